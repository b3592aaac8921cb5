use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

/// Agent configuration, read from `STRATA_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the agent's on-disk state.
    pub work_dir: PathBuf,
    /// Override for detected capacity, e.g. `cpus:4;mem:8192`.
    pub resources: Option<String>,
    /// Node attributes advertised to the master, e.g. `rack:r1`.
    pub attributes: Option<String>,
    /// Port advertised for the node web UI.
    pub webui_port: u16,
    /// Age after which abandoned directories are deleted.
    pub gc_timeout: Duration,
    /// Grace period between ShutdownExecutor and a forced kill.
    pub executor_shutdown_timeout: Duration,
    /// Compute work directory paths but do not create them.
    pub no_create_work_dir: bool,
    /// Public DNS name advertised in place of the probed hostname.
    pub public_dns: Option<String>,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let work_dir = std::env::var("STRATA_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/var/lib/strata"));

        let resources = std::env::var("STRATA_RESOURCES").ok();
        let attributes = std::env::var("STRATA_ATTRIBUTES").ok();

        let webui_port = std::env::var("STRATA_WEBUI_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8081);

        let gc_timeout_hours: u64 = std::env::var("STRATA_GC_TIMEOUT_HOURS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(24);

        let executor_shutdown_timeout_secs: u64 =
            std::env::var("STRATA_EXECUTOR_SHUTDOWN_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5);

        let no_create_work_dir = std::env::var("STRATA_NO_CREATE_WORK_DIR")
            .ok()
            .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let public_dns = std::env::var("STRATA_PUBLIC_DNS").ok();

        let log_level = std::env::var("STRATA_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            work_dir,
            resources,
            attributes,
            webui_port,
            gc_timeout: Duration::from_secs(gc_timeout_hours * 3600),
            executor_shutdown_timeout: Duration::from_secs(executor_shutdown_timeout_secs),
            no_create_work_dir,
            public_dns,
            log_level,
        })
    }
}

#[cfg(test)]
impl Config {
    /// Configuration for tests: a private work dir and a short kill
    /// grace period.
    pub fn for_tests(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            resources: None,
            attributes: None,
            webui_port: 8081,
            gc_timeout: Duration::from_secs(3600),
            executor_shutdown_timeout: Duration::from_millis(50),
            no_create_work_dir: false,
            public_dns: None,
            log_level: "info".to_string(),
        }
    }
}
