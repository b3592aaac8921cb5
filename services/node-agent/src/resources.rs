//! Resource vectors, node attributes, and host capacity probing.
//!
//! Resources are named scalar quantities (`cpus:2;mem:1024`). The
//! agent only accounts them; enforcement belongs to the isolation
//! backend.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A vector of named scalar resources.
///
/// Quantities are additive; `mem` is in megabytes by convention.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resources(BTreeMap<String, f64>);

impl Resources {
    /// An empty resource vector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a resource string of the form `cpus:2;mem:1024`.
    pub fn parse(s: &str) -> Result<Self> {
        let mut resources = BTreeMap::new();

        for part in s.split(';').filter(|p| !p.trim().is_empty()) {
            let Some((name, value)) = part.split_once(':') else {
                bail!("malformed resource '{part}': expected name:value");
            };

            let name = name.trim();
            if name.is_empty() {
                bail!("malformed resource '{part}': empty name");
            }

            let value: f64 = value
                .trim()
                .parse()
                .with_context(|| format!("malformed resource value in '{part}'"))?;

            resources.insert(name.to_string(), value);
        }

        Ok(Self(resources))
    }

    /// Returns the quantity of a named resource, or 0 when absent.
    #[must_use]
    pub fn get(&self, name: &str) -> f64 {
        self.0.get(name).copied().unwrap_or(0.0)
    }

    /// Sets the quantity of a named resource.
    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    /// Adds another resource vector into this one.
    pub fn merge(&mut self, other: &Resources) {
        for (name, value) in &other.0 {
            *self.0.entry(name.clone()).or_insert(0.0) += value;
        }
    }

    /// Returns the sum of this vector and another.
    #[must_use]
    pub fn plus(&self, other: &Resources) -> Resources {
        let mut sum = self.clone();
        sum.merge(other);
        sum
    }

    /// Returns true when no resources are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.0 {
            if !first {
                write!(f, ";")?;
            }
            write!(f, "{name}:{value}")?;
            first = false;
        }
        Ok(())
    }
}

/// Key/value attributes advertised to the master (`rack:r1;zone:z2`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, String>);

impl Attributes {
    /// Parses an attribute string of the form `rack:r1;zone:z2`.
    pub fn parse(s: &str) -> Result<Self> {
        let mut attributes = BTreeMap::new();

        for part in s.split(';').filter(|p| !p.trim().is_empty()) {
            let Some((key, value)) = part.split_once(':') else {
                bail!("malformed attribute '{part}': expected key:value");
            };
            attributes.insert(key.trim().to_string(), value.trim().to_string());
        }

        Ok(Self(attributes))
    }

    /// Returns the value for a key, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns true when no attributes are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// =============================================================================
// Host probes
// =============================================================================

const MIB: i64 = 1024 * 1024;

/// Detects the capacity this node offers when no override is
/// configured. Memory leaves 1 GB of headroom for the host when more
/// than 1 GB is present.
#[must_use]
pub fn detect_resources() -> Resources {
    let cpus = match std::thread::available_parallelism() {
        Ok(n) => n.get() as f64,
        Err(e) => {
            warn!(error = %e, "Failed to detect CPU count, defaulting to 1");
            1.0
        }
    };

    let mut mem_mb = total_memory_bytes() / MIB;
    if mem_mb > 1024 {
        mem_mb -= 1024;
    }

    let mut resources = Resources::new();
    resources.set("cpus", cpus);
    resources.set("mem", mem_mb as f64);
    resources
}

/// Returns the host name, or an error when the probe fails.
pub fn hostname() -> Result<String> {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        bail!("gethostname failed: {}", std::io::Error::last_os_error());
    }

    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let name = std::str::from_utf8(&buf[..end])
        .context("hostname is not valid UTF-8")?
        .to_string();

    if name.is_empty() {
        bail!("hostname probe returned an empty name");
    }

    Ok(name)
}

/// Physical memory of the host: `/proc/meminfo` where available,
/// sysconf otherwise, 1 GiB when neither probe answers.
fn total_memory_bytes() -> i64 {
    #[cfg(target_os = "linux")]
    {
        if let Some(kb) = std::fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|meminfo| meminfo_kb(&meminfo, "MemTotal"))
        {
            return kb * 1024;
        }
    }

    let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if pages > 0 && page_size > 0 {
        return pages as i64 * page_size as i64;
    }

    warn!("Failed to detect memory size, assuming 1 GiB");
    1024 * MIB
}

/// Reads one `Field:   N kB` value out of `/proc/meminfo` content.
#[cfg(target_os = "linux")]
fn meminfo_kb(content: &str, field: &str) -> Option<i64> {
    content.lines().find_map(|line| {
        let value = line.strip_prefix(field)?.strip_prefix(':')?;
        value.split_whitespace().next()?.parse().ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resources() {
        let resources = Resources::parse("cpus:2;mem:1024").unwrap();
        assert_eq!(resources.get("cpus"), 2.0);
        assert_eq!(resources.get("mem"), 1024.0);
        assert_eq!(resources.get("disk"), 0.0);
    }

    #[test]
    fn test_parse_resources_whitespace_and_empty_parts() {
        let resources = Resources::parse("cpus: 0.5 ; mem:128;").unwrap();
        assert_eq!(resources.get("cpus"), 0.5);
        assert_eq!(resources.get("mem"), 128.0);
    }

    #[test]
    fn test_parse_resources_malformed() {
        assert!(Resources::parse("cpus").is_err());
        assert!(Resources::parse("cpus:abc").is_err());
        assert!(Resources::parse(":1").is_err());
    }

    #[test]
    fn test_resources_display_roundtrip() {
        let resources = Resources::parse("cpus:1;mem:128").unwrap();
        let reparsed = Resources::parse(&resources.to_string()).unwrap();
        assert_eq!(resources, reparsed);
    }

    #[test]
    fn test_resources_merge_and_plus() {
        let mut a = Resources::parse("cpus:1;mem:128").unwrap();
        let b = Resources::parse("cpus:0.5;disk:10").unwrap();

        let sum = a.plus(&b);
        assert_eq!(sum.get("cpus"), 1.5);
        assert_eq!(sum.get("mem"), 128.0);
        assert_eq!(sum.get("disk"), 10.0);

        a.merge(&b);
        assert_eq!(a, sum);
    }

    #[test]
    fn test_parse_attributes() {
        let attributes = Attributes::parse("rack:r1;zone:us-east").unwrap();
        assert_eq!(attributes.get("rack"), Some("r1"));
        assert_eq!(attributes.get("zone"), Some("us-east"));
        assert_eq!(attributes.get("missing"), None);
    }

    #[test]
    fn test_detect_resources() {
        let resources = detect_resources();
        assert!(resources.get("cpus") >= 1.0);
        assert!(resources.get("mem") > 0.0);
    }

    #[test]
    fn test_hostname_probe() {
        let name = hostname().unwrap();
        assert!(!name.is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_meminfo_kb() {
        let sample = "MemTotal:       16384000 kB\n\
                      MemFree:         1234567 kB\n\
                      MemAvailable:    8000000 kB\n";
        assert_eq!(meminfo_kb(sample, "MemTotal"), Some(16384000));
        assert_eq!(meminfo_kb(sample, "MemAvailable"), Some(8000000));
        assert_eq!(meminfo_kb(sample, "SwapTotal"), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_meminfo_kb_ignores_prefix_collisions() {
        // "Mem" alone must not match "MemTotal" lines.
        let sample = "MemTotal:       1000 kB\n";
        assert_eq!(meminfo_kb(sample, "Mem"), None);
        assert_eq!(meminfo_kb(sample, "MemTotal"), Some(1000));
    }
}
