//! Isolation backend seam.
//!
//! The backend is the enforcement boundary: it launches and kills
//! executor processes, applies resource limits, and samples usage.
//! The agent accounts; the backend enforces. Work happens out-of-band
//! — every call here must return promptly, and results come back to
//! the agent as events on its loop (`executor_started`,
//! `executor_exited`, completed statistics collections).
//!
//! A mock implementation records every call for tests and
//! development.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use strata_id::{ExecutorId, FrameworkId};

use crate::actors::ActorHandle;
use crate::agent::AgentEvent;
use crate::catalog::{ExecutorInfo, FrameworkInfo};
use crate::config::Config;
use crate::resources::Resources;

/// One resource usage sample for an executor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceStatistics {
    pub timestamp: DateTime<Utc>,
    /// Cumulative CPU time in user mode, seconds.
    pub cpu_user_secs: f64,
    /// Cumulative CPU time in kernel mode, seconds.
    pub cpu_system_secs: f64,
    /// Resident set size, bytes.
    pub memory_rss_bytes: i64,
}

impl ResourceStatistics {
    /// Produces the usage view of this sample, diffing the cumulative
    /// CPU counters against the previous sample when one exists.
    #[must_use]
    pub fn since(&self, previous: Option<&ResourceStatistics>) -> UsageStatistics {
        let (cpu_user_secs, cpu_system_secs) = match previous {
            Some(prev) => (
                (self.cpu_user_secs - prev.cpu_user_secs).max(0.0),
                (self.cpu_system_secs - prev.cpu_system_secs).max(0.0),
            ),
            None => (self.cpu_user_secs, self.cpu_system_secs),
        };

        UsageStatistics {
            timestamp: self.timestamp,
            cpu_user_secs,
            cpu_system_secs,
            memory_rss_bytes: self.memory_rss_bytes,
        }
    }
}

/// Usage since the previous sample (CPU deltas, current RSS).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageStatistics {
    pub timestamp: DateTime<Utc>,
    pub cpu_user_secs: f64,
    pub cpu_system_secs: f64,
    pub memory_rss_bytes: i64,
}

/// The isolation backend interface.
///
/// Implementations must not block the caller: process launch, cgroup
/// manipulation, and sampling run out-of-band, and completion reaches
/// the agent through its event mailbox.
#[async_trait]
pub trait IsolationBackend: Send + Sync {
    /// Hand the backend its configuration and the agent mailbox for
    /// callbacks.
    async fn initialize(&self, config: &Config, agent: ActorHandle<AgentEvent>);

    /// Start an executor process in the given work directory with the
    /// given resource limits.
    async fn launch_executor(
        &self,
        framework_id: &FrameworkId,
        framework_info: &FrameworkInfo,
        executor_info: &ExecutorInfo,
        directory: &Path,
        resources: &Resources,
    );

    /// Forcibly terminate an executor process.
    async fn kill_executor(&self, framework_id: &FrameworkId, executor_id: &ExecutorId);

    /// Apply new resource limits for an executor slot.
    async fn resources_changed(
        &self,
        framework_id: &FrameworkId,
        executor_id: &ExecutorId,
        resources: &Resources,
    );

    /// Relative weights between frameworks.
    async fn set_framework_priorities(&self, priorities: &HashMap<FrameworkId, f64>);

    /// Trigger an asynchronous usage sample for an executor.
    async fn sample_usage(&self, framework_id: &FrameworkId, executor_id: &ExecutorId);

    /// Collect a statistics sample; `None` when the executor is not
    /// measurable (already gone, backend failure).
    async fn collect_statistics(
        &self,
        framework_id: &FrameworkId,
        executor_id: &ExecutorId,
    ) -> Option<ResourceStatistics>;

    /// Tear the backend down; called once at agent shutdown.
    async fn terminate(&self);
}

// =============================================================================
// Mock backend
// =============================================================================

/// A call recorded by the mock backend.
#[derive(Debug, Clone, PartialEq)]
pub enum IsolationCall {
    Initialize,
    LaunchExecutor {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        directory: std::path::PathBuf,
        resources: Resources,
    },
    KillExecutor {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
    },
    ResourcesChanged {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        resources: Resources,
    },
    SetFrameworkPriorities {
        priorities: Vec<(FrameworkId, f64)>,
    },
    SampleUsage {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
    },
    CollectStatistics {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
    },
    Terminate,
}

/// Mock backend for testing and development: records every call and
/// serves canned statistics samples.
pub struct MockIsolation {
    calls: Mutex<Vec<IsolationCall>>,
    statistics: Mutex<Vec<ResourceStatistics>>,
    agent: Mutex<Option<ActorHandle<AgentEvent>>>,
}

impl MockIsolation {
    /// Create a new mock backend.
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            statistics: Mutex::new(Vec::new()),
            agent: Mutex::new(None),
        }
    }

    /// Queue a statistics sample to be returned by the next
    /// `collect_statistics` call.
    pub fn push_statistics(&self, sample: ResourceStatistics) {
        self.statistics
            .lock()
            .expect("statistics queue poisoned")
            .push(sample);
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<IsolationCall> {
        self.calls.lock().expect("call log poisoned").clone()
    }

    /// The agent mailbox captured at `initialize`, for driving
    /// callbacks from a test harness.
    pub fn agent_handle(&self) -> Option<ActorHandle<AgentEvent>> {
        self.agent.lock().expect("agent handle poisoned").clone()
    }

    /// Recorded calls of one kind, by predicate.
    pub fn calls_matching(&self, pred: impl Fn(&IsolationCall) -> bool) -> Vec<IsolationCall> {
        self.calls
            .lock()
            .expect("call log poisoned")
            .iter()
            .filter(|c| pred(c))
            .cloned()
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear(&self) {
        self.calls.lock().expect("call log poisoned").clear();
    }

    fn record(&self, call: IsolationCall) {
        self.calls.lock().expect("call log poisoned").push(call);
    }
}

impl Default for MockIsolation {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IsolationBackend for MockIsolation {
    async fn initialize(&self, _config: &Config, agent: ActorHandle<AgentEvent>) {
        info!("[MOCK] Isolation backend initialized");
        *self.agent.lock().expect("agent handle poisoned") = Some(agent);
        self.record(IsolationCall::Initialize);
    }

    async fn launch_executor(
        &self,
        framework_id: &FrameworkId,
        _framework_info: &FrameworkInfo,
        executor_info: &ExecutorInfo,
        directory: &Path,
        resources: &Resources,
    ) {
        info!(
            framework_id = %framework_id,
            executor_id = %executor_info.executor_id,
            directory = %directory.display(),
            resources = %resources,
            "[MOCK] Launching executor"
        );
        self.record(IsolationCall::LaunchExecutor {
            framework_id: framework_id.clone(),
            executor_id: executor_info.executor_id.clone(),
            directory: directory.to_path_buf(),
            resources: resources.clone(),
        });
    }

    async fn kill_executor(&self, framework_id: &FrameworkId, executor_id: &ExecutorId) {
        info!(
            framework_id = %framework_id,
            executor_id = %executor_id,
            "[MOCK] Killing executor"
        );
        self.record(IsolationCall::KillExecutor {
            framework_id: framework_id.clone(),
            executor_id: executor_id.clone(),
        });
    }

    async fn resources_changed(
        &self,
        framework_id: &FrameworkId,
        executor_id: &ExecutorId,
        resources: &Resources,
    ) {
        debug!(
            framework_id = %framework_id,
            executor_id = %executor_id,
            resources = %resources,
            "[MOCK] Resources changed"
        );
        self.record(IsolationCall::ResourcesChanged {
            framework_id: framework_id.clone(),
            executor_id: executor_id.clone(),
            resources: resources.clone(),
        });
    }

    async fn set_framework_priorities(&self, priorities: &HashMap<FrameworkId, f64>) {
        let mut priorities: Vec<_> = priorities
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        priorities.sort_by(|a, b| a.0.cmp(&b.0));
        self.record(IsolationCall::SetFrameworkPriorities { priorities });
    }

    async fn sample_usage(&self, framework_id: &FrameworkId, executor_id: &ExecutorId) {
        self.record(IsolationCall::SampleUsage {
            framework_id: framework_id.clone(),
            executor_id: executor_id.clone(),
        });
    }

    async fn collect_statistics(
        &self,
        framework_id: &FrameworkId,
        executor_id: &ExecutorId,
    ) -> Option<ResourceStatistics> {
        self.record(IsolationCall::CollectStatistics {
            framework_id: framework_id.clone(),
            executor_id: executor_id.clone(),
        });

        let mut queue = self.statistics.lock().expect("statistics queue poisoned");
        if queue.is_empty() {
            None
        } else {
            Some(queue.remove(0))
        }
    }

    async fn terminate(&self) {
        info!("[MOCK] Isolation backend terminated");
        self.record(IsolationCall::Terminate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_diff_against_previous() {
        let now = Utc::now();
        let prev = ResourceStatistics {
            timestamp: now,
            cpu_user_secs: 10.0,
            cpu_system_secs: 2.0,
            memory_rss_bytes: 1024,
        };
        let current = ResourceStatistics {
            timestamp: now,
            cpu_user_secs: 12.5,
            cpu_system_secs: 2.5,
            memory_rss_bytes: 2048,
        };

        let usage = current.since(Some(&prev));
        assert!((usage.cpu_user_secs - 2.5).abs() < 1e-9);
        assert!((usage.cpu_system_secs - 0.5).abs() < 1e-9);
        assert_eq!(usage.memory_rss_bytes, 2048);
    }

    #[test]
    fn test_statistics_diff_without_previous() {
        let current = ResourceStatistics {
            timestamp: Utc::now(),
            cpu_user_secs: 3.0,
            cpu_system_secs: 1.0,
            memory_rss_bytes: 512,
        };

        let usage = current.since(None);
        assert_eq!(usage.cpu_user_secs, 3.0);
        assert_eq!(usage.cpu_system_secs, 1.0);
    }

    #[tokio::test]
    async fn test_mock_isolation_records_calls() {
        let backend = MockIsolation::new();
        let framework_id = FrameworkId::new("f1");
        let executor_id = ExecutorId::new("e1");

        backend.kill_executor(&framework_id, &executor_id).await;
        backend.sample_usage(&framework_id, &executor_id).await;

        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], IsolationCall::KillExecutor { .. }));
        assert!(matches!(calls[1], IsolationCall::SampleUsage { .. }));
    }

    #[tokio::test]
    async fn test_mock_isolation_statistics_queue() {
        let backend = MockIsolation::new();
        let framework_id = FrameworkId::new("f1");
        let executor_id = ExecutorId::new("e1");

        assert!(backend
            .collect_statistics(&framework_id, &executor_id)
            .await
            .is_none());

        backend.push_statistics(ResourceStatistics {
            timestamp: Utc::now(),
            cpu_user_secs: 1.0,
            cpu_system_secs: 0.5,
            memory_rss_bytes: 4096,
        });

        let sample = backend
            .collect_statistics(&framework_id, &executor_id)
            .await
            .unwrap();
        assert_eq!(sample.memory_rss_bytes, 4096);
    }
}
