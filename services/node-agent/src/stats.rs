//! Counters and observability snapshots.
//!
//! The snapshot documents here are what the node's status endpoints
//! serve; the HTTP layer itself lives outside the agent.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;

use strata_id::SlaveId;

use crate::catalog::{Catalog, TaskState};
use crate::messages::Address;

/// Running counters kept by the agent.
#[derive(Debug)]
pub struct Stats {
    /// Count of status updates observed per resulting state.
    pub tasks: BTreeMap<TaskState, u64>,
    pub valid_status_updates: u64,
    pub invalid_status_updates: u64,
    pub valid_framework_messages: u64,
    pub invalid_framework_messages: u64,
    pub started_at: Instant,
}

impl Stats {
    pub fn new() -> Self {
        let mut tasks = BTreeMap::new();
        for state in [
            TaskState::Staging,
            TaskState::Starting,
            TaskState::Running,
            TaskState::Finished,
            TaskState::Failed,
            TaskState::Killed,
            TaskState::Lost,
        ] {
            tasks.insert(state, 0);
        }

        Self {
            tasks,
            valid_status_updates: 0,
            invalid_status_updates: 0,
            valid_framework_messages: 0,
            invalid_framework_messages: 0,
            started_at: Instant::now(),
        }
    }

    /// Bumps the counter for a task state.
    pub fn record_task(&mut self, state: TaskState) {
        *self.tasks.entry(state).or_insert(0) += 1;
    }

    /// The counters document (`stats.json`).
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs_f64(),
            tasks: self.tasks.clone(),
            valid_status_updates: self.valid_status_updates,
            invalid_status_updates: self.invalid_status_updates,
            valid_framework_messages: self.valid_framework_messages,
            invalid_framework_messages: self.invalid_framework_messages,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialized counters.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub uptime_secs: f64,
    pub tasks: BTreeMap<TaskState, u64>,
    pub valid_status_updates: u64,
    pub invalid_status_updates: u64,
    pub valid_framework_messages: u64,
    pub invalid_framework_messages: u64,
}

/// Serialized view of the catalog (`state.json`).
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slave_id: Option<SlaveId>,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master: Option<Address>,
    pub frameworks: Vec<FrameworkSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameworkSnapshot {
    pub framework_id: String,
    pub name: String,
    pub user: String,
    pub pid: Address,
    pub executors: Vec<ExecutorSnapshot>,
    pub pending_updates: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutorSnapshot {
    pub executor_id: String,
    pub directory: String,
    pub registered: bool,
    pub shutdown: bool,
    pub queued_tasks: usize,
    pub tasks: BTreeMap<String, TaskState>,
}

impl StateSnapshot {
    /// Builds the state document from the agent's catalog.
    pub fn capture(
        slave_id: Option<&SlaveId>,
        connected: bool,
        master: Option<&Address>,
        catalog: &Catalog,
    ) -> Self {
        let mut frameworks: Vec<FrameworkSnapshot> = catalog
            .frameworks()
            .map(|framework| {
                let mut executors: Vec<ExecutorSnapshot> = framework
                    .executors
                    .values()
                    .map(|executor| ExecutorSnapshot {
                        executor_id: executor.executor_id.to_string(),
                        directory: executor.directory.display().to_string(),
                        registered: executor.pid.is_some(),
                        shutdown: executor.shutdown,
                        queued_tasks: executor.queued_tasks.len(),
                        tasks: executor
                            .launched_tasks
                            .values()
                            .map(|t| (t.task_id.to_string(), t.state))
                            .collect(),
                    })
                    .collect();
                executors.sort_by(|a, b| a.executor_id.cmp(&b.executor_id));

                FrameworkSnapshot {
                    framework_id: framework.framework_id.to_string(),
                    name: framework.info.name.clone(),
                    user: framework.info.user.clone(),
                    pid: framework.pid.clone(),
                    executors,
                    pending_updates: framework.updates.len(),
                }
            })
            .collect();
        frameworks.sort_by(|a, b| a.framework_id.cmp(&b.framework_id));

        Self {
            slave_id: slave_id.cloned(),
            connected,
            master: master.cloned(),
            frameworks,
        }
    }
}
