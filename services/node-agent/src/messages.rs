//! Wire messages the agent exchanges with the master, framework
//! schedulers, and executor processes.
//!
//! Payloads are structured records; the byte-level encoding and
//! delivery belong to the transport layer. Every outbound message is
//! one variant of [`WireMessage`].

use serde::{Deserialize, Serialize};

use strata_id::{ExecutorId, FrameworkId, SlaveId, TaskId, UpdateId};

use crate::catalog::{AgentInfo, ExecutorInfo, FrameworkInfo, StatusUpdate, Task, TaskInfo};
use crate::isolation::UsageStatistics;
use crate::resources::Resources;

/// An opaque transport endpoint address.
///
/// Addresses carry no lifetime claim: holding one does not keep the
/// peer alive, and sends to dead peers are best-effort.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Messages the agent sends over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    // -- to the master -------------------------------------------------------
    /// First-time registration.
    RegisterSlave { slave: AgentInfo },

    /// Registration after failover: carries everything still running
    /// here so the new master can rebuild its picture of this node.
    ReregisterSlave {
        slave_id: SlaveId,
        slave: AgentInfo,
        executor_infos: Vec<ExecutorInfo>,
        tasks: Vec<Task>,
    },

    /// A task-state transition. `pid` is the agent endpoint the
    /// acknowledgement should come back to; synthetic one-shot
    /// updates leave it unset.
    StatusUpdate {
        update: StatusUpdate,
        #[serde(skip_serializing_if = "Option::is_none")]
        pid: Option<Address>,
    },

    /// Data from an executor routed back to its scheduler.
    ExecutorToFramework {
        slave_id: SlaveId,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        data: Vec<u8>,
    },

    /// A non-command executor exited; informational.
    ExitedExecutor {
        slave_id: SlaveId,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        status: i32,
    },

    /// A resource usage sample for one executor.
    Usage(UsageMessage),

    /// Reply to a ping.
    Pong,

    // -- to executors --------------------------------------------------------
    /// Registration accepted; the executor may start running tasks.
    ExecutorRegistered {
        executor_info: ExecutorInfo,
        framework_id: FrameworkId,
        framework_info: FrameworkInfo,
        slave_id: SlaveId,
        slave_info: AgentInfo,
    },

    /// Deliver a task.
    RunTask {
        framework_id: FrameworkId,
        framework: FrameworkInfo,
        /// Scheduler address, so the executor can reach it directly.
        pid: Address,
        task: TaskInfo,
    },

    /// Kill a task; the executor answers with a status update.
    KillTask {
        framework_id: FrameworkId,
        task_id: TaskId,
    },

    /// Data from a scheduler routed to an executor.
    FrameworkToExecutor {
        slave_id: SlaveId,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        data: Vec<u8>,
    },

    /// Ask the executor to wind down and exit.
    ShutdownExecutor,
}

/// Usage report for one executor, sent to the master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageMessage {
    pub slave_id: SlaveId,
    pub framework_id: FrameworkId,
    pub executor_id: ExecutorId,
    /// Latest sample, diffed against the previous one when available.
    pub statistics: UsageStatistics,
    /// Capacity this node offers.
    pub expected_resources: Resources,
    /// False when the executor is already gone; the sample is final.
    pub still_running: bool,
}

impl WireMessage {
    /// Correlator of a status-update message, for log lines and tests.
    #[must_use]
    pub fn update_uuid(&self) -> Option<UpdateId> {
        match self {
            WireMessage::StatusUpdate { update, .. } => Some(update.uuid),
            _ => None,
        }
    }
}
