//! In-memory catalog of frameworks, executors, and tasks.
//!
//! The agent actor exclusively owns everything in here; all mutation
//! happens on the event loop, so no locking is involved. The catalog
//! is a pure data container — routing and lifecycle decisions live in
//! the agent handlers.
//!
//! Invariants:
//! - A framework is removed exactly when its executor map and its
//!   pending-update map are both empty.
//! - No two executors within one framework share an executor ID.
//! - Task state only advances; terminal states absorb.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use strata_id::{EpochId, ExecutorId, FrameworkId, SlaveId, TaskId, UpdateId};

use crate::config::Config;
use crate::messages::Address;
use crate::resources::{self, Attributes, Resources};

// =============================================================================
// Agent identity
// =============================================================================

/// Immutable description of this node, sent to the master at
/// registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub hostname: String,
    /// Hostname shown in the master's web UI; usually the same as
    /// `hostname` unless a public DNS name is configured.
    pub webui_hostname: String,
    pub webui_port: u16,
    /// Capacity offered to the master.
    pub resources: Resources,
    pub attributes: Attributes,
}

impl AgentInfo {
    /// Builds the agent's identity from configuration and host probes.
    ///
    /// Fails when the hostname cannot be determined; the agent cannot
    /// run without one.
    pub fn detect(config: &Config) -> anyhow::Result<Self> {
        let hostname = resources::hostname()?;

        let webui_hostname = config.public_dns.clone().unwrap_or_else(|| hostname.clone());

        let offered = match &config.resources {
            Some(spec) => Resources::parse(spec)?,
            None => resources::detect_resources(),
        };

        let attributes = match &config.attributes {
            Some(spec) => Attributes::parse(spec)?,
            None => Attributes::default(),
        };

        Ok(Self {
            hostname,
            webui_hostname,
            webui_port: config.webui_port,
            resources: offered,
            attributes,
        })
    }
}

// =============================================================================
// Tasks
// =============================================================================

/// Task lifecycle states. The last four are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Staging,
    Starting,
    Running,
    Finished,
    Failed,
    Killed,
    Lost,
}

impl TaskState {
    /// Returns true for states a task can never leave.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Finished | TaskState::Failed | TaskState::Killed | TaskState::Lost
        )
    }

    fn rank(&self) -> u8 {
        match self {
            TaskState::Staging => 0,
            TaskState::Starting => 1,
            TaskState::Running => 2,
            TaskState::Finished | TaskState::Failed | TaskState::Killed | TaskState::Lost => 3,
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Staging => "staging",
            TaskState::Starting => "starting",
            TaskState::Running => "running",
            TaskState::Finished => "finished",
            TaskState::Failed => "failed",
            TaskState::Killed => "killed",
            TaskState::Lost => "lost",
        };
        write!(f, "{s}")
    }
}

/// A command line run by the default executor on behalf of a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandInfo {
    pub value: String,
    #[serde(default)]
    pub arguments: Vec<String>,
}

/// Executor description: either supplied by the framework or
/// synthesized for command tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorInfo {
    pub executor_id: ExecutorId,
    /// Stamped when the info leaves the agent (reregistration).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework_id: Option<FrameworkId>,
    pub command: CommandInfo,
    #[serde(default)]
    pub resources: Resources,
}

/// A task as assigned by the master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub task_id: TaskId,
    pub name: String,
    #[serde(default)]
    pub resources: Resources,
    /// Explicit executor, when the framework supplies one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor: Option<ExecutorInfo>,
    /// Plain command, for tasks run by the synthesized executor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandInfo>,
}

/// A task the agent has delivered to an executor and tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub name: String,
    /// Absent for command-executor tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<ExecutorId>,
    #[serde(default)]
    pub resources: Resources,
    pub state: TaskState,
}

/// A task-state transition reported upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A status update and its acknowledgement correlator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub framework_id: FrameworkId,
    pub slave_id: SlaveId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<ExecutorId>,
    pub status: TaskStatus,
    pub timestamp: DateTime<Utc>,
    pub uuid: UpdateId,
}

// =============================================================================
// Executors
// =============================================================================

/// A per-framework executor slot on this node.
#[derive(Debug)]
pub struct Executor {
    pub executor_id: ExecutorId,
    pub framework_id: FrameworkId,
    pub info: ExecutorInfo,
    /// Work directory for this run.
    pub directory: PathBuf,
    /// Lifecycle epoch; a new slot with the same ID gets a new epoch.
    pub epoch: EpochId,
    /// Transport address of the executor process; unset until it
    /// registers.
    pub pid: Option<Address>,
    /// Set once graceful shutdown has been requested.
    pub shutdown: bool,
    /// Tasks not yet delivered to the executor process.
    pub queued_tasks: HashMap<TaskId, TaskInfo>,
    /// Tasks delivered and tracked.
    pub launched_tasks: HashMap<TaskId, Task>,
}

impl Executor {
    fn new(framework_id: FrameworkId, info: ExecutorInfo, directory: PathBuf) -> Self {
        Self {
            executor_id: info.executor_id.clone(),
            framework_id,
            info,
            directory,
            epoch: EpochId::new(),
            pid: None,
            shutdown: false,
            queued_tasks: HashMap::new(),
            launched_tasks: HashMap::new(),
        }
    }

    /// Moves a task into the launched set.
    pub fn add_task(&mut self, task: TaskInfo) {
        let tracked = Task {
            task_id: task.task_id.clone(),
            name: task.name.clone(),
            executor_id: task.executor.as_ref().map(|e| e.executor_id.clone()),
            resources: task.resources.clone(),
            state: TaskState::Staging,
        };
        self.launched_tasks.insert(tracked.task_id.clone(), tracked);
    }

    /// Drops a task from whichever set holds it.
    pub fn remove_task(&mut self, task_id: &TaskId) {
        self.queued_tasks.remove(task_id);
        self.launched_tasks.remove(task_id);
    }

    /// Advances a launched task's state. Terminal states absorb and
    /// earlier states never reappear.
    pub fn update_task_state(&mut self, task_id: &TaskId, state: TaskState) {
        if let Some(task) = self.launched_tasks.get_mut(task_id) {
            if !task.state.is_terminal() && state.rank() >= task.state.rank() {
                task.state = state;
            }
        }
    }

    /// Resources the isolation backend should enforce for this slot:
    /// the executor's own plus everything queued and launched.
    #[must_use]
    pub fn resources(&self) -> Resources {
        let mut total = self.info.resources.clone();
        for task in self.queued_tasks.values() {
            total.merge(&task.resources);
        }
        for task in self.launched_tasks.values() {
            total.merge(&task.resources);
        }
        total
    }
}

// =============================================================================
// Frameworks
// =============================================================================

/// Static description of a framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkInfo {
    pub name: String,
    pub user: String,
    /// Executor template; tasks may still carry their own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor: Option<ExecutorInfo>,
    #[serde(default)]
    pub failover_timeout_secs: f64,
}

/// A framework with live state on this node.
#[derive(Debug)]
pub struct Framework {
    pub framework_id: FrameworkId,
    pub info: FrameworkInfo,
    /// Transport address of the framework's scheduler.
    pub pid: Address,
    pub executors: HashMap<ExecutorId, Executor>,
    /// Status updates awaiting acknowledgement, by correlator.
    pub updates: HashMap<UpdateId, StatusUpdate>,
}

impl Framework {
    pub fn new(framework_id: FrameworkId, info: FrameworkInfo, pid: Address) -> Self {
        Self {
            framework_id,
            info,
            pid,
            executors: HashMap::new(),
            updates: HashMap::new(),
        }
    }

    /// Resolves the executor a task should run under: the task's own
    /// executor when present, otherwise one synthesized around the
    /// task's command.
    #[must_use]
    pub fn executor_info_for(&self, task: &TaskInfo) -> ExecutorInfo {
        if let Some(executor) = &task.executor {
            return executor.clone();
        }

        // Command task: the default executor is keyed by the task ID
        // so each command task gets its own slot.
        ExecutorInfo {
            executor_id: ExecutorId::new(task.task_id.as_str()),
            framework_id: None,
            command: task.command.clone().unwrap_or_default(),
            resources: Resources::new(),
        }
    }

    #[must_use]
    pub fn executor(&self, executor_id: &ExecutorId) -> Option<&Executor> {
        self.executors.get(executor_id)
    }

    pub fn executor_mut(&mut self, executor_id: &ExecutorId) -> Option<&mut Executor> {
        self.executors.get_mut(executor_id)
    }

    /// Finds the executor responsible for a task, searching both
    /// queued and launched sets.
    #[must_use]
    pub fn executor_id_for_task(&self, task_id: &TaskId) -> Option<ExecutorId> {
        self.executors
            .values()
            .find(|e| {
                e.queued_tasks.contains_key(task_id) || e.launched_tasks.contains_key(task_id)
            })
            .map(|e| e.executor_id.clone())
    }

    /// Creates a new executor slot with a fresh epoch.
    pub fn create_executor(&mut self, info: ExecutorInfo, directory: PathBuf) -> &mut Executor {
        let executor = Executor::new(self.framework_id.clone(), info, directory);
        let executor_id = executor.executor_id.clone();
        self.executors.insert(executor_id.clone(), executor);
        self.executors
            .get_mut(&executor_id)
            .expect("executor was just inserted")
    }

    pub fn destroy_executor(&mut self, executor_id: &ExecutorId) -> Option<Executor> {
        self.executors.remove(executor_id)
    }

    /// True when nothing keeps this framework alive.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.executors.is_empty() && self.updates.is_empty()
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// The framework map the agent owns.
#[derive(Debug, Default)]
pub struct Catalog {
    frameworks: HashMap<FrameworkId, Framework>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn framework(&self, framework_id: &FrameworkId) -> Option<&Framework> {
        self.frameworks.get(framework_id)
    }

    pub fn framework_mut(&mut self, framework_id: &FrameworkId) -> Option<&mut Framework> {
        self.frameworks.get_mut(framework_id)
    }

    pub fn insert(&mut self, framework: Framework) -> &mut Framework {
        let framework_id = framework.framework_id.clone();
        self.frameworks.insert(framework_id.clone(), framework);
        self.frameworks
            .get_mut(&framework_id)
            .expect("framework was just inserted")
    }

    /// Removes the framework when both its executor and update maps
    /// are empty. Returns true when removal happened.
    pub fn remove_if_idle(&mut self, framework_id: &FrameworkId) -> bool {
        let idle = self
            .frameworks
            .get(framework_id)
            .is_some_and(Framework::is_idle);
        if idle {
            self.frameworks.remove(framework_id);
        }
        idle
    }

    pub fn frameworks(&self) -> impl Iterator<Item = &Framework> {
        self.frameworks.values()
    }

    pub fn frameworks_mut(&mut self) -> impl Iterator<Item = &mut Framework> {
        self.frameworks.values_mut()
    }

    #[must_use]
    pub fn framework_ids(&self) -> Vec<FrameworkId> {
        self.frameworks.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frameworks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frameworks.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
