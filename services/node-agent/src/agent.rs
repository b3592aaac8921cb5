//! The agent actor.
//!
//! One long-lived actor owns the whole catalog and drains a single
//! mailbox of events from five sources: master messages, executor
//! messages, isolation-backend callbacks, timers, and link-loss
//! notifications. Handlers run strictly one at a time, so every
//! handler observes all state changes of its predecessors and no
//! catalog access needs locking.
//!
//! Timers are never cancelled. Each delayed self-message re-checks
//! the catalog when it fires (the kill-timeout's epoch match, the
//! status-retry's pending-table lookup) and becomes a no-op when the
//! state it guarded is gone.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use strata_id::{EpochId, ExecutorId, FrameworkId, SlaveId, TaskId, UpdateId};

use crate::actors::{Actor, ActorContext, ActorError, ActorHandle};
use crate::catalog::{
    AgentInfo, Catalog, ExecutorInfo, Framework, FrameworkInfo, StatusUpdate, TaskInfo, TaskState,
    TaskStatus,
};
use crate::config::Config;
use crate::isolation::{IsolationBackend, ResourceStatistics};
use crate::messages::{Address, UsageMessage, WireMessage};
use crate::resources::Resources;
use crate::stats::{StateSnapshot, Stats, StatsSnapshot};
use crate::transport::Transport;
use crate::workdir;

/// How often registration is re-attempted until the master answers.
const REGISTRATION_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// How often an unacknowledged status update is resent.
const STATUS_UPDATE_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Cadence of the usage sampling walk and per-executor collection.
const USAGE_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

// =============================================================================
// Events
// =============================================================================

/// Everything the agent reacts to, in one mailbox.
#[derive(Debug)]
pub enum AgentEvent {
    // -- master detection and registration -----------------------------------
    NewMasterDetected {
        master: Address,
    },
    NoMasterDetected,
    Registered {
        slave_id: SlaveId,
    },
    Reregistered {
        slave_id: SlaveId,
    },

    // -- task routing from the master ----------------------------------------
    RunTask {
        framework_info: FrameworkInfo,
        framework_id: FrameworkId,
        pid: Address,
        task: TaskInfo,
    },
    KillTask {
        framework_id: FrameworkId,
        task_id: TaskId,
    },
    ShutdownFramework {
        framework_id: FrameworkId,
    },
    SchedulerMessage {
        slave_id: SlaveId,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        data: Vec<u8>,
    },
    UpdateFramework {
        framework_id: FrameworkId,
        pid: Address,
    },
    StatusUpdateAcknowledgement {
        slave_id: SlaveId,
        framework_id: FrameworkId,
        task_id: TaskId,
        uuid: UpdateId,
    },
    SetFrameworkPriorities {
        priorities: HashMap<FrameworkId, f64>,
    },
    Ping {
        from: Address,
    },
    Shutdown,

    // -- executor traffic ----------------------------------------------------
    RegisterExecutor {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        from: Address,
    },
    StatusUpdate {
        update: StatusUpdate,
    },
    ExecutorMessage {
        slave_id: SlaveId,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        data: Vec<u8>,
    },

    // -- isolation backend callbacks -----------------------------------------
    ExecutorStarted {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        pid: u32,
    },
    ExecutorExited {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        status: i32,
    },
    StatisticsCollected {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        previous: Option<ResourceStatistics>,
        sample: Option<ResourceStatistics>,
    },

    // -- timers --------------------------------------------------------------
    RegistrationRetry,
    StatusUpdateRetry {
        framework_id: FrameworkId,
        uuid: UpdateId,
    },
    ShutdownExecutorTimeout {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        epoch: EpochId,
    },
    UsageSampleTick,
    CollectStatistics {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        previous: Option<ResourceStatistics>,
    },
    ExpireDirectories {
        paths: Vec<PathBuf>,
    },

    // -- transport -----------------------------------------------------------
    PeerExited {
        address: Address,
    },
}

// =============================================================================
// Agent
// =============================================================================

/// The per-node agent.
pub struct Agent {
    config: Config,
    info: AgentInfo,
    /// Assigned by the master at first registration; never changes.
    slave_id: Option<SlaveId>,
    master: Option<Address>,
    connected: bool,
    catalog: Catalog,
    stats: Stats,
    transport: Arc<dyn Transport>,
    isolation: Arc<dyn IsolationBackend>,
    /// Mailbox to self, for delayed events.
    handle: ActorHandle<AgentEvent>,
}

/// Routing decision for an incoming task, resolved against the
/// executor slot's current state.
enum RunTaskAction {
    /// Executor is shutting down: report the task lost, touch nothing.
    ReportLost,
    /// Executor not yet registered: task parked in the queue.
    Queued,
    /// Executor registered: deliver.
    Deliver {
        executor_pid: Address,
        resources: Resources,
    },
    /// No executor yet: one was created with the task queued.
    Launch {
        executor_info: ExecutorInfo,
        directory: PathBuf,
        resources: Resources,
    },
}

/// Routing decision for a kill request.
enum KillTaskAction {
    UnknownFramework,
    UnknownTask,
    /// Executor not yet registered: task removed from its queue.
    Deregistered {
        executor_id: ExecutorId,
        resources: Resources,
    },
    Forward {
        executor_pid: Address,
    },
}

impl Agent {
    pub fn new(
        config: Config,
        info: AgentInfo,
        transport: Arc<dyn Transport>,
        isolation: Arc<dyn IsolationBackend>,
        handle: ActorHandle<AgentEvent>,
    ) -> Self {
        Self {
            config,
            info,
            slave_id: None,
            master: None,
            connected: false,
            catalog: Catalog::new(),
            stats: Stats::new(),
            transport,
            isolation,
            handle,
        }
    }

    // -- introspection --------------------------------------------------------

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn slave_id(&self) -> Option<&SlaveId> {
        self.slave_id.as_ref()
    }

    pub fn master(&self) -> Option<&Address> {
        self.master.as_ref()
    }

    /// The counters document.
    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// The catalog document.
    pub fn state_snapshot(&self) -> StateSnapshot {
        StateSnapshot::capture(
            self.slave_id.as_ref(),
            self.connected,
            self.master.as_ref(),
            &self.catalog,
        )
    }

    // -- small helpers --------------------------------------------------------

    /// The slave ID to stamp into outbound messages; empty until the
    /// master assigns one.
    fn current_slave_id(&self) -> SlaveId {
        self.slave_id.clone().unwrap_or_else(|| SlaveId::new(""))
    }

    fn send_to_master(&self, message: WireMessage) {
        match &self.master {
            Some(master) => self.transport.send(master, message),
            None => debug!("No known master; dropping outbound message"),
        }
    }

    fn make_update(
        &self,
        framework_id: FrameworkId,
        executor_id: Option<ExecutorId>,
        task_id: TaskId,
        state: TaskState,
        message: &str,
    ) -> StatusUpdate {
        StatusUpdate {
            framework_id,
            slave_id: self.current_slave_id(),
            executor_id,
            status: TaskStatus {
                task_id,
                state,
                message: Some(message.to_string()),
            },
            timestamp: Utc::now(),
            uuid: UpdateId::new(),
        }
    }

    /// One-shot terminal update straight to the master, outside the
    /// reliable pipeline. Used when there is no executor an
    /// acknowledgement round-trip would make sense for; the master's
    /// reconciliation covers a lost copy.
    fn send_unreliable_update(&self, update: StatusUpdate) {
        self.send_to_master(WireMessage::StatusUpdate { update, pid: None });
    }

    fn schedule_executor_dir_gc(&self, directory: PathBuf) {
        info!(
            path = %directory.display(),
            "Scheduling executor directory for deletion"
        );
        self.handle.send_after(
            self.config.gc_timeout,
            AgentEvent::ExpireDirectories {
                paths: vec![directory],
            },
        );
    }

    // -- registration controller ----------------------------------------------

    fn new_master_detected(&mut self, master: Address) {
        info!(master = %master, "New master detected");

        self.transport.link(&master);
        self.master = Some(master);
        self.connected = false;
        self.do_reliable_registration();
    }

    fn no_master_detected(&mut self) {
        info!("Lost master(s), waiting for a new one");
        self.connected = false;
        self.master = None;
    }

    /// One registration attempt, rescheduling itself every second
    /// until the master answers.
    fn do_reliable_registration(&mut self) {
        if self.connected {
            return;
        }
        let Some(master) = self.master.clone() else {
            return;
        };

        match &self.slave_id {
            None => {
                self.transport.send(
                    &master,
                    WireMessage::RegisterSlave {
                        slave: self.info.clone(),
                    },
                );
            }
            Some(slave_id) => {
                // Re-registering: carry every live executor and every
                // launched task so the new master can rebuild its
                // picture of this node.
                let mut executor_infos = Vec::new();
                let mut tasks = Vec::new();
                for framework in self.catalog.frameworks() {
                    for executor in framework.executors.values() {
                        let mut executor_info = executor.info.clone();
                        executor_info.framework_id = Some(framework.framework_id.clone());
                        executor_infos.push(executor_info);
                        tasks.extend(executor.launched_tasks.values().cloned());
                    }
                }

                self.transport.send(
                    &master,
                    WireMessage::ReregisterSlave {
                        slave_id: slave_id.clone(),
                        slave: self.info.clone(),
                        executor_infos,
                        tasks,
                    },
                );
            }
        }

        self.handle
            .send_after(REGISTRATION_RETRY_INTERVAL, AgentEvent::RegistrationRetry);
    }

    fn registered(&mut self, slave_id: SlaveId) {
        info!(slave_id = %slave_id, "Registered with master");
        self.slave_id = Some(slave_id.clone());
        self.connected = true;

        // Directories of previous agent incarnations are fair game
        // once they are older than the GC timeout.
        let stale = workdir::stale_slave_directories(
            &self.config.work_dir,
            &slave_id,
            self.config.gc_timeout,
        );
        if !stale.is_empty() {
            workdir::remove_directories(stale);
        }
    }

    fn reregistered(&mut self, slave_id: SlaveId) -> Result<(), ActorError> {
        match &self.slave_id {
            Some(current) if *current == slave_id => {
                info!(slave_id = %slave_id, "Re-registered with master");
                self.connected = true;
                Ok(())
            }
            current => {
                let have = current
                    .as_ref()
                    .map(|id| id.to_string())
                    .unwrap_or_default();
                Err(ActorError::Permanent(format!(
                    "re-registered with mismatched slave ID: have '{have}', master sent '{slave_id}'"
                )))
            }
        }
    }

    fn peer_exited(&mut self, address: Address) {
        info!(peer = %address, "Peer exited");

        if self.master.as_ref() == Some(&address) {
            warn!("Master disconnected, waiting for a new master to be elected");
        }
    }

    // -- running and killing tasks --------------------------------------------

    async fn run_task(
        &mut self,
        framework_info: FrameworkInfo,
        framework_id: FrameworkId,
        pid: Address,
        task: TaskInfo,
    ) -> Result<(), ActorError> {
        info!(
            task_id = %task.task_id,
            framework_id = %framework_id,
            "Got assigned task"
        );

        if self.catalog.framework(&framework_id).is_none() {
            self.catalog.insert(Framework::new(
                framework_id.clone(),
                framework_info,
                pid,
            ));
        }

        let task_id = task.task_id.clone();
        let slave_id = self.current_slave_id();
        let no_create = self.config.no_create_work_dir;
        let work_dir = self.config.work_dir.clone();

        let action = {
            let Some(framework) = self.catalog.framework_mut(&framework_id) else {
                return Ok(());
            };

            let executor_info = framework.executor_info_for(&task);
            let executor_id = executor_info.executor_id.clone();
            let framework_info = framework.info.clone();
            let framework_pid = framework.pid.clone();

            let existing = match framework.executor_mut(&executor_id) {
                None => None,
                Some(executor) if executor.shutdown => {
                    warn!(
                        task_id = %task_id,
                        executor_id = %executor_id,
                        framework_id = %framework_id,
                        "Asked to run a task on an executor that is shutting down"
                    );
                    Some(RunTaskAction::ReportLost)
                }
                Some(executor) => Some(match executor.pid.clone() {
                    None => {
                        info!(
                            task_id = %task_id,
                            executor_id = %executor_id,
                            "Queuing task until the executor registers"
                        );
                        executor.queued_tasks.insert(task_id.clone(), task.clone());
                        RunTaskAction::Queued
                    }
                    Some(executor_pid) => {
                        executor.add_task(task.clone());
                        RunTaskAction::Deliver {
                            executor_pid,
                            resources: executor.resources(),
                        }
                    }
                }),
            };

            let action = match existing {
                Some(action) => action,
                None => {
                    let directory = workdir::allocate_run_directory(
                        &work_dir,
                        &slave_id,
                        &framework_id,
                        &executor_id,
                        !no_create,
                    )
                    .map_err(|e| ActorError::Permanent(format!("{e:#}")))?;

                    info!(
                        directory = %directory.display(),
                        executor_id = %executor_id,
                        framework_id = %framework_id,
                        "Allocated executor work directory"
                    );

                    let executor =
                        framework.create_executor(executor_info.clone(), directory.clone());
                    executor.queued_tasks.insert(task_id.clone(), task.clone());

                    RunTaskAction::Launch {
                        executor_info,
                        directory,
                        resources: executor.resources(),
                    }
                }
            };

            (action, executor_id, framework_info, framework_pid)
        };
        let (action, executor_id, framework_info, framework_pid) = action;

        match action {
            RunTaskAction::ReportLost => {
                // One-shot: the executor will never acknowledge, so the
                // update stays out of the pending table.
                let update = self.make_update(
                    framework_id,
                    Some(executor_id),
                    task_id,
                    TaskState::Lost,
                    "Executor is shutting down",
                );
                self.send_unreliable_update(update);
            }
            RunTaskAction::Queued => {}
            RunTaskAction::Deliver {
                executor_pid,
                resources,
            } => {
                self.stats.record_task(TaskState::Staging);
                self.isolation
                    .resources_changed(&framework_id, &executor_id, &resources)
                    .await;
                self.transport.send(
                    &executor_pid,
                    WireMessage::RunTask {
                        framework_id,
                        framework: framework_info,
                        pid: framework_pid,
                        task,
                    },
                );
            }
            RunTaskAction::Launch {
                executor_info,
                directory,
                resources,
            } => {
                self.isolation
                    .launch_executor(
                        &framework_id,
                        &framework_info,
                        &executor_info,
                        &directory,
                        &resources,
                    )
                    .await;
            }
        }

        Ok(())
    }

    async fn kill_task(&mut self, framework_id: FrameworkId, task_id: TaskId) {
        info!(
            task_id = %task_id,
            framework_id = %framework_id,
            "Asked to kill task"
        );

        let action = {
            match self.catalog.framework_mut(&framework_id) {
                None => KillTaskAction::UnknownFramework,
                Some(framework) => match framework.executor_id_for_task(&task_id) {
                    None => KillTaskAction::UnknownTask,
                    Some(executor_id) => match framework.executor_mut(&executor_id) {
                        None => KillTaskAction::UnknownTask,
                        Some(executor) => match executor.pid.clone() {
                            None => {
                                executor.remove_task(&task_id);
                                KillTaskAction::Deregistered {
                                    executor_id,
                                    resources: executor.resources(),
                                }
                            }
                            Some(executor_pid) => KillTaskAction::Forward { executor_pid },
                        },
                    },
                },
            }
        };

        match action {
            KillTaskAction::UnknownFramework => {
                warn!(
                    task_id = %task_id,
                    framework_id = %framework_id,
                    "Cannot kill task: no such framework is running"
                );
                let update = self.make_update(
                    framework_id,
                    None,
                    task_id,
                    TaskState::Lost,
                    "Unknown framework",
                );
                self.send_unreliable_update(update);
            }
            KillTaskAction::UnknownTask => {
                warn!(
                    task_id = %task_id,
                    framework_id = %framework_id,
                    "Cannot kill task: no such task is running"
                );
                let update = self.make_update(
                    framework_id,
                    None,
                    task_id,
                    TaskState::Lost,
                    "Unknown task",
                );
                self.send_unreliable_update(update);
            }
            KillTaskAction::Deregistered {
                executor_id,
                resources,
            } => {
                self.isolation
                    .resources_changed(&framework_id, &executor_id, &resources)
                    .await;
                let update = self.make_update(
                    framework_id,
                    Some(executor_id),
                    task_id,
                    TaskState::Killed,
                    "Task killed before its executor registered",
                );
                self.send_unreliable_update(update);
            }
            KillTaskAction::Forward { executor_pid } => {
                // The executor answers with a real status update.
                self.transport.send(
                    &executor_pid,
                    WireMessage::KillTask {
                        framework_id,
                        task_id,
                    },
                );
            }
        }
    }

    fn shutdown_framework(&mut self, framework_id: FrameworkId) {
        info!(framework_id = %framework_id, "Asked to shut down framework");

        let executor_ids: Vec<ExecutorId> = match self.catalog.framework(&framework_id) {
            Some(framework) => framework.executors.keys().cloned().collect(),
            None => return,
        };

        for executor_id in executor_ids {
            self.shutdown_executor(&framework_id, &executor_id);
        }
        // The framework itself is removed lazily, once its last
        // executor is gone and its last update is acknowledged.
    }

    // -- executor lifecycle ----------------------------------------------------

    async fn register_executor(
        &mut self,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        from: Address,
    ) {
        info!(
            executor_id = %executor_id,
            framework_id = %framework_id,
            from = %from,
            "Got registration for executor"
        );

        let accepted = {
            match self.catalog.framework_mut(&framework_id) {
                None => {
                    warn!(
                        framework_id = %framework_id,
                        "Framework does not exist (it may have been torn down), telling executor to exit"
                    );
                    None
                }
                Some(framework) => {
                    let framework_info = framework.info.clone();
                    let framework_pid = framework.pid.clone();

                    match framework.executor_mut(&executor_id) {
                        None => {
                            warn!(
                                executor_id = %executor_id,
                                framework_id = %framework_id,
                                "Unexpected executor registering"
                            );
                            None
                        }
                        Some(executor) if executor.pid.is_some() => {
                            warn!(
                                executor_id = %executor_id,
                                framework_id = %framework_id,
                                "Executor is already running"
                            );
                            None
                        }
                        Some(executor) if executor.shutdown => {
                            warn!(
                                executor_id = %executor_id,
                                framework_id = %framework_id,
                                "Executor should be shutting down"
                            );
                            None
                        }
                        Some(executor) => {
                            executor.pid = Some(from.clone());

                            // Account for the queued tasks before the
                            // executor acts on them.
                            let queued: Vec<TaskInfo> =
                                executor.queued_tasks.drain().map(|(_, t)| t).collect();
                            for task in &queued {
                                executor.add_task(task.clone());
                            }

                            Some((
                                executor.info.clone(),
                                executor.resources(),
                                queued,
                                framework_info,
                                framework_pid,
                            ))
                        }
                    }
                }
            }
        };

        let Some((executor_info, resources, queued, framework_info, framework_pid)) = accepted
        else {
            // Invalid or racing registration: never mutate, just tell
            // the sender to go away.
            self.transport.send(&from, WireMessage::ShutdownExecutor);
            return;
        };

        self.isolation
            .resources_changed(&framework_id, &executor_id, &resources)
            .await;

        self.transport.send(
            &from,
            WireMessage::ExecutorRegistered {
                executor_info,
                framework_id: framework_id.clone(),
                framework_info: framework_info.clone(),
                slave_id: self.current_slave_id(),
                slave_info: self.info.clone(),
            },
        );

        info!(
            count = queued.len(),
            framework_id = %framework_id,
            "Flushing queued tasks"
        );

        for task in queued {
            self.stats.record_task(TaskState::Staging);
            self.transport.send(
                &from,
                WireMessage::RunTask {
                    framework_id: framework_id.clone(),
                    framework: framework_info.clone(),
                    pid: framework_pid.clone(),
                    task,
                },
            );
        }
    }

    fn shutdown_executor(&mut self, framework_id: &FrameworkId, executor_id: &ExecutorId) {
        info!(
            executor_id = %executor_id,
            framework_id = %framework_id,
            "Shutting down executor"
        );

        let armed = {
            let Some(framework) = self.catalog.framework_mut(framework_id) else {
                return;
            };
            let Some(executor) = framework.executor_mut(executor_id) else {
                return;
            };

            executor.shutdown = true;
            (executor.pid.clone(), executor.epoch)
        };
        let (executor_pid, epoch) = armed;

        // Dropped on the floor when the executor never registered;
        // the backend's exit callback still fires.
        if let Some(pid) = executor_pid {
            self.transport.send(&pid, WireMessage::ShutdownExecutor);
        }

        self.handle.send_after(
            self.config.executor_shutdown_timeout,
            AgentEvent::ShutdownExecutorTimeout {
                framework_id: framework_id.clone(),
                executor_id: executor_id.clone(),
                epoch,
            },
        );
    }

    async fn shutdown_executor_timeout(
        &mut self,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        epoch: EpochId,
    ) {
        let live = self
            .catalog
            .framework(&framework_id)
            .and_then(|f| f.executor(&executor_id))
            // The epoch guards against a newer executor reusing the ID.
            .filter(|e| e.epoch == epoch)
            .map(|e| e.directory.clone());

        if let Some(directory) = live {
            info!(
                executor_id = %executor_id,
                framework_id = %framework_id,
                "Executor did not exit within the grace period, killing it"
            );

            self.isolation
                .kill_executor(&framework_id, &executor_id)
                .await;
            self.schedule_executor_dir_gc(directory);

            if let Some(framework) = self.catalog.framework_mut(&framework_id) {
                framework.destroy_executor(&executor_id);
            }
        }

        self.catalog.remove_if_idle(&framework_id);
    }

    async fn executor_exited(
        &mut self,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        status: i32,
    ) {
        info!(
            executor_id = %executor_id,
            framework_id = %framework_id,
            status,
            "Executor exited"
        );

        let reaped = {
            let Some(framework) = self.catalog.framework(&framework_id) else {
                warn!(
                    framework_id = %framework_id,
                    executor_id = %executor_id,
                    "Exited executor's framework is no longer known"
                );
                return;
            };
            let Some(executor) = framework.executor(&executor_id) else {
                warn!(
                    executor_id = %executor_id,
                    framework_id = %framework_id,
                    "Unknown executor exited"
                );
                return;
            };

            // (task, was it run by the command executor)
            let mut transitions: Vec<(TaskId, bool)> = executor
                .launched_tasks
                .values()
                .filter(|t| !t.state.is_terminal())
                .map(|t| (t.task_id.clone(), t.executor_id.is_none()))
                .collect();
            transitions.extend(
                executor
                    .queued_tasks
                    .values()
                    .map(|t| (t.task_id.clone(), t.command.is_some())),
            );

            (transitions, executor.directory.clone())
        };
        let (transitions, directory) = reaped;

        let is_command_executor =
            !transitions.is_empty() && transitions.iter().all(|(_, command)| *command);

        // Drive every live task terminal through the reliable
        // pipeline, so the master learns about each one even if a
        // send is lost.
        for (task_id, command_task) in transitions {
            let (state, message) = if command_task {
                (TaskState::Failed, "Executor running the task's command failed")
            } else {
                (TaskState::Lost, "Executor exited")
            };
            let update = self.make_update(
                framework_id.clone(),
                Some(executor_id.clone()),
                task_id,
                state,
                message,
            );
            self.status_update(update).await;
        }

        // A command executor's exit maps entirely to per-task updates.
        if !is_command_executor {
            let message = WireMessage::ExitedExecutor {
                slave_id: self.current_slave_id(),
                framework_id: framework_id.clone(),
                executor_id: executor_id.clone(),
                status,
            };
            self.send_to_master(message);
        }

        self.schedule_executor_dir_gc(directory);

        if let Some(framework) = self.catalog.framework_mut(&framework_id) {
            framework.destroy_executor(&executor_id);
        }
        self.catalog.remove_if_idle(&framework_id);
    }

    // -- status-update pipeline ------------------------------------------------

    /// Every status update — executor-originated or synthesized —
    /// enters here and is retried until acknowledged.
    async fn status_update(&mut self, update: StatusUpdate) {
        info!(
            task_id = %update.status.task_id,
            framework_id = %update.framework_id,
            state = %update.status.state,
            "Status update"
        );

        let framework_id = update.framework_id.clone();
        let task_id = update.status.task_id.clone();
        let state = update.status.state;
        let uuid = update.uuid;

        let resources_changed = {
            let Some(framework) = self.catalog.framework_mut(&framework_id) else {
                warn!(
                    framework_id = %framework_id,
                    "Dropping status update: unknown framework"
                );
                self.stats.invalid_status_updates += 1;
                return;
            };

            let Some(executor_id) = framework.executor_id_for_task(&task_id) else {
                warn!(
                    task_id = %task_id,
                    framework_id = %framework_id,
                    "Dropping status update: no executor is responsible for the task"
                );
                self.stats.invalid_status_updates += 1;
                return;
            };

            let Some(executor) = framework.executor_mut(&executor_id) else {
                self.stats.invalid_status_updates += 1;
                return;
            };

            executor.update_task_state(&task_id, state);

            let mut changed = None;
            if state.is_terminal() {
                executor.remove_task(&task_id);
                changed = Some((executor_id, executor.resources()));
            }

            framework.updates.insert(uuid, update.clone());
            changed
        };

        if let Some((executor_id, resources)) = resources_changed {
            self.isolation
                .resources_changed(&framework_id, &executor_id, &resources)
                .await;
        }

        self.send_to_master(WireMessage::StatusUpdate {
            update,
            pid: Some(self.transport.self_address()),
        });

        self.handle.send_after(
            STATUS_UPDATE_RETRY_INTERVAL,
            AgentEvent::StatusUpdateRetry { framework_id, uuid },
        );

        self.stats.record_task(state);
        self.stats.valid_status_updates += 1;
    }

    fn status_update_timeout(&mut self, framework_id: FrameworkId, uuid: UpdateId) {
        // Still pending means not yet acknowledged: resend and re-arm.
        let pending = self
            .catalog
            .framework(&framework_id)
            .and_then(|f| f.updates.get(&uuid))
            .cloned();

        if let Some(update) = pending {
            info!(
                task_id = %update.status.task_id,
                framework_id = %framework_id,
                "Resending status update"
            );

            self.send_to_master(WireMessage::StatusUpdate {
                update,
                pid: Some(self.transport.self_address()),
            });

            self.handle.send_after(
                STATUS_UPDATE_RETRY_INTERVAL,
                AgentEvent::StatusUpdateRetry { framework_id, uuid },
            );
        }
    }

    fn status_update_acknowledgement(
        &mut self,
        framework_id: FrameworkId,
        task_id: TaskId,
        uuid: UpdateId,
    ) {
        let removed = self
            .catalog
            .framework_mut(&framework_id)
            .map(|f| f.updates.remove(&uuid).is_some())
            .unwrap_or(false);

        if removed {
            info!(
                task_id = %task_id,
                framework_id = %framework_id,
                "Got acknowledgement of status update"
            );
            self.catalog.remove_if_idle(&framework_id);
        }
    }

    // -- message routing -------------------------------------------------------

    fn scheduler_message(
        &mut self,
        slave_id: SlaveId,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        data: Vec<u8>,
    ) {
        let target = {
            match self.catalog.framework(&framework_id) {
                None => {
                    warn!(
                        framework_id = %framework_id,
                        "Dropping message: framework does not exist"
                    );
                    None
                }
                Some(framework) => match framework.executor(&executor_id) {
                    None => {
                        warn!(
                            executor_id = %executor_id,
                            framework_id = %framework_id,
                            "Dropping message: executor does not exist"
                        );
                        None
                    }
                    Some(executor) => match executor.pid.clone() {
                        None => {
                            warn!(
                                executor_id = %executor_id,
                                framework_id = %framework_id,
                                "Dropping message: executor is not running"
                            );
                            None
                        }
                        Some(pid) => Some(pid),
                    },
                },
            }
        };

        match target {
            Some(pid) => {
                self.transport.send(
                    &pid,
                    WireMessage::FrameworkToExecutor {
                        slave_id,
                        framework_id,
                        executor_id,
                        data,
                    },
                );
                self.stats.valid_framework_messages += 1;
            }
            None => self.stats.invalid_framework_messages += 1,
        }
    }

    fn executor_message(
        &mut self,
        slave_id: SlaveId,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        data: Vec<u8>,
    ) {
        let scheduler = self
            .catalog
            .framework(&framework_id)
            .map(|f| f.pid.clone());

        let Some(scheduler) = scheduler else {
            warn!(
                framework_id = %framework_id,
                "Cannot route executor message: framework does not exist"
            );
            self.stats.invalid_framework_messages += 1;
            return;
        };

        info!(
            framework_id = %framework_id,
            scheduler = %scheduler,
            "Routing executor message to the framework scheduler"
        );

        self.transport.send(
            &scheduler,
            WireMessage::ExecutorToFramework {
                slave_id,
                framework_id,
                executor_id,
                data,
            },
        );
        self.stats.valid_framework_messages += 1;
    }

    fn update_framework(&mut self, framework_id: FrameworkId, pid: Address) {
        if let Some(framework) = self.catalog.framework_mut(&framework_id) {
            info!(
                framework_id = %framework_id,
                pid = %pid,
                "Updating framework pid"
            );
            framework.pid = pid;
        }
    }

    // -- usage sampling --------------------------------------------------------

    async fn usage_sample_tick(&mut self) {
        let live: Vec<(FrameworkId, ExecutorId)> = self
            .catalog
            .frameworks()
            .flat_map(|f| {
                f.executors
                    .keys()
                    .map(|e| (f.framework_id.clone(), e.clone()))
            })
            .collect();

        for (framework_id, executor_id) in live {
            self.isolation
                .sample_usage(&framework_id, &executor_id)
                .await;
        }

        self.handle
            .send_after(USAGE_SAMPLE_INTERVAL, AgentEvent::UsageSampleTick);
    }

    /// Starts one statistics collection off the loop; the result
    /// rejoins the mailbox as a `StatisticsCollected` event.
    fn fetch_statistics(
        &self,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        previous: Option<ResourceStatistics>,
    ) {
        let isolation = Arc::clone(&self.isolation);
        let handle = self.handle.clone();

        tokio::spawn(async move {
            let sample = isolation
                .collect_statistics(&framework_id, &executor_id)
                .await;
            let _ = handle
                .send(AgentEvent::StatisticsCollected {
                    framework_id,
                    executor_id,
                    previous,
                    sample,
                })
                .await;
        });
    }

    fn statistics_collected(
        &mut self,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        previous: Option<ResourceStatistics>,
        sample: Option<ResourceStatistics>,
    ) {
        // An absent sample means the executor is not measurable any
        // more; its exit callback settles the rest.
        let Some(sample) = sample else {
            return;
        };

        let still_running = self
            .catalog
            .framework(&framework_id)
            .and_then(|f| f.executor(&executor_id))
            .is_some();

        let usage = UsageMessage {
            slave_id: self.current_slave_id(),
            framework_id: framework_id.clone(),
            executor_id: executor_id.clone(),
            statistics: sample.since(previous.as_ref()),
            expected_resources: self.info.resources.clone(),
            still_running,
        };
        self.send_to_master(WireMessage::Usage(usage));

        if still_running {
            self.handle.send_after(
                USAGE_SAMPLE_INTERVAL,
                AgentEvent::CollectStatistics {
                    framework_id,
                    executor_id,
                    previous: Some(sample),
                },
            );
        }
    }

    // -- shutdown --------------------------------------------------------------

    async fn shutdown(&mut self) {
        info!("Agent asked to shut down");

        for framework_id in self.catalog.framework_ids() {
            self.shutdown_framework(framework_id);
        }

        self.isolation.terminate().await;
    }
}

// =============================================================================
// Actor impl
// =============================================================================

#[async_trait]
impl Actor for Agent {
    type Message = AgentEvent;

    fn name(&self) -> &str {
        "agent"
    }

    async fn on_start(&mut self, _ctx: &mut ActorContext) -> Result<(), ActorError> {
        info!(
            hostname = %self.info.hostname,
            resources = %self.info.resources,
            "Agent started"
        );

        self.isolation
            .initialize(&self.config, self.handle.clone())
            .await;

        self.handle
            .send_after(USAGE_SAMPLE_INTERVAL, AgentEvent::UsageSampleTick);

        Ok(())
    }

    async fn handle(
        &mut self,
        event: AgentEvent,
        _ctx: &mut ActorContext,
    ) -> Result<bool, ActorError> {
        match event {
            AgentEvent::NewMasterDetected { master } => self.new_master_detected(master),
            AgentEvent::NoMasterDetected => self.no_master_detected(),
            AgentEvent::Registered { slave_id } => self.registered(slave_id),
            AgentEvent::Reregistered { slave_id } => self.reregistered(slave_id)?,
            AgentEvent::RegistrationRetry => self.do_reliable_registration(),

            AgentEvent::RunTask {
                framework_info,
                framework_id,
                pid,
                task,
            } => self.run_task(framework_info, framework_id, pid, task).await?,
            AgentEvent::KillTask {
                framework_id,
                task_id,
            } => self.kill_task(framework_id, task_id).await,
            AgentEvent::ShutdownFramework { framework_id } => {
                self.shutdown_framework(framework_id)
            }
            AgentEvent::SchedulerMessage {
                slave_id,
                framework_id,
                executor_id,
                data,
            } => self.scheduler_message(slave_id, framework_id, executor_id, data),
            AgentEvent::UpdateFramework { framework_id, pid } => {
                self.update_framework(framework_id, pid)
            }
            AgentEvent::StatusUpdateAcknowledgement {
                slave_id: _,
                framework_id,
                task_id,
                uuid,
            } => self.status_update_acknowledgement(framework_id, task_id, uuid),
            AgentEvent::SetFrameworkPriorities { priorities } => {
                self.isolation.set_framework_priorities(&priorities).await
            }
            AgentEvent::Ping { from } => self.transport.send(&from, WireMessage::Pong),
            AgentEvent::Shutdown => {
                self.shutdown().await;
                return Ok(false);
            }

            AgentEvent::RegisterExecutor {
                framework_id,
                executor_id,
                from,
            } => self.register_executor(framework_id, executor_id, from).await,
            AgentEvent::StatusUpdate { update } => self.status_update(update).await,
            AgentEvent::ExecutorMessage {
                slave_id,
                framework_id,
                executor_id,
                data,
            } => self.executor_message(slave_id, framework_id, executor_id, data),

            AgentEvent::ExecutorStarted {
                framework_id,
                executor_id,
                pid,
            } => {
                debug!(
                    executor_id = %executor_id,
                    framework_id = %framework_id,
                    pid,
                    "Executor process started"
                );
                self.fetch_statistics(framework_id, executor_id, None);
            }
            AgentEvent::ExecutorExited {
                framework_id,
                executor_id,
                status,
            } => self.executor_exited(framework_id, executor_id, status).await,
            AgentEvent::StatisticsCollected {
                framework_id,
                executor_id,
                previous,
                sample,
            } => self.statistics_collected(framework_id, executor_id, previous, sample),

            AgentEvent::StatusUpdateRetry { framework_id, uuid } => {
                self.status_update_timeout(framework_id, uuid)
            }
            AgentEvent::ShutdownExecutorTimeout {
                framework_id,
                executor_id,
                epoch,
            } => {
                self.shutdown_executor_timeout(framework_id, executor_id, epoch)
                    .await
            }
            AgentEvent::UsageSampleTick => self.usage_sample_tick().await,
            AgentEvent::CollectStatistics {
                framework_id,
                executor_id,
                previous,
            } => self.fetch_statistics(framework_id, executor_id, previous),
            AgentEvent::ExpireDirectories { paths } => {
                workdir::remove_directories(paths);
            }

            AgentEvent::PeerExited { address } => self.peer_exited(address),
        }

        Ok(true)
    }

    async fn on_stop(&mut self, _ctx: &mut ActorContext) {
        info!("Agent terminating");
    }
}
