//! Actor substrate for the agent's event loop.
//!
//! Provides the building blocks for a single-threaded cooperative
//! actor:
//! - `Actor` trait for defining behavior
//! - `ActorHandle` for enqueuing messages, including delayed
//!   self-messages (`send_after`), the primitive behind every retry
//!   and timeout in the agent
//! - `spawn` to wire a mailbox, a shutdown signal, and the drain loop
//!
//! Messages are drained strictly in arrival order; a handler never
//! runs concurrently with another handler, so actor state needs no
//! locking.

use std::fmt::Debug;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

// =============================================================================
// Core Traits
// =============================================================================

/// Marker trait for actor messages.
pub trait Message: Send + Debug + 'static {}

impl<T: Send + Debug + 'static> Message for T {}

/// The Actor trait defines behavior for an actor.
///
/// Actors:
/// - Process messages one at a time (no internal concurrency)
/// - Own mutable state not shared with other actors
/// - Communicate only via message passing
#[async_trait]
pub trait Actor: Send + 'static {
    /// The message type this actor handles.
    type Message: Message;

    /// Actor name for logging and metrics.
    fn name(&self) -> &str;

    /// Handle a single message.
    ///
    /// Returns `Ok(true)` to continue, `Ok(false)` to stop, or `Err`
    /// on failure. A permanent error stops the loop: the process is
    /// fail-stop and does not restart its actor.
    async fn handle(
        &mut self,
        msg: Self::Message,
        ctx: &mut ActorContext,
    ) -> Result<bool, ActorError>;

    /// Called when the actor starts.
    async fn on_start(&mut self, _ctx: &mut ActorContext) -> Result<(), ActorError> {
        Ok(())
    }

    /// Called when the actor is about to stop.
    async fn on_stop(&mut self, _ctx: &mut ActorContext) {
        // Default: no cleanup
    }
}

/// Context provided to actors during message handling.
pub struct ActorContext {
    /// Actor's unique ID.
    pub actor_id: String,

    /// Shutdown signal receiver.
    pub shutdown: watch::Receiver<bool>,

    /// Message counter for metrics.
    pub messages_processed: u64,

    /// Last message processing time for metrics.
    pub last_message_at: Option<Instant>,

    /// Current actor state (for introspection).
    pub state: ActorState,
}

impl ActorContext {
    /// Create a new actor context.
    pub fn new(actor_id: String, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            actor_id,
            shutdown,
            messages_processed: 0,
            last_message_at: None,
            state: ActorState::Starting,
        }
    }

    /// Check if shutdown has been signaled.
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Actor lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorState {
    /// Actor is starting up.
    Starting,
    /// Actor is running and processing messages.
    Running,
    /// Actor is stopping.
    Stopping,
    /// Actor has stopped.
    Stopped,
    /// Actor has failed.
    Failed,
}

// =============================================================================
// Errors
// =============================================================================

/// Errors that can occur in actors.
#[derive(Debug, Error)]
pub enum ActorError {
    /// Transient error; the loop keeps running.
    #[error("transient error: {0}")]
    Transient(String),

    /// Permanent error; the loop stops and the process exits.
    #[error("permanent error: {0}")]
    Permanent(String),

    /// Actor mailbox is full.
    #[error("mailbox full")]
    MailboxFull,

    /// Actor has stopped.
    #[error("actor stopped")]
    ActorStopped,

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

// =============================================================================
// Actor Handle
// =============================================================================

/// Handle for sending messages to an actor.
pub struct ActorHandle<M: Message> {
    /// Sender for the actor's mailbox.
    tx: mpsc::Sender<M>,

    /// Actor ID for logging.
    actor_id: String,
}

impl<M: Message> Clone for ActorHandle<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            actor_id: self.actor_id.clone(),
        }
    }
}

impl<M: Message> ActorHandle<M> {
    /// Send a message to the actor.
    pub async fn send(&self, msg: M) -> Result<(), ActorError> {
        self.tx.send(msg).await.map_err(|_| ActorError::ActorStopped)
    }

    /// Try to send a message without blocking.
    pub fn try_send(&self, msg: M) -> Result<(), ActorError> {
        self.tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ActorError::MailboxFull,
            mpsc::error::TrySendError::Closed(_) => ActorError::ActorStopped,
        })
    }

    /// Enqueue a message after a delay.
    ///
    /// This is the self-rescheduling timer primitive: the delayed
    /// message is never cancelled; the handler re-checks its state
    /// when the message arrives and becomes a no-op if the state it
    /// guarded is gone. The timer task is detached; if the mailbox is
    /// closed by the time it fires, the message is dropped.
    pub fn send_after(&self, delay: Duration, msg: M) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(msg).await;
        });
    }

    /// Get the actor ID.
    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }
}

/// Running actor: join handle plus shutdown signal.
pub struct ActorRef {
    /// Actor ID.
    pub actor_id: String,

    /// Task handle.
    task_handle: tokio::task::JoinHandle<()>,

    /// Shutdown sender.
    shutdown_tx: watch::Sender<bool>,
}

impl ActorRef {
    /// Signal the actor to stop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Check if the actor task is still running.
    pub fn is_running(&self) -> bool {
        !self.task_handle.is_finished()
    }

    /// Wait for the actor loop to finish.
    pub async fn join(self) {
        let _ = self.task_handle.await;
    }
}

// =============================================================================
// Spawning
// =============================================================================

/// Create a mailbox for an actor that has not been spawned yet.
///
/// Splitting mailbox creation from spawning lets the actor hold a
/// handle to itself, which it needs to post delayed self-messages.
pub fn mailbox<M: Message>(name: &str, capacity: usize) -> (ActorHandle<M>, mpsc::Receiver<M>) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        ActorHandle {
            tx,
            actor_id: name.to_string(),
        },
        rx,
    )
}

/// Spawn an actor on a previously created mailbox.
pub fn spawn<A: Actor>(actor: A, rx: mpsc::Receiver<A::Message>) -> ActorRef {
    let actor_id = actor.name().to_string();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let loop_id = actor_id.clone();
    let task_handle = tokio::spawn(async move {
        run_actor_loop(actor, rx, shutdown_rx, loop_id).await;
    });

    info!(actor_id = %actor_id, "Spawned actor");

    ActorRef {
        actor_id,
        task_handle,
        shutdown_tx,
    }
}

// =============================================================================
// Actor Loop
// =============================================================================

/// Run the main actor loop.
async fn run_actor_loop<A: Actor>(
    mut actor: A,
    mut rx: mpsc::Receiver<A::Message>,
    mut shutdown: watch::Receiver<bool>,
    actor_id: String,
) {
    let mut ctx = ActorContext::new(actor_id.clone(), shutdown.clone());

    // Call on_start
    if let Err(e) = actor.on_start(&mut ctx).await {
        error!(actor_id = %actor_id, error = %e, "Actor failed to start");
        return;
    }

    ctx.state = ActorState::Running;
    debug!(actor_id = %actor_id, "Actor started");

    loop {
        tokio::select! {
            biased;

            // Check shutdown first
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!(actor_id = %actor_id, "Actor received shutdown signal");
                    break;
                }
            }

            // Process messages
            msg = rx.recv() => {
                match msg {
                    Some(msg) => {
                        ctx.messages_processed += 1;
                        ctx.last_message_at = Some(Instant::now());

                        match actor.handle(msg, &mut ctx).await {
                            Ok(true) => {
                                // Continue processing
                            }
                            Ok(false) => {
                                info!(actor_id = %actor_id, "Actor requested stop");
                                break;
                            }
                            Err(e) => {
                                error!(actor_id = %actor_id, error = %e, "Actor error");
                                if matches!(e, ActorError::Permanent(_)) {
                                    ctx.state = ActorState::Failed;
                                    break;
                                }
                            }
                        }
                    }
                    None => {
                        // Channel closed
                        debug!(actor_id = %actor_id, "Actor mailbox closed");
                        break;
                    }
                }
            }
        }
    }

    ctx.state = ActorState::Stopping;
    actor.on_stop(&mut ctx).await;
    ctx.state = ActorState::Stopped;

    info!(
        actor_id = %actor_id,
        messages_processed = ctx.messages_processed,
        "Actor stopped"
    );
}

// =============================================================================
// Tests
// =============================================================================
