//! strata Node Agent Library
//!
//! The node agent runs on each worker host of a strata cluster. The
//! master allocates slices of node resources to frameworks; the agent
//! registers with the master, launches and supervises per-framework
//! executor processes through an isolation backend, routes tasks to
//! executors, streams reliable task status updates back to the
//! master, and recycles on-disk work directories.
//!
//! ## Architecture
//!
//! A single long-lived actor owns all mutable state:
//!
//! ```text
//! Agent (one mailbox, strictly sequential handlers)
//! ├── master messages      (registration, tasks, acks, pings)
//! ├── executor messages    (registration, status updates, data)
//! ├── isolation callbacks  (started, exited, statistics)
//! ├── timers               (retries, kill grace, GC, sampling)
//! └── link loss            (peer exited)
//! ```
//!
//! External collaborators sit behind two seams: [`transport::Transport`]
//! for the wire and [`isolation::IsolationBackend`] for process
//! launch, enforcement, and sampling.
//!
//! ## Modules
//!
//! - `agent`: the event loop and all handlers
//! - `catalog`: frameworks, executors, tasks, and status updates
//! - `actors`: minimal actor substrate (mailbox, delayed self-messages)
//! - `workdir`: run-directory allocation and garbage collection
//! - `stats`: counters and observability snapshots

pub mod actors;
pub mod agent;
pub mod catalog;
pub mod config;
pub mod isolation;
pub mod messages;
pub mod resources;
pub mod stats;
pub mod transport;
pub mod workdir;

// Re-export commonly used types
pub use agent::{Agent, AgentEvent};
pub use config::Config;
pub use isolation::{IsolationBackend, MockIsolation};
pub use transport::{MockTransport, Transport};
