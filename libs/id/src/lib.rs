//! # strata-id
//!
//! Typed identifiers for the strata cluster manager.
//!
//! Two families of IDs exist:
//!
//! - **Opaque IDs** are assigned by an external party (the master or a
//!   framework scheduler) and carry no internal structure. The agent
//!   treats them as tokens: `FrameworkId`, `ExecutorId`, `TaskId`,
//!   `SlaveId`. They wrap plain strings with transparent
//!   serialization.
//! - **Nonce IDs** are minted locally by the agent and use a prefixed
//!   ULID format (`{prefix}_{ulid}`) with strict parsing: `UpdateId`
//!   correlates a status update with its acknowledgement, `EpochId`
//!   distinguishes successive lifecycles of an executor slot.
//!
//! Nonce examples:
//! - `upd_01HV4Z2WQXKJNM8GPQY6VBKC3D`
//! - `run_01HV4Z3MXNKPQR9HSTZ7WCLD4E`
//!
//! The ULID format provides sortability (time-ordered), uniqueness
//! (80 bits of randomness), and human readability (clear prefixes).

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
