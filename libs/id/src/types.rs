//! Typed ID definitions for the cluster manager.
//!
//! Opaque IDs name resources owned by external parties; nonce IDs are
//! minted by the agent itself and are ULID-based for sortability and
//! uniqueness.

use crate::{define_nonce_id, define_opaque_id};

// =============================================================================
// Externally-assigned IDs
// =============================================================================

define_opaque_id!(FrameworkId);
define_opaque_id!(ExecutorId);
define_opaque_id!(TaskId);
define_opaque_id!(SlaveId);

// =============================================================================
// Agent-minted nonces
// =============================================================================

// Acknowledgement correlator for a status update.
define_nonce_id!(UpdateId, "upd");

// Lifecycle epoch of an executor slot. A fresh epoch is minted every
// time an executor object is created, so a timer armed against an old
// epoch can detect that the slot has since been reused.
define_nonce_id!(EpochId, "run");

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framework_id_roundtrip() {
        let id = FrameworkId::new("framework-001");
        assert_eq!(id.as_str(), "framework-001");
        assert_eq!(id.to_string(), "framework-001");

        let parsed: FrameworkId = "framework-001".parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_opaque_id_json_transparent() {
        let id = TaskId::new("task-42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"task-42\"");

        let parsed: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_opaque_id_empty() {
        let id = SlaveId::new("");
        assert!(id.is_empty());

        let id = SlaveId::from("s1");
        assert!(!id.is_empty());
    }

    #[test]
    fn test_opaque_ids_are_distinct_types() {
        // Same raw value, different types; both usable as map keys.
        let mut frameworks = std::collections::HashMap::new();
        frameworks.insert(FrameworkId::new("x"), 1);

        let mut executors = std::collections::HashMap::new();
        executors.insert(ExecutorId::new("x"), 2);

        assert_eq!(frameworks[&FrameworkId::new("x")], 1);
        assert_eq!(executors[&ExecutorId::new("x")], 2);
    }

    #[test]
    fn test_update_id_roundtrip() {
        let id = UpdateId::new();
        let s = id.to_string();
        assert!(s.starts_with("upd_"));

        let parsed: UpdateId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_update_id_invalid_prefix() {
        let result: Result<UpdateId, _> = "run_01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert!(result.is_err());
        assert!(result.unwrap_err().is_prefix_error());
    }

    #[test]
    fn test_update_id_missing_separator() {
        let result: Result<UpdateId, _> = "upd01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert!(matches!(
            result.unwrap_err(),
            crate::IdError::MissingSeparator
        ));
    }

    #[test]
    fn test_update_id_empty() {
        let result: Result<UpdateId, _> = "".parse();
        assert!(result.unwrap_err().is_empty());
    }

    #[test]
    fn test_update_id_invalid_ulid() {
        let result: Result<UpdateId, _> = "upd_invalid".parse();
        assert!(matches!(result.unwrap_err(), crate::IdError::InvalidUlid(_)));
    }

    #[test]
    fn test_epoch_id_fresh_per_call() {
        let a = EpochId::new();
        let b = EpochId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_epoch_id_json_roundtrip() {
        let id = EpochId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: EpochId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_nonce_id_sortable() {
        let id1 = UpdateId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = UpdateId::new();
        // ULIDs are time-ordered, so id1 < id2
        assert!(id1 < id2);
    }
}
