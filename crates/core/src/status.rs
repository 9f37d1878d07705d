//! Resource status vocabulary.
//!
//! Statuses are free-form strings reported by cloud backends (an AWS-flavored
//! set plus a few generic values). The engine never switches on raw strings
//! outside this module; everything else goes through these predicates.

/// Fully available and usable for writes.
pub fn is_available(status: &str) -> bool {
    status == "available" || status == "RUNNABLE"
}

/// Usable for reads: available, or in a state that does not affect the data
/// path (monitoring/optimization/backup phases).
pub fn is_ready(status: &str) -> bool {
    matches!(
        status,
        "available"
            | "configuring-enhanced-monitoring"
            | "storage-optimization"
            | "backing-up"
            | "RUNNABLE"
            | "UNKNOWN_STATE"
    )
}

/// A transition is underway and a later poll should observe a change.
pub fn in_progress(status: &str) -> bool {
    matches!(
        status,
        "creating"
            | "starting"
            | "modifying"
            | "rebooting"
            | "moving-to-vpc"
            | "renaming"
            | "upgrading"
            | "backtracking"
            | "maintenance"
            | "resetting-master-credentials"
            | "rebooting cluster nodes"
            | "PENDING_CREATE"
            | "MAINTENANCE"
    )
}

/// Binding credentials may be handed out.
pub fn can_get_bindings(status: &str) -> bool {
    !matches!(
        status,
        "creating"
            | "starting"
            | "modifying"
            | "stopping"
            | "stopped"
            | "deleting"
            | "deleted"
            | "incompatible-network"
            | "SUSPENDED"
            | "PENDING_CREATE"
            | "MAINTENANCE"
            | "FAILED"
            | "UNKNOWN_STATE"
    )
}

/// Safe to issue a modify against the backend.
pub fn can_be_modified(status: &str) -> bool {
    !matches!(
        status,
        "creating"
            | "starting"
            | "modifying"
            | "rebooting"
            | "moving-to-vpc"
            | "backing-up"
            | "renaming"
            | "upgrading"
            | "backtracking"
            | "maintenance"
            | "resetting-master-credentials"
            | "deleted"
            | "rebooting cluster nodes"
            | "SUSPENDED"
            | "PENDING_CREATE"
            | "MAINTENANCE"
            | "FAILED"
            | "UNKNOWN_STATE"
    )
}

/// Safe to issue a delete against the backend.
pub fn can_be_deleted(status: &str) -> bool {
    matches!(
        status,
        "available"
            | "failed"
            | "incompatible-parameters"
            | "incompatible-network"
            | "restore-failed"
            | "recovering"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_is_narrower_than_ready() {
        for status in ["available", "RUNNABLE"] {
            assert!(is_available(status));
            assert!(is_ready(status));
        }
        assert!(is_ready("backing-up"));
        assert!(!is_available("backing-up"));
    }

    #[test]
    fn in_progress_states_are_not_available() {
        for status in ["creating", "modifying", "PENDING_CREATE"] {
            assert!(in_progress(status));
            assert!(!is_available(status));
        }
    }

    #[test]
    fn bindings_blocked_during_transitions() {
        assert!(!can_get_bindings("creating"));
        assert!(!can_get_bindings("SUSPENDED"));
        assert!(can_get_bindings("available"));
        // Upgrades do not block bindings.
        assert!(can_get_bindings("upgrading"));
    }

    #[test]
    fn delete_requires_a_steady_state() {
        assert!(can_be_deleted("available"));
        assert!(can_be_deleted("failed"));
        assert!(!can_be_deleted("creating"));
        assert!(!can_be_deleted("deleting"));
    }

    #[test]
    fn modify_excludes_backup_and_maintenance() {
        assert!(can_be_modified("available"));
        assert!(!can_be_modified("backing-up"));
        assert!(!can_be_modified("maintenance"));
    }
}
