// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Rideline job lifecycle system.
//!
//! This crate provides the domain types, the lifecycle transition rules,
//! change-feed filters, error types, and the adapter traits every backend
//! implements.

pub mod error;
pub mod filter;
pub mod traits;
pub mod transition;
pub mod types;

pub use error::{Precondition, RidelineError};
pub use filter::{Assignee, JobFilter, OrderBy};
pub use transition::Transition;
pub use types::{
    Actor, AdapterType, ChangeKind, Decline, DriverId, DriverProfile, DriverSnapshot, Fare,
    FeedItem, HealthStatus, Identity, Job, JobId, JobStatus, NewJob, ProfilePatch, RequesterId,
    SnapshotEvent,
};

pub use traits::{IdentityProvider, JobStore, JobStream, PluginAdapter, ProfileStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rideline_error_has_all_variants() {
        let job_id = JobId::new("j-1");
        let _config = RidelineError::Config("test".into());
        let _precondition = RidelineError::precondition(&job_id, Precondition::NoProfile);
        let _not_found = RidelineError::NotFound {
            kind: "job",
            id: "j-1".into(),
        };
        let _storage = RidelineError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _inconsistent = RidelineError::DataInconsistency("two active jobs".into());
        let _closed = RidelineError::SessionClosed;
        let _internal = RidelineError::Internal("test".into());
    }

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(RidelineError::transport("socket closed").is_retryable());
        assert!(!RidelineError::SessionClosed.is_retryable());
        assert!(
            !RidelineError::precondition(&JobId::new("j"), Precondition::NotInPool).is_retryable()
        );
    }

    #[test]
    fn precondition_message_names_the_active_job() {
        let err = RidelineError::precondition(
            &JobId::new("j-2"),
            Precondition::AlreadyHasActiveJob {
                active: JobId::new("j-1"),
            },
        );
        assert_eq!(
            err.to_string(),
            "precondition failed for job j-2: driver already has active job j-1"
        );
    }

    #[test]
    fn adapter_type_round_trips_through_strings() {
        use std::str::FromStr;

        for variant in [
            AdapterType::JobStore,
            AdapterType::ProfileStore,
            AdapterType::Identity,
        ] {
            let s = variant.to_string();
            let parsed = AdapterType::from_str(&s).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn health_status_variants() {
        let healthy = HealthStatus::Healthy;
        let degraded = HealthStatus::Degraded("slow".into());
        let unhealthy = HealthStatus::Unhealthy("down".into());

        assert_eq!(healthy, HealthStatus::Healthy);
        assert_ne!(degraded, healthy);
        assert_ne!(unhealthy, healthy);
    }

    #[test]
    fn all_trait_modules_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_job_store<T: JobStore>() {}
        fn _assert_profile_store<T: ProfileStore>() {}
        fn _assert_identity_provider<T: IdentityProvider>() {}
    }
}
