// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by stores, the reconciliation engine and presentation code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Store-assigned identifier of a job. Immutable.
    JobId
);
string_id!(
    /// Identifier of a driver, as issued by the identity provider.
    DriverId
);
string_id!(
    /// Identifier of the party that requested a job.
    RequesterId
);

impl JobId {
    /// Generate a fresh random job id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Lifecycle states of a job.
///
/// `pending -> accepted -> in_progress -> completed`, with `cancelled` and
/// `rejected` as alternate terminal states.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
    Rejected,
}

impl JobStatus {
    /// Statuses that bind a job to its driver as the driver's active job.
    pub const ACTIVE: [JobStatus; 2] = [JobStatus::Accepted, JobStatus::InProgress];

    /// Terminal statuses retained as history.
    pub const TERMINAL: [JobStatus; 3] =
        [JobStatus::Completed, JobStatus::Cancelled, JobStatus::Rejected];

    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Accepted | JobStatus::InProgress)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Cancelled | JobStatus::Rejected
        )
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Accepted, InProgress)
                | (Accepted, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
        )
    }
}

/// A monetary amount in minor units (cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fare(pub i64);

impl Fare {
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn cents(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Fare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

/// Driver details copied onto a job when it is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverSnapshot {
    pub name: String,
    pub vehicle_model: String,
    pub license_plate: String,
}

impl From<&DriverProfile> for DriverSnapshot {
    fn from(profile: &DriverProfile) -> Self {
        Self {
            name: profile.display_name.clone(),
            vehicle_model: profile.vehicle_model.clone(),
            license_plate: profile.license_plate.clone(),
        }
    }
}

/// A driver-scoped rejection: the job stays available to everyone else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decline {
    pub driver: DriverId,
    pub at: DateTime<Utc>,
}

/// A transportation booking tracked through its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Incremented by the store on every applied write.
    pub revision: u64,

    pub requester: RequesterId,
    #[serde(default)]
    pub requester_name: Option<String>,
    #[serde(default)]
    pub assigned_driver: Option<DriverId>,
    #[serde(default)]
    pub driver_snapshot: Option<DriverSnapshot>,

    pub origin: String,
    pub destination: String,
    #[serde(default)]
    pub waypoints: Vec<String>,
    pub scheduled_time: DateTime<Utc>,
    pub fare: Fare,
    pub passengers: u32,
    pub bags: u32,
    #[serde(default)]
    pub distance: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub after_hours: bool,
    #[serde(default)]
    pub round_trip: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rejected_by: Option<DriverId>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancelled_by: Option<Actor>,
    #[serde(default)]
    pub declines: Vec<Decline>,
}

impl Job {
    /// Materialize a freshly created job from its creation payload.
    pub fn from_new(id: JobId, new: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            revision: 1,
            requester: new.requester,
            requester_name: new.requester_name,
            assigned_driver: new.assigned_driver,
            driver_snapshot: None,
            origin: new.origin,
            destination: new.destination,
            waypoints: new.waypoints,
            scheduled_time: new.scheduled_time,
            fare: new.fare,
            passengers: new.passengers,
            bags: new.bags,
            distance: new.distance,
            duration: new.duration,
            after_hours: new.after_hours,
            round_trip: new.round_trip,
            created_at: now,
            updated_at: now,
            accepted_at: None,
            started_at: None,
            completed_at: None,
            rejected_at: None,
            rejected_by: None,
            cancelled_at: None,
            cancelled_by: None,
            declines: Vec::new(),
        }
    }

    pub fn is_assigned_to(&self, driver: &DriverId) -> bool {
        self.assigned_driver.as_ref() == Some(driver)
    }

    /// The decline recorded for `driver`, if that driver passed on this job.
    pub fn decline_by(&self, driver: &DriverId) -> Option<&Decline> {
        self.declines.iter().find(|d| &d.driver == driver)
    }

    pub fn is_declined_by(&self, driver: &DriverId) -> bool {
        self.decline_by(driver).is_some()
    }
}

/// Creation payload for a job. Every field is immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJob {
    pub requester: RequesterId,
    #[serde(default)]
    pub requester_name: Option<String>,
    /// Set when a dispatcher pre-assigns the job to one driver.
    #[serde(default)]
    pub assigned_driver: Option<DriverId>,
    pub origin: String,
    pub destination: String,
    #[serde(default)]
    pub waypoints: Vec<String>,
    pub scheduled_time: DateTime<Utc>,
    pub fare: Fare,
    pub passengers: u32,
    pub bags: u32,
    #[serde(default)]
    pub distance: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub after_hours: bool,
    #[serde(default)]
    pub round_trip: bool,
}

/// Who performed a cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Driver(DriverId),
    Requester(RequesterId),
}

/// A driver's persisted profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverProfile {
    pub id: DriverId,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub vehicle_model: String,
    pub license_plate: String,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl DriverProfile {
    /// Display name used when the identity provider supplies none.
    pub const DEFAULT_DISPLAY_NAME: &'static str = "Driver";

    /// Build the default profile for a first-time driver.
    pub fn from_identity(identity: &Identity, now: DateTime<Utc>) -> Self {
        Self {
            id: identity.driver_id.clone(),
            display_name: identity
                .display_name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| Self::DEFAULT_DISPLAY_NAME.to_string()),
            email: identity.email.clone(),
            vehicle_model: String::new(),
            license_plate: String::new(),
            created_at: now,
            last_updated_at: now,
        }
    }

    /// Apply a settings update in place.
    pub fn apply(&mut self, patch: &ProfilePatch, now: DateTime<Utc>) {
        if let Some(name) = &patch.display_name {
            self.display_name = name.clone();
        }
        if let Some(model) = &patch.vehicle_model {
            self.vehicle_model = model.clone();
        }
        if let Some(plate) = &patch.license_plate {
            self.license_plate = plate.clone();
        }
        self.last_updated_at = now.max(self.last_updated_at);
    }
}

/// Settings update for a driver profile. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePatch {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub vehicle_model: Option<String>,
    #[serde(default)]
    pub license_plate: Option<String>,
}

/// An authenticated driver identity supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub driver_id: DriverId,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Identity {
    pub fn new(driver_id: impl Into<String>) -> Self {
        Self {
            driver_id: DriverId::new(driver_id),
            display_name: None,
            email: None,
        }
    }
}

/// Kind of change a feed notification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// A single delta from a change feed.
///
/// For `Removed`, `job` is the record's state after the change that took it
/// out of the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEvent {
    pub kind: ChangeKind,
    pub job: Job,
}

/// Items yielded by a change-feed subscription.
///
/// Every subscription starts with exactly one `Snapshot` holding the full
/// state of the filter, followed by `Change` deltas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedItem {
    Snapshot(Vec<Job>),
    Change(SnapshotEvent),
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    JobStore,
    ProfileStore,
    Identity,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_strings_are_snake_case() {
        assert_eq!(JobStatus::InProgress.to_string(), "in_progress");
        assert_eq!(JobStatus::from_str("in_progress").unwrap(), JobStatus::InProgress);
        assert_eq!(JobStatus::Pending.as_ref(), "pending");
        let json = serde_json::to_string(&JobStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn active_and_terminal_partition_non_pending_states() {
        for status in [
            JobStatus::Pending,
            JobStatus::Accepted,
            JobStatus::InProgress,
            JobStatus::Completed,
            JobStatus::Cancelled,
            JobStatus::Rejected,
        ] {
            assert!(!(status.is_active() && status.is_terminal()));
            if status != JobStatus::Pending {
                assert!(status.is_active() || status.is_terminal());
            }
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for terminal in JobStatus::TERMINAL {
            for next in [JobStatus::Pending, JobStatus::Accepted, JobStatus::Completed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Accepted));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::InProgress));
        assert!(!JobStatus::Accepted.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn fare_displays_dollars_and_cents() {
        assert_eq!(Fare::from_cents(1250).to_string(), "$12.50");
        assert_eq!(Fare::from_cents(5).to_string(), "$0.05");
        assert_eq!(Fare::from_cents(-199).to_string(), "-$1.99");
    }

    #[test]
    fn profile_from_identity_falls_back_to_default_name() {
        let now = Utc::now();
        let mut identity = Identity::new("d-1");
        let profile = DriverProfile::from_identity(&identity, now);
        assert_eq!(profile.display_name, "Driver");
        assert!(profile.vehicle_model.is_empty());

        identity.display_name = Some("Ana".into());
        identity.email = Some("ana@example.com".into());
        let profile = DriverProfile::from_identity(&identity, now);
        assert_eq!(profile.display_name, "Ana");
        assert_eq!(profile.email.as_deref(), Some("ana@example.com"));
    }

    #[test]
    fn profile_patch_only_touches_given_fields() {
        let now = Utc::now();
        let mut profile = DriverProfile::from_identity(&Identity::new("d-1"), now);
        profile.apply(
            &ProfilePatch {
                vehicle_model: Some("Prius".into()),
                ..ProfilePatch::default()
            },
            now,
        );
        assert_eq!(profile.vehicle_model, "Prius");
        assert_eq!(profile.display_name, "Driver");
        assert!(profile.license_plate.is_empty());
    }

    #[test]
    fn actor_serializes_with_kind_tag() {
        let actor = Actor::Driver(DriverId::new("d-9"));
        let json = serde_json::to_string(&actor).unwrap();
        assert_eq!(json, r#"{"kind":"driver","id":"d-9"}"#);
    }
}
