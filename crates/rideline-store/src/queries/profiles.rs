// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Driver profile operations.

use chrono::Utc;
use rideline_core::{DriverId, DriverProfile, Identity, ProfilePatch, RidelineError};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{PROFILE_COLUMNS, format_ts, profile_from_row};

/// Return the profile for `identity`, creating it with defaults if absent.
///
/// `INSERT .. ON CONFLICT DO NOTHING` followed by a read in one transaction:
/// concurrent first logins converge on the row whichever insert won.
pub async fn get_or_create(db: &Database, identity: &Identity) -> Result<DriverProfile, RidelineError> {
    let seed = DriverProfile::from_identity(identity, Utc::now());
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO driver_profiles
                     (id, display_name, email, vehicle_model, license_plate, created_at, last_updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO NOTHING",
                params![
                    seed.id.as_str(),
                    seed.display_name,
                    seed.email,
                    seed.vehicle_model,
                    seed.license_plate,
                    format_ts(seed.created_at),
                    format_ts(seed.last_updated_at),
                ],
            )?;
            let profile = tx.query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM driver_profiles WHERE id = ?1"),
                params![seed.id.as_str()],
                profile_from_row,
            )?;
            tx.commit()?;
            Ok(profile)
        })
        .await
        .map_err(map_tr_err)
}

/// Get a profile by driver ID.
pub async fn get(db: &Database, id: &DriverId) -> Result<Option<DriverProfile>, RidelineError> {
    let id = id.clone();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM driver_profiles WHERE id = ?1"),
                params![id.as_str()],
                profile_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Apply a settings update. Returns `None` if the profile does not exist.
pub async fn update(
    db: &Database,
    id: &DriverId,
    patch: &ProfilePatch,
) -> Result<Option<DriverProfile>, RidelineError> {
    let id = id.clone();
    let patch = patch.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let Some(mut profile) = tx
                .query_row(
                    &format!("SELECT {PROFILE_COLUMNS} FROM driver_profiles WHERE id = ?1"),
                    params![id.as_str()],
                    profile_from_row,
                )
                .optional()?
            else {
                return Ok(None);
            };
            profile.apply(&patch, Utc::now());
            tx.execute(
                "UPDATE driver_profiles
                 SET display_name = ?1, vehicle_model = ?2, license_plate = ?3, last_updated_at = ?4
                 WHERE id = ?5",
                params![
                    profile.display_name,
                    profile.vehicle_model,
                    profile.license_plate,
                    format_ts(profile.last_updated_at),
                    id.as_str(),
                ],
            )?;
            tx.commit()?;
            Ok(Some(profile))
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("profiles.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn first_access_creates_profile_once() {
        let (db, _dir) = setup_db().await;
        let mut identity = Identity::new("d-1");
        identity.email = Some("dee@example.com".into());

        let created = get_or_create(&db, &identity).await.unwrap();
        assert_eq!(created.display_name, "Driver");
        assert_eq!(created.email.as_deref(), Some("dee@example.com"));

        identity.display_name = Some("Someone Else".into());
        let again = get_or_create(&db, &identity).await.unwrap();
        assert_eq!(again, created);
    }

    #[tokio::test]
    async fn concurrent_first_logins_converge() {
        let (db, _dir) = setup_db().await;
        let identity = Identity::new("d-race");
        let (a, b) = tokio::join!(get_or_create(&db, &identity), get_or_create(&db, &identity));
        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[tokio::test]
    async fn update_stamps_last_updated_at() {
        let (db, _dir) = setup_db().await;
        let created = get_or_create(&db, &Identity::new("d-1")).await.unwrap();
        let patch = ProfilePatch {
            vehicle_model: Some("Prius".into()),
            license_plate: Some("XYZ-789".into()),
            ..ProfilePatch::default()
        };
        let updated = update(&db, &created.id, &patch).await.unwrap().unwrap();
        assert_eq!(updated.vehicle_model, "Prius");
        assert_eq!(updated.license_plate, "XYZ-789");
        assert!(updated.last_updated_at >= created.last_updated_at);
        assert_eq!(get(&db, &created.id).await.unwrap(), Some(updated));

        let missing = update(&db, &DriverId::new("nobody"), &patch).await.unwrap();
        assert!(missing.is_none());
    }
}
