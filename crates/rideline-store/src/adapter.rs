// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the job and profile store traits.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use rideline_config::model::StorageConfig;
use rideline_core::{
    AdapterType, DriverId, DriverProfile, HealthStatus, Identity, Job, JobFilter, JobId,
    JobStatus, JobStore, JobStream, NewJob, PluginAdapter, ProfilePatch, ProfileStore,
    RidelineError, Transition,
};

use crate::database::{Database, map_tr_err};
use crate::feed;
use crate::queries;

/// SQLite-backed job and profile store.
///
/// Wraps a [`Database`] handle and delegates to the typed query modules.
/// The database is opened on the first call to [`SqliteStore::initialize`].
pub struct SqliteStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStore {
    /// Create a new store with the given configuration.
    ///
    /// The database connection is not opened until [`initialize`](Self::initialize) is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Create and initialize a store in one step.
    pub async fn open(config: StorageConfig) -> Result<Self, RidelineError> {
        let store = Self::new(config);
        store.initialize().await?;
        Ok(store)
    }

    /// Open the database and apply migrations. Fails if already initialized.
    pub async fn initialize(&self) -> Result<(), RidelineError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| RidelineError::Storage {
            source: "store already initialized".into(),
        })?;
        info!(path = %self.config.database_path, "SQLite store initialized");
        Ok(())
    }

    fn db(&self) -> Result<&Database, RidelineError> {
        self.db.get().ok_or_else(|| RidelineError::Storage {
            source: "store not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::JobStore
    }

    async fn health_check(&self) -> Result<HealthStatus, RidelineError> {
        let Ok(db) = self.db() else {
            return Ok(HealthStatus::Unhealthy("not initialized".into()));
        };
        db.connection()
            .call(|conn| conn.execute_batch("SELECT 1;"))
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RidelineError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn create_job(&self, new: NewJob) -> Result<Job, RidelineError> {
        queries::jobs::insert_job(self.db()?, new).await
    }

    async fn get_job(&self, id: &JobId) -> Result<Job, RidelineError> {
        queries::jobs::get_job(self.db()?, id)
            .await?
            .ok_or_else(|| RidelineError::NotFound {
                kind: "job",
                id: id.to_string(),
            })
    }

    async fn subscribe(&self, filter: JobFilter) -> Result<JobStream, RidelineError> {
        feed::subscribe(
            self.db()?.clone(),
            filter,
            self.config.feed_poll_interval(),
        )
        .await
    }

    async fn write(
        &self,
        id: &JobId,
        expected: JobStatus,
        transition: Transition,
    ) -> Result<Job, RidelineError> {
        queries::jobs::write_job(self.db()?, id, expected, transition)
            .await?
            .into_result(id, expected)
    }
}

#[async_trait]
impl ProfileStore for SqliteStore {
    async fn get_or_create_profile(
        &self,
        identity: &Identity,
    ) -> Result<DriverProfile, RidelineError> {
        queries::profiles::get_or_create(self.db()?, identity).await
    }

    async fn get_profile(&self, id: &DriverId) -> Result<Option<DriverProfile>, RidelineError> {
        queries::profiles::get(self.db()?, id).await
    }

    async fn update_profile(
        &self,
        id: &DriverId,
        patch: &ProfilePatch,
    ) -> Result<DriverProfile, RidelineError> {
        queries::profiles::update(self.db()?, id, patch)
            .await?
            .ok_or_else(|| RidelineError::NotFound {
                kind: "driver profile",
                id: id.to_string(),
            })
    }
}
