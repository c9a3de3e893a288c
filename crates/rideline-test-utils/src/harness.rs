// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end engine testing.
//!
//! `TestHarness` wires a store, a gateway and a fast-reconnect config
//! together and provides helpers that wait, with a timeout, for a session's
//! view or event stream to reach an expected state.

use std::sync::Arc;
use std::time::Duration;

use rideline_config::RidelineConfig;
use rideline_config::model::AssignmentMode;
use rideline_core::{Identity, Job, NewJob, RidelineError};
use rideline_engine::{DriverEvent, DriverSession, DriverView, JobGateway, LifecycleController};
use rideline_store::SqliteStore;
use tokio::sync::broadcast;

use crate::fixtures;
use crate::mock_store::MockJobStore;

/// How long the wait helpers wait before failing the test.
pub const WAIT: Duration = Duration::from_secs(5);

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    mode: AssignmentMode,
    sqlite: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            mode: AssignmentMode::Pull,
            sqlite: false,
        }
    }

    pub fn with_mode(mut self, mode: AssignmentMode) -> Self {
        self.mode = mode;
        self
    }

    /// Back the gateway with a temp-file SQLite store instead of the mock.
    pub fn with_sqlite(mut self) -> Self {
        self.sqlite = true;
        self
    }

    pub async fn build(self) -> Result<TestHarness, RidelineError> {
        let mut config = fixtures::fast_config(self.mode);
        let mock = Arc::new(MockJobStore::new());

        let (gateway, temp_dir) = if self.sqlite {
            let temp_dir =
                tempfile::TempDir::new().map_err(|e| RidelineError::Storage { source: e.into() })?;
            config.storage.database_path = temp_dir
                .path()
                .join("rideline.db")
                .to_string_lossy()
                .to_string();
            let store = Arc::new(SqliteStore::open(config.storage.clone()).await?);
            (JobGateway::from_store(store), Some(temp_dir))
        } else {
            (JobGateway::from_store(mock.clone()), None)
        };

        Ok(TestHarness {
            mock,
            gateway,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with a store and config.
pub struct TestHarness {
    /// The mock store. Unused by the gateway when built with SQLite.
    pub mock: Arc<MockJobStore>,
    pub gateway: JobGateway,
    pub config: RidelineConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: Option<tempfile::TempDir>,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Pull-model harness over the mock store.
    pub async fn new() -> TestHarness {
        Self::builder()
            .build()
            .await
            .expect("mock harness builds")
    }

    /// Create a pull-model job scheduled `minutes` from now.
    pub async fn seed(&self, minutes: i64) -> Job {
        self.create(fixtures::new_job(minutes)).await
    }

    pub async fn create(&self, new: NewJob) -> Job {
        self.gateway.create_job(new).await.expect("job created")
    }

    /// Start a session for `driver` and wait until every stream has synced.
    pub async fn session(&self, driver: &str) -> DriverSession {
        self.session_for(&Identity::new(driver)).await
    }

    pub async fn session_for(&self, identity: &Identity) -> DriverSession {
        let session = DriverSession::start(self.gateway.clone(), identity, &self.config)
            .await
            .expect("session starts");
        tokio::time::timeout(WAIT, session.wait_until_synced())
            .await
            .expect("session synced within timeout")
            .expect("session live");
        session
    }
}

/// Wait until the controller's view satisfies `pred` and return that view.
pub async fn wait_for_view<F>(controller: &LifecycleController, pred: F) -> Arc<DriverView>
where
    F: Fn(&DriverView) -> bool,
{
    let mut rx = controller.watch_view();
    let view = tokio::time::timeout(WAIT, rx.wait_for(|v| pred(v)))
        .await
        .expect("view reached expected state within timeout")
        .expect("session still running");
    Arc::clone(&view)
}

/// Wait for the first event satisfying `pred`, skipping others.
pub async fn wait_for_event<F>(rx: &mut broadcast::Receiver<DriverEvent>, pred: F) -> DriverEvent
where
    F: Fn(&DriverEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("expected event within timeout")
}
