//! Collaborator seams used by the control cycle.
//!
//! The control cycle never talks to a database directly. It resolves
//! environments, schedules and devices and writes readings through these
//! traits, so the decision logic can be exercised against [`MemoryStore`]
//! and run in production against [`crate::db::store::PgStore`].

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::db::models::{Device, DeviceSlot, DeviceUsage, Environment, Reading, Schedule};
use crate::error::StoreError;

pub use memory::MemoryStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait EnvironmentCatalog: Send + Sync {
    async fn get_environment(&self, environment_id: Uuid) -> StoreResult<Option<Environment>>;
}

#[async_trait]
pub trait ScheduleLookup: Send + Sync {
    /// Returns the single schedule active for `environment_id` at `at`.
    ///
    /// Fails with [`StoreError::AmbiguousSchedule`] when validity windows
    /// overlap instead of picking an arbitrary winner.
    async fn lookup_active_schedule(
        &self,
        environment_id: Uuid,
        at: NaiveDateTime,
    ) -> StoreResult<Option<Schedule>>;
}

#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Resolves `device_id` within the device class `slot`.
    async fn get_device(&self, slot: DeviceSlot, device_id: Uuid) -> StoreResult<Option<Device>>;

    /// Persists `active` and `last_activated_at` of `device`.
    async fn save_device_state(&self, device: &Device) -> StoreResult<()>;

    async fn record_usage(&self, usage: &DeviceUsage) -> StoreResult<()>;
}

/// Append-only log of readings.
#[async_trait]
pub trait ReadingLog: Send + Sync {
    async fn persist_reading(&self, reading: &Reading) -> StoreResult<()>;

    /// Readings for one environment ordered by `at` ascending. Both bounds
    /// are inclusive.
    async fn readings(
        &self,
        environment_id: Uuid,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> StoreResult<Vec<Reading>>;

    async fn latest_reading(&self, environment_id: Uuid) -> StoreResult<Option<Reading>>;
}

/// Bundle of every collaborator the control cycle needs.
#[derive(Clone)]
pub struct Stores {
    pub environments: Arc<dyn EnvironmentCatalog>,
    pub schedules: Arc<dyn ScheduleLookup>,
    pub devices: Arc<dyn DeviceRegistry>,
    pub readings: Arc<dyn ReadingLog>,
}

impl Stores {
    /// Uses one backend for all collaborators.
    pub fn from_backend<S>(backend: S) -> Self
    where
        S: EnvironmentCatalog + ScheduleLookup + DeviceRegistry + ReadingLog + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            environments: backend.clone(),
            schedules: backend.clone(),
            devices: backend.clone(),
            readings: backend,
        }
    }
}
