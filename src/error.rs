use thiserror::Error;
use uuid::Uuid;

use crate::db::models::DeviceSlot;

/// Failures raised by the persistence collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// More than one schedule is active for the same environment and day.
    #[error("environment {environment_id} has {count} overlapping active schedules")]
    AmbiguousSchedule { environment_id: Uuid, count: usize },

    /// A device row vanished between resolution and the state write.
    #[error("device {0} no longer exists")]
    DeviceNotFound(Uuid),

    #[error("in-memory store lock poisoned")]
    Poisoned,
}

/// Reasons a control cycle is aborted before its reading is written.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("environment {0} not found")]
    EnvironmentNotFound(Uuid),

    #[error("environment {0} has no hardware configured")]
    NoHardware(Uuid),

    #[error("{slot} device {device_id} referenced by environment {environment_id} does not exist")]
    StaleDevice {
        environment_id: Uuid,
        slot: DeviceSlot,
        device_id: Uuid,
    },

    #[error("sensor read failed for environment {environment_id}: {source:#}")]
    SensorUnavailable {
        environment_id: Uuid,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
