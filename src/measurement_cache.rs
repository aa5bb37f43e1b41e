use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::hardware::Measurement;

/// A measurement pushed by an operator or external probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedMeasurement {
    pub measurement: Measurement,
    pub received_at: DateTime<Utc>,
}

/// In-memory store of the most recent pushed measurement per environment.
///
/// Wrapped in `Arc` so it can be cheaply cloned and shared between the HTTP
/// handlers that fill it and the sensors that read it.
#[derive(Clone, Default)]
pub struct MeasurementCache {
    inner: Arc<RwLock<HashMap<Uuid, CachedMeasurement>>>,
}

impl MeasurementCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the cached measurement for `environment_id`.
    pub async fn update(&self, environment_id: Uuid, measurement: Measurement) {
        self.update_at(environment_id, measurement, Utc::now()).await;
    }

    pub async fn update_at(
        &self,
        environment_id: Uuid,
        measurement: Measurement,
        received_at: DateTime<Utc>,
    ) {
        self.inner.write().await.insert(
            environment_id,
            CachedMeasurement {
                measurement,
                received_at,
            },
        );
    }

    pub async fn get(&self, environment_id: Uuid) -> Option<CachedMeasurement> {
        self.inner.read().await.get(&environment_id).copied()
    }
}
