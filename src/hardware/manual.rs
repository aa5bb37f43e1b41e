use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{Measurement, Sensor};
use crate::measurement_cache::MeasurementCache;

/// Sensor backed by measurements pushed over HTTP.
///
/// A measurement older than `max_age` counts as unavailable so the control
/// loop never acts on a probe that has gone quiet.
pub struct CachedSensor {
    cache: MeasurementCache,
    environment_id: Uuid,
    max_age: Duration,
}

impl CachedSensor {
    pub fn new(cache: MeasurementCache, environment_id: Uuid, max_age: Duration) -> Self {
        Self {
            cache,
            environment_id,
            max_age,
        }
    }
}

#[async_trait]
impl Sensor for CachedSensor {
    async fn read(&self) -> Result<Measurement> {
        let cached = self
            .cache
            .get(self.environment_id)
            .await
            .ok_or_else(|| anyhow!("no measurement received yet"))?;

        let age = (Utc::now() - cached.received_at).to_std().unwrap_or_default();
        if age > self.max_age {
            return Err(anyhow!(
                "latest measurement is {}s old (limit {}s)",
                age.as_secs(),
                self.max_age.as_secs()
            ));
        }
        Ok(cached.measurement)
    }
}
