//! Sensing and actuation capabilities backing each environment.
//!
//! Every environment is paired with a [`Rig`]: one [`Sensor`] and one
//! [`Actuator`] per device slot. Which implementations make up a rig is
//! chosen per environment through [`HardwareProfile`].

pub mod manual;
pub mod mock;

use std::{str::FromStr, sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::models::{DeviceSlot, Slots},
    measurement_cache::MeasurementCache,
};

/// Current conditions inside an environment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub temp: f64,
    /// Relative humidity between 0.0 and 1.0.
    pub humidity: f64,
}

#[async_trait]
pub trait Sensor: Send + Sync {
    async fn read(&self) -> Result<Measurement>;
}

/// Command hooks of one physical output. Implementations may block for as
/// long as the actuation takes.
#[async_trait]
pub trait Actuator: Send + Sync {
    async fn turn_on(&self, level: f64) -> Result<()>;
    async fn turn_off(&self) -> Result<()>;
}

/// Which capability set backs an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareProfile {
    /// Simulated sine-wave sensor, logging actuators.
    Mock,
    /// Sensor fed through the measurements endpoint, logging actuators.
    Manual,
}

impl FromStr for HardwareProfile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mock" => Ok(Self::Mock),
            "manual" => Ok(Self::Manual),
            other => Err(anyhow::anyhow!("unknown hardware profile: {other:?}")),
        }
    }
}

#[derive(Clone)]
pub struct Rig {
    pub sensor: Arc<dyn Sensor>,
    pub actuators: Slots<Arc<dyn Actuator>>,
}

impl Rig {
    pub fn new(sensor: Arc<dyn Sensor>, actuators: Slots<Arc<dyn Actuator>>) -> Self {
        Self { sensor, actuators }
    }

    pub fn from_profile(
        profile: HardwareProfile,
        environment_id: Uuid,
        cache: &MeasurementCache,
        max_measurement_age: Duration,
    ) -> Self {
        let sensor: Arc<dyn Sensor> = match profile {
            HardwareProfile::Mock => Arc::new(mock::SimulatedSensor::default()),
            HardwareProfile::Manual => Arc::new(manual::CachedSensor::new(
                cache.clone(),
                environment_id,
                max_measurement_age,
            )),
        };
        Self::new(sensor, logging_actuators(environment_id))
    }

    pub fn actuator(&self, slot: DeviceSlot) -> &Arc<dyn Actuator> {
        self.actuators.get(slot)
    }
}

fn logging_actuators(environment_id: Uuid) -> Slots<Arc<dyn Actuator>> {
    Slots::<()>::default().map(|slot, ()| {
        Arc::new(mock::LoggingActuator::new(environment_id, slot)) as Arc<dyn Actuator>
    })
}
