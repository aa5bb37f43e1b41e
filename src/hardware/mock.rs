use std::f64::consts::PI;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Local, Timelike};
use tracing::info;
use uuid::Uuid;

use super::{Actuator, Measurement, Sensor};
use crate::db::models::DeviceSlot;

/// `offset ± amplitude`, completing one cycle every `period_secs`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SineWave {
    pub offset: f64,
    pub amplitude: f64,
    pub period_secs: u32,
}

impl SineWave {
    pub fn value_at(&self, second: u32) -> f64 {
        let phase = f64::from(second) / f64::from(self.period_secs.max(1));
        self.amplitude * (phase * 2.0 * PI).sin() + self.offset
    }
}

/// Simulated sensor whose readings drift along sine waves indexed by the
/// current second of the hour.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    pub temp: SineWave,
    pub humidity: SineWave,
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self {
            // 60–80 degrees every five minutes.
            temp: SineWave {
                offset: 70.0,
                amplitude: 10.0,
                period_secs: 300,
            },
            // 0–100 % every twelve minutes.
            humidity: SineWave {
                offset: 0.5,
                amplitude: 0.5,
                period_secs: 720,
            },
        }
    }
}

impl SimulatedSensor {
    pub fn measurement_at(&self, second_of_hour: u32) -> Measurement {
        Measurement {
            temp: self.temp.value_at(second_of_hour),
            humidity: self.humidity.value_at(second_of_hour),
        }
    }
}

#[async_trait]
impl Sensor for SimulatedSensor {
    async fn read(&self) -> Result<Measurement> {
        let now = Local::now();
        Ok(self.measurement_at(now.minute() * 60 + now.second()))
    }
}

/// Actuator that only reports the commands it receives.
#[derive(Debug, Clone)]
pub struct LoggingActuator {
    environment_id: Uuid,
    slot: DeviceSlot,
}

impl LoggingActuator {
    pub fn new(environment_id: Uuid, slot: DeviceSlot) -> Self {
        Self {
            environment_id,
            slot,
        }
    }
}

#[async_trait]
impl Actuator for LoggingActuator {
    async fn turn_on(&self, level: f64) -> Result<()> {
        info!(environment_id = %self.environment_id, slot = %self.slot, power = level, "Actuator on");
        Ok(())
    }

    async fn turn_off(&self) -> Result<()> {
        info!(environment_id = %self.environment_id, slot = %self.slot, "Actuator off");
        Ok(())
    }
}
