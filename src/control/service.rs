use std::{collections::HashMap, str::FromStr, sync::Arc, time::Duration};

use anyhow::anyhow;
use chrono::{Local, NaiveDateTime};
use tokio::{
    sync::Mutex,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::rules::{self, Transition};
use crate::{
    db::models::{Device, DeviceSlot, DeviceUsage, Environment, Reading, Slots},
    error::{ControlError, StoreError},
    hardware::{Actuator, Measurement, Rig},
    store::Stores,
};

/// What to do when an environment references a device the registry cannot
/// resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StaleDevicePolicy {
    /// Fail the whole cycle: no commands, no reading.
    #[default]
    Abort,
    /// Treat only the broken slot as empty and carry on.
    Skip,
}

impl FromStr for StaleDevicePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            other => Err(anyhow!("unknown stale device policy: {other:?}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControlSettings {
    pub interval: Duration,
    pub actuator_timeout: Duration,
    pub sensor_timeout: Duration,
    pub stale_device_policy: StaleDevicePolicy,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            actuator_timeout: Duration::from_secs(30),
            sensor_timeout: Duration::from_secs(10),
            stale_device_policy: StaleDevicePolicy::Abort,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedTransition {
    pub slot: DeviceSlot,
    pub device_id: Uuid,
    pub transition: Transition,
}

/// A transition that did not fully apply.
///
/// Either the command hook failed or timed out, in which case the device
/// keeps its previous state, or the hardware switched but the registry
/// write failed, in which case the transition is also listed as applied and
/// the reading shows the switched state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    pub slot: DeviceSlot,
    pub device_id: Uuid,
    pub transition: Transition,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub reading: Reading,
    pub transitions: Vec<AppliedTransition>,
    pub failures: Vec<CommandFailure>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// No schedule is active; nothing was touched or recorded.
    NoSchedule,
    Recorded(CycleReport),
}

struct Station {
    rig: Rig,
    // Serializes cycles of one environment.
    lock: Arc<Mutex<()>>,
}

struct Inner {
    stores: Stores,
    stations: HashMap<Uuid, Station>,
    settings: ControlSettings,
}

/// Runs control cycles for every environment that has a rig.
///
/// Cheap to clone; clones share stations and their locks.
#[derive(Clone)]
pub struct ControlService {
    inner: Arc<Inner>,
}

impl ControlService {
    pub fn new(stores: Stores, rigs: HashMap<Uuid, Rig>, settings: ControlSettings) -> Self {
        let stations = rigs
            .into_iter()
            .map(|(id, rig)| {
                (
                    id,
                    Station {
                        rig,
                        lock: Arc::new(Mutex::new(())),
                    },
                )
            })
            .collect();
        Self {
            inner: Arc::new(Inner {
                stores,
                stations,
                settings,
            }),
        }
    }

    /// Whether `environment_id` has a rig attached.
    pub fn manages(&self, environment_id: Uuid) -> bool {
        self.inner.stations.contains_key(&environment_id)
    }

    /// Runs the control loop indefinitely.
    /// Spawn this via `tokio::spawn`.
    ///
    /// Every tick spawns one task per environment so a slow sensor or
    /// actuator only delays its own environment.
    pub async fn run(self) {
        let interval = self.inner.settings.interval;
        info!(
            interval_secs = interval.as_secs(),
            environments = self.inner.stations.len(),
            "Control loop started"
        );
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let now = Local::now().naive_local();
            for &environment_id in self.inner.stations.keys() {
                let service = self.clone();
                tokio::spawn(async move { service.tick(environment_id, now).await });
            }
        }
    }

    async fn tick(&self, environment_id: Uuid, now: NaiveDateTime) {
        match self.try_evaluate(environment_id, now).await {
            None => {
                warn!(environment_id = %environment_id, "Previous cycle still running; skipping tick");
            }
            Some(Ok(CycleOutcome::NoSchedule)) => {}
            Some(Ok(CycleOutcome::Recorded(report))) => {
                debug!(
                    environment_id = %environment_id,
                    transitions = report.transitions.len(),
                    failures = report.failures.len(),
                    "Control cycle finished"
                );
            }
            Some(Err(e)) => {
                error!(environment_id = %environment_id, error = %e, "Control cycle failed");
            }
        }
    }

    /// Runs one cycle, waiting for any cycle already running for the same
    /// environment. `at` defaults to the current local time.
    pub async fn evaluate(
        &self,
        environment_id: Uuid,
        at: Option<NaiveDateTime>,
    ) -> Result<CycleOutcome, ControlError> {
        let station = self.station(environment_id)?;
        let _guard = station.lock.lock().await;
        let now = at.unwrap_or_else(|| Local::now().naive_local());
        self.cycle(environment_id, &station.rig, now).await
    }

    /// Like [`evaluate`](Self::evaluate) but returns `None` instead of
    /// waiting when a cycle for the environment is already running.
    pub async fn try_evaluate(
        &self,
        environment_id: Uuid,
        now: NaiveDateTime,
    ) -> Option<Result<CycleOutcome, ControlError>> {
        let station = match self.station(environment_id) {
            Ok(station) => station,
            Err(e) => return Some(Err(e)),
        };
        let _guard = station.lock.try_lock().ok()?;
        Some(self.cycle(environment_id, &station.rig, now).await)
    }

    fn station(&self, environment_id: Uuid) -> Result<&Station, ControlError> {
        self.inner
            .stations
            .get(&environment_id)
            .ok_or(ControlError::NoHardware(environment_id))
    }

    async fn cycle(
        &self,
        environment_id: Uuid,
        rig: &Rig,
        now: NaiveDateTime,
    ) -> Result<CycleOutcome, ControlError> {
        let stores = &self.inner.stores;

        let environment = stores
            .environments
            .get_environment(environment_id)
            .await?
            .ok_or(ControlError::EnvironmentNotFound(environment_id))?;

        let Some(schedule) = stores
            .schedules
            .lookup_active_schedule(environment_id, now)
            .await?
        else {
            debug!(environment_id = %environment_id, at = %now, "No active schedule; nothing to do");
            return Ok(CycleOutcome::NoSchedule);
        };

        let measurement = self.read_sensor(environment_id, rig).await?;
        let mut devices = self.resolve_devices(&environment).await?;

        let current = devices
            .as_ref()
            .map(|_, device| device.as_ref().map(|d| d.active));
        let plan = rules::decide(&environment, &schedule, now, measurement, &current);

        let mut transitions = Vec::new();
        let mut failures = Vec::new();
        for slot in DeviceSlot::ALL {
            let Some(transition) = *plan.get(slot) else {
                continue;
            };
            let Some(device) = devices.get_mut(slot).as_mut() else {
                continue;
            };

            if let Err(e) = self.command(rig.actuator(slot), transition).await {
                warn!(
                    environment_id = %environment_id,
                    slot = %slot,
                    device_id = %device.id,
                    transition = ?transition,
                    error = %e,
                    "Actuator command failed; keeping previous state"
                );
                failures.push(CommandFailure {
                    slot,
                    device_id: device.id,
                    transition,
                    error: format!("{e:#}"),
                });
                continue;
            }

            let usage = match transition {
                Transition::On => {
                    device.last_activated_at = Some(now);
                    None
                }
                Transition::Off => DeviceUsage::closing(device, environment_id, now),
            };
            // The hardware has switched; the reading reports that even if
            // the registry write below fails.
            device.active = transition.target_state();
            if let Err(e) = self.record_switch(device, usage.as_ref()).await {
                warn!(
                    environment_id = %environment_id,
                    slot = %slot,
                    device_id = %device.id,
                    transition = ?transition,
                    error = %e,
                    "Device switched but its state was not saved"
                );
                failures.push(CommandFailure {
                    slot,
                    device_id: device.id,
                    transition,
                    error: format!("device state not saved: {e}"),
                });
            }

            info!(
                environment_id = %environment_id,
                slot = %slot,
                device_id = %device.id,
                transition = ?transition,
                "Device switched"
            );
            transitions.push(AppliedTransition {
                slot,
                device_id: device.id,
                transition,
            });
        }

        let reading = snapshot(&environment, now, measurement, &devices);
        stores.readings.persist_reading(&reading).await?;
        info!(
            environment_id = %environment_id,
            at = %now,
            temp = measurement.temp,
            humidity = measurement.humidity,
            "Reading recorded"
        );

        Ok(CycleOutcome::Recorded(CycleReport {
            reading,
            transitions,
            failures,
        }))
    }

    async fn record_switch(
        &self,
        device: &Device,
        usage: Option<&DeviceUsage>,
    ) -> Result<(), StoreError> {
        let registry = &self.inner.stores.devices;
        registry.save_device_state(device).await?;
        if let Some(usage) = usage {
            registry.record_usage(usage).await?;
        }
        Ok(())
    }

    async fn read_sensor(&self, environment_id: Uuid, rig: &Rig) -> Result<Measurement, ControlError> {
        let timeout = self.inner.settings.sensor_timeout;
        let result = match time::timeout(timeout, rig.sensor.read()).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("sensor read timed out after {}s", timeout.as_secs())),
        };
        result.map_err(|source| ControlError::SensorUnavailable {
            environment_id,
            source,
        })
    }

    /// Resolves the device of every populated slot.
    async fn resolve_devices(
        &self,
        environment: &Environment,
    ) -> Result<Slots<Option<Device>>, ControlError> {
        let ids = environment.device_ids();
        let mut devices = Slots::<Option<Device>>::default();

        for slot in DeviceSlot::ALL {
            let Some(device_id) = *ids.get(slot) else {
                continue;
            };
            match self.inner.stores.devices.get_device(slot, device_id).await? {
                Some(device) => *devices.get_mut(slot) = Some(device),
                None => match self.inner.settings.stale_device_policy {
                    StaleDevicePolicy::Abort => {
                        return Err(ControlError::StaleDevice {
                            environment_id: environment.id,
                            slot,
                            device_id,
                        });
                    }
                    StaleDevicePolicy::Skip => {
                        warn!(
                            environment_id = %environment.id,
                            slot = %slot,
                            device_id = %device_id,
                            "Referenced device does not exist; skipping slot"
                        );
                    }
                },
            }
        }
        Ok(devices)
    }

    async fn command(&self, actuator: &Arc<dyn Actuator>, transition: Transition) -> anyhow::Result<()> {
        let timeout = self.inner.settings.actuator_timeout;
        let hook = match transition {
            Transition::On => actuator.turn_on(1.0),
            Transition::Off => actuator.turn_off(),
        };
        time::timeout(timeout, hook)
            .await
            .map_err(|_| anyhow!("actuator command timed out after {}s", timeout.as_secs()))?
    }
}

/// Builds the reading for the post-transition state of `devices`.
fn snapshot(
    environment: &Environment,
    now: NaiveDateTime,
    measurement: Measurement,
    devices: &Slots<Option<Device>>,
) -> Reading {
    let active = devices
        .as_ref()
        .map(|_, device| device.as_ref().is_some_and(|d| d.active));
    Reading {
        id: Uuid::new_v4(),
        environment_id: environment.id,
        at: now,
        temp: measurement.temp,
        humidity: measurement.humidity,
        heater_id: environment.heater_id,
        heater_active: active.heater,
        humidifier_id: environment.humidifier_id,
        humidifier_active: active.humidifier,
        fan_id: environment.fan_id,
        fan_active: active.fan,
        light_id: environment.light_id,
        light_active: active.light,
    }
}
