//! Scriptable hardware and a seeded in-memory environment for control tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use uuid::Uuid;

use super::{ControlService, ControlSettings};
use crate::{
    db::models::{Device, DeviceSlot, DeviceUsage, Environment, Schedule, Slots},
    error::StoreError,
    hardware::{Actuator, Measurement, Rig, Sensor},
    store::{DeviceRegistry, MemoryStore, StoreResult, Stores},
};

/// `HH:MM:SS` on a day covered by the fixture schedule.
pub fn at(time: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(&format!("2024-06-01 {time}"), "%Y-%m-%d %H:%M:%S").unwrap()
}

/// Returns whatever measurement was last set, or fails when cleared.
#[derive(Debug)]
pub struct FixedSensor {
    value: Mutex<Option<Measurement>>,
}

impl FixedSensor {
    pub fn new(measurement: Measurement) -> Self {
        Self {
            value: Mutex::new(Some(measurement)),
        }
    }

    pub fn set(&self, measurement: Option<Measurement>) {
        *self.value.lock().unwrap() = measurement;
    }
}

#[async_trait]
impl Sensor for FixedSensor {
    async fn read(&self) -> Result<Measurement> {
        let value = *self.value.lock().unwrap();
        value.ok_or_else(|| anyhow!("probe disconnected"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedCommand {
    pub slot: DeviceSlot,
    pub command: Command,
}

#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
    Succeed,
    Fail,
    Hang,
    Delay(Duration),
}

/// Records every command it receives into a shared log, then behaves as
/// scripted.
#[derive(Debug)]
pub struct RecordingActuator {
    slot: DeviceSlot,
    log: Arc<Mutex<Vec<RecordedCommand>>>,
    behaviour: Mutex<Behaviour>,
}

impl RecordingActuator {
    pub fn set_behaviour(&self, behaviour: Behaviour) {
        *self.behaviour.lock().unwrap() = behaviour;
    }

    async fn handle(&self, command: Command) -> Result<()> {
        self.log.lock().unwrap().push(RecordedCommand {
            slot: self.slot,
            command,
        });
        let behaviour = *self.behaviour.lock().unwrap();
        match behaviour {
            Behaviour::Succeed => Ok(()),
            Behaviour::Fail => Err(anyhow!("relay did not respond")),
            Behaviour::Hang => std::future::pending().await,
            Behaviour::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Actuator for RecordingActuator {
    async fn turn_on(&self, _level: f64) -> Result<()> {
        self.handle(Command::On).await
    }

    async fn turn_off(&self) -> Result<()> {
        self.handle(Command::Off).await
    }
}

/// Device registry over a [`MemoryStore`] whose writes can be made to fail.
pub struct FlakyRegistry {
    inner: MemoryStore,
    fail_saves: bool,
    fail_usages: bool,
}

impl FlakyRegistry {
    pub fn failing_saves(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_saves: true,
            fail_usages: false,
        }
    }

    pub fn failing_usages(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_saves: false,
            fail_usages: true,
        }
    }
}

#[async_trait]
impl DeviceRegistry for FlakyRegistry {
    async fn get_device(&self, slot: DeviceSlot, device_id: Uuid) -> StoreResult<Option<Device>> {
        self.inner.get_device(slot, device_id).await
    }

    async fn save_device_state(&self, device: &Device) -> StoreResult<()> {
        if self.fail_saves {
            return Err(StoreError::Poisoned);
        }
        self.inner.save_device_state(device).await
    }

    async fn record_usage(&self, usage: &DeviceUsage) -> StoreResult<()> {
        if self.fail_usages {
            return Err(StoreError::Poisoned);
        }
        self.inner.record_usage(usage).await
    }
}

/// An environment with one device per slot and a schedule of
/// 70 degrees, 50 % humidity, fan one minute per hour and light 08:00-20:00.
pub struct Fixture {
    pub store: MemoryStore,
    pub env_id: Uuid,
    environment: Environment,
    device_ids: Slots<Uuid>,
    sensor: Arc<FixedSensor>,
    actuators: Slots<Arc<RecordingActuator>>,
    log: Arc<Mutex<Vec<RecordedCommand>>>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    /// Seeds another environment into an existing store.
    pub fn with_store(store: MemoryStore) -> Self {
        let device_ids = Slots::<()>::default().map(|slot, ()| {
            let id = Uuid::new_v4();
            store.insert_device(Device {
                id,
                name: format!("{slot} unit"),
                slot,
                active: false,
                voltage: Some(120.0),
                watts: Some(match slot {
                    DeviceSlot::Heater => 300.0,
                    DeviceSlot::Humidifier => 40.0,
                    DeviceSlot::Fan => 5.0,
                    DeviceSlot::Light => 60.0,
                }),
                last_activated_at: None,
            });
            id
        });

        let env_id = Uuid::new_v4();
        let environment = Environment {
            id: env_id,
            name: "gecko tank".to_owned(),
            created_at: Utc::now(),
            heater_id: Some(device_ids.heater),
            humidifier_id: Some(device_ids.humidifier),
            fan_id: Some(device_ids.fan),
            light_id: Some(device_ids.light),
            temp_default: None,
            temp_tolerance: None,
            humidity_default: None,
            humidity_tolerance: None,
        };
        store.insert_environment(environment.clone());

        let log = Arc::new(Mutex::new(Vec::new()));
        let actuators = Slots::<()>::default().map(|slot, ()| {
            Arc::new(RecordingActuator {
                slot,
                log: log.clone(),
                behaviour: Mutex::new(Behaviour::Succeed),
            })
        });

        let fixture = Self {
            store,
            env_id,
            environment,
            device_ids,
            sensor: Arc::new(FixedSensor::new(Measurement {
                temp: 70.0,
                humidity: 0.5,
            })),
            actuators,
            log,
        };
        fixture.store.insert_schedule(fixture.schedule());
        fixture
    }

    pub fn environment(&self) -> Environment {
        self.environment.clone()
    }

    /// A fresh schedule row for this environment.
    pub fn schedule(&self) -> Schedule {
        Schedule {
            id: Uuid::new_v4(),
            environment_id: self.env_id,
            start_date: "2024-01-01".parse().unwrap(),
            end_date: None,
            temp: Some(70.0),
            humidity: Some(0.5),
            fan_on_seconds: Some(60),
            fan_off_seconds: Some(3540),
            light_on_at: Some("08:00:00".parse().unwrap()),
            light_off_at: Some("20:00:00".parse().unwrap()),
        }
    }

    pub fn clear_schedules(&self) {
        self.store.remove_schedules(self.env_id);
    }

    pub fn set_measurement(&self, temp: f64, humidity: f64) {
        self.sensor.set(Some(Measurement { temp, humidity }));
    }

    pub fn fail_sensor(&self) {
        self.sensor.set(None);
    }

    pub fn fail_actuator(&self, slot: DeviceSlot) {
        self.actuators.get(slot).set_behaviour(Behaviour::Fail);
    }

    pub fn hang_actuator(&self, slot: DeviceSlot) {
        self.actuators.get(slot).set_behaviour(Behaviour::Hang);
    }

    pub fn delay_actuators(&self, delay: Duration) {
        for slot in DeviceSlot::ALL {
            self.actuators.get(slot).set_behaviour(Behaviour::Delay(delay));
        }
    }

    pub fn device_id(&self, slot: DeviceSlot) -> Uuid {
        *self.device_ids.get(slot)
    }

    /// Stored state of the device in `slot`.
    pub fn device(&self, slot: DeviceSlot) -> Device {
        self.store.device(self.device_id(slot)).unwrap()
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.log.lock().unwrap().clone()
    }

    pub fn rig(&self) -> Rig {
        let actuators = self
            .actuators
            .clone()
            .map(|_, actuator| actuator as Arc<dyn Actuator>);
        Rig::new(self.sensor.clone(), actuators)
    }

    pub fn service(&self) -> ControlService {
        self.service_with(ControlSettings::default())
    }

    pub fn service_with(&self, settings: ControlSettings) -> ControlService {
        self.service_for([(self.env_id, self.rig())], settings)
    }

    pub fn service_for(
        &self,
        rigs: impl IntoIterator<Item = (Uuid, Rig)>,
        settings: ControlSettings,
    ) -> ControlService {
        ControlService::new(
            Stores::from_backend(self.store.clone()),
            rigs.into_iter().collect::<HashMap<_, _>>(),
            settings,
        )
    }

    /// Service whose device registry is replaced by `registry`.
    pub fn service_with_registry(&self, registry: impl DeviceRegistry + 'static) -> ControlService {
        let mut stores = Stores::from_backend(self.store.clone());
        stores.devices = Arc::new(registry);
        ControlService::new(
            stores,
            HashMap::from([(self.env_id, self.rig())]),
            ControlSettings::default(),
        )
    }
}
