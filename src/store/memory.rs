//! In-memory implementation of every collaborator trait.
//!
//! Backs the unit and HTTP tests. Cloning shares the underlying state, so a
//! test can keep a handle for seeding and inspection while the control
//! service owns another.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use uuid::Uuid;

use super::{DeviceRegistry, EnvironmentCatalog, ReadingLog, ScheduleLookup, StoreResult};
use crate::db::models::{Device, DeviceSlot, DeviceUsage, Environment, Reading, Schedule};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct State {
    environments: HashMap<Uuid, Environment>,
    schedules: Vec<Schedule>,
    devices: HashMap<Uuid, Device>,
    readings: Vec<Reading>,
    usages: Vec<DeviceUsage>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

fn poison_err<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Poisoned
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_environment(&self, environment: Environment) {
        self.write(|s| {
            s.environments.insert(environment.id, environment);
        });
    }

    pub fn insert_schedule(&self, schedule: Schedule) {
        self.write(|s| s.schedules.push(schedule));
    }

    pub fn remove_schedules(&self, environment_id: Uuid) {
        self.write(|s| s.schedules.retain(|sch| sch.environment_id != environment_id));
    }

    pub fn insert_device(&self, device: Device) {
        self.write(|s| {
            s.devices.insert(device.id, device);
        });
    }

    pub fn remove_device(&self, device_id: Uuid) -> Option<Device> {
        self.write(|s| s.devices.remove(&device_id))
    }

    pub fn device(&self, device_id: Uuid) -> Option<Device> {
        self.read(|s| s.devices.get(&device_id).cloned())
    }

    /// Every reading written so far, in insertion order.
    pub fn all_readings(&self) -> Vec<Reading> {
        self.read(|s| s.readings.clone())
    }

    pub fn usages(&self) -> Vec<DeviceUsage> {
        self.read(|s| s.usages.clone())
    }

    // Seeding and inspection helpers are test-facing; a poisoned lock there
    // means a test already panicked, so recover the data instead of failing.
    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> T {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

#[async_trait]
impl EnvironmentCatalog for MemoryStore {
    async fn get_environment(&self, environment_id: Uuid) -> StoreResult<Option<Environment>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.environments.get(&environment_id).cloned())
    }
}

#[async_trait]
impl ScheduleLookup for MemoryStore {
    async fn lookup_active_schedule(
        &self,
        environment_id: Uuid,
        at: NaiveDateTime,
    ) -> StoreResult<Option<Schedule>> {
        let state = self.state.read().map_err(poison_err)?;
        let mut active: Vec<&Schedule> = state
            .schedules
            .iter()
            .filter(|s| s.environment_id == environment_id && s.is_active_on(at.date()))
            .collect();

        if active.len() > 1 {
            return Err(StoreError::AmbiguousSchedule {
                environment_id,
                count: active.len(),
            });
        }
        Ok(active.pop().cloned())
    }
}

#[async_trait]
impl DeviceRegistry for MemoryStore {
    async fn get_device(&self, slot: DeviceSlot, device_id: Uuid) -> StoreResult<Option<Device>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .devices
            .get(&device_id)
            .filter(|d| d.slot == slot)
            .cloned())
    }

    async fn save_device_state(&self, device: &Device) -> StoreResult<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        let stored = state
            .devices
            .get_mut(&device.id)
            .ok_or(StoreError::DeviceNotFound(device.id))?;
        stored.active = device.active;
        stored.last_activated_at = device.last_activated_at;
        Ok(())
    }

    async fn record_usage(&self, usage: &DeviceUsage) -> StoreResult<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.usages.push(usage.clone());
        Ok(())
    }
}

#[async_trait]
impl ReadingLog for MemoryStore {
    async fn persist_reading(&self, reading: &Reading) -> StoreResult<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        state.readings.push(reading.clone());
        Ok(())
    }

    async fn readings(
        &self,
        environment_id: Uuid,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> StoreResult<Vec<Reading>> {
        let state = self.state.read().map_err(poison_err)?;
        let mut rows: Vec<Reading> = state
            .readings
            .iter()
            .filter(|r| r.environment_id == environment_id)
            .filter(|r| from.map_or(true, |from| r.at >= from))
            .filter(|r| to.map_or(true, |to| r.at <= to))
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.at);
        Ok(rows)
    }

    async fn latest_reading(&self, environment_id: Uuid) -> StoreResult<Option<Reading>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .readings
            .iter()
            .filter(|r| r.environment_id == environment_id)
            .max_by_key(|r| r.at)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn schedule(environment_id: Uuid, start: &str, end: Option<&str>) -> Schedule {
        Schedule {
            id: Uuid::new_v4(),
            environment_id,
            start_date: start.parse().unwrap(),
            end_date: end.map(|e| e.parse().unwrap()),
            temp: Some(75.0),
            humidity: None,
            fan_on_seconds: None,
            fan_off_seconds: None,
            light_on_at: None,
            light_off_at: None,
        }
    }

    fn noon(day: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{day} 12:00:00"), "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[tokio::test]
    async fn lookup_returns_none_outside_every_window() {
        let store = MemoryStore::new();
        let env = Uuid::new_v4();
        store.insert_schedule(schedule(env, "2024-03-01", Some("2024-03-05")));

        let found = store.lookup_active_schedule(env, noon("2024-03-05")).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn lookup_ignores_other_environments() {
        let store = MemoryStore::new();
        let env = Uuid::new_v4();
        store.insert_schedule(schedule(Uuid::new_v4(), "2024-03-01", None));

        assert!(store.lookup_active_schedule(env, noon("2024-03-02")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lookup_rejects_overlapping_windows() {
        let store = MemoryStore::new();
        let env = Uuid::new_v4();
        store.insert_schedule(schedule(env, "2024-03-01", None));
        store.insert_schedule(schedule(env, "2024-03-02", Some("2024-03-09")));

        let err = store.lookup_active_schedule(env, noon("2024-03-03")).await.unwrap_err();
        assert!(matches!(err, StoreError::AmbiguousSchedule { count: 2, .. }));

        // Before the second window opens only one schedule is active.
        let one = store.lookup_active_schedule(env, noon("2024-03-01")).await.unwrap();
        assert!(one.is_some());
    }

    #[tokio::test]
    async fn get_device_respects_slot() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store.insert_device(Device {
            id,
            name: "clip fan".to_owned(),
            slot: DeviceSlot::Fan,
            active: false,
            voltage: None,
            watts: Some(5.0),
            last_activated_at: None,
        });

        assert!(store.get_device(DeviceSlot::Fan, id).await.unwrap().is_some());
        assert!(store.get_device(DeviceSlot::Light, id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn saving_a_removed_device_fails() {
        let store = MemoryStore::new();
        let device = Device {
            id: Uuid::new_v4(),
            name: "mister".to_owned(),
            slot: DeviceSlot::Humidifier,
            active: true,
            voltage: None,
            watts: None,
            last_activated_at: None,
        };
        store.insert_device(device.clone());
        store.remove_device(device.id);

        let err = store.save_device_state(&device).await.unwrap_err();
        assert!(matches!(err, StoreError::DeviceNotFound(id) if id == device.id));
    }

    #[tokio::test]
    async fn readings_are_filtered_and_sorted() {
        let store = MemoryStore::new();
        let env = Uuid::new_v4();
        let reading = |at: NaiveDateTime| Reading {
            id: Uuid::new_v4(),
            environment_id: env,
            at,
            temp: 70.0,
            humidity: 0.5,
            heater_id: None,
            heater_active: false,
            humidifier_id: None,
            humidifier_active: false,
            fan_id: None,
            fan_active: false,
            light_id: None,
            light_active: false,
        };
        let base = Utc::now().naive_utc();
        store.persist_reading(&reading(base + chrono::Duration::minutes(2))).await.unwrap();
        store.persist_reading(&reading(base)).await.unwrap();
        store.persist_reading(&reading(base + chrono::Duration::minutes(1))).await.unwrap();

        let all = store.readings(env, None, None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].at <= w[1].at));

        let bounded = store
            .readings(env, Some(base + chrono::Duration::minutes(1)), None)
            .await
            .unwrap();
        assert_eq!(bounded.len(), 2);

        let latest = store.latest_reading(env).await.unwrap().unwrap();
        assert_eq!(latest.at, base + chrono::Duration::minutes(2));
    }
}
