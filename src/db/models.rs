use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Mirrors the `device_slot` Postgres enum.
///
/// An environment has at most one device per slot; the slot also acts as the
/// device class when resolving a device id through the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "device_slot", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeviceSlot {
    Heater,
    Humidifier,
    Fan,
    Light,
}

impl DeviceSlot {
    /// Evaluation order of the four control rules.
    pub const ALL: [DeviceSlot; 4] = [
        DeviceSlot::Heater,
        DeviceSlot::Humidifier,
        DeviceSlot::Fan,
        DeviceSlot::Light,
    ];
}

impl fmt::Display for DeviceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceSlot::Heater => "heater",
            DeviceSlot::Humidifier => "humidifier",
            DeviceSlot::Fan => "fan",
            DeviceSlot::Light => "light",
        };
        f.write_str(s)
    }
}

/// One value per device slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slots<T> {
    pub heater: T,
    pub humidifier: T,
    pub fan: T,
    pub light: T,
}

impl<T> Slots<T> {
    pub fn get(&self, slot: DeviceSlot) -> &T {
        match slot {
            DeviceSlot::Heater => &self.heater,
            DeviceSlot::Humidifier => &self.humidifier,
            DeviceSlot::Fan => &self.fan,
            DeviceSlot::Light => &self.light,
        }
    }

    pub fn get_mut(&mut self, slot: DeviceSlot) -> &mut T {
        match slot {
            DeviceSlot::Heater => &mut self.heater,
            DeviceSlot::Humidifier => &mut self.humidifier,
            DeviceSlot::Fan => &mut self.fan,
            DeviceSlot::Light => &mut self.light,
        }
    }

    pub fn as_ref(&self) -> Slots<&T> {
        Slots {
            heater: &self.heater,
            humidifier: &self.humidifier,
            fan: &self.fan,
            light: &self.light,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(DeviceSlot, T) -> U) -> Slots<U> {
        Slots {
            heater: f(DeviceSlot::Heater, self.heater),
            humidifier: f(DeviceSlot::Humidifier, self.humidifier),
            fan: f(DeviceSlot::Fan, self.fan),
            light: f(DeviceSlot::Light, self.light),
        }
    }
}

/// A controlled micro-climate with up to four actuator slots.
///
/// Devices are referenced by id only; a reference may be stale if the device
/// row has since been removed.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Environment {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub heater_id: Option<Uuid>,
    pub humidifier_id: Option<Uuid>,
    pub fan_id: Option<Uuid>,
    pub light_id: Option<Uuid>,
    pub temp_default: Option<f64>,
    pub temp_tolerance: Option<f64>,
    pub humidity_default: Option<f64>,
    pub humidity_tolerance: Option<f64>,
}

impl Environment {
    pub fn device_ids(&self) -> Slots<Option<Uuid>> {
        Slots {
            heater: self.heater_id,
            humidifier: self.humidifier_id,
            fan: self.fan_id,
            light: self.light_id,
        }
    }
}

/// Time-bounded target conditions and timing windows for one environment.
///
/// Active while `start_date <= today < end_date`; an absent `end_date` leaves
/// the window open.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub environment_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub temp: Option<f64>,
    pub humidity: Option<f64>,
    pub fan_on_seconds: Option<i32>,
    pub fan_off_seconds: Option<i32>,
    pub light_on_at: Option<NaiveTime>,
    pub light_off_at: Option<NaiveTime>,
}

impl Schedule {
    pub fn is_active_on(&self, day: NaiveDate) -> bool {
        self.start_date <= day && self.end_date.map_or(true, |end| day < end)
    }
}

/// A controllable output with a binary on/off state.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub name: String,
    pub slot: DeviceSlot,
    pub active: bool,
    pub voltage: Option<f64>,
    pub watts: Option<f64>,
    pub last_activated_at: Option<NaiveDateTime>,
}

/// Immutable snapshot of measured conditions and post-decision actuator
/// states. `*_active` is `false` whenever the slot has no device.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Reading {
    pub id: Uuid,
    pub environment_id: Uuid,
    pub at: NaiveDateTime,
    pub temp: f64,
    pub humidity: f64,
    pub heater_id: Option<Uuid>,
    pub heater_active: bool,
    pub humidifier_id: Option<Uuid>,
    pub humidifier_active: bool,
    pub fan_id: Option<Uuid>,
    pub fan_active: bool,
    pub light_id: Option<Uuid>,
    pub light_active: bool,
}

impl Reading {
    pub fn active_flags(&self) -> Slots<bool> {
        Slots {
            heater: self.heater_active,
            humidifier: self.humidifier_active,
            fan: self.fan_active,
            light: self.light_active,
        }
    }
}

/// One ON→OFF interval of a device.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct DeviceUsage {
    pub id: Uuid,
    pub device_id: Uuid,
    pub environment_id: Uuid,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub seconds: i64,
    pub kilowatt_hours: Option<f64>,
}

impl DeviceUsage {
    /// Builds the usage record for `device` switching off at `end_at`.
    ///
    /// Returns `None` when the device never recorded an activation time.
    pub fn closing(device: &Device, environment_id: Uuid, end_at: NaiveDateTime) -> Option<Self> {
        let start_at = device.last_activated_at?;
        let seconds = (end_at - start_at).num_seconds().max(0);
        Some(Self {
            id: Uuid::new_v4(),
            device_id: device.id,
            environment_id,
            start_at,
            end_at,
            seconds,
            kilowatt_hours: device
                .watts
                .map(|watts| watts * seconds as f64 / 3_600_000.0),
        })
    }
}
