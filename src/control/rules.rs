//! Pure per-environment decision rules.
//!
//! Each device slot is an independent two-state machine. Given the current
//! state of every populated slot, the measured conditions and the active
//! schedule, [`decide`] returns the transition (if any) each slot should
//! make. Nothing here performs I/O.

use chrono::{NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    db::models::{DeviceSlot, Environment, Schedule, Slots},
    hardware::Measurement,
};

pub const DEFAULT_TEMP_TARGET: f64 = 70.0;
pub const DEFAULT_TEMP_TOLERANCE: f64 = 3.0;
pub const DEFAULT_HUMIDITY_TARGET: f64 = 0.5;
pub const DEFAULT_HUMIDITY_TOLERANCE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    On,
    Off,
}

impl Transition {
    pub fn target_state(self) -> bool {
        matches!(self, Transition::On)
    }
}

/// Target ± tolerance with hysteresis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub target: f64,
    pub tolerance: f64,
}

impl Band {
    pub fn temperature(environment: &Environment, schedule: &Schedule) -> Self {
        Self {
            target: schedule
                .temp
                .or(environment.temp_default)
                .unwrap_or(DEFAULT_TEMP_TARGET),
            tolerance: environment.temp_tolerance.unwrap_or(DEFAULT_TEMP_TOLERANCE),
        }
    }

    pub fn humidity(environment: &Environment, schedule: &Schedule) -> Self {
        Self {
            target: schedule
                .humidity
                .or(environment.humidity_default)
                .unwrap_or(DEFAULT_HUMIDITY_TARGET),
            tolerance: environment
                .humidity_tolerance
                .unwrap_or(DEFAULT_HUMIDITY_TOLERANCE),
        }
    }

    /// An inactive device engages below `target - tolerance`; an active one
    /// only disengages once `measured - tolerance` exceeds the target.
    pub fn transition(&self, active: bool, measured: f64) -> Option<Transition> {
        if !active && self.target - self.tolerance > measured {
            Some(Transition::On)
        } else if active && measured - self.tolerance > self.target {
            Some(Transition::Off)
        } else {
            None
        }
    }
}

/// Whether the fan duty cycle is in its ON phase at `now`.
///
/// The cycle restarts at midnight: the phase is the second of the day modulo
/// `fan_on_seconds + fan_off_seconds`. Returns `None` unless both durations
/// are set and positive.
pub fn fan_due_on(schedule: &Schedule, now: NaiveTime) -> Option<bool> {
    let on = i64::from(schedule.fan_on_seconds.filter(|s| *s > 0)?);
    let off = i64::from(schedule.fan_off_seconds.filter(|s| *s > 0)?);
    let second_of_day = i64::from(now.num_seconds_from_midnight());
    Some(second_of_day % (on + off) < on)
}

/// Whether `now` falls strictly inside the light window. Windows crossing
/// midnight are not supported and never report due-on.
pub fn light_due_on(schedule: &Schedule, now: NaiveTime) -> Option<bool> {
    let on_at = schedule.light_on_at?;
    let off_at = schedule.light_off_at?;
    Some(on_at < now && now < off_at)
}

fn window_transition(active: bool, due_on: bool) -> Option<Transition> {
    match (active, due_on) {
        (false, true) => Some(Transition::On),
        (true, false) => Some(Transition::Off),
        _ => None,
    }
}

/// Computes the transition for every slot.
///
/// `current` holds the stored state of each slot's device, `None` when the
/// slot is empty. Empty slots never transition.
pub fn decide(
    environment: &Environment,
    schedule: &Schedule,
    now: NaiveDateTime,
    measurement: Measurement,
    current: &Slots<Option<bool>>,
) -> Slots<Option<Transition>> {
    let time = now.time();
    current.map(|slot, state| {
        let active = state?;
        match slot {
            DeviceSlot::Heater => {
                Band::temperature(environment, schedule).transition(active, measurement.temp)
            }
            DeviceSlot::Humidifier => {
                Band::humidity(environment, schedule).transition(active, measurement.humidity)
            }
            DeviceSlot::Fan => window_transition(active, fan_due_on(schedule, time)?),
            DeviceSlot::Light => window_transition(active, light_due_on(schedule, time)?),
        }
    })
}
