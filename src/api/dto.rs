use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    control::{AppliedTransition, CommandFailure, CycleOutcome, Transition},
    db::models::{DeviceSlot, Reading},
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadingDto {
    pub id: Uuid,
    pub environment_id: Uuid,
    /// Local wall-clock time of the cycle
    pub at: NaiveDateTime,
    /// Same unit as the temperature targets
    pub temp: f64,
    /// Relative humidity, 0.0 to 1.0
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

impl From<Reading> for ReadingDto {
    fn from(r: Reading) -> Self {
        Self {
            id: r.id,
            environment_id: r.environment_id,
            at: r.at,
            temp: r.temp,
            humidity: r.humidity,
            heater_id: r.heater_id,
            heater_active: r.heater_active,
            humidifier_id: r.humidifier_id,
            humidifier_active: r.humidifier_active,
            fan_id: r.fan_id,
            fan_active: r.fan_active,
            light_id: r.light_id,
            light_active: r.light_active,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReadingRangeParams {
    /// Inclusive lower bound
    pub from: Option<NaiveDateTime>,
    /// Inclusive upper bound
    pub to: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeasurementRequest {
    pub temp: f64,
    pub humidity: f64,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct EvaluateRequest {
    /// Evaluate as of this local time instead of now.
    #[serde(default)]
    pub at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcomeKind {
    NoSchedule,
    Recorded,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransitionDto {
    pub slot: DeviceSlot,
    pub device_id: Uuid,
    pub transition: Transition,
}

impl From<AppliedTransition> for TransitionDto {
    fn from(t: AppliedTransition) -> Self {
        Self {
            slot: t.slot,
            device_id: t.device_id,
            transition: t.transition,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CommandFailureDto {
    pub slot: DeviceSlot,
    pub device_id: Uuid,
    pub transition: Transition,
    pub error: String,
}

impl From<CommandFailure> for CommandFailureDto {
    fn from(f: CommandFailure) -> Self {
        Self {
            slot: f.slot,
            device_id: f.device_id,
            transition: f.transition,
            error: f.error,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CycleReportDto {
    pub outcome: CycleOutcomeKind,
    /// Absent when no schedule was active
    pub reading: Option<ReadingDto>,
    pub transitions: Vec<TransitionDto>,
    /// Commands that failed or timed out, and switches whose state was not saved
    pub failures: Vec<CommandFailureDto>,
}

impl From<CycleOutcome> for CycleReportDto {
    fn from(outcome: CycleOutcome) -> Self {
        match outcome {
            CycleOutcome::NoSchedule => Self {
                outcome: CycleOutcomeKind::NoSchedule,
                reading: None,
                transitions: Vec::new(),
                failures: Vec::new(),
            },
            CycleOutcome::Recorded(report) => Self {
                outcome: CycleOutcomeKind::Recorded,
                reading: Some(report.reading.into()),
                transitions: report.transitions.into_iter().map(Into::into).collect(),
                failures: report.failures.into_iter().map(Into::into).collect(),
            },
        }
    }
}
