pub mod rules;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use rules::Transition;
pub use service::{
    AppliedTransition, CommandFailure, ControlService, ControlSettings, CycleOutcome, CycleReport,
    StaleDevicePolicy,
};
