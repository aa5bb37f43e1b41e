use std::{collections::HashMap, time::Duration};

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::{
    control::{ControlSettings, StaleDevicePolicy},
    hardware::HardwareProfile,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    /// Maps environment id → hardware profile.
    /// Format: `"<uuid>:<mock|manual>,..."`.
    pub environments: HashMap<Uuid, HardwareProfile>,
    /// Control loop interval in seconds.
    pub control_interval_secs: u64,
    pub actuator_timeout_secs: u64,
    pub sensor_timeout_secs: u64,
    /// Oldest pushed measurement a `manual` sensor will still report.
    pub measurement_max_age_secs: u64,
    pub stale_device_policy: StaleDevicePolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            environments: parse_environments(&optional("ENVIRONMENTS", ""))?,
            control_interval_secs: positive_secs("CONTROL_INTERVAL_SECS", "60")?,
            actuator_timeout_secs: positive_secs("ACTUATOR_TIMEOUT_SECS", "30")?,
            sensor_timeout_secs: positive_secs("SENSOR_TIMEOUT_SECS", "10")?,
            measurement_max_age_secs: positive_secs("MEASUREMENT_MAX_AGE_SECS", "300")?,
            stale_device_policy: optional("STALE_DEVICE_POLICY", "abort")
                .parse()
                .context("STALE_DEVICE_POLICY must be 'abort' or 'skip'")?,
        })
    }

    pub fn control_settings(&self) -> ControlSettings {
        ControlSettings {
            interval: Duration::from_secs(self.control_interval_secs),
            actuator_timeout: Duration::from_secs(self.actuator_timeout_secs),
            sensor_timeout: Duration::from_secs(self.sensor_timeout_secs),
            stale_device_policy: self.stale_device_policy,
        }
    }

    pub fn measurement_max_age(&self) -> Duration {
        Duration::from_secs(self.measurement_max_age_secs)
    }
}

/// Parse `"<uuid>:<profile>,..."` into a `HashMap<Uuid, HardwareProfile>`.
///
/// Fails on the first malformed entry, unknown profile or repeated id.
fn parse_environments(raw: &str) -> Result<HashMap<Uuid, HardwareProfile>> {
    let mut environments = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (id, profile) = entry.split_once(':').with_context(|| {
            format!("ENVIRONMENTS entry must be 'environment_id:profile', got: {entry:?}")
        })?;
        let id = id
            .trim()
            .parse::<Uuid>()
            .with_context(|| format!("invalid environment id in ENVIRONMENTS entry {entry:?}"))?;
        let profile = profile
            .trim()
            .parse::<HardwareProfile>()
            .with_context(|| format!("unknown hardware profile in ENVIRONMENTS entry {entry:?}"))?;
        if environments.insert(id, profile).is_some() {
            anyhow::bail!("environment {id} listed more than once in ENVIRONMENTS");
        }
    }
    Ok(environments)
}

fn positive_secs(key: &str, default: &str) -> Result<u64> {
    let secs: u64 = optional(key, default)
        .parse()
        .with_context(|| format!("{key} must be a positive integer"))?;
    anyhow::ensure!(secs > 0, "{key} must be a positive integer");
    Ok(secs)
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required env var: {key}"))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "6f1c2c5e-8f0e-4b8e-9a51-1d6f7e0f2a11";
    const B: &str = "0b7e5a39-2c3d-4d7a-8c1f-5e9a0b4c6d22";

    #[test]
    fn parse_environments_empty() {
        assert!(parse_environments("").unwrap().is_empty());
    }

    #[test]
    fn parse_environments_all_known() {
        let m = parse_environments(&format!("{A}:mock, {B}:manual")).unwrap();
        assert_eq!(m[&A.parse::<Uuid>().unwrap()], HardwareProfile::Mock);
        assert_eq!(m[&B.parse::<Uuid>().unwrap()], HardwareProfile::Manual);
    }

    #[test]
    fn parse_environments_unknown_profile_errors() {
        let err = parse_environments(&format!("{A}:tuya")).unwrap_err();
        assert!(err.to_string().contains("unknown hardware profile"));
    }

    #[test]
    fn parse_environments_missing_colon_errors() {
        let err = parse_environments(A).unwrap_err();
        assert!(err.to_string().contains("environment_id:profile"));
    }

    #[test]
    fn parse_environments_bad_uuid_errors() {
        let err = parse_environments("tank-1:mock").unwrap_err();
        assert!(err.to_string().contains("invalid environment id"));
    }

    #[test]
    fn parse_environments_duplicate_errors() {
        let err = parse_environments(&format!("{A}:mock,{A}:manual")).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn control_settings_from_config() {
        let config = Config {
            database_url: String::new(),
            server_host: "0.0.0.0".to_owned(),
            server_port: 8080,
            environments: HashMap::new(),
            control_interval_secs: 15,
            actuator_timeout_secs: 5,
            sensor_timeout_secs: 2,
            measurement_max_age_secs: 300,
            stale_device_policy: StaleDevicePolicy::Skip,
        };
        let settings = config.control_settings();
        assert_eq!(settings.interval, Duration::from_secs(15));
        assert_eq!(settings.actuator_timeout, Duration::from_secs(5));
        assert_eq!(settings.sensor_timeout, Duration::from_secs(2));
        assert_eq!(settings.stale_device_policy, StaleDevicePolicy::Skip);
        assert_eq!(config.measurement_max_age(), Duration::from_secs(300));
    }
}
