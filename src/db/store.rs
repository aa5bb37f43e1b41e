use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{Device, DeviceSlot, DeviceUsage, Environment, Reading, Schedule};
use crate::error::StoreError;
use crate::store::{DeviceRegistry, EnvironmentCatalog, ReadingLog, ScheduleLookup, StoreResult};

const READING_COLUMNS: &str = "id, environment_id, at, temp, humidity, \
     heater_id, heater_active, humidifier_id, humidifier_active, \
     fan_id, fan_active, light_id, light_active";

/// Postgres-backed implementation of every collaborator trait.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EnvironmentCatalog for PgStore {
    async fn get_environment(&self, environment_id: Uuid) -> StoreResult<Option<Environment>> {
        let row = sqlx::query_as::<_, Environment>(
            "SELECT id, name, created_at, heater_id, humidifier_id, fan_id, light_id, \
                    temp_default, temp_tolerance, humidity_default, humidity_tolerance \
             FROM environments WHERE id = $1",
        )
        .bind(environment_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl ScheduleLookup for PgStore {
    async fn lookup_active_schedule(
        &self,
        environment_id: Uuid,
        at: NaiveDateTime,
    ) -> StoreResult<Option<Schedule>> {
        let mut rows = sqlx::query_as::<_, Schedule>(
            "SELECT id, environment_id, start_date, end_date, temp, humidity, \
                    fan_on_seconds, fan_off_seconds, light_on_at, light_off_at \
             FROM schedules \
             WHERE environment_id = $1 \
               AND start_date <= $2 \
               AND (end_date IS NULL OR end_date > $2)",
        )
        .bind(environment_id)
        .bind(at.date())
        .fetch_all(&self.pool)
        .await?;

        if rows.len() > 1 {
            return Err(StoreError::AmbiguousSchedule {
                environment_id,
                count: rows.len(),
            });
        }
        Ok(rows.pop())
    }
}

#[async_trait]
impl DeviceRegistry for PgStore {
    async fn get_device(&self, slot: DeviceSlot, device_id: Uuid) -> StoreResult<Option<Device>> {
        let row = sqlx::query_as::<_, Device>(
            "SELECT id, name, slot, active, voltage, watts, last_activated_at \
             FROM devices WHERE id = $1 AND slot = $2",
        )
        .bind(device_id)
        .bind(slot)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn save_device_state(&self, device: &Device) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE devices SET active = $2, last_activated_at = $3 WHERE id = $1")
                .bind(device.id)
                .bind(device.active)
                .bind(device.last_activated_at)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::DeviceNotFound(device.id));
        }
        Ok(())
    }

    async fn record_usage(&self, usage: &DeviceUsage) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO device_usages \
                 (id, device_id, environment_id, start_at, end_at, seconds, kilowatt_hours) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(usage.id)
        .bind(usage.device_id)
        .bind(usage.environment_id)
        .bind(usage.start_at)
        .bind(usage.end_at)
        .bind(usage.seconds)
        .bind(usage.kilowatt_hours)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ReadingLog for PgStore {
    async fn persist_reading(&self, reading: &Reading) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO readings ({READING_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        ))
        .bind(reading.id)
        .bind(reading.environment_id)
        .bind(reading.at)
        .bind(reading.temp)
        .bind(reading.humidity)
        .bind(reading.heater_id)
        .bind(reading.heater_active)
        .bind(reading.humidifier_id)
        .bind(reading.humidifier_active)
        .bind(reading.fan_id)
        .bind(reading.fan_active)
        .bind(reading.light_id)
        .bind(reading.light_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn readings(
        &self,
        environment_id: Uuid,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> StoreResult<Vec<Reading>> {
        let rows = sqlx::query_as::<_, Reading>(&format!(
            "SELECT {READING_COLUMNS} FROM readings \
             WHERE environment_id = $1 \
               AND ($2::timestamp IS NULL OR at >= $2) \
               AND ($3::timestamp IS NULL OR at <= $3) \
             ORDER BY at ASC"
        ))
        .bind(environment_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn latest_reading(&self, environment_id: Uuid) -> StoreResult<Option<Reading>> {
        let row = sqlx::query_as::<_, Reading>(&format!(
            "SELECT {READING_COLUMNS} FROM readings \
             WHERE environment_id = $1 \
             ORDER BY at DESC LIMIT 1"
        ))
        .bind(environment_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}
