//! Row models for the measurement tables.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;

/// Three-phase energy meter reading.
#[derive(Debug, Clone, PartialEq, Queryable, Serialize)]
#[diesel(table_name = crate::schema::power_measurements)]
pub struct PowerRow {
    pub device: String,
    pub timestamp: NaiveDateTime,

    // Phase A
    pub phase_a_current: f64,
    pub phase_a_voltage: f64,
    pub phase_a_active_power: f64,
    pub phase_a_apparent_power: f64,
    pub phase_a_power_factor: f64,
    pub phase_a_frequency: f64,

    // Phase B
    pub phase_b_current: f64,
    pub phase_b_voltage: f64,
    pub phase_b_active_power: f64,
    pub phase_b_apparent_power: f64,
    pub phase_b_power_factor: f64,
    pub phase_b_frequency: f64,

    // Phase C
    pub phase_c_current: f64,
    pub phase_c_voltage: f64,
    pub phase_c_active_power: f64,
    pub phase_c_apparent_power: f64,
    pub phase_c_power_factor: f64,
    pub phase_c_frequency: f64,

    // System totals
    pub total_current: f64,
    pub total_active_power: f64,
    pub total_apparent_power: f64,
}

/// Digital input states (0 = off, 1 = on) of a discrete sensor.
#[derive(Debug, Clone, PartialEq, Queryable, Serialize)]
#[diesel(table_name = crate::schema::discrete_measurements)]
pub struct DiscreteRow {
    pub device: String,
    pub timestamp: NaiveDateTime,
    pub d1_state: i32,
    pub d2_state: i32,
    /// Analog input 1 thresholded to a digital state.
    pub a1_state: i32,
}

/// A row from either measurement table. Serializes as the bare row object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MeasurementRow {
    Power(PowerRow),
    Discrete(DiscreteRow),
}

impl MeasurementRow {
    pub fn timestamp(&self) -> NaiveDateTime {
        match self {
            MeasurementRow::Power(row) => row.timestamp,
            MeasurementRow::Discrete(row) => row.timestamp,
        }
    }

    pub fn device(&self) -> &str {
        match self {
            MeasurementRow::Power(row) => &row.device,
            MeasurementRow::Discrete(row) => &row.device,
        }
    }
}

impl From<PowerRow> for MeasurementRow {
    fn from(row: PowerRow) -> Self {
        MeasurementRow::Power(row)
    }
}

impl From<DiscreteRow> for MeasurementRow {
    fn from(row: DiscreteRow) -> Self {
        MeasurementRow::Discrete(row)
    }
}
