use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{self, Request, StatusCode},
    Router,
};
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
use sensor_api::{
    db::MeasurementStore,
    error::{Result, ServiceError},
    models::{DiscreteRow, MeasurementRow, PowerRow},
    query::{MeasurementTable, QuerySpec, WindowFilter},
    server,
    service::QueryService,
    state::AppState,
};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;

/// In-memory stand-in for the measurement tables with the same filter,
/// ordering and paging semantics as the SQL the API issues.
#[derive(Default)]
pub struct FixtureStore {
    rows: Vec<MeasurementRow>,
    fail: bool,
}

impl FixtureStore {
    /// 30 discrete rows for `sensor001` (10:00..=10:29 on 2025-01-01), 5 for
    /// `sensor002` and 12 power rows for `meter-01`.
    pub fn seeded() -> Self {
        let mut rows = Vec::new();
        for minute in 0..30 {
            rows.push(discrete("sensor001", minute));
        }
        for minute in 0..5 {
            rows.push(discrete("sensor002", minute));
        }
        for minute in 0..12 {
            rows.push(power("meter-01", minute));
        }
        Self { rows, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            rows: Vec::new(),
            fail: true,
        }
    }

    fn window_rows(&self, window: &WindowFilter) -> Vec<MeasurementRow> {
        let mut rows: Vec<_> = self
            .rows
            .iter()
            .filter(|row| {
                let same_table = matches!(
                    (window.table, row),
                    (MeasurementTable::Power, MeasurementRow::Power(_))
                        | (MeasurementTable::Discrete, MeasurementRow::Discrete(_))
                );
                same_table
                    && row.device() == window.device
                    && row.timestamp() >= window.range.start()
                    && row.timestamp() <= window.range.end()
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        rows
    }

    fn page(&self, spec: &QuerySpec) -> Result<Vec<MeasurementRow>> {
        if self.fail {
            return Err(ServiceError::QueryExecution(anyhow::anyhow!(
                "connection refused"
            )));
        }

        let rows = self.window_rows(&spec.window);
        let limit = spec.page.page_size as usize;
        let rows = match spec.page.cursor {
            Some(cursor) => rows
                .into_iter()
                .filter(|row| row.timestamp() < cursor)
                .take(limit)
                .collect(),
            None => rows
                .into_iter()
                .skip(spec.page.offset() as usize)
                .take(limit)
                .collect(),
        };
        Ok(rows)
    }
}

#[async_trait]
impl MeasurementStore for FixtureStore {
    async fn fetch(&self, spec: &QuerySpec) -> Result<Vec<MeasurementRow>> {
        self.page(spec)
    }

    async fn fetch_with_count(&self, spec: &QuerySpec) -> Result<(Vec<MeasurementRow>, i64)> {
        let rows = self.page(spec)?;
        let total = self.window_rows(&spec.window).len() as i64;
        Ok((rows, total))
    }
}

fn base_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

fn discrete(device: &str, minute: i64) -> MeasurementRow {
    MeasurementRow::from(DiscreteRow {
        device: device.to_string(),
        timestamp: base_time() + ChronoDuration::minutes(minute),
        d1_state: (minute % 2) as i32,
        d2_state: 1,
        a1_state: 0,
    })
}

fn power(device: &str, minute: i64) -> MeasurementRow {
    let load = minute as f64;
    MeasurementRow::from(PowerRow {
        device: device.to_string(),
        timestamp: base_time() + ChronoDuration::minutes(minute),
        phase_a_current: 15.2 + load,
        phase_a_voltage: 220.5,
        phase_a_active_power: 3300.0,
        phase_a_apparent_power: 3350.0,
        phase_a_power_factor: 0.98,
        phase_a_frequency: 50.0,
        phase_b_current: 14.8,
        phase_b_voltage: 221.0,
        phase_b_active_power: 3250.0,
        phase_b_apparent_power: 3300.0,
        phase_b_power_factor: 0.97,
        phase_b_frequency: 50.0,
        phase_c_current: 15.0,
        phase_c_voltage: 219.8,
        phase_c_active_power: 3280.0,
        phase_c_apparent_power: 3320.0,
        phase_c_power_factor: 0.99,
        phase_c_frequency: 50.0,
        total_current: 45.0 + load,
        total_active_power: 9830.0,
        total_apparent_power: 9970.0,
    })
}

#[derive(Clone)]
pub struct ApiHarness {
    router: Router,
}

impl ApiHarness {
    pub fn new(store: FixtureStore) -> Self {
        let query = QueryService::new(Arc::new(store), Duration::from_secs(5));
        Self {
            router: server::router(AppState::new(query)),
        }
    }

    pub async fn get(&self, uri: &str) -> http::Response<Body> {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .expect("failed to build harness request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should handle harness request")
    }
}

pub async fn read_json(response: http::Response<Body>) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("response body should be readable");
    let value =
        serde_json::from_slice::<Value>(&bytes).expect("response body should be valid JSON");
    (status, value)
}
