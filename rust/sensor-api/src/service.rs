//! Request orchestration: validate, build, execute, assemble.

use crate::{
    db::MeasurementStore,
    error::{Result, ServiceError},
    models::MeasurementRow,
    pagination::{self, PaginatedResult},
    query::{self, MeasurementTable, PageRequest, QuerySpec, WindowFilter},
    time::{parse_cursor, parse_time_range},
};
use serde::Deserialize;
use std::{future::Future, sync::Arc, time::Duration};
use tracing::debug;

pub const DEFAULT_PAGE_SIZE: i64 = 500;
pub const MAX_PAGE_SIZE: i64 = 1000;

/// Query string of the paginated endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RangeQueryParams {
    pub device: String,
    pub start_date: String,
    pub start_time: String,
    pub end_date: String,
    pub end_time: String,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<i64>,
    #[serde(default)]
    pub cursor: Option<String>,
}

/// Query string of the flat-list endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimpleQueryParams {
    pub device: String,
    pub start_date: String,
    pub start_time: String,
    pub end_date: String,
    pub end_time: String,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Largest `limit` accepted by the flat-list endpoint of each table.
pub const fn max_simple_limit(table: MeasurementTable) -> i64 {
    match table {
        MeasurementTable::Power => 10_000,
        MeasurementTable::Discrete => 1_000,
    }
}

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn MeasurementStore>,
    timeout: Duration,
}

impl QueryService {
    pub fn new(store: Arc<dyn MeasurementStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn execute_paginated(
        &self,
        table: MeasurementTable,
        params: RangeQueryParams,
    ) -> Result<PaginatedResult> {
        let page = params.page.unwrap_or(1);
        if page < 1 {
            return Err(ServiceError::InvalidRequest("page must be >= 1".into()));
        }
        let page_size = bounded("page_size", params.page_size, MAX_PAGE_SIZE)?;
        let cursor = params
            .cursor
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .map(|raw| {
                parse_cursor(raw)
                    .ok_or_else(|| ServiceError::InvalidRequest(format!("invalid cursor '{raw}'")))
            })
            .transpose()?;

        let range = parse_time_range(
            &params.start_date,
            &params.start_time,
            &params.end_date,
            &params.end_time,
        )?;
        let spec = QuerySpec {
            window: WindowFilter {
                table,
                device: params.device,
                range,
            },
            page: PageRequest {
                page,
                page_size,
                cursor,
            },
        };

        build_statements(&spec, true)?;
        let (rows, total) = self
            .bounded_call(self.store.fetch_with_count(&spec))
            .await?;

        Ok(pagination::assemble(rows, total, &spec.page))
    }

    /// Flat list of the newest rows in the window, without count or paging metadata.
    pub async fn execute_simple(
        &self,
        table: MeasurementTable,
        params: SimpleQueryParams,
    ) -> Result<Vec<MeasurementRow>> {
        let limit = bounded("limit", params.limit, max_simple_limit(table))?;
        let range = parse_time_range(
            &params.start_date,
            &params.start_time,
            &params.end_date,
            &params.end_time,
        )?;
        let spec = QuerySpec {
            window: WindowFilter {
                table,
                device: params.device,
                range,
            },
            page: PageRequest::first(limit),
        };

        build_statements(&spec, false)?;
        self.bounded_call(self.store.fetch(&spec)).await
    }

    async fn bounded_call<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| ServiceError::Timeout)?
    }
}

fn bounded(name: &str, value: Option<i64>, max: i64) -> Result<i64> {
    let value = value.unwrap_or(DEFAULT_PAGE_SIZE.min(max));
    if !(1..=max).contains(&value) {
        return Err(ServiceError::InvalidRequest(format!(
            "{name} must be between 1 and {max}"
        )));
    }
    Ok(value)
}

// Builds what the store is about to run; rendering also applies the
// placeholder and table checks.
fn build_statements(spec: &QuerySpec, with_count: bool) -> Result<()> {
    let fetch = query::build_fetch(spec)?;
    debug!(
        table = spec.window.table.table_name(),
        device = %spec.window.device,
        sql = %fetch.sql,
        params = ?fetch.params,
        "fetch statement"
    );

    if with_count {
        let count = query::build_count(&spec.window)?;
        debug!(
            table = spec.window.table.table_name(),
            sql = %count.sql,
            params = ?count.params,
            "count statement"
        );
    }

    Ok(())
}
