//! Statement building and execution for the measurement tables.
//!
//! Each table module owns the diesel query for its table. The SQL text handed
//! out by [`build_fetch`] / [`build_count`] is rendered from the same boxed
//! query the store executes. The [`BindParam`] list mirrors diesel's binds and
//! is checked value by value against them before a statement is returned.

mod discrete;
mod power;

use crate::{
    error::{Result, ServiceError},
    models::MeasurementRow,
    time::TimeRange,
};
use chrono::NaiveDateTime;
use diesel_async::AsyncPgConnection;
use serde::Serialize;
use std::fmt;
use tracing::error;

/// Allow-listed measurement tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementTable {
    Power,
    Discrete,
}

impl MeasurementTable {
    pub const ALL: [MeasurementTable; 2] = [MeasurementTable::Power, MeasurementTable::Discrete];

    pub const fn table_name(self) -> &'static str {
        match self {
            MeasurementTable::Power => "power_measurements",
            MeasurementTable::Discrete => "discrete_measurements",
        }
    }
}

/// Device and time window shared by the fetch and count statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowFilter {
    pub table: MeasurementTable,
    pub device: String,
    pub range: TimeRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
    /// Timestamp of the last row already seen. Overrides the offset position.
    pub cursor: Option<NaiveDateTime>,
}

impl PageRequest {
    pub fn first(page_size: i64) -> Self {
        Self {
            page: 1,
            page_size,
            cursor: None,
        }
    }

    pub fn offset(&self) -> i64 {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub window: WindowFilter,
    pub page: PageRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum BindParam {
    Text(String),
    Timestamp(NaiveDateTime),
    Int(i64),
}

/// SQL template with positional `$n` placeholders and the values bound to them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<BindParam>,
}

/// Builds the page fetch, newest rows first. With a cursor only rows strictly
/// older than it are selected and no OFFSET is emitted.
pub fn build_fetch(spec: &QuerySpec) -> Result<SqlStatement> {
    let rendered = match spec.window.table {
        MeasurementTable::Power => power::render_fetch(spec)?,
        MeasurementTable::Discrete => discrete::render_fetch(spec)?,
    };

    let mut params = window_params(&spec.window);
    match spec.page.cursor {
        Some(cursor) => {
            params.push(BindParam::Timestamp(cursor));
            params.push(BindParam::Int(spec.page.page_size));
        }
        None => {
            params.push(BindParam::Int(spec.page.page_size));
            params.push(BindParam::Int(spec.page.offset()));
        }
    }

    verify_binds(&rendered.binds, &params)?;
    finish_statement(spec.window.table, rendered.sql, params)
}

/// Builds the COUNT over the device/time window. Paging and cursor are ignored.
pub fn build_count(window: &WindowFilter) -> Result<SqlStatement> {
    let rendered = match window.table {
        MeasurementTable::Power => power::render_count(window)?,
        MeasurementTable::Discrete => discrete::render_count(window)?,
    };

    let params = window_params(window);
    verify_binds(&rendered.binds, &params)?;
    finish_statement(window.table, rendered.sql, params)
}

pub(crate) async fn load_page(
    conn: &mut AsyncPgConnection,
    spec: &QuerySpec,
) -> Result<Vec<MeasurementRow>> {
    match spec.window.table {
        MeasurementTable::Power => power::load_page(conn, spec).await,
        MeasurementTable::Discrete => discrete::load_page(conn, spec).await,
    }
}

pub(crate) async fn count_rows(conn: &mut AsyncPgConnection, window: &WindowFilter) -> Result<i64> {
    match window.table {
        MeasurementTable::Power => power::count_rows(conn, window).await,
        MeasurementTable::Discrete => discrete::count_rows(conn, window).await,
    }
}

fn window_params(window: &WindowFilter) -> Vec<BindParam> {
    vec![
        BindParam::Text(window.device.clone()),
        BindParam::Timestamp(window.range.start()),
        BindParam::Timestamp(window.range.end()),
    ]
}

fn finish_statement(
    table: MeasurementTable,
    sql: String,
    params: Vec<BindParam>,
) -> Result<SqlStatement> {
    let from = format!("FROM \"{}\"", table.table_name());
    if !sql.contains(&from) {
        return Err(ServiceError::Config(format!(
            "statement does not target allow-listed table '{}'",
            table.table_name()
        )));
    }

    let expected = max_dollar_placeholder(&sql);
    if expected != params.len() {
        return Err(ServiceError::Internal(anyhow::anyhow!(
            "sql expects {expected} binds but {} were collected",
            params.len()
        )));
    }

    Ok(SqlStatement { sql, params })
}

pub(super) fn max_dollar_placeholder(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }

        i += 1;
        let mut value = 0usize;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            value = value * 10 + (bytes[i] - b'0') as usize;
            i += 1;
        }

        max = max.max(value);
    }

    max
}

/// SQL text of a diesel query plus diesel's own debug rendering of its binds.
struct Rendered {
    sql: String,
    binds: String,
}

fn render<T>(query: &T) -> Result<Rendered>
where
    T: diesel::query_builder::QueryFragment<diesel::pg::Pg>,
{
    let sql = diesel_sql(query)?;
    let debug = diesel::debug_query::<diesel::pg::Pg, _>(query).to_string();
    let binds = debug
        .split_once("-- binds:")
        .map(|(_, binds)| binds.trim().to_string())
        .ok_or_else(|| ServiceError::Internal(anyhow::anyhow!("missing binds marker")))?;

    Ok(Rendered { sql, binds })
}

// Formats a bind the way diesel's debug output does, so that order and
// values can be compared and not only the count.
struct DebugBind<'a>(&'a BindParam);

impl fmt::Debug for DebugBind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            BindParam::Text(value) => fmt::Debug::fmt(value, f),
            BindParam::Timestamp(value) => fmt::Debug::fmt(value, f),
            BindParam::Int(value) => fmt::Debug::fmt(value, f),
        }
    }
}

fn verify_binds(diesel_binds: &str, params: &[BindParam]) -> Result<()> {
    let collected = format!("{:?}", params.iter().map(DebugBind).collect::<Vec<_>>());
    if collected != diesel_binds {
        return Err(ServiceError::Internal(anyhow::anyhow!(
            "collected binds {collected} do not match diesel binds {diesel_binds}"
        )));
    }
    Ok(())
}

fn diesel_sql<T>(query: &T) -> Result<String>
where
    T: diesel::query_builder::QueryFragment<diesel::pg::Pg>,
{
    use diesel::query_builder::QueryBuilder as _;

    let backend = diesel::pg::Pg;
    let mut query_builder = <diesel::pg::Pg as diesel::backend::Backend>::QueryBuilder::default();
    diesel::query_builder::QueryFragment::<diesel::pg::Pg>::to_sql(
        query,
        &mut query_builder,
        &backend,
    )
    .map_err(|err| {
        error!(error = ?err, "failed to serialize diesel SQL");
        ServiceError::Internal(anyhow::anyhow!("failed to serialize SQL"))
    })?;

    Ok(query_builder.finish())
}

fn execution_error(err: diesel::result::Error) -> ServiceError {
    ServiceError::QueryExecution(err.into())
}
