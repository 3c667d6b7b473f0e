use super::{QuerySpec, Rendered, WindowFilter};
use crate::{
    error::Result,
    models::{MeasurementRow, PowerRow},
    schema::power_measurements::dsl::{
        device as col_device, power_measurements, timestamp as col_timestamp,
    },
};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_builder::{AsQuery, BoxedSelectStatement, FromClause};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

type PowerTable = crate::schema::power_measurements::table;
type PowerFromClause = FromClause<PowerTable>;
type PowerQuery<'a> =
    BoxedSelectStatement<'a, <PowerTable as AsQuery>::SqlType, PowerFromClause, Pg>;

pub(super) async fn load_page(
    conn: &mut AsyncPgConnection,
    spec: &QuerySpec,
) -> Result<Vec<MeasurementRow>> {
    let rows: Vec<PowerRow> = page_query(spec)
        .load(conn)
        .await
        .map_err(super::execution_error)?;

    Ok(rows.into_iter().map(MeasurementRow::from).collect())
}

pub(super) async fn count_rows(conn: &mut AsyncPgConnection, window: &WindowFilter) -> Result<i64> {
    window_query(window)
        .count()
        .get_result(conn)
        .await
        .map_err(super::execution_error)
}

pub(super) fn render_fetch(spec: &QuerySpec) -> Result<Rendered> {
    super::render(&page_query(spec))
}

pub(super) fn render_count(window: &WindowFilter) -> Result<Rendered> {
    super::render(&window_query(window).count())
}

fn window_query(window: &WindowFilter) -> PowerQuery<'static> {
    power_measurements
        .into_boxed::<Pg>()
        .filter(col_device.eq(window.device.clone()))
        .filter(
            col_timestamp
                .ge(window.range.start())
                .and(col_timestamp.le(window.range.end())),
        )
}

fn page_query(spec: &QuerySpec) -> PowerQuery<'static> {
    let query = window_query(&spec.window);
    match spec.page.cursor {
        Some(cursor) => query
            .filter(col_timestamp.lt(cursor))
            .order(col_timestamp.desc())
            .limit(spec.page.page_size),
        None => query
            .order(col_timestamp.desc())
            .limit(spec.page.page_size)
            .offset(spec.page.offset()),
    }
}
