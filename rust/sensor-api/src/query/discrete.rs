use super::{QuerySpec, Rendered, WindowFilter};
use crate::{
    error::Result,
    models::{DiscreteRow, MeasurementRow},
    schema::discrete_measurements::dsl::{
        device as col_device, discrete_measurements, timestamp as col_timestamp,
    },
};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_builder::{AsQuery, BoxedSelectStatement, FromClause};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

type DiscreteTable = crate::schema::discrete_measurements::table;
type DiscreteFromClause = FromClause<DiscreteTable>;
type DiscreteQuery<'a> =
    BoxedSelectStatement<'a, <DiscreteTable as AsQuery>::SqlType, DiscreteFromClause, Pg>;

pub(super) async fn load_page(
    conn: &mut AsyncPgConnection,
    spec: &QuerySpec,
) -> Result<Vec<MeasurementRow>> {
    let rows: Vec<DiscreteRow> = page_query(spec)
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

fn window_query(window: &WindowFilter) -> DiscreteQuery<'static> {
    discrete_measurements
        .into_boxed::<Pg>()
        .filter(col_device.eq(window.device.clone()))
        .filter(
            col_timestamp
                .ge(window.range.start())
                .and(col_timestamp.le(window.range.end())),
        )
}

fn page_query(spec: &QuerySpec) -> DiscreteQuery<'static> {
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
