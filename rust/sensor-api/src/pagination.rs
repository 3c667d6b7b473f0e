//! Page metadata assembly for paginated measurement queries.

use crate::{models::MeasurementRow, query::PageRequest, time::format_cursor};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaginatedResult {
    pub data: Vec<MeasurementRow>,
    pub total_count: i64,
    pub page: i64,
    pub page_size: i64,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_cursor: Option<String>,
}

pub fn assemble(
    rows: Vec<MeasurementRow>,
    total_count: i64,
    request: &PageRequest,
) -> PaginatedResult {
    let filled = i64::try_from(rows.len()).map_or(false, |len| len == request.page_size);
    // A full page that ends exactly at total_count has nothing after it.
    let has_next = filled && request.page.saturating_mul(request.page_size) < total_count;
    let next_cursor = if has_next {
        rows.last().map(|row| format_cursor(row.timestamp()))
    } else {
        None
    };

    PaginatedResult {
        data: rows,
        total_count,
        page: request.page,
        page_size: request.page_size,
        has_next,
        has_previous: request.page > 1,
        next_cursor,
    }
}
