use crate::{
    config::AppConfig,
    db::Database,
    error::{Result, ServiceError},
    models::MeasurementRow,
    pagination::PaginatedResult,
    query::MeasurementTable,
    service::{QueryService, RangeQueryParams, SimpleQueryParams},
    state::AppState,
};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::{future::Future, sync::Arc};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

type QueryParams<T> = std::result::Result<Query<T>, QueryRejection>;

pub struct Server {
    config: Arc<AppConfig>,
    database: Database,
    state: AppState,
}

impl Server {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let database = Database::open(&config).await?;
        let query = QueryService::new(Arc::new(database.clone()), config.request_timeout);
        let state = AppState::new(query);

        Ok(Self {
            config: Arc::new(config),
            database,
            state,
        })
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let Self {
            config,
            database,
            state,
        } = self;
        let addr = config.listen_addr;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "sensor API listening");

        serve(listener, state, shutdown_signal()).await?;

        info!("sensor API stopped");
        database.close();
        Ok(())
    }
}

// Consumes the state so every handle on the store is gone when this returns.
async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Routes of the API, independent of how the store behind `state` is built.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(health))
        .route("/api/power/by-time-range", get(power_by_time_range))
        .route("/api/discrete/by-time-range", get(discrete_by_time_range))
        .route(
            "/api/discrete/by-time-range/simple",
            get(discrete_by_time_range_simple),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Time-range queries over power and discrete sensor measurements.",
        "endpoints": {
            "/api/power/by-time-range": "Power measurements in a time range",
            "/api/discrete/by-time-range": "Paginated discrete measurements in a time range",
            "/api/discrete/by-time-range/simple": "Discrete measurements in a time range, without pagination",
        },
        "status": "running",
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn power_by_time_range(
    State(state): State<AppState>,
    params: QueryParams<SimpleQueryParams>,
) -> Result<Json<Vec<MeasurementRow>>> {
    let Query(params) = params.map_err(rejected)?;
    let rows = state
        .query
        .execute_simple(MeasurementTable::Power, params)
        .await?;
    Ok(Json(rows))
}

async fn discrete_by_time_range(
    State(state): State<AppState>,
    params: QueryParams<RangeQueryParams>,
) -> Result<Json<PaginatedResult>> {
    let Query(params) = params.map_err(rejected)?;
    let page = state
        .query
        .execute_paginated(MeasurementTable::Discrete, params)
        .await?;
    Ok(Json(page))
}

async fn discrete_by_time_range_simple(
    State(state): State<AppState>,
    params: QueryParams<SimpleQueryParams>,
) -> Result<Json<Vec<MeasurementRow>>> {
    let Query(params) = params.map_err(rejected)?;
    let rows = state
        .query
        .execute_simple(MeasurementTable::Discrete, params)
        .await?;
    Ok(Json(rows))
}

fn rejected(rejection: QueryRejection) -> ServiceError {
    ServiceError::InvalidRequest(rejection.body_text())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::MeasurementStore, query::QuerySpec};
    use async_trait::async_trait;
    use std::time::Duration;

    struct EmptyStore;

    #[async_trait]
    impl MeasurementStore for EmptyStore {
        async fn fetch(&self, _: &QuerySpec) -> Result<Vec<MeasurementRow>> {
            Ok(Vec::new())
        }

        async fn fetch_with_count(&self, _: &QuerySpec) -> Result<(Vec<MeasurementRow>, i64)> {
            Ok((Vec::new(), 0))
        }
    }

    #[tokio::test]
    async fn serve_releases_the_store_on_shutdown() {
        let store = Arc::new(EmptyStore);
        let state = AppState::new(QueryService::new(store.clone(), Duration::from_secs(1)));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        serve(listener, state, async {}).await.unwrap();

        assert_eq!(Arc::strong_count(&store), 1);
    }
}
