pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pagination;
pub mod query;
pub mod schema;
pub mod server;
pub mod service;
pub mod state;
pub mod telemetry;
pub mod time;

use crate::{config::AppConfig, server::Server};

/// Bootstraps the sensor query API using environment configuration.
pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    Server::new(config).await?.run().await
}
