//! Database access: the [`MeasurementStore`] seam and its PostgreSQL implementation.

use crate::{
    config::AppConfig,
    error::{Result, ServiceError},
    models::MeasurementRow,
    query::{self, QuerySpec},
};
use anyhow::Context;
use async_trait::async_trait;
use bb8::{ManageConnection, Pool, PooledConnection, RunError};
use diesel_async::{AsyncPgConnection, SimpleAsyncConnection};
use rustls::{ClientConfig, RootCertStore};
use rustls_pemfile::certs;
use std::fs::File;
use std::io::BufReader;
use tokio_postgres::{Config as PgConfig, NoTls};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{error, info};

pub type PgPool = Pool<PgConnectionManager>;

/// Executes measurement queries. Each call works on a single connection that
/// is returned to the pool on every exit path.
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    async fn fetch(&self, spec: &QuerySpec) -> Result<Vec<MeasurementRow>>;

    /// Fetches the page and counts the whole window on the same connection.
    async fn fetch_with_count(&self, spec: &QuerySpec) -> Result<(Vec<MeasurementRow>, i64)>;
}

/// Owns the connection pool. Opened once at startup and closed at shutdown.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn open(config: &AppConfig) -> anyhow::Result<Self> {
        let manager =
            PgConnectionManager::new(&config.database_url, config.pg_ssl_root_cert.as_deref())?;
        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .min_idle(Some(config.min_idle))
            .connection_timeout(config.request_timeout)
            .build(manager)
            .await
            .context("failed to build PostgreSQL connection pool")?;

        // `build` only returns once `min_idle` connections are established.
        info!(
            max_size = config.max_pool_size,
            min_idle = config.min_idle,
            "database pool opened"
        );

        Ok(Self { pool })
    }

    /// Releases this handle. The pool shuts down once every clone is gone, so
    /// callers drop the router state first.
    pub fn close(self) {
        let state = self.pool.state();
        info!(
            connections = state.connections,
            idle = state.idle_connections,
            "closing database pool"
        );
        drop(self.pool);
    }

    async fn connection(&self) -> Result<PooledConnection<'_, PgConnectionManager>> {
        self.pool.get().await.map_err(|err| {
            error!(error = ?err, "failed to acquire database connection");
            match err {
                RunError::TimedOut => ServiceError::Timeout,
                RunError::User(err) => ServiceError::QueryExecution(err),
            }
        })
    }
}

#[async_trait]
impl MeasurementStore for Database {
    async fn fetch(&self, spec: &QuerySpec) -> Result<Vec<MeasurementRow>> {
        let mut conn = self.connection().await?;
        query::load_page(&mut conn, spec).await
    }

    async fn fetch_with_count(&self, spec: &QuerySpec) -> Result<(Vec<MeasurementRow>, i64)> {
        let mut conn = self.connection().await?;
        let rows = query::load_page(&mut conn, spec).await?;
        let total = query::count_rows(&mut conn, &spec.window).await?;
        Ok((rows, total))
    }
}

#[derive(Clone)]
pub struct PgConnectionManager {
    config: PgConfig,
    tls: Option<MakeRustlsConnect>,
}

impl PgConnectionManager {
    fn new(database_url: &str, root_cert: Option<&str>) -> anyhow::Result<Self> {
        let config = database_url
            .parse::<PgConfig>()
            .context("invalid DATABASE_URL")?;
        let tls = root_cert.map(build_tls_connector).transpose()?;
        Ok(Self { config, tls })
    }
}

#[async_trait]
impl ManageConnection for PgConnectionManager {
    type Connection = AsyncPgConnection;
    type Error = anyhow::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let connection = match &self.tls {
            None => {
                let (client, connection) = self.config.connect(NoTls).await?;
                AsyncPgConnection::try_from_client_and_connection(client, connection).await
            }
            Some(connector) => {
                let (client, connection) = self.config.connect(connector.clone()).await?;
                AsyncPgConnection::try_from_client_and_connection(client, connection).await
            }
        };
        connection.map_err(|err| anyhow::anyhow!(err))
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.batch_execute("SELECT 1").await?;
        Ok(())
    }

    fn has_broken(&self, _: &mut Self::Connection) -> bool {
        false
    }
}

fn build_tls_connector(root_cert: &str) -> anyhow::Result<MakeRustlsConnect> {
    let file = File::open(root_cert)
        .with_context(|| format!("failed to open PGSSLROOTCERT file '{root_cert}'"))?;
    let mut reader = BufReader::new(file);

    let mut root_store = RootCertStore::empty();
    for cert in certs(&mut reader) {
        let cert = cert.context("failed to parse PGSSLROOTCERT")?;
        root_store
            .add(cert)
            .map_err(|_| anyhow::anyhow!("invalid certificate in PGSSLROOTCERT"))?;
    }
    if root_store.is_empty() {
        anyhow::bail!("PGSSLROOTCERT contained no certificates");
    }

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(MakeRustlsConnect::new(config))
}
