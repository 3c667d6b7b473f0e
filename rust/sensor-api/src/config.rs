use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    env,
    net::{SocketAddr, ToSocketAddrs},
    time::Duration,
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub database_url: String,
    pub pg_ssl_root_cert: Option<String>,
    pub max_pool_size: u32,
    pub min_idle: u32,
    /// Upper bound for a single fetch/count round trip, pool wait included.
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    sensor_api_listen_addr: Option<String>,
    #[serde(default)]
    sensor_api_listen_host: Option<String>,
    #[serde(default)]
    sensor_api_listen_port: Option<u16>,
    #[serde(default)]
    sensor_api_database_url: Option<String>,
    #[serde(default)]
    database_url: Option<String>,
    #[serde(default)]
    sensor_api_pg_ssl_root_cert: Option<String>,
    #[serde(default = "default_pool_size")]
    sensor_api_max_pool_size: u32,
    #[serde(default = "default_min_idle")]
    sensor_api_min_idle: u32,
    #[serde(default = "default_timeout_secs")]
    sensor_api_request_timeout_secs: u64,
}

const fn default_pool_size() -> u32 {
    5
}

const fn default_min_idle() -> u32 {
    1
}

const fn default_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    /// Reads the process environment, after loading `.env` if one is present.
    pub fn from_env() -> Result<Self> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err(err).context("failed to load .env file");
            }
        }

        let raw: RawConfig =
            envy::from_env().context("failed to parse SENSOR_API_* environment variables")?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let listen_addr = resolve_addr(
            raw.sensor_api_listen_addr,
            raw.sensor_api_listen_host,
            raw.sensor_api_listen_port,
        )?;

        let database_url = raw
            .sensor_api_database_url
            .or(raw.database_url)
            .filter(|url| !url.trim().is_empty())
            .context("SENSOR_API_DATABASE_URL or DATABASE_URL must be set")?;

        let pg_ssl_root_cert = raw
            .sensor_api_pg_ssl_root_cert
            .or_else(|| env::var("PGSSLROOTCERT").ok())
            .filter(|path| !path.trim().is_empty());

        let max_pool_size = raw.sensor_api_max_pool_size.max(1);

        Ok(Self {
            listen_addr,
            database_url,
            pg_ssl_root_cert,
            max_pool_size,
            min_idle: raw.sensor_api_min_idle.min(max_pool_size),
            request_timeout: Duration::from_secs(raw.sensor_api_request_timeout_secs.max(1)),
        })
    }
}

fn resolve_addr(
    addr: Option<String>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<SocketAddr> {
    if let Some(addr) = addr {
        return addr
            .to_socket_addrs()
            .context("invalid SENSOR_API_LISTEN_ADDR value")?
            .next()
            .context("SENSOR_API_LISTEN_ADDR resolved to no addresses");
    }

    let host = host.unwrap_or_else(|| "0.0.0.0".to_string());
    let port = port.unwrap_or(8000);
    format!("{host}:{port}")
        .to_socket_addrs()
        .context("invalid listen host/port combination")?
        .next()
        .context("listen address resolved to no targets")
}
