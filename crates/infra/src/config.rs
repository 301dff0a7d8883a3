//! Process configuration read from environment variables.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgSslMode};
use thiserror::Error;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_BODY_LIMIT_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Postgres connection settings.
#[derive(Clone)]
pub struct DatabaseConfig {
    pub connect_options: PgConnectOptions,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

// The connect options carry the password.
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opts = &self.connect_options;
        f.debug_struct("DatabaseConfig")
            .field("host", &opts.get_host())
            .field("port", &opts.get_port())
            .field("database", &opts.get_database())
            .field("ssl_mode", &opts.get_ssl_mode())
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    /// `None` selects the in-memory store.
    pub database: Option<DatabaseConfig>,
    pub body_limit_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = parse_or(&lookup, "BIND_ADDR", IpAddr::V4(Ipv4Addr::UNSPECIFIED))?;
        let port = parse_or(&lookup, "PORT", DEFAULT_PORT)?;
        let body_limit_bytes = parse_or(&lookup, "BODY_LIMIT_BYTES", DEFAULT_BODY_LIMIT_BYTES)?;

        let connect_options = match non_empty(&lookup, "DATABASE_URL") {
            Some(url) => Some(PgConnectOptions::from_str(url.trim()).map_err(|_| {
                ConfigError::Invalid {
                    name: "DATABASE_URL",
                    value: "<redacted>".to_string(),
                }
            })?),
            None => connect_options_from_parts(&lookup)?,
        };

        let database = match connect_options {
            Some(opts) => Some(DatabaseConfig {
                connect_options: apply_tls(&lookup, opts)?,
                max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
                acquire_timeout: Duration::from_secs(parse_or(
                    &lookup,
                    "DB_ACQUIRE_TIMEOUT_SECS",
                    DEFAULT_ACQUIRE_TIMEOUT_SECS,
                )?),
            }),
            None => None,
        };

        Ok(Self {
            bind_addr,
            port,
            database,
            body_limit_bytes,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|v| !v.trim().is_empty())
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match non_empty(lookup, name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}

/// Connect options from the discrete `DB_*` variables, when all of them are
/// present. Each value is passed through as-is, so the password may contain
/// any character.
fn connect_options_from_parts<F>(lookup: &F) -> Result<Option<PgConnectOptions>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let (Some(host), Some(port), Some(user), Some(pass), Some(name)) = (
        non_empty(lookup, "DB_HOST"),
        non_empty(lookup, "DB_PORT"),
        non_empty(lookup, "DB_USER"),
        lookup("DB_PASS"),
        non_empty(lookup, "DB_NAME"),
    ) else {
        return Ok(None);
    };
    let port: u16 = port.trim().parse().map_err(|_| ConfigError::Invalid {
        name: "DB_PORT",
        value: port.clone(),
    })?;

    Ok(Some(
        PgConnectOptions::new_without_pgpass()
            .host(host.trim())
            .port(port)
            .username(user.trim())
            .password(&pass)
            .database(name.trim()),
    ))
}

/// `DB_SSL_MODE` overrides whatever the URL asked for. A CA bundle without an
/// explicit mode verifies the server certificate against it.
fn apply_tls<F>(lookup: &F, opts: PgConnectOptions) -> Result<PgConnectOptions, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mode = match non_empty(lookup, "DB_SSL_MODE") {
        Some(raw) => Some(PgSslMode::from_str(raw.trim()).map_err(|_| ConfigError::Invalid {
            name: "DB_SSL_MODE",
            value: raw.clone(),
        })?),
        None => None,
    };
    let ca = non_empty(lookup, "DB_SSL_CA");

    let opts = match (mode, &ca) {
        (Some(mode), _) => opts.ssl_mode(mode),
        (None, Some(_)) => opts.ssl_mode(PgSslMode::VerifyCa),
        (None, None) => opts,
    };
    Ok(match ca {
        Some(path) => opts.ssl_root_cert(path.trim()),
        None => opts,
    })
}
