//! Process configuration, read from the environment (and `.env` via dotenvy)

use anyhow::{Context, Result};

pub const DEFAULT_PORT: u16 = 8083;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    /// No database means coupons live in memory for the life of the process.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub nats_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let port = match non_empty("PORT") {
            Some(v) => v.parse().with_context(|| format!("PORT `{v}` is not a port number"))?,
            None => DEFAULT_PORT,
        };
        let max_connections = match non_empty("DATABASE_MAX_CONNECTIONS") {
            Some(v) => v.parse().with_context(|| format!("DATABASE_MAX_CONNECTIONS `{v}` is not a number"))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        Ok(Self { port, database_url: non_empty("DATABASE_URL"), max_connections, nats_url: non_empty("NATS_URL") })
    }

    pub fn bind_addr(&self) -> String { format!("0.0.0.0:{}", self.port) }
}
