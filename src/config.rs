use std::net::SocketAddr;

use anyhow::{bail, Context};
use serde::Deserialize;

/// Which `Storage` implementation the process runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub backend: StorageBackend,
    pub host: String,
    pub port: u16,
    /// Owner stamped on generated signals; `None` stores them unowned.
    pub default_signal_user_id: Option<i32>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    ///
    /// `DATABASE_URL` selects Postgres unless `STORAGE_BACKEND` says otherwise.
    /// Asking for Postgres without a usable URL is a startup error.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL");
        if matches!(&database_url, Some(url) if url.trim().is_empty()) {
            bail!("DATABASE_URL is set but empty");
        }

        let backend = match lookup("STORAGE_BACKEND").as_deref().map(str::trim) {
            Some("postgres") => StorageBackend::Postgres,
            Some("memory") => StorageBackend::Memory,
            Some(other) => bail!("unknown STORAGE_BACKEND: {other} (expected postgres or memory)"),
            None if database_url.is_some() => StorageBackend::Postgres,
            None => StorageBackend::Memory,
        };
        if backend == StorageBackend::Postgres && database_url.is_none() {
            bail!("STORAGE_BACKEND=postgres requires DATABASE_URL");
        }

        let host = lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = match lookup("APP_PORT") {
            Some(p) => p.parse::<u16>().with_context(|| format!("invalid APP_PORT: {p}"))?,
            None => 8080,
        };
        let default_signal_user_id = lookup("DEFAULT_SIGNAL_USER_ID")
            .map(|v| {
                v.parse::<i32>()
                    .with_context(|| format!("invalid DEFAULT_SIGNAL_USER_ID: {v}"))
            })
            .transpose()?;

        Ok(Self {
            database_url,
            backend,
            host,
            port,
            default_signal_user_id,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .context("parse listen address")
    }
}
