use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;

/// Process configuration, read from the environment (after `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub media_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let db_path = std::env::var("MURMUR_DB_PATH").unwrap_or_else(|_| "murmur.db".into());
        let host = std::env::var("MURMUR_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port = std::env::var("MURMUR_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse::<u16>()
            .context("MURMUR_PORT must be a port number")?;
        let media_dir = std::env::var("MURMUR_MEDIA_DIR").unwrap_or_else(|_| "./media".into());

        Ok(Self {
            db_path: PathBuf::from(db_path),
            host,
            port,
            media_dir: PathBuf::from(media_dir),
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}
