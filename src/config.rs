use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use dotenvy::dotenv;

use crate::services::csv::{DEFAULT_CHUNK_SIZE, DEFAULT_SAMPLE_SIZE};
use crate::services::progress::PROGRESS_TTL;

fn default_max_file_size() -> u64 {
    // 100 MB in bytes
    100 * 1024 * 1024
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub upload_dir: PathBuf,
    pub chunk_size: usize,
    pub analysis_sample_size: usize,
    pub progress_ttl: Duration,
    pub result_ttl: Duration,
    pub max_workers: usize,
    pub max_file_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            upload_dir: PathBuf::from("uploads"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            analysis_sample_size: DEFAULT_SAMPLE_SIZE,
            progress_ttl: PROGRESS_TTL,
            result_ttl: Duration::from_secs(3600),
            max_workers: 1,
            max_file_size: default_max_file_size(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env file first
        dotenv().ok();

        let defaults = Config::default();
        let config = Config {
            bind_addr: env_or("BIND_ADDR", defaults.bind_addr)?,
            upload_dir: env_or("UPLOAD_DIR", defaults.upload_dir)?,
            chunk_size: env_or("CHUNK_SIZE", defaults.chunk_size)?,
            analysis_sample_size: env_or("ANALYSIS_SAMPLE_SIZE", defaults.analysis_sample_size)?,
            progress_ttl: Duration::from_secs(env_or("PROGRESS_TTL_SECS", defaults.progress_ttl.as_secs())?),
            result_ttl: Duration::from_secs(env_or("RESULT_TTL_SECS", defaults.result_ttl.as_secs())?),
            max_workers: env_or("MAX_WORKERS", defaults.max_workers)?,
            max_file_size: env_or("MAX_FILE_SIZE", defaults.max_file_size)?,
        };

        if config.chunk_size == 0 {
            anyhow::bail!("CHUNK_SIZE must be greater than zero");
        }
        if config.max_workers == 0 {
            anyhow::bail!("MAX_WORKERS must be greater than zero");
        }

        Ok(config)
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse {}={:?}: {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}
