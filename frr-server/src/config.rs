//! Server configuration
//!
//! Assembled from `FRR_*` environment variables. Anything missing or
//! unparseable falls back to its default, with a warning for the latter.

use frr_core::ghost::LapMetric;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_PORT: u16 = 9200;
pub const DEFAULT_TICK_MS: u64 = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Object storage root; None disables the HTTP primary source
    pub storage_root: Option<String>,
    /// Same-schema fallback endpoint base (serves `/api/race`); None uses
    /// the in-process race generator
    pub fallback_url: Option<String>,
    pub cache_dir: PathBuf,
    /// Local mirror of the bucket, used as primary instead of HTTP
    pub data_dir: Option<PathBuf>,
    pub ghost_metric: LapMetric,
    pub tick_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            storage_root: None,
            fallback_url: None,
            cache_dir: default_cache_dir(),
            data_dir: None,
            ghost_metric: LapMetric::default(),
            tick_ms: DEFAULT_TICK_MS,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(bind) = get("FRR_BIND") {
            match bind.parse() {
                Ok(addr) => config.bind = addr,
                Err(_) => warn!("Ignoring invalid FRR_BIND {:?}", bind),
            }
        }

        config.fallback_url = get("FRR_FALLBACK_URL");
        config.storage_root = get("FRR_STORAGE_ROOT");

        if let Some(dir) = get("FRR_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }
        config.data_dir = get("FRR_DATA_DIR").map(PathBuf::from);

        if let Some(metric) = get("FRR_GHOST_METRIC") {
            match metric.parse() {
                Ok(m) => config.ghost_metric = m,
                Err(e) => warn!("Ignoring FRR_GHOST_METRIC: {}", e),
            }
        }

        if let Some(tick) = get("FRR_TICK_MS") {
            match tick.parse::<u64>() {
                Ok(ms) if ms > 0 => config.tick_ms = ms,
                _ => warn!("Ignoring invalid FRR_TICK_MS {:?}", tick),
            }
        }

        config
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("frr")
        .join("races")
}
