//! Dataset loader
//!
//! Drives one race load through its stages:
//!
//! ```text
//! init -> cache -> fetching -> downloading -> parsing -> ready
//!            \________________________________________/-> error
//! ```
//!
//! A cache hit jumps straight to ready. Otherwise the primary source is
//! tried, and any failure there (transfer or decode) falls back once to the
//! secondary source. Progress and stage changes are reported as
//! [`LoadEvent`]s; [`LoadStatus::apply`] keeps them monotonic.
//!
//! Because stages never move backwards, a fallback that starts after the
//! primary payload failed to decode is reported under the `parsing` stage,
//! and its download progress only shows once it passes the primary's.
//!
//! `load` never writes the cache. The caller decides whether the result is
//! still wanted and then calls [`Loader::store`].

use crate::cache::RaceCache;
use frr_core::decode::decode_race;
use frr_core::{DecodeError, RaceData, RaceKey, RaceSource, SourceError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Progress reported on entering the fetching stage
pub const FETCHING_PROGRESS: u8 = 5;
/// Progress reported on entering the downloading stage
pub const DOWNLOADING_PROGRESS: u8 = 10;

/// Load stages, in the only order they may be visited
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStage {
    #[default]
    Init,
    Cache,
    Fetching,
    Downloading,
    Parsing,
    Ready,
    Error,
}

impl LoadStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoadStage::Ready | LoadStage::Error)
    }
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadStage::Init => "init",
            LoadStage::Cache => "cache",
            LoadStage::Fetching => "fetching",
            LoadStage::Downloading => "downloading",
            LoadStage::Parsing => "parsing",
            LoadStage::Ready => "ready",
            LoadStage::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadEvent {
    Stage(LoadStage),
    Progress(u8),
}

/// Loader state as seen by clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadStatus {
    pub stage: LoadStage,
    /// 0-100, never decreases within one load
    pub progress: u8,
    pub error: Option<String>,
    pub is_from_cache: bool,
}

impl Default for LoadStatus {
    fn default() -> Self {
        Self {
            stage: LoadStage::Init,
            progress: 0,
            error: None,
            is_from_cache: false,
        }
    }
}

impl LoadStatus {
    /// True until the load reaches ready or error
    pub fn loading(&self) -> bool {
        !self.stage.is_terminal()
    }

    /// Apply an event. Backward stage moves, smaller progress values and
    /// anything after a terminal stage are discarded. Returns whether the
    /// status changed.
    pub fn apply(&mut self, event: LoadEvent) -> bool {
        if self.stage.is_terminal() {
            return false;
        }
        match event {
            LoadEvent::Stage(stage) if stage > self.stage => {
                self.stage = stage;
                true
            }
            LoadEvent::Progress(p) if p.min(100) > self.progress => {
                self.progress = p.min(100);
                true
            }
            _ => false,
        }
    }

    pub fn ready(&mut self, from_cache: bool) {
        self.stage = LoadStage::Ready;
        self.progress = 100;
        self.error = None;
        self.is_from_cache = from_cache;
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.stage = LoadStage::Error;
        self.error = Some(message.into());
        self.is_from_cache = false;
    }
}

#[derive(Error, Debug)]
pub enum LoadError {
    /// Neither source could deliver a payload
    #[error("Stream error: {fallback} (primary: {primary})")]
    Unavailable { primary: String, fallback: String },

    #[error("Failed to decode race data: {0}")]
    Decode(#[from] DecodeError),

    /// A newer load started before this one finished
    #[error("Load superseded by a newer request")]
    Superseded,
}

/// A successfully loaded race
#[derive(Debug, Clone)]
pub struct LoadedRace {
    pub data: Arc<RaceData>,
    pub from_cache: bool,
    /// Name of the source that delivered the data ("cache" on a hit)
    pub source: String,
}

#[derive(Debug)]
enum AttemptError {
    Source(SourceError),
    Decode(DecodeError),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Source(e) => write!(f, "{}", e),
            AttemptError::Decode(e) => write!(f, "{}", e),
        }
    }
}

pub struct Loader {
    primary: Option<Arc<dyn RaceSource>>,
    fallback: Arc<dyn RaceSource>,
    cache: Arc<dyn RaceCache>,
}

impl Loader {
    pub fn new(
        primary: Option<Arc<dyn RaceSource>>,
        fallback: Arc<dyn RaceSource>,
        cache: Arc<dyn RaceCache>,
    ) -> Self {
        Self {
            primary,
            fallback,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<dyn RaceCache> {
        &self.cache
    }

    /// Load `key`, reporting stage and progress changes through `report`
    pub async fn load(
        &self,
        key: RaceKey,
        report: &(dyn Fn(LoadEvent) + Send + Sync),
    ) -> Result<LoadedRace, LoadError> {
        report(LoadEvent::Stage(LoadStage::Cache));
        match self.cache.get(key).await {
            Ok(Some(data)) => {
                info!("Loaded {} from cache ({} frames)", key, data.frames.len());
                report(LoadEvent::Progress(100));
                return Ok(LoadedRace {
                    data: Arc::new(data),
                    from_cache: true,
                    source: "cache".to_string(),
                });
            }
            Ok(None) => debug!("Cache miss for {}", key),
            Err(e) => warn!("Cache lookup for {} failed, treating as miss: {}", key, e),
        }

        report(LoadEvent::Stage(LoadStage::Fetching));
        report(LoadEvent::Progress(FETCHING_PROGRESS));

        let primary_error = match &self.primary {
            Some(source) => match self.attempt(source.as_ref(), key, report).await {
                Ok(data) => return Ok(self.fetched(key, data, source.name())),
                Err(e) => {
                    warn!(
                        "Primary source {} failed for {} ({}), falling back to {}",
                        source.name(),
                        key,
                        e,
                        self.fallback.name()
                    );
                    e.to_string()
                }
            },
            None => "no primary source configured".to_string(),
        };

        match self.attempt(self.fallback.as_ref(), key, report).await {
            Ok(data) => Ok(self.fetched(key, data, self.fallback.name())),
            Err(AttemptError::Decode(e)) => Err(LoadError::Decode(e)),
            Err(AttemptError::Source(e)) => Err(LoadError::Unavailable {
                primary: primary_error,
                fallback: e.to_string(),
            }),
        }
    }

    async fn attempt(
        &self,
        source: &dyn RaceSource,
        key: RaceKey,
        report: &(dyn Fn(LoadEvent) + Send + Sync),
    ) -> Result<RaceData, AttemptError> {
        report(LoadEvent::Stage(LoadStage::Downloading));
        report(LoadEvent::Progress(DOWNLOADING_PROGRESS));

        let on_progress = |p: u8| report(LoadEvent::Progress(p));
        let text = source
            .fetch(key, &on_progress)
            .await
            .map_err(AttemptError::Source)?;

        report(LoadEvent::Stage(LoadStage::Parsing));
        let decoded = decode_race(&text).map_err(AttemptError::Decode)?;
        if decoded.brake_rescaled {
            debug!("Brake values for {} rescaled to 0-100", key);
        }
        Ok(decoded.data)
    }

    /// Persist a freshly fetched race. Failures are logged, never returned.
    pub async fn store(&self, key: RaceKey, loaded: &LoadedRace) {
        if loaded.from_cache {
            return;
        }
        if let Err(e) = self.cache.put(key, loaded.data.clone()).await {
            warn!("Failed to cache {}: {}", key, e);
        }
    }

    fn fetched(&self, key: RaceKey, data: RaceData, source: &str) -> LoadedRace {
        let data = Arc::new(data);
        info!(
            "Loaded {} from {} ({} frames)",
            key,
            source,
            data.frames.len()
        );
        LoadedRace {
            data,
            from_cache: false,
            source: source.to_string(),
        }
    }
}
