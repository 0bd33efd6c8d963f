//! Application state management

use crate::cache::FileCache;
use crate::config::ServerConfig;
use crate::loader::{LoadError, LoadEvent, LoadedRace, Loader};
use crate::playback;
use crate::session::{ReplaySession, ReplaySnapshot};
use frr_core::{RaceKey, RaceSource};
use frr_sources::{DemoSource, DirectorySource, LocalApiSource, ObjectStorageSource, StorageLayout};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Whether a load call returns immediately or after the load settles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    Background,
    Wait,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,

    /// The single replay session
    pub session: Arc<RwLock<ReplaySession>>,

    pub loader: Arc<Loader>,

    /// Broadcast channel for session snapshots
    /// Multiple consumers can subscribe to receive updates
    pub updates_tx: broadcast::Sender<ReplaySnapshot>,

    /// Cancellation token for the playback clock task
    pub playback_cancel: Arc<RwLock<Option<CancellationToken>>>,

    /// Bumped on every load and unload; results from older loads are dropped
    generation: Arc<AtomicU64>,

    /// Serializes cache writes and purges against the generation check
    cache_writes: Arc<Mutex<()>>,
}

impl AppState {
    /// Wire up sources and cache from configuration
    pub fn new(config: ServerConfig) -> Self {
        let loader = Loader::new(
            primary_source(&config),
            fallback_source(&config),
            Arc::new(FileCache::new(config.cache_dir.clone())),
        );
        Self::with_loader(config, loader)
    }

    pub fn with_loader(config: ServerConfig, loader: Loader) -> Self {
        // Create broadcast channel with capacity for 100 updates
        let (updates_tx, _) = broadcast::channel(100);

        Self {
            session: Arc::new(RwLock::new(ReplaySession::new(config.ghost_metric))),
            config: Arc::new(config),
            loader: Arc::new(loader),
            updates_tx,
            playback_cancel: Arc::new(RwLock::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
            cache_writes: Arc::new(Mutex::new(())),
        }
    }

    /// Subscribe to session snapshots
    pub fn subscribe(&self) -> broadcast::Receiver<ReplaySnapshot> {
        self.updates_tx.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Send the current snapshot to subscribers
    pub async fn publish(&self) -> ReplaySnapshot {
        let snapshot = self.session.read().await.snapshot();
        let _ = self.updates_tx.send(snapshot.clone());
        snapshot
    }

    /// Start loading `key`, superseding any load in flight. Returns the load
    /// generation; in `Wait` mode also the load outcome.
    pub async fn load(&self, key: RaceKey, mode: LoadMode) -> Result<u64, LoadError> {
        let generation = self.begin_load(key).await;
        self.dispatch(generation, key, mode).await
    }

    /// Purge the current race from the cache and load it again.
    /// None when no race is selected.
    pub async fn refresh(&self, mode: LoadMode) -> Option<Result<u64, LoadError>> {
        let key = self.session.read().await.key()?;
        info!("Refreshing {}", key);
        // Older loads are superseded before the purge, so none of them can
        // write the entry back afterwards
        let generation = self.begin_load(key).await;
        {
            let _writes = self.cache_writes.lock().await;
            if let Err(e) = self.loader.cache().remove(key).await {
                warn!("Failed to purge cache entry for {}: {}", key, e);
            }
        }
        Some(self.dispatch(generation, key, mode).await)
    }

    /// Drop the race and stop playback
    pub async fn unload(&self) {
        {
            let mut session = self.session.write().await;
            playback::stop(self).await;
            self.generation.fetch_add(1, Ordering::SeqCst);
            session.unload();
        }
        info!("Replay unloaded");
        self.publish().await;
    }

    async fn begin_load(&self, key: RaceKey) -> u64 {
        let generation = {
            let mut session = self.session.write().await;
            playback::stop(self).await;
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            session.begin_load(key);
            generation
        };
        info!("Loading {} (generation {})", key, generation);
        self.publish().await;
        generation
    }

    async fn dispatch(&self, generation: u64, key: RaceKey, mode: LoadMode) -> Result<u64, LoadError> {
        match mode {
            LoadMode::Wait => self.run_load(generation, key).await.map(|_| generation),
            LoadMode::Background => {
                let state = self.clone();
                tokio::spawn(async move {
                    let _ = state.run_load(generation, key).await;
                });
                Ok(generation)
            }
        }
    }

    async fn run_load(&self, generation: u64, key: RaceKey) -> Result<(), LoadError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let report = move |event: LoadEvent| {
            let _ = tx.send(event);
        };

        let result = {
            let load = self.loader.load(key, &report);
            tokio::pin!(load);
            loop {
                tokio::select! {
                    result = &mut load => break result,
                    Some(event) = rx.recv() => self.apply_load_event(generation, event).await,
                }
            }
        };
        while let Ok(event) = rx.try_recv() {
            self.apply_load_event(generation, event).await;
        }

        self.complete_load(generation, key, result).await
    }

    async fn apply_load_event(&self, generation: u64, event: LoadEvent) {
        let snapshot = {
            let mut session = self.session.write().await;
            if !self.is_current(generation) || !session.apply_event(event) {
                return;
            }
            session.snapshot()
        };
        let _ = self.updates_tx.send(snapshot);
    }

    async fn complete_load(
        &self,
        generation: u64,
        key: RaceKey,
        result: Result<LoadedRace, LoadError>,
    ) -> Result<(), LoadError> {
        let (outcome, snapshot) = {
            let mut session = self.session.write().await;
            if !self.is_current(generation) {
                debug!("Discarding superseded load of {} (generation {})", key, generation);
                return Err(LoadError::Superseded);
            }
            let outcome = match result {
                Ok(loaded) => {
                    session.install(loaded.clone());
                    Ok(loaded)
                }
                Err(e) => {
                    error!("Failed to load {}: {}", key, e);
                    session.fail(e.to_string());
                    Err(e)
                }
            };
            (outcome, session.snapshot())
        };
        let _ = self.updates_tx.send(snapshot);

        let loaded = outcome?;
        self.store(generation, key, &loaded).await;
        Ok(())
    }

    /// Write a fetched race to the cache unless a newer load has started
    async fn store(&self, generation: u64, key: RaceKey, loaded: &LoadedRace) {
        let _writes = self.cache_writes.lock().await;
        if !self.is_current(generation) {
            debug!("Skipping cache write for superseded load of {}", key);
            return;
        }
        self.loader.store(key, loaded).await;
    }
}

/// The configured primary source: a local mirror wins over object storage
fn primary_source(config: &ServerConfig) -> Option<Arc<dyn RaceSource>> {
    if let Some(dir) = &config.data_dir {
        info!("Primary source: directory {}", dir.display());
        return Some(Arc::new(DirectorySource::new(dir.clone())));
    }
    let root = config.storage_root.as_ref()?;
    info!("Primary source: object storage {}", root);
    Some(Arc::new(ObjectStorageSource::new(storage_layout(root))))
}

/// The remote `/api/race` endpoint when configured, else the same generator
/// in-process
fn fallback_source(config: &ServerConfig) -> Arc<dyn RaceSource> {
    match &config.fallback_url {
        Some(url) => {
            info!("Fallback source: {}/api/race", url.trim_end_matches('/'));
            Arc::new(LocalApiSource::new(url.clone()))
        }
        None => {
            info!("Fallback source: in-process race generator");
            Arc::new(DemoSource::new())
        }
    }
}

/// `firebase://{bucket}` selects the Firebase download API; anything else is
/// a plain HTTP root
pub fn storage_layout(root: &str) -> StorageLayout {
    match root.strip_prefix("firebase://") {
        Some(bucket) => StorageLayout::Firebase {
            bucket: bucket.trim_end_matches('/').to_string(),
        },
        None => StorageLayout::Plain {
            root: root.to_string(),
        },
    }
}
