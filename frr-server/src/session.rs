//! Replay session
//!
//! Owns everything one race view needs: the loaded `RaceData`, the loader
//! status, the single authoritative `PlaybackState`, and values derived from
//! the data (track bounds, lap list, the selected driver's fastest lap).
//! Derived values are computed when the data or the selection changes, never
//! per frame.
//!
//! Playback state is only mutated through the action methods here.

use crate::loader::{LoadEvent, LoadStage, LoadStatus, LoadedRace};
use frr_core::ghost::{ghost_frame_index, FastestLap, LapIndex, LapMetric};
use frr_core::laps::{lap_times, HeadToHead, LapTime};
use frr_core::model::{Frame, TrackStatusCode};
use frr_core::{PlaybackState, RaceData, RaceKey, Tick, TrackBounds};
use serde::Serialize;
use std::sync::Arc;

/// Fastest-lap lookup for the currently selected driver
#[derive(Debug, Clone)]
struct GhostIndex {
    driver: String,
    laps: LapIndex,
    fastest: Option<FastestLap>,
}

#[derive(Debug, Default)]
pub struct ReplaySession {
    key: Option<RaceKey>,
    data: Option<Arc<RaceData>>,
    status: LoadStatus,
    playback: PlaybackState,
    metric: LapMetric,

    bounds: Option<TrackBounds>,
    available_laps: Vec<u32>,
    ghost: Option<GhostIndex>,
}

/// Track status with its display label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackStatusView {
    pub code: String,
    pub label: &'static str,
}

impl From<TrackStatusCode> for TrackStatusView {
    fn from(status: TrackStatusCode) -> Self {
        Self {
            code: status.code().to_string(),
            label: status.label(),
        }
    }
}

/// Everything a client needs to render the current state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySnapshot {
    pub year: Option<u16>,
    pub round: Option<u8>,
    pub loading: bool,
    pub loading_progress: u8,
    pub loading_stage: LoadStage,
    pub error: Option<String>,
    pub is_from_cache: bool,
    pub playback: PlaybackState,
    pub total_frames: usize,
    pub bounds: Option<TrackBounds>,
    pub current_frame: Option<Frame>,
    pub ghost_frame: Option<Frame>,
    pub ghost_lap: Option<u32>,
    pub available_laps: Vec<u32>,
    pub track_status: Option<TrackStatusView>,
    pub head_to_head: Option<HeadToHead>,
}

impl ReplaySession {
    pub fn new(metric: LapMetric) -> Self {
        Self {
            metric,
            ..Default::default()
        }
    }

    // ==================== Load lifecycle ====================

    /// Discard the current data and start tracking a new load of `key`.
    /// Speed and driver selections carry over.
    pub fn begin_load(&mut self, key: RaceKey) {
        self.key = Some(key);
        self.data = None;
        self.status = LoadStatus::default();
        self.bounds = None;
        self.available_laps.clear();
        self.ghost = None;
        self.playback.rewind(&[]);
    }

    pub fn apply_event(&mut self, event: LoadEvent) -> bool {
        self.status.apply(event)
    }

    /// Install freshly loaded data and place the cursor on the first frame
    pub fn install(&mut self, loaded: LoadedRace) {
        let data = loaded.data;
        self.bounds = TrackBounds::estimate(&data.frames);
        self.available_laps = data.available_laps();
        self.playback.rewind(&data.frames);
        self.data = Some(data);
        self.status.ready(loaded.from_cache);
        self.rebuild_ghost();
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.data = None;
        self.bounds = None;
        self.available_laps.clear();
        self.ghost = None;
        self.playback.pause();
        self.status.fail(message);
    }

    /// Forget the race entirely
    pub fn unload(&mut self) {
        *self = Self::new(self.metric);
    }

    // ==================== Actions ====================

    /// Returns the new play state
    pub fn toggle_play(&mut self) -> bool {
        let frames = self.data.as_ref().map(|d| d.frames.as_slice()).unwrap_or(&[]);
        self.playback.toggle_play(frames)
    }

    pub fn play(&mut self) -> bool {
        let frames = self.data.as_ref().map(|d| d.frames.as_slice()).unwrap_or(&[]);
        self.playback.play(frames);
        self.playback.is_playing
    }

    pub fn pause(&mut self) {
        self.playback.pause();
    }

    pub fn set_speed(&mut self, speed: f64) -> bool {
        self.playback.set_speed(speed)
    }

    pub fn seek_to(&mut self, index: i64) {
        if let Some(data) = &self.data {
            self.playback.seek_to(&data.frames, index);
        }
    }

    pub fn seek_to_time(&mut self, t: f64) {
        if let Some(data) = &self.data {
            self.playback.seek_to_time(&data.frames, t);
        }
    }

    /// False when no frame reaches `lap`
    pub fn seek_to_lap(&mut self, lap: u32) -> bool {
        match &self.data {
            Some(data) => self.playback.seek_to_lap(&data.frames, lap),
            None => false,
        }
    }

    pub fn select_driver(&mut self, driver: Option<String>) {
        if self.playback.selected_driver != driver {
            self.playback.selected_driver = driver;
            self.rebuild_ghost();
        }
    }

    pub fn select_comparison_driver(&mut self, driver: Option<String>) {
        self.playback.comparison_driver = driver;
    }

    /// Advance the clock by `delta` wall-clock seconds
    pub fn tick(&mut self, delta: f64) -> Tick {
        match &self.data {
            Some(data) => self.playback.advance(&data.frames, delta),
            None => {
                self.playback.pause();
                Tick::Finished
            }
        }
    }

    // ==================== Read state ====================

    pub fn key(&self) -> Option<RaceKey> {
        self.key
    }

    pub fn data(&self) -> Option<&Arc<RaceData>> {
        self.data.as_ref()
    }

    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    pub fn loading(&self) -> bool {
        self.status.loading()
    }

    pub fn loading_progress(&self) -> u8 {
        self.status.progress
    }

    pub fn loading_stage(&self) -> LoadStage {
        self.status.stage
    }

    pub fn error(&self) -> Option<&str> {
        self.status.error.as_deref()
    }

    pub fn is_from_cache(&self) -> bool {
        self.status.is_from_cache
    }

    pub fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    pub fn bounds(&self) -> Option<&TrackBounds> {
        self.bounds.as_ref()
    }

    pub fn available_laps(&self) -> &[u32] {
        &self.available_laps
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_playing
    }

    /// None while loading, after an error, or for an empty race
    pub fn current_frame(&self) -> Option<&Frame> {
        if self.status.stage != LoadStage::Ready {
            return None;
        }
        self.frames().get(self.playback.current_frame_index)
    }

    pub fn ghost_frame_index(&self) -> Option<usize> {
        if self.status.stage != LoadStage::Ready {
            return None;
        }
        let ghost = self.ghost.as_ref()?;
        ghost_frame_index(
            self.frames(),
            &ghost.driver,
            &ghost.laps,
            ghost.fastest.as_ref(),
            self.playback.current_frame_index,
        )
    }

    pub fn ghost_frame(&self) -> Option<&Frame> {
        self.ghost_frame_index().and_then(|i| self.frames().get(i))
    }

    /// Fastest lap of the selected driver, if any
    pub fn fastest_lap(&self) -> Option<&FastestLap> {
        self.ghost.as_ref().and_then(|g| g.fastest.as_ref())
    }

    pub fn track_status(&self) -> Option<TrackStatusCode> {
        let data = self.data.as_ref()?;
        let frame = self.current_frame()?;
        Some(data.track_status_at(frame.t))
    }

    /// Selected driver against the comparison driver at the current frame
    pub fn head_to_head(&self) -> Option<HeadToHead> {
        let driver = self.playback.selected_driver.as_deref()?;
        let rival = self.playback.comparison_driver.as_deref()?;
        HeadToHead::compare(self.current_frame()?, driver, rival)
    }

    pub fn lap_times(&self, driver: &str) -> Vec<LapTime> {
        lap_times(self.frames(), driver)
    }

    pub fn snapshot(&self) -> ReplaySnapshot {
        ReplaySnapshot {
            year: self.key.map(|k| k.year),
            round: self.key.map(|k| k.round),
            loading: self.loading(),
            loading_progress: self.loading_progress(),
            loading_stage: self.loading_stage(),
            error: self.status.error.clone(),
            is_from_cache: self.is_from_cache(),
            playback: self.playback.clone(),
            total_frames: self.frames().len(),
            bounds: self.bounds,
            current_frame: self.current_frame().cloned(),
            ghost_frame: self.ghost_frame().cloned(),
            ghost_lap: self.fastest_lap().map(|f| f.lap),
            available_laps: self.available_laps.clone(),
            track_status: self.track_status().map(TrackStatusView::from),
            head_to_head: self.head_to_head(),
        }
    }

    fn frames(&self) -> &[Frame] {
        self.data.as_ref().map(|d| d.frames.as_slice()).unwrap_or(&[])
    }

    fn rebuild_ghost(&mut self) {
        self.ghost = match (&self.data, &self.playback.selected_driver) {
            (Some(data), Some(driver)) => {
                let laps = LapIndex::build(&data.frames, driver);
                let fastest = FastestLap::find(&data.frames, &laps, self.metric);
                Some(GhostIndex {
                    driver: driver.clone(),
                    laps,
                    fastest,
                })
            }
            _ => None,
        };
    }
}
