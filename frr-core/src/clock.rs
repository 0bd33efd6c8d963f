//! Playback clock
//!
//! Maps wall-clock time onto the frame sequence. While playing, race time
//! advances by `delta * playback_speed` and the frame index is found by a
//! forward-only scan from the current index, which costs O(1) amortized for
//! the small per-tick advances of normal playback. Discontinuous seeks use
//! binary search instead.
//!
//! Invariant: `current_frame_index` is the greatest index whose `t` is at or
//! below `current_time`, clamped to the valid range.

use crate::model::Frame;
use serde::{Deserialize, Serialize};

pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 64.0;

/// Mutable playback state for one race view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub is_playing: bool,
    pub current_frame_index: usize,
    pub current_time: f64,
    pub playback_speed: f64,
    pub selected_driver: Option<String>,
    pub comparison_driver: Option<String>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            is_playing: false,
            current_frame_index: 0,
            current_time: 0.0,
            playback_speed: 1.0,
            selected_driver: None,
            comparison_driver: None,
        }
    }
}

/// What a clock tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Not playing, or no time elapsed
    Idle,
    /// Time advanced; the flag is set when the frame index changed
    Advanced { frame_changed: bool },
    /// Reached the last frame and stopped
    Finished,
}

impl PlaybackState {
    /// Place the cursor on the first frame, keeping speed and selections
    pub fn rewind(&mut self, frames: &[Frame]) {
        self.is_playing = false;
        self.current_frame_index = 0;
        self.current_time = frames.first().map(|f| f.t).unwrap_or(0.0);
    }

    /// Advance race time by `delta` wall-clock seconds.
    ///
    /// Large deltas (a backgrounded tab, a stalled task) land on the last
    /// frame and stop playback; they never run past the end.
    pub fn advance(&mut self, frames: &[Frame], delta: f64) -> Tick {
        if !self.is_playing {
            return Tick::Idle;
        }
        if frames.is_empty() {
            self.is_playing = false;
            return Tick::Finished;
        }

        let step = delta * self.playback_speed;
        if !step.is_finite() || step <= 0.0 {
            return Tick::Idle;
        }

        let last = frames.len() - 1;
        let next_time = self.current_time + step;
        let start = self.current_frame_index.min(last);

        let mut index = start;
        while index < last && frames[index + 1].t <= next_time {
            index += 1;
        }

        if index >= last {
            self.current_frame_index = last;
            self.current_time = frames[last].t;
            self.is_playing = false;
            return Tick::Finished;
        }

        self.current_frame_index = index;
        self.current_time = next_time;
        Tick::Advanced {
            frame_changed: index != start,
        }
    }

    /// Jump to a frame index, clamped into range. Play state is untouched.
    pub fn seek_to(&mut self, frames: &[Frame], index: i64) {
        let Some(last) = frames.len().checked_sub(1) else {
            return;
        };
        let index = index.clamp(0, last as i64) as usize;
        self.current_frame_index = index;
        self.current_time = frames[index].t;
    }

    /// Jump to race time `t` using binary search over the sorted frames
    pub fn seek_to_time(&mut self, frames: &[Frame], t: f64) {
        if frames.is_empty() || !t.is_finite() {
            return;
        }
        let after = frames.partition_point(|f| f.t <= t);
        let index = after.saturating_sub(1);
        self.current_frame_index = index;
        self.current_time = t.clamp(frames[0].t, frames[frames.len() - 1].t);
    }

    /// Jump to the first frame whose lap is at or beyond `lap`.
    /// Returns false (and leaves the state alone) when no such frame exists.
    pub fn seek_to_lap(&mut self, frames: &[Frame], lap: u32) -> bool {
        match frames.iter().position(|f| f.lap >= lap) {
            Some(index) => {
                self.seek_to(frames, index as i64);
                true
            }
            None => false,
        }
    }

    /// Set the speed multiplier. Non-finite or non-positive values are ignored.
    pub fn set_speed(&mut self, speed: f64) -> bool {
        if !speed.is_finite() || speed <= 0.0 {
            return false;
        }
        self.playback_speed = speed.clamp(MIN_SPEED, MAX_SPEED);
        true
    }

    /// Toggle play/pause. Playback cannot start without frames.
    pub fn toggle_play(&mut self, frames: &[Frame]) -> bool {
        if self.is_playing {
            self.is_playing = false;
        } else {
            self.play(frames);
        }
        self.is_playing
    }

    pub fn play(&mut self, frames: &[Frame]) {
        self.is_playing = !frames.is_empty();
    }

    pub fn pause(&mut self) {
        self.is_playing = false;
    }
}
