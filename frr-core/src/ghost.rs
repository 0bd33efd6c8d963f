//! Ghost / fastest-lap alignment
//!
//! For a selected driver, the ghost is the frame where that driver was at the
//! same fractional progress through their fastest completed lap as they are
//! through their current lap. Alignment is by progress fraction, not by time.
//!
//! The fastest lap is chosen by frame count: with a roughly constant export
//! rate, fewer frames means a shorter lap. `LapMetric::ElapsedTime` measures
//! `t` spans instead, for datasets whose sampling rate is not constant.

use crate::model::Frame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Laps with this many frames or fewer are treated as partial
pub const MIN_LAP_FRAMES: usize = 10;

/// How the fastest lap is ranked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LapMetric {
    #[default]
    FrameCount,
    ElapsedTime,
}

impl FromStr for LapMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "frames" | "frame_count" => Ok(LapMetric::FrameCount),
            "elapsed" | "elapsed_time" | "time" => Ok(LapMetric::ElapsedTime),
            other => Err(format!("unknown lap metric: {}", other)),
        }
    }
}

/// Frame indices grouped by one driver's lap number
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LapIndex {
    laps: BTreeMap<u32, Vec<usize>>,
}

impl LapIndex {
    /// Group every frame containing `driver` (with a lap number) by that lap
    pub fn build(frames: &[Frame], driver: &str) -> Self {
        let mut laps: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (idx, frame) in frames.iter().enumerate() {
            if let Some(lap) = frame.drivers.get(driver).and_then(|d| d.lap) {
                laps.entry(lap).or_default().push(idx);
            }
        }
        Self { laps }
    }

    pub fn frames_of(&self, lap: u32) -> Option<&[usize]> {
        self.laps.get(&lap).map(Vec::as_slice)
    }

    pub fn laps(&self) -> impl Iterator<Item = (u32, &[usize])> {
        self.laps.iter().map(|(lap, idx)| (*lap, idx.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.laps.is_empty()
    }
}

/// A driver's fastest complete lap
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FastestLap {
    pub lap: u32,
    /// Global frame indices of the lap, in time order
    pub frames: Vec<usize>,
    /// Race time spanned by the lap's frames
    pub elapsed: f64,
}

impl FastestLap {
    /// Pick the fastest lap among groups with more than `MIN_LAP_FRAMES`
    /// frames. Ties go to the earliest lap.
    pub fn find(frames: &[Frame], index: &LapIndex, metric: LapMetric) -> Option<Self> {
        let mut best: Option<(f64, u32, &[usize])> = None;

        for (lap, idx) in index.laps() {
            if idx.len() <= MIN_LAP_FRAMES {
                continue;
            }
            let score = match metric {
                LapMetric::FrameCount => idx.len() as f64,
                LapMetric::ElapsedTime => span(frames, idx),
            };
            if best.map_or(true, |(best_score, _, _)| score < best_score) {
                best = Some((score, lap, idx));
            }
        }

        best.map(|(_, lap, idx)| FastestLap {
            lap,
            frames: idx.to_vec(),
            elapsed: span(frames, idx),
        })
    }
}

fn span(frames: &[Frame], idx: &[usize]) -> f64 {
    match (idx.first(), idx.last()) {
        (Some(&first), Some(&last)) => frames[last].t - frames[first].t,
        _ => 0.0,
    }
}

/// Resolve the ghost frame index for `driver` at `current_index`.
///
/// Returns None when there is no fastest lap, the driver is absent from the
/// current frame, or the driver has no lap number there.
pub fn ghost_frame_index(
    frames: &[Frame],
    driver: &str,
    index: &LapIndex,
    fastest: Option<&FastestLap>,
    current_index: usize,
) -> Option<usize> {
    let fastest = fastest?;
    let current_lap = frames.get(current_index)?.drivers.get(driver)?.lap?;
    let lap_frames = index.frames_of(current_lap)?;
    let position = lap_frames.binary_search(&current_index).ok()?;

    let progress = position as f64 / lap_frames.len() as f64;
    let ghost_pos = (progress * fastest.frames.len() as f64).floor() as usize;
    fastest.frames.get(ghost_pos).copied()
}
