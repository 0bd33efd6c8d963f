//! Lap analytics for the tyre and head-to-head views

use crate::model::Frame;
use serde::Serialize;
use std::collections::BTreeMap;

/// Lap times outside (0, MAX_LAP_SECONDS) are pit stops or neutralised laps
pub const MAX_LAP_SECONDS: f64 = 180.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LapTime {
    pub lap: u32,
    /// Seconds, rounded to hundredths
    pub time: f64,
}

/// Approximate lap times for `driver`, from the time span of the frames in
/// each leader lap that contain the driver.
///
/// The first lap present in the data is skipped because it includes the
/// standing start.
pub fn lap_times(frames: &[Frame], driver: &str) -> Vec<LapTime> {
    let mut by_lap: BTreeMap<u32, (f64, f64, usize)> = BTreeMap::new();
    let first_lap = frames.iter().map(|f| f.lap).min();

    for frame in frames.iter().filter(|f| f.drivers.contains_key(driver)) {
        let entry = by_lap.entry(frame.lap).or_insert((frame.t, frame.t, 0));
        entry.0 = entry.0.min(frame.t);
        entry.1 = entry.1.max(frame.t);
        entry.2 += 1;
    }

    by_lap
        .into_iter()
        .filter(|(lap, _)| Some(*lap) != first_lap)
        .filter(|(_, (_, _, count))| *count >= 2)
        .filter_map(|(lap, (first, last, _))| {
            let time = last - first;
            (time > 0.0 && time < MAX_LAP_SECONDS).then(|| LapTime {
                lap,
                time: (time * 100.0).round() / 100.0,
            })
        })
        .collect()
}

/// Comparison of two drivers at one frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadToHead {
    pub driver: String,
    pub rival: String,
    /// Negative when `driver` is ahead
    pub position_diff: i64,
    pub lap_diff: i64,
    /// Code of the driver ahead, None when level
    pub leader: Option<String>,
}

impl HeadToHead {
    /// None unless both drivers are present in the frame
    pub fn compare(frame: &Frame, driver: &str, rival: &str) -> Option<Self> {
        let a = frame.drivers.get(driver)?;
        let b = frame.drivers.get(rival)?;

        let position_diff = a.position.unwrap_or(0) as i64 - b.position.unwrap_or(0) as i64;
        let lap_diff = a.lap.unwrap_or(0) as i64 - b.lap.unwrap_or(0) as i64;
        let leader = match position_diff {
            d if d < 0 => Some(driver.to_string()),
            d if d > 0 => Some(rival.to_string()),
            _ => None,
        };

        Some(Self {
            driver: driver.to_string(),
            rival: rival.to_string(),
            position_diff,
            lap_diff,
            leader,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DriverData;

    fn frame(t: f64, lap: u32, drivers: &[(&str, u32, u32)]) -> Frame {
        Frame {
            t,
            lap,
            drivers: drivers
                .iter()
                .map(|(code, position, lap)| {
                    (
                        code.to_string(),
                        DriverData {
                            position: Some(*position),
                            lap: Some(*lap),
                            ..Default::default()
                        },
                    )
                })
                .collect(),
            weather: None,
        }
    }

    #[test]
    fn test_lap_times_skip_first_lap_and_outliers() {
        let mut frames = Vec::new();
        // Lap 1: 0..95, lap 2: 100..190.126, lap 3: 200..500 (pit/red flag)
        frames.push(frame(0.0, 1, &[("VER", 1, 1)]));
        frames.push(frame(95.0, 1, &[("VER", 1, 1)]));
        frames.push(frame(100.0, 2, &[("VER", 1, 2)]));
        frames.push(frame(190.126, 2, &[("VER", 1, 2)]));
        frames.push(frame(200.0, 3, &[("VER", 1, 3)]));
        frames.push(frame(500.0, 3, &[("VER", 1, 3)]));

        let times = lap_times(&frames, "VER");
        assert_eq!(times, vec![LapTime { lap: 2, time: 90.13 }]);
    }

    #[test]
    fn test_lap_times_ignore_frames_without_driver() {
        let frames = vec![
            frame(0.0, 1, &[("VER", 1, 1)]),
            frame(10.0, 2, &[("VER", 1, 2)]),
            frame(50.0, 2, &[("VER", 1, 2)]),
            frame(60.0, 2, &[("HAM", 2, 2)]),
        ];
        assert_eq!(lap_times(&frames, "VER"), vec![LapTime { lap: 2, time: 40.0 }]);
        assert!(lap_times(&frames, "LEC").is_empty());
    }

    #[test]
    fn test_head_to_head() {
        let f = frame(0.0, 5, &[("VER", 1, 5), ("HAM", 4, 4)]);
        let h = HeadToHead::compare(&f, "HAM", "VER").unwrap();
        assert_eq!(h.position_diff, 3);
        assert_eq!(h.lap_diff, -1);
        assert_eq!(h.leader.as_deref(), Some("VER"));

        assert!(HeadToHead::compare(&f, "HAM", "LEC").is_none());
    }
}
