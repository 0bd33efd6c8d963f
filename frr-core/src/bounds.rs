//! Track bounds estimation
//!
//! Spatial views normalize world coordinates against a padded bounding box
//! of car positions. Only every `SAMPLE_STRIDE`-th frame is scanned, which
//! keeps the cost small on full-race datasets at the price of a slightly
//! looser box; the 20% padding absorbs the difference.

use crate::model::Frame;
use serde::{Deserialize, Serialize};

/// Every Nth frame is sampled
pub const SAMPLE_STRIDE: usize = 10;

/// Padding on each side, as a fraction of the larger dimension
pub const PADDING_RATIO: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackBounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub width: f64,
    pub height: f64,
}

impl TrackBounds {
    /// Estimate bounds from sampled car positions. Returns None when no
    /// sampled frame has a car with usable coordinates.
    pub fn estimate(frames: &[Frame]) -> Option<Self> {
        let mut min_x = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        let mut seen = false;

        for frame in frames.iter().step_by(SAMPLE_STRIDE) {
            for (x, y) in frame.drivers.values().filter_map(|d| d.position_xy()) {
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
                seen = true;
            }
        }

        if !seen {
            return None;
        }

        let width = max_x - min_x;
        let height = max_y - min_y;
        let padding = width.max(height) * PADDING_RATIO;

        Some(Self {
            min_x: min_x - padding,
            max_x: max_x + padding,
            min_y: min_y - padding,
            max_y: max_y + padding,
            width: width + 2.0 * padding,
            height: height + 2.0 * padding,
        })
    }

    /// Map a world position into [0, 1] on both axes
    pub fn normalize(&self, x: f64, y: f64) -> (f64, f64) {
        let nx = if self.width > 0.0 { (x - self.min_x) / self.width } else { 0.5 };
        let ny = if self.height > 0.0 { (y - self.min_y) / self.height } else { 0.5 };
        (nx, ny)
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DriverData;
    use crate::units::Meters;
    use std::collections::BTreeMap;

    fn frame_with(points: &[(&str, f64, f64)]) -> Frame {
        Frame {
            t: 0.0,
            lap: 1,
            drivers: points
                .iter()
                .map(|(code, x, y)| {
                    (
                        code.to_string(),
                        DriverData {
                            x: Meters(*x),
                            y: Meters(*y),
                            ..Default::default()
                        },
                    )
                })
                .collect(),
            weather: None,
        }
    }

    #[test]
    fn test_padding_is_twenty_percent_of_larger_span() {
        // Raw extent: x in [0, 1000], y in [0, 500]
        let frames = vec![frame_with(&[("VER", 0.0, 0.0), ("HAM", 1000.0, 500.0), ("LEC", 400.0, 250.0)])];
        let b = TrackBounds::estimate(&frames).unwrap();

        assert_eq!(b.min_x, -200.0);
        assert_eq!(b.max_x, 1200.0);
        assert_eq!(b.min_y, -200.0);
        assert_eq!(b.max_y, 700.0);
        assert_eq!(b.width, 1000.0 + 400.0);
        assert_eq!(b.height, 500.0 + 400.0);

        for (x, y) in [(0.0, 0.0), (1000.0, 500.0), (400.0, 250.0)] {
            assert!(x > b.min_x && x < b.max_x);
            assert!(y > b.min_y && y < b.max_y);
        }
    }

    #[test]
    fn test_only_every_tenth_frame_is_sampled() {
        let mut frames: Vec<Frame> = (0..20).map(|_| frame_with(&[("VER", 0.0, 0.0), ("HAM", 10.0, 10.0)])).collect();
        // Frame 5 is never sampled, so its outlier must not widen the box
        frames[5] = frame_with(&[("VER", 10_000.0, 10_000.0)]);
        let b = TrackBounds::estimate(&frames).unwrap();
        assert_eq!(b.max_x, 12.0);
        assert_eq!(b.max_y, 12.0);
    }

    #[test]
    fn test_missing_coordinates_are_skipped() {
        let frames = vec![frame_with(&[("VER", 0.0, 0.0), ("HAM", f64::NAN, 3.0), ("LEC", 10.0, 10.0)])];
        let b = TrackBounds::estimate(&frames).unwrap();
        assert_eq!(b.min_x, -2.0);
        assert_eq!(b.max_x, 12.0);
    }

    #[test]
    fn test_no_frames_no_bounds() {
        assert_eq!(TrackBounds::estimate(&[]), None);
        assert_eq!(TrackBounds::estimate(&[frame_with(&[])]), None);
    }

    #[test]
    fn test_normalize_and_contains() {
        let frames = vec![frame_with(&[("VER", 0.0, 0.0), ("HAM", 100.0, 100.0)])];
        let b = TrackBounds::estimate(&frames).unwrap();
        let (nx, ny) = b.normalize(50.0, 50.0);
        assert!((nx - 0.5).abs() < 1e-9);
        assert!((ny - 0.5).abs() < 1e-9);
        assert!(b.contains(100.0, 0.0));
        assert!(!b.contains(500.0, 0.0));
    }

    #[test]
    fn test_single_point_has_zero_size() {
        let frames = vec![frame_with(&[("VER", 5.0, 5.0)])];
        let b = TrackBounds::estimate(&frames).unwrap();
        assert_eq!(b.width, 0.0);
        assert_eq!(b.normalize(5.0, 5.0), (0.5, 0.5));
    }
}
