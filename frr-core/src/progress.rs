//! Download progress estimation
//!
//! Turns byte counts into a 0-100 percentage that never moves backwards.
//! When the transfer size is unknown the percentage is estimated against a
//! fixed payload size and held below 100 until the transfer completes.

/// Typical size of a full race export
pub const ASSUMED_PAYLOAD_BYTES: u64 = 15 * 1024 * 1024;

/// Highest value reported while the total size is unknown
pub const UNKNOWN_SIZE_CEILING: u8 = 95;

#[derive(Debug, Default, Clone)]
pub struct ProgressTracker {
    reported: u8,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the bytes received so far. Returns the new percentage only when
    /// it is strictly greater than anything reported before.
    pub fn observe(&mut self, loaded: u64, total: Option<u64>) -> Option<u8> {
        let percent = match total {
            Some(total) if total > 0 => {
                ((loaded as f64 / total as f64) * 100.0).round().min(100.0) as u8
            }
            _ => {
                let estimate = (loaded as f64 / ASSUMED_PAYLOAD_BYTES as f64) * 100.0;
                estimate.round().min(UNKNOWN_SIZE_CEILING as f64) as u8
            }
        };
        self.bump(percent)
    }

    /// Transfer completed
    pub fn finish(&mut self) -> Option<u8> {
        self.bump(100)
    }

    pub fn reported(&self) -> u8 {
        self.reported
    }

    fn bump(&mut self, percent: u8) -> Option<u8> {
        if percent > self.reported {
            self.reported = percent;
            Some(percent)
        } else {
            None
        }
    }
}
