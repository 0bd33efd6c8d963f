//! F1 Race Replay Core Library
//!
//! This crate provides the race data model, payload ingestion, and the
//! playback algorithms (clock, seeking, track bounds, ghost alignment)
//! shared by every race replay view.

pub mod bounds;
pub mod clock;
pub mod decode;
pub mod error;
pub mod ghost;
pub mod laps;
pub mod model;
pub mod progress;
pub mod source;
pub mod units;

pub use bounds::TrackBounds;
pub use clock::{PlaybackState, Tick};
pub use error::{DecodeError, SourceError};
pub use model::{DriverData, Frame, RaceData, RaceKey};
pub use source::{ProgressFn, RaceSource};
