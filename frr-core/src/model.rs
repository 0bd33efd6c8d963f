//! Race replay data model
//!
//! Mirrors the JSON schema written by the race export pipeline. A `RaceData`
//! is immutable once loaded: frames are ordered by time and every consumer
//! (clock, bounds sampling, lap grouping) relies on that ordering.
//!
//! Coordinate system: world-space meters on the track plane
//! - X: east
//! - Y: north

use crate::units::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// DRS values at or above this threshold mean the flap is open
pub const DRS_OPEN_THRESHOLD: i32 = 10;

/// Identifies one race session in storage and in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RaceKey {
    pub year: u16,
    pub round: u8,
}

impl RaceKey {
    pub fn new(year: u16, round: u8) -> Self {
        Self { year, round }
    }

    /// Key used by the local cache (`"2024-1"`)
    pub fn cache_key(&self) -> String {
        format!("{}-{}", self.year, self.round)
    }

    /// Object storage path (`races/2024/1.json`)
    pub fn object_path(&self) -> String {
        format!("races/{}/{}.json", self.year, self.round)
    }
}

impl fmt::Display for RaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} round {}", self.year, self.round)
    }
}

/// Complete race data structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceData {
    /// Telemetry frames, non-decreasing in `t`
    pub frames: Vec<Frame>,

    /// Circuit polyline
    #[serde(default)]
    pub track_layout: Vec<TrackPoint>,

    /// Track status periods (safety car, VSC, red flag, ...)
    #[serde(default)]
    pub track_statuses: Vec<TrackStatus>,

    /// Driver colours keyed by driver code
    #[serde(default)]
    pub driver_colors: BTreeMap<String, Rgb>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_laps: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RaceMetadata>,
}

/// A single point-in-time snapshot of every car
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Seconds from race start
    pub t: f64,

    /// Lap attributed to this frame (the leader's lap)
    #[serde(default, deserialize_with = "lenient::u32_or_zero")]
    pub lap: u32,

    /// Driver telemetry keyed by driver code ("VER", "HAM", ...).
    /// A driver missing from a frame is simply not on track.
    #[serde(default)]
    pub drivers: BTreeMap<String, DriverData>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<WeatherData>,
}

/// Telemetry for a single driver at a single frame
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DriverData {
    #[serde(default = "Meters::default")]
    pub x: Meters,
    #[serde(default = "Meters::default")]
    pub y: Meters,
    #[serde(default)]
    pub speed: Kph,
    #[serde(default)]
    pub throttle: Percent,
    /// Canonical 0-100 scale after ingestion
    #[serde(default)]
    pub brake: Percent,
    #[serde(default, deserialize_with = "lenient::i32_or_zero")]
    pub gear: i32,
    #[serde(default)]
    pub rpm: Rpm,
    #[serde(default, deserialize_with = "lenient::i32_or_zero")]
    pub drs: i32,

    /// Race distance covered in meters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dist: Option<f64>,
    /// Relative distance around the lap (0-1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel_dist: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub lap: Option<u32>,
    /// 1-based race rank
    #[serde(
        default,
        deserialize_with = "lenient::opt_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub position: Option<u32>,
    /// Tyre compound code
    #[serde(
        default,
        deserialize_with = "lenient::opt_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub tyre: Option<u32>,
}

impl DriverData {
    /// World position, or None when the car has no usable coordinates
    pub fn position_xy(&self) -> Option<(f64, f64)> {
        if self.x.is_finite() && self.y.is_finite() {
            Some((self.x.0, self.y.0))
        } else {
            None
        }
    }

    pub fn is_drs_open(&self) -> bool {
        self.drs >= DRS_OPEN_THRESHOLD
    }
}

/// Weather snapshot for a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherData {
    #[serde(default)]
    pub track_temp: Option<Celsius>,
    #[serde(default)]
    pub air_temp: Option<Celsius>,
    #[serde(default)]
    pub humidity: Option<Percent>,
    #[serde(default)]
    pub wind_speed: Option<MetersPerSecond>,
    #[serde(default)]
    pub wind_direction: Option<Degrees>,
    #[serde(default)]
    pub rain_state: RainState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RainState {
    #[default]
    Dry,
    Raining,
}

/// Track status period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackStatus {
    pub status: TrackStatusCode,
    #[serde(deserialize_with = "lenient::f64_or_zero")]
    pub start_time: f64,
    /// None while the status was still active at export time
    pub end_time: Option<f64>,
}

impl TrackStatus {
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start_time && self.end_time.map_or(true, |end| t <= end)
    }
}

/// Race control status codes as exported ("1", "2", "4", ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrackStatusCode {
    Green,
    Yellow,
    SafetyCar,
    Red,
    Vsc,
    VscEnding,
    Other(String),
}

impl TrackStatusCode {
    pub fn code(&self) -> &str {
        match self {
            TrackStatusCode::Green => "1",
            TrackStatusCode::Yellow => "2",
            TrackStatusCode::SafetyCar => "4",
            TrackStatusCode::Red => "5",
            TrackStatusCode::Vsc => "6",
            TrackStatusCode::VscEnding => "7",
            TrackStatusCode::Other(code) => code,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrackStatusCode::Green => "TRACK CLEAR",
            TrackStatusCode::Yellow => "YELLOW FLAG",
            TrackStatusCode::SafetyCar => "SAFETY CAR",
            TrackStatusCode::Red => "RED FLAG",
            TrackStatusCode::Vsc => "VIRTUAL SAFETY CAR",
            TrackStatusCode::VscEnding => "VSC ENDING",
            TrackStatusCode::Other(_) => "UNKNOWN",
        }
    }
}

impl From<&str> for TrackStatusCode {
    fn from(code: &str) -> Self {
        match code {
            "1" => TrackStatusCode::Green,
            "2" => TrackStatusCode::Yellow,
            "4" => TrackStatusCode::SafetyCar,
            "5" => TrackStatusCode::Red,
            "6" => TrackStatusCode::Vsc,
            "7" => TrackStatusCode::VscEnding,
            other => TrackStatusCode::Other(other.to_string()),
        }
    }
}

impl Serialize for TrackStatusCode {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for TrackStatusCode {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        // Some exports write the code as a bare number
        let value = serde_json::Value::deserialize(d)?;
        match value {
            serde_json::Value::String(s) => Ok(TrackStatusCode::from(s.as_str())),
            serde_json::Value::Number(n) => Ok(TrackStatusCode::from(n.to_string().as_str())),
            other => Err(serde::de::Error::custom(format!(
                "invalid track status code: {}",
                other
            ))),
        }
    }
}

/// A point on the circuit polyline. A missing coordinate is NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    #[serde(default = "Meters::default")]
    pub x: Meters,
    #[serde(default = "Meters::default")]
    pub y: Meters,
}

/// RGB colour as `[r, g, b]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(#[serde(deserialize_with = "lenient::rgb")] pub [u8; 3]);

/// Race metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceMetadata {
    pub year: u16,
    pub round: u8,
    pub event_name: String,
    pub session_type: SessionType,
    pub exported_at: String,
}

/// Session type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionType {
    /// Race
    R,
    /// Sprint
    S,
    /// Qualifying
    Q,
    /// Sprint qualifying
    SQ,
}

impl RaceData {
    /// Sorted unique lap numbers present in the frames
    pub fn available_laps(&self) -> Vec<u32> {
        self.frames
            .iter()
            .map(|f| f.lap)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Every driver code that appears in any frame
    pub fn driver_codes(&self) -> Vec<String> {
        self.frames
            .iter()
            .flat_map(|f| f.drivers.keys())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Track status in effect at race time `t`; green when no period covers it
    pub fn track_status_at(&self, t: f64) -> TrackStatusCode {
        self.track_statuses
            .iter()
            .find(|s| s.contains(t))
            .map(|s| s.status.clone())
            .unwrap_or(TrackStatusCode::Green)
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Frame {
    /// Driver codes ordered by race position; drivers without a position go last
    pub fn running_order(&self) -> Vec<&str> {
        let mut order: Vec<(&String, &DriverData)> = self.drivers.iter().collect();
        order.sort_by_key(|(_, d)| d.position.unwrap_or(u32::MAX));
        order.into_iter().map(|(code, _)| code.as_str()).collect()
    }
}

/// Deserializers that accept the loose numeric encodings found in exports:
/// `null`, and integers written as floats (`3.0`).
mod lenient {
    use serde::{Deserialize, Deserializer};

    pub fn opt_u32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        let v = Option::<f64>::deserialize(d)?;
        Ok(v.filter(|v| v.is_finite() && *v >= 0.0).map(|v| v as u32))
    }

    pub fn u32_or_zero<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        Ok(opt_u32(d)?.unwrap_or(0))
    }

    pub fn i32_or_zero<'de, D: Deserializer<'de>>(d: D) -> Result<i32, D::Error> {
        let v = Option::<f64>::deserialize(d)?;
        Ok(v.filter(|v| v.is_finite()).map(|v| v as i32).unwrap_or(0))
    }

    pub fn f64_or_zero<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        let v = Option::<f64>::deserialize(d)?;
        Ok(v.filter(|v| v.is_finite()).unwrap_or(0.0))
    }

    /// Colour channels, with `null` as 0 and out-of-range values clamped
    pub fn rgb<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 3], D::Error> {
        let [r, g, b] = <[Option<f64>; 3]>::deserialize(d)?;
        let channel = |v: Option<f64>| {
            v.filter(|v| v.is_finite())
                .map(|v| v.round().clamp(0.0, 255.0) as u8)
                .unwrap_or(0)
        };
        Ok([channel(r), channel(g), channel(b)])
    }
}
