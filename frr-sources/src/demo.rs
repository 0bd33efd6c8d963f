//! Demo source that generates a synthetic race
//!
//! Simulates a field of cars lapping a circuit with straights, braking zones,
//! corners, and acceleration phases. Each car has its own pace and small
//! lap-to-lap variation, so lap lengths differ and the fastest-lap ghost has
//! something to work with. Output is deterministic apart from `exported_at`.

use chrono::Utc;
use frr_core::model::*;
use frr_core::units::*;
use frr_core::{ProgressFn, RaceKey, RaceSource, SourceError};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::f64::consts::TAU;

// =============================================================================
// Track definition: a sequence of segments that form a lap
// =============================================================================

#[derive(Clone, Copy, PartialEq)]
enum SegmentKind {
    Straight,   // Full throttle, top speed, DRS zone
    Braking,    // Heavy braking into a corner
    Corner,     // Constant-ish speed cornering
    Accel,      // Accelerating out of a corner
}

#[derive(Clone, Copy)]
struct TrackSegment {
    kind: SegmentKind,
    duration: f64,       // seconds to traverse at reference pace
    target_speed: f64,   // km/h at end of segment
}

/// A simple circuit: ~85s lap, mix of corners and straights
fn demo_track() -> Vec<TrackSegment> {
    use SegmentKind::*;
    vec![
        // Start/finish straight
        TrackSegment { kind: Straight, duration: 8.0,  target_speed: 315.0 },
        // T1: heavy braking into slow right-hander
        TrackSegment { kind: Braking,  duration: 3.0,  target_speed: 110.0 },
        TrackSegment { kind: Corner,   duration: 4.0,  target_speed: 95.0 },
        TrackSegment { kind: Accel,    duration: 3.5,  target_speed: 220.0 },
        // Short straight
        TrackSegment { kind: Straight, duration: 4.0,  target_speed: 260.0 },
        // T2: medium braking into fast left-hander
        TrackSegment { kind: Braking,  duration: 2.0,  target_speed: 180.0 },
        TrackSegment { kind: Corner,   duration: 3.5,  target_speed: 170.0 },
        TrackSegment { kind: Accel,    duration: 3.0,  target_speed: 235.0 },
        // Back straight
        TrackSegment { kind: Straight, duration: 10.0, target_speed: 325.0 },
        // T3: chicane
        TrackSegment { kind: Braking,  duration: 2.5,  target_speed: 130.0 },
        TrackSegment { kind: Corner,   duration: 4.0,  target_speed: 115.0 },
        TrackSegment { kind: Accel,    duration: 3.0,  target_speed: 205.0 },
        // Medium straight
        TrackSegment { kind: Straight, duration: 6.0,  target_speed: 285.0 },
        // T4: long sweeping right
        TrackSegment { kind: Braking,  duration: 1.5,  target_speed: 215.0 },
        TrackSegment { kind: Corner,   duration: 5.0,  target_speed: 205.0 },
        TrackSegment { kind: Accel,    duration: 3.0,  target_speed: 245.0 },
        // T5: tight hairpin left
        TrackSegment { kind: Braking,  duration: 3.5,  target_speed: 85.0 },
        TrackSegment { kind: Corner,   duration: 4.5,  target_speed: 75.0 },
        TrackSegment { kind: Accel,    duration: 4.0,  target_speed: 215.0 },
        // Run to start/finish
        TrackSegment { kind: Straight, duration: 6.0,  target_speed: 300.0 },
    ]
}

// =============================================================================
// Interpolation state derived from track position
// =============================================================================

struct LapState {
    kind: SegmentKind,
    speed: f64,
    throttle: f64,
    brake: f64,
    gear: i32,
    rpm: f64,
}

/// Car state at `fraction` (0-1) of the way around the lap
fn compute_lap_state(track: &[TrackSegment], lap_duration: f64, fraction: f64) -> LapState {
    let t = fraction.rem_euclid(1.0) * lap_duration;

    // Find current segment
    let mut elapsed = 0.0;
    let mut seg_idx = track.len() - 1;
    for (i, seg) in track.iter().enumerate() {
        if elapsed + seg.duration > t {
            seg_idx = i;
            break;
        }
        elapsed += seg.duration;
    }
    if seg_idx == track.len() - 1 {
        elapsed = lap_duration - track[seg_idx].duration;
    }

    let seg = track[seg_idx];
    let seg_t = ((t - elapsed) / seg.duration).clamp(0.0, 1.0);

    let prev_target_speed = if seg_idx > 0 {
        track[seg_idx - 1].target_speed
    } else {
        track[track.len() - 1].target_speed
    };

    let smooth_t = smoothstep(seg_t);
    let speed = lerp(prev_target_speed, seg.target_speed, smooth_t);

    let (throttle, brake) = match seg.kind {
        SegmentKind::Straight => (95.0 + 5.0 * (1.0 - seg_t), 0.0),
        SegmentKind::Braking => (0.0, (100.0 - smooth_t * 30.0).clamp(0.0, 100.0)),
        SegmentKind::Corner => (20.0 + 30.0 * seg_t, 0.0),
        SegmentKind::Accel => (50.0 + 50.0 * smooth_t, 0.0),
    };

    let gear = speed_to_gear(speed);
    let rpm = speed_to_rpm(speed, gear);

    LapState {
        kind: seg.kind,
        speed,
        throttle,
        brake,
        gear,
        rpm,
    }
}

fn smoothstep(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn speed_to_gear(kph: f64) -> i32 {
    match kph {
        x if x < 80.0 => 1,
        x if x < 110.0 => 2,
        x if x < 140.0 => 3,
        x if x < 170.0 => 4,
        x if x < 205.0 => 5,
        x if x < 240.0 => 6,
        x if x < 280.0 => 7,
        _ => 8,
    }
}

fn speed_to_rpm(kph: f64, gear: i32) -> f64 {
    // Each gear spans roughly 9000-12000 rpm across its speed band
    let band_top = [80.0, 110.0, 140.0, 170.0, 205.0, 240.0, 280.0, 340.0];
    let top = band_top[(gear.clamp(1, 8) - 1) as usize];
    (kph / top * 12_000.0).clamp(4_000.0, 12_500.0)
}

/// Simple deterministic noise from a seed
fn noise(seed: f64) -> f64 {
    let x = (seed * 12.9898 + 78.233).sin() * 43_758.547;
    x - x.floor()
}

/// Small jitter centered around 0
fn jitter(seed: f64, amplitude: f64) -> f64 {
    (noise(seed) - 0.5) * 2.0 * amplitude
}

/// Circuit outline: a squashed loop with a wobble so it is not a plain ellipse
fn track_point(fraction: f64) -> (f64, f64) {
    let angle = fraction * TAU;
    let wobble = 1.0 + 0.12 * (3.0 * angle).sin();
    (
        2_400.0 * angle.cos() * wobble,
        1_300.0 * angle.sin() * wobble,
    )
}

const TRACK_LENGTH_M: f64 = 5_300.0;

const GRID: [(&str, [u8; 3]); 10] = [
    ("VER", [6, 0, 239]),
    ("HAM", [0, 210, 190]),
    ("NOR", [255, 128, 0]),
    ("LEC", [220, 0, 0]),
    ("SAI", [255, 0, 0]),
    ("PIA", [255, 140, 0]),
    ("RUS", [0, 163, 150]),
    ("PER", [0, 0, 200]),
    ("ALO", [0, 144, 124]),
    ("STR", [0, 103, 85]),
];

// =============================================================================
// Race generation
// =============================================================================

#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Race length in laps
    pub laps: u32,
    /// Seconds between frames
    pub frame_interval: f64,
    /// Number of cars, at most 10
    pub drivers: usize,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            laps: 5,
            frame_interval: 0.1,
            drivers: GRID.len(),
        }
    }
}

struct CarState {
    code: &'static str,
    /// Laps covered, including the fraction of the current one
    progress: f64,
    /// Seconds per lap multiplier (1.0 = reference pace)
    pace: f64,
    tyre: u32,
}

/// Generate a complete synthetic race for `key`
pub fn generate_race(key: RaceKey, config: &DemoConfig) -> RaceData {
    let track = demo_track();
    let lap_duration: f64 = track.iter().map(|s| s.duration).sum();
    let dt = config.frame_interval.max(0.01);
    let seed = key.year as f64 * 31.0 + key.round as f64;

    let mut cars: Vec<CarState> = GRID
        .iter()
        .take(config.drivers.min(GRID.len()))
        .enumerate()
        .map(|(i, (code, _))| CarState {
            code,
            // Staggered grid slots just behind the line
            progress: -(i as f64) * 0.004,
            pace: 1.0 + i as f64 * 0.003 + jitter(seed + i as f64, 0.002),
            tyre: 1 + (i as u32 % 3),
        })
        .collect();

    let mut frames = Vec::new();
    let mut t = 0.0;
    let finish = config.laps as f64;

    loop {
        let mut drivers = BTreeMap::new();

        for (i, car) in cars.iter().enumerate() {
            let lap_fraction = car.progress.rem_euclid(1.0);
            let lap = car.progress.floor().max(0.0) as u32 + 1;
            let state = compute_lap_state(&track, lap_duration, lap_fraction);
            let (x, y) = track_point(lap_fraction);
            let n = seed + t * 7.0 + i as f64;

            let drs = if state.kind == SegmentKind::Straight && lap >= 3 { 12 } else { 8 };

            drivers.insert(
                car.code.to_string(),
                DriverData {
                    x: Meters(x + jitter(n, 1.5)),
                    y: Meters(y + jitter(n * 1.1, 1.5)),
                    speed: Kph((state.speed + jitter(n * 1.2, 2.0)).max(0.0)),
                    throttle: Percent::new(state.throttle + jitter(n * 1.3, 2.0)),
                    brake: Percent::new(state.brake),
                    gear: state.gear,
                    rpm: Rpm(state.rpm + jitter(n * 1.4, 80.0)),
                    drs,
                    dist: Some(car.progress.max(0.0) * TRACK_LENGTH_M),
                    rel_dist: Some(lap_fraction),
                    lap: Some(lap),
                    position: None,
                    tyre: Some(car.tyre),
                },
            );
        }

        // Running order by distance covered
        let mut order: Vec<(&str, f64)> = cars.iter().map(|c| (c.code, c.progress)).collect();
        order.sort_by(|a, b| b.1.total_cmp(&a.1));
        for (rank, (code, _)) in order.iter().enumerate() {
            if let Some(d) = drivers.get_mut(*code) {
                d.position = Some(rank as u32 + 1);
            }
        }

        let leader_lap = order
            .first()
            .map(|(_, p)| p.floor().max(0.0) as u32 + 1)
            .unwrap_or(1)
            .min(config.laps.max(1));

        frames.push(Frame {
            t: (t * 1000.0_f64).round() / 1000.0,
            lap: leader_lap,
            drivers,
            weather: Some(WeatherData {
                track_temp: Some(Celsius(38.0 + (t / 600.0).sin())),
                air_temp: Some(Celsius(24.0)),
                humidity: Some(Percent(45.0)),
                wind_speed: Some(MetersPerSecond(2.1)),
                wind_direction: Some(Degrees(135.0)),
                rain_state: RainState::Dry,
            }),
        });

        if order.first().map_or(true, |(_, p)| *p >= finish) {
            break;
        }

        t += dt;
        for (i, car) in cars.iter_mut().enumerate() {
            let lap_index = car.progress.floor().max(0.0);
            let variation = 1.0 + jitter(seed + lap_index * 13.0 + i as f64 * 101.0, 0.015);
            car.progress += dt / (lap_duration * car.pace * variation);
        }
    }

    let track_layout = (0..200)
        .map(|i| {
            let (x, y) = track_point(i as f64 / 200.0);
            TrackPoint { x: Meters(x), y: Meters(y) }
        })
        .collect();

    let driver_colors = GRID
        .iter()
        .take(cars.len())
        .map(|(code, rgb)| (code.to_string(), Rgb(*rgb)))
        .collect();

    RaceData {
        frames,
        track_layout,
        track_statuses: vec![TrackStatus {
            status: TrackStatusCode::Green,
            start_time: 0.0,
            end_time: None,
        }],
        driver_colors,
        total_laps: Some(config.laps),
        metadata: Some(RaceMetadata {
            year: key.year,
            round: key.round,
            event_name: "Demo Grand Prix".to_string(),
            session_type: SessionType::R,
            exported_at: Utc::now().to_rfc3339(),
        }),
    }
}

// =============================================================================
// DemoSource
// =============================================================================

/// Serves generated races through the `RaceSource` interface
#[derive(Default)]
pub struct DemoSource {
    config: DemoConfig,
}

impl DemoSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DemoConfig) -> Self {
        Self { config }
    }
}

impl RaceSource for DemoSource {
    fn name(&self) -> &str {
        "demo"
    }

    fn fetch<'a>(
        &'a self,
        key: RaceKey,
        progress: ProgressFn<'a>,
    ) -> BoxFuture<'a, Result<String, SourceError>> {
        async move {
            let config = self.config.clone();
            let text = tokio::task::spawn_blocking(move || {
                serde_json::to_string(&generate_race(key, &config))
            })
            .await
            .map_err(|e| SourceError::Transport(format!("demo generator failed: {}", e)))?
            .map_err(|e| SourceError::Transport(format!("demo serialization failed: {}", e)))?;
            progress(100);
            Ok(text)
        }
        .boxed()
    }
}
