//! Payload ingestion
//!
//! Strict JSON decode first. Older exports may contain bare `NaN` /
//! `Infinity` tokens, which are not JSON; those payloads are rewritten with
//! `null` in place of every non-finite token and decoded once more. After
//! decoding, the frame ordering invariant is checked and brake values are
//! normalized to the 0-100 scale.

use crate::error::DecodeError;
use crate::model::RaceData;
use crate::units::Percent;
use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Result of a successful decode
#[derive(Debug)]
pub struct Decoded {
    pub data: RaceData,
    /// True when the payload needed the non-finite token rewrite
    pub sanitized: bool,
    /// True when brake values were promoted from 0-1 to 0-100
    pub brake_rescaled: bool,
}

fn non_finite_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"-?\b(?:NaN|Infinity)\b").expect("static regex is valid")
    })
}

/// Replace bare `NaN`, `Infinity` and `-Infinity` tokens with `null`
pub fn sanitize_non_finite(text: &str) -> Cow<'_, str> {
    non_finite_token().replace_all(text, "null")
}

/// Decode, validate and normalize a race payload
pub fn decode_race(text: &str) -> Result<Decoded, DecodeError> {
    let (mut data, sanitized) = match serde_json::from_str::<RaceData>(text) {
        Ok(data) => (data, false),
        Err(strict_err) => {
            debug!("Strict decode failed ({}), retrying with sanitized payload", strict_err);
            let cleaned = sanitize_non_finite(text);
            if matches!(cleaned, Cow::Borrowed(_)) {
                // Nothing to rewrite, so a retry would fail identically
                return Err(DecodeError::Json(strict_err));
            }
            let data = serde_json::from_str::<RaceData>(&cleaned)?;
            warn!("Sanitized non-finite values in race payload");
            (data, true)
        }
    };

    validate_frame_order(&data)?;
    let brake_rescaled = normalize_brake_scale(&mut data);

    Ok(Decoded {
        data,
        sanitized,
        brake_rescaled,
    })
}

/// Frames must be non-decreasing in time
pub fn validate_frame_order(data: &RaceData) -> Result<(), DecodeError> {
    for (index, pair) in data.frames.windows(2).enumerate() {
        if pair[1].t < pair[0].t {
            return Err(DecodeError::OutOfOrder {
                index: index + 1,
                previous: pair[0].t,
                current: pair[1].t,
            });
        }
    }
    Ok(())
}

/// Bring brake values onto the 0-100 scale used by throttle.
///
/// Producers disagree: some export 0-100, some a 0-1 fraction (or a 0/1
/// flag). The scale is decided for the whole dataset: if every finite brake
/// value lies in [0, 1] and at least one is non-zero, all values are
/// multiplied by 100. Returns whether a rescale happened.
pub fn normalize_brake_scale(data: &mut RaceData) -> bool {
    let mut any_nonzero = false;
    for d in data.frames.iter().flat_map(|f| f.drivers.values()) {
        let b = d.brake.0;
        if !b.is_finite() {
            continue;
        }
        if b > 1.0 || b < 0.0 {
            return false;
        }
        if b > 0.0 {
            any_nonzero = true;
        }
    }
    if !any_nonzero {
        return false;
    }

    for d in data.frames.iter_mut().flat_map(|f| f.drivers.values_mut()) {
        d.brake = Percent::from_fraction(d.brake.0);
    }
    true
}
