//! Type-safe wrappers for physical units
//!
//! This module provides newtype wrappers around f64 to ensure
//! type safety and prevent unit confusion.
//!
//! Race exports produced by older pipelines may carry `null` where a number
//! is expected (non-finite values are rewritten to `null` during ingestion),
//! so every unit deserializes `null` to a per-unit fallback value.

use serde::{Deserialize, Deserializer, Serialize};

macro_rules! unit {
    ($(#[$meta:meta])* $name:ident, null = $null:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub f64);

        impl $name {
            /// Value used when the export carries `null` for this unit
            pub const NULL: $name = $name($null);
        }

        impl Default for $name {
            fn default() -> Self {
                Self::NULL
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                Ok(Option::<f64>::deserialize(d)?.map($name).unwrap_or(Self::NULL))
            }
        }

        impl From<f64> for $name {
            fn from(v: f64) -> Self {
                $name(v)
            }
        }
    };
}

unit!(
    /// World-space meters. A missing coordinate becomes NaN, which every
    /// spatial consumer treats as "not on track".
    Meters,
    null = f64::NAN
);

unit!(
    /// Kilometres per hour
    Kph,
    null = 0.0
);

unit!(
    /// Percentage on the 0-100 scale
    Percent,
    null = 0.0
);

unit!(
    /// Revolutions per minute
    Rpm,
    null = 0.0
);

unit!(
    /// Celsius
    Celsius,
    null = 0.0
);

unit!(
    /// Meters per second
    MetersPerSecond,
    null = 0.0
);

unit!(
    /// Compass degrees
    Degrees,
    null = 0.0
);

impl Meters {
    pub fn is_finite(&self) -> bool {
        self.0.is_finite()
    }
}

impl Percent {
    /// Create a new percentage, clamping to [0.0, 100.0]
    pub fn new(value: f64) -> Self {
        Self(value.clamp(0.0, 100.0))
    }

    /// Promote a 0-1 fraction to the 0-100 scale
    pub fn from_fraction(fraction: f64) -> Self {
        Self(fraction * 100.0)
    }
}
