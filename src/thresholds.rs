//! Threshold registry for the aquaponics monitoring service.
//!
//! Defines the calibrated ranges for every monitored parameter. This is the
//! single source of truth for alerting bounds; all other modules should look
//! thresholds up here rather than hardcoding numbers. Changing a value here
//! changes alerting behavior for every pond.

use crate::model::Parameter;

// ---------------------------------------------------------------------------
// Range types
// ---------------------------------------------------------------------------

/// Inclusive bounds of one band. An absent side is not enforced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Bounds {
    pub const fn between(min: f64, max: f64) -> Self {
        Bounds { min: Some(min), max: Some(max) }
    }

    pub const fn at_least(min: f64) -> Self {
        Bounds { min: Some(min), max: None }
    }

    /// True when `value` lies below the lower bound.
    pub fn is_below(&self, value: f64) -> bool {
        self.min.is_some_and(|min| value < min)
    }

    /// True when `value` lies above the upper bound.
    pub fn is_above(&self, value: f64) -> bool {
        self.max.is_some_and(|max| value > max)
    }

    pub fn contains(&self, value: f64) -> bool {
        !self.is_below(value) && !self.is_above(value)
    }

    /// Midpoint of the band, used to tell low breaches from high ones.
    ///
    /// With one side absent there is no midpoint; every breach of a
    /// lower-only band is low and every breach of an upper-only band is
    /// high.
    pub fn midpoint(&self) -> Option<f64> {
        match (self.min, self.max) {
            (Some(min), Some(max)) => Some((min + max) / 2.0),
            _ => None,
        }
    }
}

/// Three nested bands for a two-sided parameter.
///
/// Bands nest outward: critical ⊇ warning ⊇ optimal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TieredThresholds {
    pub optimal: Bounds,
    pub warning: Bounds,
    pub critical: Bounds,
}

/// Single-sided refill threshold for feed weight, in kilograms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefillThreshold {
    pub refill: Bounds,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdSpec {
    Tiered(TieredThresholds),
    Refill(RefillThreshold),
}

/// Registry entry for one monitored parameter.
pub struct ThresholdEntry {
    pub parameter: Parameter,
    /// Human-readable name used in notification messages.
    pub label: &'static str,
    pub spec: ThresholdSpec,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Grams per kilogram. The scale reports grams; refill bounds are in kg.
pub const GRAMS_PER_KILOGRAM: f64 = 1000.0;

/// Calibrated thresholds for tilapia in freshwater fishponds.
pub static THRESHOLD_TABLE: &[ThresholdEntry] = &[
    ThresholdEntry {
        parameter: Parameter::Ph,
        label: "pH level",
        spec: ThresholdSpec::Tiered(TieredThresholds {
            optimal: Bounds::between(6.5, 8.5),
            warning: Bounds::between(6.5, 8.5),
            critical: Bounds::between(6.0, 9.0),
        }),
    },
    ThresholdEntry {
        parameter: Parameter::DissolvedOxygen,
        label: "Dissolved Oxygen level",
        spec: ThresholdSpec::Tiered(TieredThresholds {
            optimal: Bounds::between(5.0, 7.0),
            warning: Bounds::at_least(4.5), // no upper warning limit
            critical: Bounds::at_least(3.0), // no upper critical limit
        }),
    },
    ThresholdEntry {
        parameter: Parameter::Temperature,
        label: "Temperature",
        spec: ThresholdSpec::Tiered(TieredThresholds {
            optimal: Bounds::between(26.0, 30.0),
            warning: Bounds::between(24.0, 31.0),
            critical: Bounds::between(22.0, 32.0),
        }),
    },
    ThresholdEntry {
        parameter: Parameter::Conductivity,
        label: "EC level",
        spec: ThresholdSpec::Tiered(TieredThresholds {
            optimal: Bounds::between(500.0, 1500.0),
            warning: Bounds::between(500.0, 1500.0),
            critical: Bounds::between(250.0, 2000.0),
        }),
    },
    ThresholdEntry {
        parameter: Parameter::FeedWeight,
        label: "Feed level",
        // 1 kg or less left in the hopper triggers a refill notification.
        spec: ThresholdSpec::Refill(RefillThreshold {
            refill: Bounds::between(0.0, 1.0),
        }),
    },
];

/// Looks up the registry entry for a parameter.
///
/// The table is ordered like `Parameter::ALL`, one entry per variant.
pub fn entry_for(parameter: Parameter) -> &'static ThresholdEntry {
    &THRESHOLD_TABLE[parameter as usize]
}

/// Looks up an entry by table key or record name (`"pH"`, `"temperature"`,
/// `"Weight"`, ...). Returns `None` for unknown names.
pub fn find_entry(name: &str) -> Option<&'static ThresholdEntry> {
    Parameter::from_name(name).map(entry_for)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
