//! Run configuration: score weights, signal mode, quantiles, grid settings,
//! and the per-city registry entry.
//!
//! Everything here is validated once, before any city is processed. A
//! rejected configuration is fatal for the invocation but never reaches
//! the scoring code.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Allowed deviation of a weight triple's sum from `1.0`.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// Default fraction of cells that must contain a signal for the signal
/// metric to be used in `auto` mode.
pub const DEFAULT_SPARSITY_THRESHOLD: f64 = 0.05;

/// Default lower band quantile.
pub const DEFAULT_Q_LOW: f64 = 0.30;

/// Default upper band quantile.
pub const DEFAULT_Q_HIGH: f64 = 0.70;

/// Default H3 resolution.
pub const DEFAULT_RESOLUTION: u8 = 8;

/// Default boundary buffer in metres applied before polyfilling.
pub const DEFAULT_BUFFER_M: f64 = 300.0;

/// Highest resolution supported by the H3 grid.
pub const MAX_RESOLUTION: u8 = 15;

/// Configuration errors, rejected before any computation starts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Weights do not sum to 1.0 within [`WEIGHT_SUM_TOLERANCE`].
    #[error("weights must sum to 1.0 (got {sum:.4})")]
    WeightSum {
        /// Actual sum of the supplied weights.
        sum: f64,
    },

    /// A weight is negative or not finite.
    #[error("invalid {name} weight: {value}")]
    InvalidWeight {
        /// Which weight was rejected.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// Intersection and road weights are both zero, so they cannot be
    /// rescaled when signals are dropped.
    #[error("intersection and road weights cannot both be zero")]
    NoBaseWeight,

    /// Weight triple could not be parsed.
    #[error("cannot parse weights '{0}': expected W_INT,W_ROAD,W_SIG")]
    WeightFormat(String),

    /// A quantile lies outside the open interval (0, 1).
    #[error("quantile {name} must be in (0, 1) (got {value})")]
    QuantileRange {
        /// Which quantile was rejected.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// The lower quantile is not strictly below the upper one.
    #[error("q_low ({low}) must be below q_high ({high})")]
    QuantileOrder {
        /// Lower quantile.
        low: f64,
        /// Upper quantile.
        high: f64,
    },

    /// Sparsity threshold lies outside [0, 1].
    #[error("sparsity threshold must be in [0, 1] (got {0})")]
    SparsityThreshold(f64),

    /// H3 resolution above [`MAX_RESOLUTION`].
    #[error("resolution must be in 0..={MAX_RESOLUTION} (got {0})")]
    Resolution(u8),

    /// Negative or non-finite boundary buffer.
    #[error("buffer must be a non-negative distance in metres (got {0})")]
    Buffer(f64),

    /// City slug not present in the registry.
    #[error("unknown city '{slug}' (valid: {valid})")]
    UnknownCity {
        /// The rejected slug.
        slug: String,
        /// Comma-separated list of known slugs.
        valid: String,
    },
}

/// Whether the signal/stop density participates in the composite score.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SignalMode {
    /// Use signals only when enough cells contain one.
    #[default]
    Auto,
    /// Always use signals.
    On,
    /// Never use signals.
    Off,
}

/// Weight triple for the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    /// Intersection density weight.
    pub intersection: f64,
    /// Road density weight.
    pub road: f64,
    /// Signal density weight.
    pub signal: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            intersection: 0.50,
            road: 0.30,
            signal: 0.20,
        }
    }
}

impl Weights {
    /// Creates a weight triple without validating it.
    #[must_use]
    pub const fn new(intersection: f64, road: f64, signal: f64) -> Self {
        Self {
            intersection,
            road,
            signal,
        }
    }

    /// Sum of the three weights.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.intersection + self.road + self.signal
    }

    /// Checks that every weight is finite and non-negative and that the
    /// triple sums to 1.0 within [`WEIGHT_SUM_TOLERANCE`].
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("intersection", self.intersection),
            ("road", self.road),
            ("signal", self.signal),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight { name, value });
            }
        }

        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::WeightSum { sum });
        }

        if self.intersection + self.road <= 0.0 {
            return Err(ConfigError::NoBaseWeight);
        }

        Ok(())
    }

    /// Drops the signal weight and rescales intersection and road so they
    /// sum to 1.0.
    #[must_use]
    pub fn without_signal(&self) -> Self {
        let total = self.intersection + self.road;
        Self {
            intersection: self.intersection / total,
            road: self.road / total,
            signal: 0.0,
        }
    }
}

impl FromStr for Weights {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ConfigError::WeightFormat(s.to_string()))?;

        let [intersection, road, signal] = parts[..] else {
            return Err(ConfigError::WeightFormat(s.to_string()));
        };

        let weights = Self::new(intersection, road, signal);
        weights.validate()?;
        Ok(weights)
    }
}

/// Score Engine and Band Assigner configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreConfig {
    /// Signal usability mode.
    pub signal_mode: SignalMode,
    /// Minimum fraction of cells with a signal for `auto` mode.
    pub sparsity_threshold: f64,
    /// Base weights (used unchanged when signals are usable).
    pub weights: Weights,
    /// Lower band quantile.
    pub q_low: f64,
    /// Upper band quantile.
    pub q_high: f64,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            signal_mode: SignalMode::Auto,
            sparsity_threshold: DEFAULT_SPARSITY_THRESHOLD,
            weights: Weights::default(),
            q_low: DEFAULT_Q_LOW,
            q_high: DEFAULT_Q_HIGH,
        }
    }
}

impl ScoreConfig {
    /// Validates weights, quantiles, and the sparsity threshold.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights.validate()?;

        for (name, value) in [("q_low", self.q_low), ("q_high", self.q_high)] {
            if !(value > 0.0 && value < 1.0) {
                return Err(ConfigError::QuantileRange { name, value });
            }
        }
        if self.q_low >= self.q_high {
            return Err(ConfigError::QuantileOrder {
                low: self.q_low,
                high: self.q_high,
            });
        }

        if !(0.0..=1.0).contains(&self.sparsity_threshold) {
            return Err(ConfigError::SparsityThreshold(self.sparsity_threshold));
        }

        Ok(())
    }
}

/// Tessellation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// H3 resolution.
    pub resolution: u8,
    /// Buffer in metres applied to the city boundary before polyfilling.
    pub buffer_m: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            buffer_m: DEFAULT_BUFFER_M,
        }
    }
}

impl GridConfig {
    /// Validates the resolution and buffer distance.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Resolution`] or [`ConfigError::Buffer`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolution > MAX_RESOLUTION {
            return Err(ConfigError::Resolution(self.resolution));
        }
        if !self.buffer_m.is_finite() || self.buffer_m < 0.0 {
            return Err(ConfigError::Buffer(self.buffer_m));
        }
        Ok(())
    }
}

/// A city definition, deserialized from an embedded TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityConfig {
    /// Filesystem-safe identifier (e.g. `"los_angeles"`).
    pub slug: String,
    /// Human-readable display name.
    pub name: String,
    /// Place query string (e.g. "Seattle, Washington, USA").
    pub osm_query: String,
    /// OSM PBF extract file name, relative to the data directory.
    pub extract: String,
    /// Optional boundary `GeoJSON` file name, relative to the data
    /// directory. Falls back to the road network's convex hull.
    #[serde(default)]
    pub boundary: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_are_valid() {
        assert!(Weights::default().validate().is_ok());
        assert!(ScoreConfig::default().validate().is_ok());
        assert!(GridConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_weights_off_by_more_than_tolerance() {
        let err = Weights::new(0.5, 0.3, 0.3).validate().unwrap_err();
        assert!(matches!(err, ConfigError::WeightSum { .. }), "{err:?}");

        // Within tolerance is accepted.
        assert!(Weights::new(0.5, 0.3, 0.205).validate().is_ok());
    }

    #[test]
    fn rejects_negative_weight() {
        let err = Weights::new(1.2, -0.4, 0.2).validate().unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidWeight {
                name: "road",
                value: -0.4
            }
        );
    }

    #[test]
    fn rejects_signal_only_weights() {
        let err = Weights::new(0.0, 0.0, 1.0).validate().unwrap_err();
        assert_eq!(err, ConfigError::NoBaseWeight);
    }

    #[test]
    fn without_signal_rescales_to_one() {
        let w = Weights::default().without_signal();
        assert!((w.intersection - 0.625).abs() < 1e-12);
        assert!((w.road - 0.375).abs() < 1e-12);
        assert!((w.intersection + w.road - 1.0).abs() < 1e-9);
        assert!(w.signal == 0.0);
    }

    #[test]
    fn parses_weight_triple() {
        let w: Weights = "0.6, 0.4, 0".parse().unwrap();
        assert_eq!(w, Weights::new(0.6, 0.4, 0.0));

        assert!(matches!(
            "0.5,0.5".parse::<Weights>(),
            Err(ConfigError::WeightFormat(_))
        ));
        assert!(matches!(
            "a,b,c".parse::<Weights>(),
            Err(ConfigError::WeightFormat(_))
        ));
        assert!(matches!(
            "0.5,0.5,0.5".parse::<Weights>(),
            Err(ConfigError::WeightSum { .. })
        ));
    }

    #[test]
    fn rejects_bad_quantiles() {
        let config = ScoreConfig {
            q_low: 0.7,
            q_high: 0.3,
            ..ScoreConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::QuantileOrder { .. })
        ));

        let config = ScoreConfig {
            q_high: 1.0,
            ..ScoreConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::QuantileRange { name: "q_high", .. })
        ));
    }

    #[test]
    fn rejects_bad_grid_settings() {
        let grid = GridConfig {
            resolution: 16,
            ..GridConfig::default()
        };
        assert_eq!(grid.validate(), Err(ConfigError::Resolution(16)));

        let grid = GridConfig {
            buffer_m: -1.0,
            ..GridConfig::default()
        };
        assert_eq!(grid.validate(), Err(ConfigError::Buffer(-1.0)));
    }

    #[test]
    fn signal_mode_parses_case_insensitively() {
        assert_eq!("auto".parse::<SignalMode>().unwrap(), SignalMode::Auto);
        assert_eq!("ON".parse::<SignalMode>().unwrap(), SignalMode::On);
        assert_eq!(SignalMode::Off.to_string(), "off");
        assert!("maybe".parse::<SignalMode>().is_err());
    }

    #[test]
    fn city_boundary_is_optional() {
        let city: CityConfig = toml::from_str(
            r#"
            slug = "austin"
            name = "Austin"
            osm_query = "Austin, Texas, USA"
            extract = "texas-latest.osm.pbf"
            "#,
        )
        .unwrap();
        assert_eq!(city.boundary, None);
    }
}
