//! Motion configuration.
//!
//! Example TOML:
//!
//! ```toml
//! [motion]
//! accel_order = 6
//! max_velocity = 300.0
//! max_accel = 3000.0
//! smoothed_accel = 1500.0
//! max_jerk = 100000.0
//!
//! [motion.shaper.x]
//! type = "zv"
//! frequency = 50.0
//! damping = 0.1
//!
//! [motion.smooth]
//! smooth_x = 0.02
//! smooth_y = 0.02
//!
//! [motion.pressure_advance]
//! advance = 0.045
//! smooth_time = 0.04
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Per-move kinematic limit bundle consumed by
/// [`MoveQueue::add_move`](crate::MoveQueue::add_move).
#[derive(Debug, Clone, Copy)]
pub struct MoveLimits {
    /// Desired cruise velocity (mm/s).
    pub velocity: f64,
    /// Acceleration limit (mm/s^2).
    pub accel: f64,
    /// Softer acceleration driving the smoothed look-ahead pass (mm/s^2).
    pub smoothed_accel: f64,
    /// Jerk limit for accel orders 4 and 6 (mm/s^3).
    pub jerk: f64,
    /// Minimum ramp duration; derives the acceleration floor (s).
    pub min_jerk_limit_time: f64,
    /// Bezier profile order: 2, 4 or 6.
    pub accel_order: u32,
    /// Per-move acceleration compensation scalar.
    pub accel_comp: f64,
}

impl Default for MoveLimits {
    fn default() -> Self {
        MotionConfig::default().limits()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub motion: MotionConfig,
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.motion.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        Config::from_toml(&std::fs::read_to_string(path)?)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MotionConfig {
    #[serde(default = "default_accel_order")]
    pub accel_order: u32,
    #[serde(default = "default_max_velocity")]
    pub max_velocity: f64,
    #[serde(default = "default_max_accel")]
    pub max_accel: f64,
    #[serde(default = "default_smoothed_accel")]
    pub smoothed_accel: f64,
    #[serde(default = "default_max_jerk")]
    pub max_jerk: f64,
    #[serde(default = "default_min_jerk_limit_time")]
    pub min_jerk_limit_time: f64,
    #[serde(default)]
    pub accel_comp: f64,
    #[serde(default)]
    pub shaper: HashMap<String, ShaperConfig>,
    #[serde(default)]
    pub smooth: Option<SmoothAxisConfig>,
    #[serde(default)]
    pub pressure_advance: Option<PressureAdvanceConfig>,
}

impl Default for MotionConfig {
    fn default() -> Self {
        MotionConfig {
            accel_order: default_accel_order(),
            max_velocity: default_max_velocity(),
            max_accel: default_max_accel(),
            smoothed_accel: default_smoothed_accel(),
            max_jerk: default_max_jerk(),
            min_jerk_limit_time: default_min_jerk_limit_time(),
            accel_comp: 0.,
            shaper: HashMap::new(),
            smooth: None,
            pressure_advance: None,
        }
    }
}

impl MotionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.accel_order, 2 | 4 | 6) {
            return Err(ConfigError::Invalid(format!(
                "accel_order must be 2, 4 or 6, got {}",
                self.accel_order
            )));
        }
        if self.max_velocity <= 0. || self.max_accel <= 0. || self.max_jerk <= 0. {
            return Err(ConfigError::Invalid(
                "max_velocity, max_accel and max_jerk must be positive".to_string(),
            ));
        }
        for (axis, shaper) in &self.shaper {
            if shaper.frequency <= 0. {
                return Err(ConfigError::Invalid(format!(
                    "shaper frequency for axis {} must be positive",
                    axis
                )));
            }
        }
        Ok(())
    }

    /// The per-move limit bundle for moves queued under this config.
    pub fn limits(&self) -> MoveLimits {
        MoveLimits {
            velocity: self.max_velocity,
            accel: self.max_accel,
            smoothed_accel: self.smoothed_accel,
            jerk: self.max_jerk,
            min_jerk_limit_time: self.min_jerk_limit_time,
            accel_order: self.accel_order,
            accel_comp: self.accel_comp,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShaperConfig {
    pub r#type: String,
    pub frequency: f64,
    #[serde(default = "default_damping")]
    pub damping: f64,
}

impl ShaperConfig {
    /// Period of the damped resonance this shaper is tuned for.
    pub fn damped_spring_period(&self) -> f64 {
        1. / (self.frequency * (1. - self.damping * self.damping).sqrt())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SmoothAxisConfig {
    #[serde(default)]
    pub smooth_x: f64,
    #[serde(default)]
    pub smooth_y: f64,
    #[serde(default)]
    pub accel_comp_x: f64,
    #[serde(default)]
    pub accel_comp_y: f64,
    #[serde(default)]
    pub damping_comp_x: f64,
    #[serde(default)]
    pub damping_comp_y: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PressureAdvanceConfig {
    pub advance: f64,
    #[serde(default = "default_pa_smooth_time")]
    pub smooth_time: f64,
}

fn default_accel_order() -> u32 {
    2
}

fn default_max_velocity() -> f64 {
    300.
}

fn default_max_accel() -> f64 {
    3000.
}

fn default_smoothed_accel() -> f64 {
    1500.
}

fn default_max_jerk() -> f64 {
    100_000.
}

fn default_min_jerk_limit_time() -> f64 {
    0.02
}

fn default_damping() -> f64 {
    0.1
}

fn default_pa_smooth_time() -> f64 {
    0.04
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_motion_section() {
        let text = r#"
[motion]
accel_order = 6
max_velocity = 250.0
max_accel = 4000.0
max_jerk = 80000.0

[motion.shaper.x]
type = "zv"
frequency = 50.0
damping = 0.1

[motion.pressure_advance]
advance = 0.045
"#;
        let config = Config::from_toml(text).unwrap();
        assert_eq!(config.motion.accel_order, 6);
        assert_eq!(config.motion.max_velocity, 250.);
        // defaults fill the rest
        assert_eq!(config.motion.min_jerk_limit_time, 0.02);
        assert_eq!(config.motion.shaper["x"].frequency, 50.);
        let pa = config.motion.pressure_advance.as_ref().unwrap();
        assert_eq!(pa.advance, 0.045);
        assert_eq!(pa.smooth_time, 0.04);
        let limits = config.motion.limits();
        assert_eq!(limits.accel_order, 6);
        assert_eq!(limits.accel, 4000.);
    }

    #[test]
    fn rejects_bad_accel_order() {
        let text = "[motion]\naccel_order = 3\n";
        assert!(Config::from_toml(text).is_err());
    }

    #[test]
    fn rejects_bad_shaper_frequency() {
        let text = "[motion.shaper.x]\ntype = \"zv\"\nfrequency = 0.0\n";
        assert!(Config::from_toml(text).is_err());
    }
}
