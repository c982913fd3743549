//! Startup configuration - defaults, optional file overrides, positional arguments

use serde::Deserialize;
use thiserror::Error;

use crate::controller::PidGains;

/// Ceiling applied to the throttle saturation value no matter what was
/// configured.
pub const MAX_THROTTLE_SATURATION_US: u16 = 2000;

pub const DEFAULT_FREQUENCY_HZ: u32 = 100;
pub const DEFAULT_SERVO_TRIM_US: u16 = 1500;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("frequency must be more than 0")]
    NonPositiveFrequency,

    #[error("unsupported argument count {0}: expected 0, 1, 2, 5 or 6 values")]
    UnsupportedArgCount(usize),

    #[error("could not parse {name} from '{value}'")]
    Malformed { name: &'static str, value: String },
}

/// Resolved startup parameters, fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlConfig {
    pub frequency_hz: u32,
    pub saturation_us: u16,
    pub gains: PidGains,
    pub servo_trim_us: u16,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            saturation_us: MAX_THROTTLE_SATURATION_US,
            gains: PidGains::default(),
            servo_trim_us: DEFAULT_SERVO_TRIM_US,
        }
    }
}

impl ControlConfig {
    /// Fold optional file overrides over the built-in defaults.
    pub fn merged(mut self, overrides: &ConfigOverrides) -> Self {
        if let Some(hz) = overrides.frequency_hz {
            self.frequency_hz = hz;
        }
        if let Some(us) = overrides.saturation_us {
            self.saturation_us = us.min(MAX_THROTTLE_SATURATION_US);
        }
        if let Some(kp) = overrides.kp {
            self.gains.kp = kp;
        }
        if let Some(ki) = overrides.ki {
            self.gains.ki = ki;
        }
        if let Some(kd) = overrides.kd {
            self.gains.kd = kd;
        }
        if let Some(us) = overrides.servo_trim_us {
            self.servo_trim_us = us;
        }
        self
    }

    /// Apply positional startup values. Only the group sizes 0, 1, 2, 5 and
    /// 6 are accepted: `[freq] [saturation] [kp ki kd] [trim]`. Supplying
    /// some but not all of the gain group is rejected rather than partially
    /// applied.
    pub fn apply_args(mut self, args: &[String]) -> Result<Self, ConfigError> {
        match args.len() {
            0 => {}
            1 => {
                self.frequency_hz = parse_frequency(&args[0])?;
            }
            2 => {
                self.frequency_hz = parse_frequency(&args[0])?;
                self.saturation_us = parse_saturation(&args[1])?;
            }
            5 => {
                self.frequency_hz = parse_frequency(&args[0])?;
                self.saturation_us = parse_saturation(&args[1])?;
                self.gains = parse_gains(&args[2], &args[3], &args[4])?;
            }
            6 => {
                self.frequency_hz = parse_frequency(&args[0])?;
                self.saturation_us = parse_saturation(&args[1])?;
                self.gains = parse_gains(&args[2], &args[3], &args[4])?;
                self.servo_trim_us = parse_value(&args[5], "servo trim")?;
            }
            n => return Err(ConfigError::UnsupportedArgCount(n)),
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frequency_hz == 0 {
            return Err(ConfigError::NonPositiveFrequency);
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(raw: &str, name: &'static str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Malformed {
        name,
        value: raw.to_string(),
    })
}

fn parse_frequency(raw: &str) -> Result<u32, ConfigError> {
    let hz: i64 = parse_value(raw, "frequency")?;
    if hz <= 0 {
        return Err(ConfigError::NonPositiveFrequency);
    }
    u32::try_from(hz).map_err(|_| ConfigError::Malformed {
        name: "frequency",
        value: raw.to_string(),
    })
}

fn parse_saturation(raw: &str) -> Result<u16, ConfigError> {
    let us: u16 = parse_value(raw, "saturation")?;
    Ok(us.min(MAX_THROTTLE_SATURATION_US))
}

fn parse_gains(kp: &str, ki: &str, kd: &str) -> Result<PidGains, ConfigError> {
    Ok(PidGains {
        kp: parse_value(kp, "Kp")?,
        ki: parse_value(ki, "Ki")?,
        kd: parse_value(kd, "Kd")?,
    })
}

// ============================================================================
// FILE OVERRIDES
// ============================================================================

/// Optional named overrides read from a TOML file before positional values
/// are applied. Every field stands alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    pub frequency_hz: Option<u32>,
    pub saturation_us: Option<u16>,
    pub kp: Option<f32>,
    pub ki: Option<f32>,
    pub kd: Option<f32>,
    pub servo_trim_us: Option<u16>,
}

/// A missing or malformed file yields no overrides.
pub fn load_overrides(path: &str) -> ConfigOverrides {
    match std::fs::read_to_string(path) {
        Ok(s) => toml::from_str::<ConfigOverrides>(&s).unwrap_or_default(),
        Err(_) => ConfigOverrides::default(),
    }
}
