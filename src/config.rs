//! Channel configuration
//!
//! Everything the configuration API can replace for a channel, plus the
//! board-level hardware parameters that are fixed at build time.

use embassy_time::Duration;
use heapless::Vec;

use crate::output::{DEFAULT_MAX_LEVEL, Polarity};

/// Maximum number of LED descriptors stored per channel
pub const MAX_CHANNEL_LEDS: usize = 10;

/// Shunt on the reference board, 0.1 Ohm
pub const DEFAULT_SHUNT_MICRO_OHM: u32 = 100_000;

/// Full-scale current the sensor is calibrated for
pub const DEFAULT_MAX_EXPECTED_AMPS: u16 = 3;

/// Board wiring and timing of one channel
#[derive(Debug, Clone, Copy)]
pub struct ChannelHardware {
    /// Device index of the channel's sensor on the shared bus
    pub device_index: u8,
    /// Calibration current passed to the sensor
    pub max_expected_amps: u16,
    /// Shunt resistance in micro-ohm
    pub shunt_micro_ohm: u32,
    /// How many times `begin` probes the sensor before giving up
    pub sensor_attempts: u8,
    /// Pause between sensor probes
    pub sensor_retry_delay: Duration,
    /// Upper rail of the output stage
    pub max_level: u16,
    pub polarity: Polarity,
    /// How often the regulation loop logs bus readings
    pub telemetry_interval: Duration,
}

impl ChannelHardware {
    pub const DEFAULT: Self = Self {
        device_index: 0,
        max_expected_amps: DEFAULT_MAX_EXPECTED_AMPS,
        shunt_micro_ohm: DEFAULT_SHUNT_MICRO_OHM,
        sensor_attempts: 3,
        sensor_retry_delay: Duration::from_millis(200),
        max_level: DEFAULT_MAX_LEVEL,
        polarity: Polarity::Direct,
        telemetry_interval: Duration::from_secs(10),
    };
}

impl Default for ChannelHardware {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Electrical limits of a channel
///
/// Currents are in milliamps, voltage in volts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub min_current: f32,
    pub max_current: f32,
    pub max_voltage: f32,
}

impl Limits {
    pub const DEFAULT: Self = Self::new(0.0, 700.0, 24.0);

    pub const fn new(min_current: f32, max_current: f32, max_voltage: f32) -> Self {
        Self {
            min_current,
            max_current,
            max_voltage,
        }
    }

    /// Repair impossible limits instead of rejecting them.
    ///
    /// Negative or NaN values become zero and a maximum below the minimum is
    /// raised to the minimum.
    pub fn sanitized(self) -> Self {
        let min_current = self.min_current.max(0.0);
        let max_current = self.max_current.max(min_current);
        let max_voltage = self.max_voltage.max(0.0);
        let fixed = Self::new(min_current, max_current, max_voltage);
        if fixed != self {
            warn!(
                "[Limits.sanitized] limits {:?} clamped to {:?}",
                self, fixed
            );
        }
        fixed
    }

    /// Clamp a current into `[min_current, max_current]`
    pub fn clamp_current(&self, current: f32) -> f32 {
        current.max(self.min_current).min(self.max_current)
    }

    /// Current that corresponds to `percent` of the channel range
    pub fn current_for_percent(&self, percent: u8) -> f32 {
        let percent = f32::from(percent.min(100));
        self.min_current + (self.max_current - self.min_current) * percent / 100.0
    }

    /// Position of `current` inside the channel range, 0–100
    pub fn percent_of(&self, current: f32) -> f32 {
        let range = self.max_current - self.min_current;
        if range <= 0.0 {
            return 0.0;
        }
        ((current - self.min_current) * 100.0 / range).max(0.0).min(100.0)
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// LED family fitted on a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum LedKind {
    #[default]
    White = 0,
    Colored = 1,
    Ultraviolet = 2,
    Infrared = 3,
}

impl LedKind {
    /// Unknown raw values fall back to white
    pub fn from_raw(value: u8) -> Self {
        match value {
            1 => Self::Colored,
            2 => Self::Ultraviolet,
            3 => Self::Infrared,
            _ => Self::White,
        }
    }
}

/// Description of one LED type wired to the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedDescriptor {
    /// Colour temperature in Kelvin
    pub kelvin: u16,
    /// Peak wavelength in nanometres
    pub wavelength_nm: u16,
    /// Rated power in watts
    pub watts: u16,
    pub kind: LedKind,
}

impl LedDescriptor {
    /// A descriptor with no measurable attribute carries no information
    pub const fn is_empty(&self) -> bool {
        self.kelvin == 0 && self.wavelength_nm == 0 && self.watts == 0
    }
}

/// Full replaceable configuration of a channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    pub enabled: bool,
    pub limits: Limits,
    /// Manually requested target current, mA
    pub target_current: f32,
    pub leds: Vec<LedDescriptor, MAX_CHANNEL_LEDS>,
}

impl ChannelConfig {
    /// Clamp every field into its legal range.
    ///
    /// Empty LED descriptors are dropped.
    pub fn sanitized(mut self) -> Self {
        self.limits = self.limits.sanitized();
        let target = self.limits.clamp_current(self.target_current);
        if target != self.target_current {
            warn!(
                "[ChannelConfig.sanitized] target {} mA clamped to {} mA",
                self.target_current, target
            );
            self.target_current = target;
        }
        self.leds.retain(|led| !led.is_empty());
        self
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limits: Limits::default(),
            target_current: 0.0,
            leds: Vec::new(),
        }
    }
}
