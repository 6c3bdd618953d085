//! Load-driven fan control
//!
//! The fan follows the channel's target load rather than a temperature:
//! the load is mapped through a configurable window onto the fan's PWM
//! range and written whenever the resulting level changes.

use embassy_time::{Duration, Timer};

use crate::error::Error;
use crate::state::{ChannelState, SharedChannel};
use crate::storage::ConfigStore;
use crate::{OutputDriver, Storage};

/// Fan PWM resolution maximum (10-bit)
pub const FAN_LEVEL_MAX: u16 = 1024;

/// How often the fan level is recomputed
pub const FAN_UPDATE_INTERVAL: Duration = Duration::from_secs(5);

/// Persistable fan configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanConfig {
    pub enabled: bool,
    /// Level written when the channel is off or below the window
    pub min_level: u16,
    /// Level written at or above the top of the window
    pub max_level: u16,
    /// Channel load (%) where the fan starts ramping up
    pub min_channel_percent: u16,
    /// Channel load (%) where the fan reaches `max_level`
    pub max_channel_percent: u16,
}

impl FanConfig {
    pub const DEFAULT: Self = Self {
        enabled: true,
        min_level: 0,
        max_level: FAN_LEVEL_MAX,
        min_channel_percent: 0,
        max_channel_percent: 100,
    };

    /// Clamp levels to the PWM resolution and keep both ranges ordered
    pub fn sanitized(self) -> Self {
        let min_level = clamp_level(self.min_level);
        let max_level = clamp_level(self.max_level).max(min_level);
        let min_channel_percent = self.min_channel_percent.min(100);
        let max_channel_percent = self.max_channel_percent.min(100).max(min_channel_percent);
        Self {
            enabled: self.enabled,
            min_level,
            max_level,
            min_channel_percent,
            max_channel_percent,
        }
    }

    /// Fan duty in percent for a channel load in percent
    pub fn fan_percent(&self, load_percent: f32) -> f32 {
        let low = f32::from(self.min_channel_percent);
        let high = f32::from(self.max_channel_percent);
        if high <= low {
            return if load_percent >= low { 100.0 } else { 0.0 };
        }
        ((load_percent - low) * 100.0 / (high - low)).max(0.0).min(100.0)
    }

    /// Fan level for a channel load in percent
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn level_for_load(&self, load_percent: f32) -> u16 {
        let span = f32::from(self.max_level.saturating_sub(self.min_level));
        let offset = span * self.fan_percent(load_percent) / 100.0;
        self.min_level.saturating_add(offset as u16)
    }
}

impl Default for FanConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn clamp_level(level: u16) -> u16 {
    if level > FAN_LEVEL_MAX {
        error!(
            "[FanConfig] level {} above maximum, clamped to {}",
            level, FAN_LEVEL_MAX
        );
        return FAN_LEVEL_MAX;
    }
    level
}

/// Cooling fan that follows the load of one channel
pub struct FanController<O: OutputDriver> {
    driver: O,
    config: FanConfig,
    level: Option<u16>,
}

impl<O: OutputDriver> FanController<O> {
    pub fn new(driver: O, config: FanConfig) -> Self {
        Self {
            driver,
            config: config.sanitized(),
            level: None,
        }
    }

    pub const fn config(&self) -> &FanConfig {
        &self.config
    }

    /// Replace the configuration; the next update always writes
    pub fn set_config(&mut self, config: FanConfig) {
        self.config = config.sanitized();
        self.level = None;
    }

    /// Last level written to the fan
    pub const fn level(&self) -> Option<u16> {
        self.level
    }

    /// Recompute and write the fan level for the given channel state.
    ///
    /// A disabled controller leaves the fan untouched.
    pub fn update(&mut self, channel: &ChannelState) -> Option<u16> {
        if !self.config.enabled {
            return self.level;
        }
        let level = if channel.started {
            self.config.level_for_load(channel.load_percent())
        } else {
            self.config.min_level
        };
        if self.level != Some(level) {
            debug!("[FanController.update] new level {}", level);
            self.write(level);
        }
        self.level
    }

    fn write(&mut self, level: u16) {
        let level = clamp_level(level);
        self.driver.write_level(level);
        self.level = Some(level);
    }

    pub fn save<S: Storage>(&self, store: &mut ConfigStore<S>) -> Result<(), Error> {
        store.save_fan(&self.config)
    }

    /// Restore the saved configuration, keeping the current one when none
    /// was saved
    pub fn load<S: Storage>(&mut self, store: &mut ConfigStore<S>) -> Result<(), Error> {
        match store.load_fan() {
            Ok(config) => {
                self.set_config(config);
                Ok(())
            }
            Err(Error::MissingRecord) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Follow the channel forever
    pub async fn run(&mut self, channel: &SharedChannel) {
        loop {
            self.update(&channel.snapshot());
            Timer::after(FAN_UPDATE_INTERVAL).await;
        }
    }
}
