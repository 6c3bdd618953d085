//! Current/voltage sensor access
//!
//! Converts the raw bus readings of a [`PowerMonitor`] into [`Sample`]s in
//! the units the rest of the crate uses (V, mA).

use embassy_time::Timer;

use crate::PowerMonitor;
use crate::config::ChannelHardware;
use crate::error::Error;
use crate::state::Sample;

/// One channel's view of the sensor bus
#[derive(Debug)]
pub struct SensorReader<M: PowerMonitor> {
    monitor: M,
    index: u8,
}

impl<M: PowerMonitor> SensorReader<M> {
    pub const fn new(monitor: M, index: u8) -> Self {
        Self { monitor, index }
    }

    pub const fn index(&self) -> u8 {
        self.index
    }

    /// Probe the bus until the channel's device shows up.
    ///
    /// Makes `sensor_attempts` attempts, `sensor_retry_delay` apart, and
    /// returns the number of devices found.
    pub async fn begin(&mut self, hardware: &ChannelHardware) -> Result<u8, Error> {
        let attempts = hardware.sensor_attempts.max(1);
        for attempt in 1..=attempts {
            let found = self
                .monitor
                .begin_device(hardware.max_expected_amps, hardware.shunt_micro_ohm);
            if found > self.index {
                debug!(
                    "[SensorReader.begin] {} device(s) found on attempt {}",
                    found, attempt
                );
                return Ok(found);
            }
            warn!(
                "[SensorReader.begin] device {} missing, attempt {}/{}",
                self.index, attempt, attempts
            );
            if attempt < attempts {
                Timer::after(hardware.sensor_retry_delay).await;
            }
        }
        error!("[SensorReader.begin] sensor {} not found", self.index);
        Err(Error::SensorNotFound)
    }

    /// Wait until the device finishes its next conversion.
    ///
    /// Never times out.
    pub async fn wait_for_conversion(&mut self) {
        self.monitor.wait_for_conversion(self.index).await;
    }

    /// Read the latest conversion result
    #[allow(clippy::cast_precision_loss)]
    pub fn read(&mut self) -> Sample {
        let millivolts = self.monitor.bus_millivolts(self.index);
        let microamps = self.monitor.bus_microamps(self.index);
        Sample::new(millivolts as f32 / 1000.0, microamps as f32 / 1000.0)
    }
}
