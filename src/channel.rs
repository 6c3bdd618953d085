//! Channel facade
//!
//! Ties a sensor, an output stage and a [`Regulator`] to one
//! [`SharedChannel`]. The facade runs the regulation loop; everything else
//! (schedule engine, fan, configuration API) talks to the shared state.

use embassy_futures::select::{Either, select};
use embassy_time::Instant;

use crate::config::{ChannelConfig, ChannelHardware};
use crate::error::Error;
use crate::output::Output;
use crate::regulator::{RegulationInput, RegulationReport, Regulator};
use crate::sensor::SensorReader;
use crate::state::SharedChannel;
use crate::storage::ConfigStore;
use crate::{OutputDriver, PowerMonitor, Storage};

/// One regulated LED channel.
///
/// Owns the sensor, the output stage and the regulator, and publishes every
/// evaluation to its [`SharedChannel`].
pub struct Channel<'a, M: PowerMonitor, O: OutputDriver> {
    shared: &'a SharedChannel,
    sensor: SensorReader<M>,
    output: Output<O>,
    regulator: Regulator,
    hardware: ChannelHardware,
    last_report: Option<Instant>,
}

impl<'a, M: PowerMonitor, O: OutputDriver> Channel<'a, M, O> {
    pub fn new(shared: &'a SharedChannel, monitor: M, driver: O, hardware: ChannelHardware) -> Self {
        Self {
            shared,
            sensor: SensorReader::new(monitor, hardware.device_index),
            output: Output::new(driver, hardware.max_level, hardware.polarity),
            regulator: Regulator::new(),
            hardware,
            last_report: None,
        }
    }

    pub const fn shared(&self) -> &'a SharedChannel {
        self.shared
    }

    pub const fn hardware(&self) -> &ChannelHardware {
        &self.hardware
    }

    pub const fn output_level(&self) -> u16 {
        self.output.level()
    }

    /// Bring the channel up.
    ///
    /// A channel whose sensor cannot be found is disabled and stays down.
    /// Calling it on a started channel leaves the running loop alone.
    pub async fn begin(&mut self) -> Result<(), Error> {
        if self.shared.is_started() {
            debug!("[Channel.begin] channel {} already started", self.sensor.index());
            return Ok(());
        }
        if !self.shared.is_enabled() {
            warn!("[Channel.begin] channel is disabled");
            return Err(Error::ChannelDisabled);
        }
        if let Err(err) = self.sensor.begin(&self.hardware).await {
            self.shared.set_enabled(false);
            self.shared.set_started(false);
            return Err(err);
        }

        self.shared.stop_signal().reset();
        self.regulator = Regulator::new();
        self.output.apply(0);
        self.shared.set_output_level(0);
        self.last_report = None;
        self.shared.set_started(true);
        info!("[Channel.begin] channel {} started", self.sensor.index());
        Ok(())
    }

    /// Run the regulation loop until [`Self::end`] is called.
    ///
    /// Returns immediately when the channel was not started.
    pub async fn run(&mut self) {
        if !self.shared.is_started() {
            return;
        }
        loop {
            let stop = self.shared.stop_signal();
            let event = select(self.sensor.wait_for_conversion(), stop.wait()).await;
            match event {
                Either::First(()) => {
                    self.step(Instant::now());
                }
                Either::Second(()) => break,
            }
        }
        self.shared.set_started(false);
        info!("[Channel.run] channel {} stopped", self.sensor.index());
    }

    /// Evaluate the latest conversion once
    pub fn step(&mut self, now: Instant) -> RegulationReport {
        let sample = self.sensor.read();
        let input = self.shared.regulation_input();
        let report = self.regulator.update(&input, sample, &mut self.output);
        self.shared.commit_regulation(&report);
        self.report(now, &input, &report);
        report
    }

    fn report(&mut self, now: Instant, input: &RegulationInput, report: &RegulationReport) {
        let due = self
            .last_report
            .is_none_or(|last| now >= last + self.hardware.telemetry_interval);
        if !due {
            return;
        }
        self.last_report = Some(now);
        info!(
            "[Channel.report] target {} mA, max {} mA / {} V, bus {} V {} mA, level {}, stable {}",
            input.target_current,
            input.max_current,
            input.max_voltage,
            report.sample.voltage,
            report.sample.current,
            report.level,
            report.stable
        );
    }

    /// Ask the regulation loop to stop. The output keeps its level.
    pub fn end(&self) {
        info!("[Channel.end] stop requested");
        self.shared.request_stop();
    }

    /// Set the manual target, clamped into the limits
    pub fn set_target(&self, value: f32) -> f32 {
        self.shared.set_target(value)
    }

    /// Disabling a running channel also ends it
    pub fn set_enabled(&self, enabled: bool) {
        self.shared.set_enabled(enabled);
        if !enabled && self.shared.is_started() {
            self.end();
        }
    }

    /// Replace the channel configuration
    pub fn apply_config(&self, config: ChannelConfig) {
        self.shared.apply_config(config);
        if !self.shared.is_enabled() && self.shared.is_started() {
            self.end();
        }
    }

    pub fn reset_peaks(&self) {
        self.shared.reset_peaks();
    }

    pub fn save<S: Storage>(&self, store: &mut ConfigStore<S>) -> Result<(), Error> {
        store.save_channel(&self.shared.snapshot().config())
    }

    /// Restore the saved configuration.
    ///
    /// When nothing was saved yet the defaults are written and applied.
    pub fn load<S: Storage>(&self, store: &mut ConfigStore<S>) -> Result<ChannelConfig, Error> {
        let config = match store.load_channel() {
            Ok(config) => config,
            Err(Error::MissingRecord) => {
                warn!("[Channel.load] no saved configuration, writing defaults");
                let config = ChannelConfig::default();
                store.save_channel(&config)?;
                config
            }
            Err(err) => return Err(err),
        };
        self.apply_config(config.clone());
        Ok(config)
    }
}
