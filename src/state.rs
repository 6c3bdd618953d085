//! Shared channel state
//!
//! One [`SharedChannel`] exists per physical channel. The regulation loop,
//! the schedule engine, the fan controller and the configuration API all
//! hold a reference to it and go through its methods; every method runs
//! inside a single critical section, so a target write and the stability
//! reset it causes can never be observed apart.

use core::cell::RefCell;

use critical_section::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use heapless::Vec;

use crate::config::{ChannelConfig, LedDescriptor, Limits, MAX_CHANNEL_LEDS};
use crate::error::Error;
use crate::regulator::{RegulationInput, RegulationReport};

/// Direction of the current regulation episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    Increase,
    Decrease,
    #[default]
    Undetermined,
}

/// Policy a test override hands control back to when it ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    Manual,
    Scheduled,
}

/// Which policy currently has the right to write the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlOwner {
    /// The operator's manual target is live
    #[default]
    Manual,
    /// The schedule engine computes the target
    Scheduled,
    /// A factory test holds a fixed target for a bounded time
    Test { resume: Resume },
}

impl From<Resume> for ControlOwner {
    fn from(resume: Resume) -> Self {
        match resume {
            Resume::Manual => Self::Manual,
            Resume::Scheduled => Self::Scheduled,
        }
    }
}

/// One sensor reading. Voltage in volts, current in milliamps.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sample {
    pub voltage: f32,
    pub current: f32,
}

impl Sample {
    pub const fn new(voltage: f32, current: f32) -> Self {
        Self { voltage, current }
    }

    /// Power in watts, never negative
    pub fn power(&self) -> f32 {
        (self.current / 1000.0 * self.voltage).max(0.0)
    }
}

/// High-water marks of the measured values
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Peaks {
    pub current: f32,
    pub voltage: f32,
    pub power: f32,
}

impl Peaks {
    pub const ZERO: Self = Self {
        current: 0.0,
        voltage: 0.0,
        power: 0.0,
    };

    pub fn record(&mut self, sample: Sample) {
        self.current = self.current.max(sample.current);
        self.voltage = self.voltage.max(sample.voltage);
        self.power = self.power.max(sample.power());
    }
}

/// Complete state of one channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelState {
    pub enabled: bool,
    /// Whether the regulation loop is running
    pub started: bool,
    pub limits: Limits,
    /// Last target set through the manual API, mA
    pub manual_target: f32,
    /// Live target the regulation loop follows, mA
    pub target_current: f32,
    /// Bumped with every change of the target or the voltage ceiling
    pub generation: u32,
    pub last_sample: Sample,
    pub peaks: Peaks,
    pub output_level: u16,
    pub stable: bool,
    pub direction: Direction,
    pub owner: ControlOwner,
    pub leds: Vec<LedDescriptor, MAX_CHANNEL_LEDS>,
}

impl ChannelState {
    pub const fn new() -> Self {
        Self {
            enabled: true,
            started: false,
            limits: Limits::DEFAULT,
            manual_target: 0.0,
            target_current: 0.0,
            generation: 0,
            last_sample: Sample::new(0.0, 0.0),
            peaks: Peaks::ZERO,
            output_level: 0,
            stable: false,
            direction: Direction::Undetermined,
            owner: ControlOwner::Manual,
            leds: Vec::new(),
        }
    }

    /// Target position inside the channel range, 0–100
    pub fn load_percent(&self) -> f32 {
        self.limits.percent_of(self.target_current)
    }

    /// Replaceable part of the state
    pub fn config(&self) -> ChannelConfig {
        ChannelConfig {
            enabled: self.enabled,
            limits: self.limits,
            target_current: self.manual_target,
            leds: self.leds.clone(),
        }
    }

    /// Store a new live target. Returns `false` when nothing changed.
    fn assign_target(&mut self, target: f32) -> bool {
        if self.target_current == target {
            return false;
        }
        self.target_current = target;
        self.invalidate();
        true
    }

    fn invalidate(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.stable = false;
        self.direction = Direction::Undetermined;
    }
}

impl Default for ChannelState {
    fn default() -> Self {
        Self::new()
    }
}

/// Synchronized handle to a channel's state
pub struct SharedChannel {
    state: Mutex<RefCell<ChannelState>>,
    stop: Signal<CriticalSectionRawMutex, ()>,
}

impl SharedChannel {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(ChannelState::new())),
            stop: Signal::new(),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut ChannelState) -> R) -> R {
        critical_section::with(|cs| f(&mut *self.state.borrow(cs).borrow_mut()))
    }

    /// Copy of the whole state
    pub fn snapshot(&self) -> ChannelState {
        self.with(|state| state.clone())
    }

    pub fn is_enabled(&self) -> bool {
        self.with(|state| state.enabled)
    }

    pub fn is_started(&self) -> bool {
        self.with(|state| state.started)
    }

    pub fn owner(&self) -> ControlOwner {
        self.with(|state| state.owner)
    }

    pub fn limits(&self) -> Limits {
        self.with(|state| state.limits)
    }

    pub fn target_current(&self) -> f32 {
        self.with(|state| state.target_current)
    }

    /// Set the manual target, clamped into the channel limits.
    ///
    /// The value always becomes the manual fallback. It only reaches the
    /// regulation loop while no other policy owns the target.
    pub fn set_target(&self, value: f32) -> f32 {
        self.with(|state| {
            let clamped = state.limits.clamp_current(value);
            if clamped != value {
                warn!(
                    "[SharedChannel.set_target] target {} mA clamped to {} mA",
                    value, clamped
                );
            }
            state.manual_target = clamped;
            if state.owner == ControlOwner::Manual {
                state.assign_target(clamped);
            }
            clamped
        })
    }

    /// Replace the configurable part of the state.
    ///
    /// Regulation restarts only when the live target or the voltage
    /// ceiling changed.
    pub fn apply_config(&self, config: ChannelConfig) {
        let config = config.sanitized();
        self.with(|state| {
            let ceiling_changed = state.limits.max_voltage != config.limits.max_voltage;
            state.enabled = config.enabled;
            state.limits = config.limits;
            state.manual_target = config.target_current;
            state.leds = config.leds;
            let target = match state.owner {
                ControlOwner::Manual => state.manual_target,
                _ => state.limits.clamp_current(state.target_current),
            };
            if !state.assign_target(target) && ceiling_changed {
                state.invalidate();
            }
        });
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.with(|state| state.enabled = enabled);
    }

    pub fn reset_peaks(&self) {
        self.with(|state| state.peaks = Peaks::ZERO);
    }

    /// Hand the target to the schedule engine
    pub(crate) fn claim_schedule(&self) -> Result<(), Error> {
        self.with(|state| match state.owner {
            ControlOwner::Test { .. } => Err(Error::ControlBusy),
            _ => {
                if state.owner != ControlOwner::Scheduled {
                    info!("[SharedChannel.claim_schedule] schedule owns the target");
                }
                state.owner = ControlOwner::Scheduled;
                Ok(())
            }
        })
    }

    /// Return the target from the schedule engine to the manual value
    pub(crate) fn release_schedule(&self) -> Result<(), Error> {
        self.with(|state| match state.owner {
            ControlOwner::Test { .. } => Err(Error::ControlBusy),
            ControlOwner::Manual => Ok(()),
            ControlOwner::Scheduled => {
                info!("[SharedChannel.release_schedule] manual target restored");
                state.owner = ControlOwner::Manual;
                let manual = state.manual_target;
                state.assign_target(manual);
                Ok(())
            }
        })
    }

    /// Write a target computed by the schedule engine.
    ///
    /// Returns whether the live target changed.
    pub(crate) fn write_scheduled_target(&self, value: f32) -> Result<bool, Error> {
        self.with(|state| {
            if state.owner != ControlOwner::Scheduled {
                return Err(Error::NotOwner);
            }
            let clamped = state.limits.clamp_current(value);
            Ok(state.assign_target(clamped))
        })
    }

    /// Start (or restart) a test override at `value` mA
    pub(crate) fn claim_test(&self, value: f32) -> Resume {
        self.with(|state| {
            let resume = match state.owner {
                ControlOwner::Manual => Resume::Manual,
                ControlOwner::Scheduled => Resume::Scheduled,
                ControlOwner::Test { resume } => resume,
            };
            state.owner = ControlOwner::Test { resume };
            let clamped = state.limits.clamp_current(value);
            state.assign_target(clamped);
            info!(
                "[SharedChannel.claim_test] test at {} mA, resume {:?}",
                clamped, resume
            );
            resume
        })
    }

    /// End a test override and give control back to the previous owner.
    ///
    /// Returns `None` when no test was active.
    pub(crate) fn release_test(&self) -> Option<Resume> {
        self.with(|state| {
            let ControlOwner::Test { resume } = state.owner else {
                return None;
            };
            state.owner = resume.into();
            if resume == Resume::Manual {
                let manual = state.manual_target;
                state.assign_target(manual);
            }
            info!("[SharedChannel.release_test] control back to {:?}", resume);
            Some(resume)
        })
    }

    /// Values the regulation loop needs for one evaluation
    pub fn regulation_input(&self) -> RegulationInput {
        self.with(|state| RegulationInput {
            target_current: state.target_current,
            max_voltage: state.limits.max_voltage,
            max_current: state.limits.max_current,
            generation: state.generation,
        })
    }

    /// Publish the result of one regulation step.
    ///
    /// Stability is only accepted when it was computed against the current
    /// generation of the target.
    pub fn commit_regulation(&self, report: &RegulationReport) {
        self.with(|state| {
            state.last_sample = report.sample;
            state.peaks.record(report.sample);
            state.output_level = report.level;
            if report.generation == state.generation {
                state.stable = report.stable;
                state.direction = report.direction;
            } else {
                state.stable = false;
                state.direction = Direction::Undetermined;
            }
        });
    }

    pub(crate) fn set_started(&self, started: bool) {
        self.with(|state| state.started = started);
    }

    pub(crate) fn set_output_level(&self, level: u16) {
        self.with(|state| state.output_level = level);
    }

    /// Ask the regulation loop to exit
    pub fn request_stop(&self) {
        self.stop.signal(());
    }

    pub(crate) fn stop_signal(&self) -> &Signal<CriticalSectionRawMutex, ()> {
        &self.stop
    }
}

impl Default for SharedChannel {
    fn default() -> Self {
        Self::new()
    }
}
