#![no_std]

#[macro_use]
mod log;

pub mod channel;
pub mod config;
pub mod error;
pub mod fan;
pub mod output;
pub mod regulator;
pub mod schedule;
pub mod sensor;
pub mod state;
pub mod storage;

pub use channel::Channel;
pub use config::{ChannelConfig, ChannelHardware, LedDescriptor, LedKind, Limits};
pub use error::{Error, ScheduleFull, StorageError};
pub use fan::{FanConfig, FanController};
pub use output::{Output, Polarity};
pub use regulator::{RegulationInput, RegulationReport, Regulator};
pub use schedule::engine::{EngineState, ScheduleEngine, ScheduleSettings, Tick, TickOutcome};
pub use schedule::{Anchor, DaySelector, Schedule, SchedulePoint, Search};
pub use state::{ChannelState, ControlOwner, Direction, Resume, Sample, SharedChannel};
pub use storage::{ConfigStore, RamStorage};

pub use chrono::NaiveDateTime;
pub use embassy_time::{Duration, Instant};

/// Output primitive behind the LED driver's dim input or the fan PWM
///
/// Implement this trait to support different hardware platforms.
pub trait OutputDriver {
    /// Write a raw level to the hardware
    fn write_level(&mut self, level: u16);
}

/// Current/voltage sensing device on a shared bus
#[allow(async_fn_in_trait)]
pub trait PowerMonitor {
    /// Configure the bus and return the number of devices that answered
    fn begin_device(&mut self, max_expected_amps: u16, shunt_micro_ohm: u32) -> u8;

    /// Resolve once device `index` has a fresh conversion
    async fn wait_for_conversion(&mut self, index: u8);

    /// Bus voltage of the last conversion, mV
    fn bus_millivolts(&mut self, index: u8) -> u32;

    /// Shunt current of the last conversion, µA. Negative when reversed.
    fn bus_microamps(&mut self, index: u8) -> i32;
}

/// Local wall clock
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Byte-addressed non-volatile memory
///
/// Writes are staged until [`Storage::commit`].
pub trait Storage {
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError>;

    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StorageError>;

    fn commit(&mut self) -> Result<(), StorageError>;
}
