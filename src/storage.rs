//! Persistent configuration records
//!
//! Each record is a fixed-layout little-endian struct at a fixed offset of
//! a byte-addressed store. Every record starts with a tag byte and a
//! version byte; an unexpected tag means the record was never written, an
//! unexpected version means it cannot be trusted.
//!
//! | offset | record           | size |
//! |--------|------------------|------|
//! | 0      | [`ChannelRecord`]  | 90   |
//! | 128    | [`ScheduleRecord`] | 254  |
//! | 384    | [`FanRecord`]      | 12   |
//!
//! The store must be at least [`STORAGE_SIZE`] bytes.

use zerocopy::little_endian::{F32, U16};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::Storage;
use crate::config::{ChannelConfig, LedDescriptor, LedKind, Limits, MAX_CHANNEL_LEDS};
use crate::error::{Error, StorageError};
use crate::fan::FanConfig;
use crate::schedule::{DaySelector, MAX_SCHEDULE_POINTS, Schedule, SchedulePoint};

pub const CHANNEL_OFFSET: usize = 0;
pub const SCHEDULE_OFFSET: usize = 128;
pub const FAN_OFFSET: usize = 384;
pub const STORAGE_SIZE: usize = 512;

const CHANNEL_TAG: u8 = 0xC1;
const SCHEDULE_TAG: u8 = 0x5C;
const FAN_TAG: u8 = 0xFA;
const RECORD_VERSION: u8 = 1;

const _: () = assert!(size_of::<ChannelRecord>() <= SCHEDULE_OFFSET - CHANNEL_OFFSET);
const _: () = assert!(size_of::<ScheduleRecord>() <= FAN_OFFSET - SCHEDULE_OFFSET);
const _: () = assert!(size_of::<FanRecord>() <= STORAGE_SIZE - FAN_OFFSET);

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct LedRecord {
    pub kelvin: U16,
    pub wavelength_nm: U16,
    pub watts: U16,
    pub kind: u8,
}

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct ChannelRecord {
    pub tag: u8,
    pub version: u8,
    pub enabled: u8,
    pub led_count: u8,
    pub min_current: F32,
    pub max_current: F32,
    pub max_voltage: F32,
    pub target_current: F32,
    pub leds: [LedRecord; MAX_CHANNEL_LEDS],
}

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct PointRecord {
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub fade: u8,
    pub value: u8,
}

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct ScheduleRecord {
    pub tag: u8,
    pub version: u8,
    pub running: u8,
    pub count: u8,
    pub points: [PointRecord; MAX_SCHEDULE_POINTS],
}

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct FanRecord {
    pub tag: u8,
    pub version: u8,
    pub enabled: u8,
    pub reserved: u8,
    pub min_level: U16,
    pub max_level: U16,
    pub min_channel_percent: U16,
    pub max_channel_percent: U16,
}

impl From<&LedDescriptor> for LedRecord {
    fn from(led: &LedDescriptor) -> Self {
        Self {
            kelvin: led.kelvin.into(),
            wavelength_nm: led.wavelength_nm.into(),
            watts: led.watts.into(),
            kind: led.kind as u8,
        }
    }
}

impl From<&LedRecord> for LedDescriptor {
    fn from(record: &LedRecord) -> Self {
        Self {
            kelvin: record.kelvin.get(),
            wavelength_nm: record.wavelength_nm.get(),
            watts: record.watts.get(),
            kind: LedKind::from_raw(record.kind),
        }
    }
}

impl From<&SchedulePoint> for PointRecord {
    fn from(point: &SchedulePoint) -> Self {
        Self {
            day: point.day.to_raw(),
            hour: point.hour,
            minute: point.minute,
            fade: u8::from(point.fade),
            value: point.value,
        }
    }
}

impl From<&PointRecord> for SchedulePoint {
    fn from(record: &PointRecord) -> Self {
        SchedulePoint::new(
            DaySelector::from_raw(record.day),
            record.hour,
            record.minute,
            record.value,
            record.fade != 0,
        )
    }
}

/// Schedule as it was last saved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSchedule {
    pub schedule: Schedule,
    /// Whether the schedule was in control when saved
    pub running: bool,
}

fn check_header(tag: u8, version: u8, expected_tag: u8) -> Result<(), Error> {
    if tag != expected_tag {
        return Err(Error::MissingRecord);
    }
    if version != RECORD_VERSION {
        return Err(Error::CorruptRecord);
    }
    Ok(())
}

/// Typed access to the configuration records of a [`Storage`]
#[derive(Debug)]
pub struct ConfigStore<S: Storage> {
    storage: S,
}

impl<S: Storage> ConfigStore<S> {
    pub const fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_inner(self) -> S {
        self.storage
    }

    fn read_record<T>(&mut self, offset: usize) -> Result<T, Error>
    where
        T: FromBytes + IntoBytes,
    {
        let mut record = T::new_zeroed();
        self.storage.read(offset, record.as_mut_bytes())?;
        Ok(record)
    }

    fn write_record<T>(&mut self, offset: usize, record: &T) -> Result<(), Error>
    where
        T: IntoBytes + Immutable,
    {
        self.storage.write(offset, record.as_bytes())?;
        self.commit()
    }

    fn commit(&mut self) -> Result<(), Error> {
        match self.storage.commit() {
            Ok(()) => {
                debug!("[ConfigStore.commit] saved");
                Ok(())
            }
            Err(err) => {
                error!("[ConfigStore.commit] {}", err);
                Err(err.into())
            }
        }
    }

    pub fn save_channel(&mut self, config: &ChannelConfig) -> Result<(), Error> {
        let mut record = ChannelRecord::new_zeroed();
        record.tag = CHANNEL_TAG;
        record.version = RECORD_VERSION;
        record.enabled = u8::from(config.enabled);
        record.min_current = config.limits.min_current.into();
        record.max_current = config.limits.max_current.into();
        record.max_voltage = config.limits.max_voltage.into();
        record.target_current = config.target_current.into();
        for (slot, led) in record.leds.iter_mut().zip(config.leds.iter()) {
            *slot = led.into();
        }
        record.led_count = u8::try_from(config.leds.len()).unwrap_or(u8::MAX);
        self.write_record(CHANNEL_OFFSET, &record)
    }

    pub fn load_channel(&mut self) -> Result<ChannelConfig, Error> {
        let record: ChannelRecord = self.read_record(CHANNEL_OFFSET)?;
        check_header(record.tag, record.version, CHANNEL_TAG)?;
        let count = usize::from(record.led_count);
        if count > MAX_CHANNEL_LEDS {
            return Err(Error::CorruptRecord);
        }
        let mut config = ChannelConfig {
            enabled: record.enabled != 0,
            limits: Limits::new(
                record.min_current.get(),
                record.max_current.get(),
                record.max_voltage.get(),
            ),
            target_current: record.target_current.get(),
            ..ChannelConfig::default()
        };
        for led in &record.leds[..count] {
            config
                .leds
                .push(led.into())
                .map_err(|_| Error::CorruptRecord)?;
        }
        Ok(config.sanitized())
    }

    pub fn save_schedule(&mut self, schedule: &Schedule, running: bool) -> Result<(), Error> {
        let mut record = ScheduleRecord::new_zeroed();
        record.tag = SCHEDULE_TAG;
        record.version = RECORD_VERSION;
        record.running = u8::from(running);
        for (slot, point) in record.points.iter_mut().zip(schedule.points()) {
            *slot = point.into();
        }
        record.count = u8::try_from(schedule.len()).unwrap_or(u8::MAX);
        info!("[ConfigStore.save_schedule] {} point(s)", schedule.len());
        self.write_record(SCHEDULE_OFFSET, &record)
    }

    pub fn load_schedule(&mut self) -> Result<StoredSchedule, Error> {
        let record: ScheduleRecord = self.read_record(SCHEDULE_OFFSET)?;
        check_header(record.tag, record.version, SCHEDULE_TAG)?;
        let count = usize::from(record.count);
        if count > MAX_SCHEDULE_POINTS {
            return Err(Error::CorruptRecord);
        }
        let mut schedule = Schedule::new();
        for point in &record.points[..count] {
            schedule.push(point.into())?;
        }
        info!("[ConfigStore.load_schedule] {} point(s) loaded", count);
        Ok(StoredSchedule {
            schedule,
            running: record.running != 0,
        })
    }

    pub fn save_fan(&mut self, config: &FanConfig) -> Result<(), Error> {
        let record = FanRecord {
            tag: FAN_TAG,
            version: RECORD_VERSION,
            enabled: u8::from(config.enabled),
            reserved: 0,
            min_level: config.min_level.into(),
            max_level: config.max_level.into(),
            min_channel_percent: config.min_channel_percent.into(),
            max_channel_percent: config.max_channel_percent.into(),
        };
        self.write_record(FAN_OFFSET, &record)
    }

    pub fn load_fan(&mut self) -> Result<FanConfig, Error> {
        let record: FanRecord = self.read_record(FAN_OFFSET)?;
        check_header(record.tag, record.version, FAN_TAG)?;
        let config = FanConfig {
            enabled: record.enabled != 0,
            min_level: record.min_level.get(),
            max_level: record.max_level.get(),
            min_channel_percent: record.min_channel_percent.get(),
            max_channel_percent: record.max_channel_percent.get(),
        };
        Ok(config.sanitized())
    }
}

/// In-memory [`Storage`], erased to `0xFF`
#[derive(Debug, Clone)]
pub struct RamStorage<const N: usize = STORAGE_SIZE> {
    bytes: [u8; N],
    fail_commit: bool,
    commits: usize,
}

impl<const N: usize> RamStorage<N> {
    pub const fn new() -> Self {
        Self {
            bytes: [0xFF; N],
            fail_commit: false,
            commits: 0,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Make every following commit fail
    pub fn set_fail_commit(&mut self, fail: bool) {
        self.fail_commit = fail;
    }

    /// Number of successful commits
    pub const fn commits(&self) -> usize {
        self.commits
    }

    fn range(offset: usize, len: usize) -> Result<core::ops::Range<usize>, StorageError> {
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= N)
            .ok_or(StorageError::OutOfBounds { offset, len })?;
        Ok(offset..end)
    }
}

impl<const N: usize> Default for RamStorage<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Storage for RamStorage<N> {
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        let range = Self::range(offset, buf.len())?;
        buf.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StorageError> {
        let range = Self::range(offset, bytes.len())?;
        self.bytes[range].copy_from_slice(bytes);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        if self.fail_commit {
            return Err(StorageError::CommitFailed);
        }
        self.commits += 1;
        Ok(())
    }
}
