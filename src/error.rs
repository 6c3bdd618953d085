use core::fmt;

/// Failure reported by the persistent storage collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Offset and length fall outside the device
    OutOfBounds { offset: usize, len: usize },
    /// The device refused to write back the staged bytes
    CommitFailed,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds { offset, len } => {
                write!(f, "storage access out of bounds ({len} bytes at {offset})")
            }
            Self::CommitFailed => f.write_str("storage commit failed"),
        }
    }
}

/// Error returned when inserting into a full schedule.
///
/// Carries the rejected point count so callers can report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleFull(pub usize);

impl fmt::Display for ScheduleFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "schedule holds at most {} points", self.0)
    }
}

/// Crate-wide error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The current sensor did not answer after all retries
    SensorNotFound,
    /// The channel is disabled and cannot be started
    ChannelDisabled,
    /// Schedule capacity exceeded
    ScheduleFull(ScheduleFull),
    /// Another control policy currently owns the target
    ControlBusy,
    /// The caller tried to write the target without owning it
    NotOwner,
    /// Persistent storage failure
    Storage(StorageError),
    /// No record of the requested kind has been saved yet
    MissingRecord,
    /// A stored record has an unknown version or impossible contents
    CorruptRecord,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SensorNotFound => f.write_str("current sensor not found"),
            Self::ChannelDisabled => f.write_str("channel is disabled"),
            Self::ScheduleFull(full) => full.fmt(f),
            Self::ControlBusy => f.write_str("target is owned by another control policy"),
            Self::NotOwner => f.write_str("caller does not own the target"),
            Self::Storage(err) => err.fmt(f),
            Self::MissingRecord => f.write_str("no stored record"),
            Self::CorruptRecord => f.write_str("stored record is corrupt"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<ScheduleFull> for Error {
    fn from(err: ScheduleFull) -> Self {
        Self::ScheduleFull(err)
    }
}
