//! Schedule engine
//!
//! Evaluates the schedule once per minute and writes the resulting target
//! into the channel while the schedule owns it. Also runs the bounded test
//! override, which preempts the schedule and hands control back when it
//! expires or is cancelled.

use core::cell::RefCell;

use chrono::{NaiveDateTime, Timelike};
use critical_section::Mutex;
use embassy_futures::select::select;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};

use super::{DEFAULT_PERCENT_STEP, Schedule, SchedulePoint, Search, compute_target};
use crate::error::{Error, ScheduleFull};
use crate::state::{ControlOwner, Resume, SharedChannel};
use crate::storage::ConfigStore;
use crate::{Clock, Storage};

/// Tuning of the schedule engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSettings {
    /// Granularity of computed percentages
    pub percent_step: u8,
    /// Seconds past the minute boundary at which the schedule is evaluated
    pub tick_offset_secs: u64,
    /// How long a test override lasts unless cancelled
    pub test_duration: Duration,
}

impl ScheduleSettings {
    pub const DEFAULT: Self = Self {
        percent_step: DEFAULT_PERCENT_STEP,
        tick_offset_secs: 5,
        test_duration: Duration::from_secs(30),
    };
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Observable engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Running,
    TestOverride,
}

/// What a single [`ScheduleEngine::tick`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The schedule does not own the target
    Inactive,
    /// The schedule was evaluated
    Applied { percent: u8, changed: bool },
    /// A test override is still holding the target
    TestActive,
    /// The test override expired and control went back
    TestEnded(Resume),
    /// The schedule is empty; the manual target took over
    FellBack,
}

/// Result of a tick and how long to sleep before the next one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub outcome: TickOutcome,
    pub sleep: Duration,
}

struct EngineInner {
    schedule: Schedule,
    test_deadline: Option<Instant>,
}

/// Minute-cadence schedule driver for one channel.
///
/// All methods take `&self`, so the configuration API and the
/// [`ScheduleEngine::run`] task can share one engine.
pub struct ScheduleEngine<'a> {
    channel: &'a SharedChannel,
    inner: Mutex<RefCell<EngineInner>>,
    settings: ScheduleSettings,
    wake: Signal<CriticalSectionRawMutex, ()>,
}

impl<'a> ScheduleEngine<'a> {
    pub const fn new(channel: &'a SharedChannel, settings: ScheduleSettings) -> Self {
        Self {
            channel,
            inner: Mutex::new(RefCell::new(EngineInner {
                schedule: Schedule::new(),
                test_deadline: None,
            })),
            settings,
            wake: Signal::new(),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut EngineInner) -> R) -> R {
        critical_section::with(|cs| f(&mut *self.inner.borrow(cs).borrow_mut()))
    }

    pub const fn settings(&self) -> &ScheduleSettings {
        &self.settings
    }

    pub fn state(&self) -> EngineState {
        match self.channel.owner() {
            ControlOwner::Manual => EngineState::Stopped,
            ControlOwner::Scheduled => EngineState::Running,
            ControlOwner::Test { .. } => EngineState::TestOverride,
        }
    }

    /// Whether the schedule owns the target, or will again once a test ends
    pub fn is_running(&self) -> bool {
        matches!(
            self.channel.owner(),
            ControlOwner::Scheduled
                | ControlOwner::Test {
                    resume: Resume::Scheduled
                }
        )
    }

    /// Copy of the current set-points
    pub fn schedule(&self) -> Schedule {
        self.with(|inner| inner.schedule.clone())
    }

    /// Replace every set-point at once
    pub fn replace_points(&self, points: &[SchedulePoint]) -> Result<(), ScheduleFull> {
        let schedule = Schedule::from_points(points)?;
        self.with(|inner| inner.schedule = schedule);
        info!("[ScheduleEngine.replace_points] {} point(s)", points.len());
        self.wake.signal(());
        Ok(())
    }

    pub fn push_point(&self, point: SchedulePoint) -> Result<(), ScheduleFull> {
        self.with(|inner| inner.schedule.push(point))?;
        self.wake.signal(());
        Ok(())
    }

    /// Hand the target to the schedule.
    ///
    /// With no set-points the manual target stays in control and the engine
    /// remains stopped.
    pub fn start(&self, now: NaiveDateTime) -> Result<EngineState, Error> {
        if matches!(self.channel.owner(), ControlOwner::Test { .. }) {
            return Err(Error::ControlBusy);
        }
        if self.with(|inner| inner.schedule.is_empty()) {
            info!("[ScheduleEngine.start] no set-points, staying on the manual target");
            self.channel.release_schedule()?;
            return Ok(EngineState::Stopped);
        }
        self.channel.claim_schedule()?;
        self.evaluate(now);
        self.wake.signal(());
        Ok(EngineState::Running)
    }

    /// Give the target back to the manual value
    pub fn stop(&self) -> Result<(), Error> {
        self.channel.release_schedule()?;
        self.wake.signal(());
        Ok(())
    }

    /// Drive the channel at `percent` of its range for the test duration.
    ///
    /// Starting a test while one runs restarts it with the new value.
    pub fn begin_test(&self, percent: u8, now: Instant) {
        let current = self.channel.limits().current_for_percent(percent);
        self.channel.claim_test(current);
        let deadline = now + self.settings.test_duration;
        self.with(|inner| inner.test_deadline = Some(deadline));
        self.wake.signal(());
    }

    /// End the test early. Returns `None` when no test was running.
    pub fn cancel_test(&self, now: NaiveDateTime) -> Option<Resume> {
        self.with(|inner| inner.test_deadline = None);
        let resume = self.end_test(now);
        self.wake.signal(());
        resume
    }

    fn end_test(&self, now: NaiveDateTime) -> Option<Resume> {
        let resume = self.channel.release_test()?;
        if resume == Resume::Scheduled {
            self.evaluate(now);
        }
        Some(resume)
    }

    /// Run one evaluation and compute the sleep until the next one
    pub fn tick(&self, now: NaiveDateTime, instant: Instant) -> Tick {
        let minute_sleep = self.until_next_minute(now);
        let deadline = self.with(|inner| inner.test_deadline);

        if let Some(deadline) = deadline {
            if instant < deadline {
                return Tick {
                    outcome: TickOutcome::TestActive,
                    sleep: minute_sleep.min(deadline - instant),
                };
            }
            self.with(|inner| inner.test_deadline = None);
            info!("[ScheduleEngine.tick] test override expired");
            if let Some(resume) = self.end_test(now) {
                return Tick {
                    outcome: TickOutcome::TestEnded(resume),
                    sleep: minute_sleep,
                };
            }
        }

        let outcome = match self.channel.owner() {
            ControlOwner::Scheduled => self.evaluate(now),
            ControlOwner::Test { .. } => TickOutcome::TestActive,
            ControlOwner::Manual => TickOutcome::Inactive,
        };
        Tick {
            outcome,
            sleep: minute_sleep,
        }
    }

    fn until_next_minute(&self, now: NaiveDateTime) -> Duration {
        let second = u64::from(now.second().min(59));
        Duration::from_secs(60 - second + self.settings.tick_offset_secs)
    }

    fn evaluate(&self, now: NaiveDateTime) -> TickOutcome {
        let anchors = self.with(|inner| {
            let previous = inner.schedule.find_nearest(now, Search::Previous)?;
            let next = inner.schedule.find_nearest(now, Search::Next)?;
            Some((previous, next))
        });
        let Some((previous, next)) = anchors else {
            warn!("[ScheduleEngine.evaluate] schedule is empty, falling back to manual");
            return match self.channel.release_schedule() {
                Ok(()) => TickOutcome::FellBack,
                Err(_) => TickOutcome::Inactive,
            };
        };

        info!(
            "[ScheduleEngine.evaluate] interval {}:{} - {}:{}",
            previous.point.hour, previous.point.minute, next.point.hour, next.point.minute
        );
        let percent = compute_target(&previous, &next, now, self.settings.percent_step);
        let current = self.channel.limits().current_for_percent(percent);
        match self.channel.write_scheduled_target(current) {
            Ok(changed) => {
                if changed {
                    debug!(
                        "[ScheduleEngine.evaluate] target {}% ({} mA)",
                        percent, current
                    );
                }
                TickOutcome::Applied { percent, changed }
            }
            Err(_) => TickOutcome::Inactive,
        }
    }

    /// Persist the set-points and whether the schedule is running
    pub fn save<S: Storage>(&self, store: &mut ConfigStore<S>) -> Result<(), Error> {
        store.save_schedule(&self.schedule(), self.is_running())
    }

    /// Restore the saved set-points and restart the schedule if it was
    /// running. A store without a schedule record yields an empty schedule.
    pub fn load<S: Storage>(
        &self,
        store: &mut ConfigStore<S>,
        now: NaiveDateTime,
    ) -> Result<EngineState, Error> {
        let (schedule, running) = match store.load_schedule() {
            Ok(stored) => (stored.schedule, stored.running),
            Err(Error::MissingRecord) => {
                info!("[ScheduleEngine.load] no saved schedule");
                (Schedule::new(), false)
            }
            Err(err) => return Err(err),
        };
        self.with(|inner| inner.schedule = schedule);
        self.wake.signal(());
        if running {
            self.start(now)
        } else {
            Ok(self.state())
        }
    }

    /// Evaluate forever, once per minute or whenever the engine is poked
    pub async fn run<C: Clock>(&self, clock: &C) {
        loop {
            let tick = self.tick(clock.now(), Instant::now());
            select(Timer::after(tick.sleep), self.wake.wait()).await;
        }
    }
}
