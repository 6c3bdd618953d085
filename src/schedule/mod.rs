//! Lighting schedule
//!
//! A schedule is an insertion-ordered list of set-points. At any moment the
//! channel's target is derived from the set-point most recently passed and
//! the one coming up next; when the upcoming one fades, the target is
//! interpolated linearly between the two.

pub mod engine;

use chrono::{Datelike, NaiveDateTime, TimeDelta, Timelike, Weekday};
use heapless::Vec;

use crate::error::ScheduleFull;

/// Maximum number of set-points a schedule can hold
pub const MAX_SCHEDULE_POINTS: usize = 50;

/// Default granularity of computed percentages
pub const DEFAULT_PERCENT_STEP: u8 = 5;

/// Days a set-point applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DaySelector {
    #[default]
    Every,
    On(Weekday),
}

impl DaySelector {
    /// Persisted encoding: 0 for every day, 1–7 for Monday–Sunday
    pub fn to_raw(self) -> u8 {
        match self {
            Self::Every => 0,
            #[allow(clippy::cast_possible_truncation)]
            Self::On(day) => day.number_from_monday() as u8,
        }
    }

    /// Unknown values decode as every day
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1..=7 => Weekday::try_from(raw - 1).map_or(Self::Every, Self::On),
            _ => Self::Every,
        }
    }

    fn period_days(self) -> i64 {
        match self {
            Self::Every => 1,
            Self::On(_) => 7,
        }
    }
}

/// A scheduled (time, value, fade) tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulePoint {
    pub day: DaySelector,
    pub hour: u8,
    pub minute: u8,
    /// Target percentage, 0–100
    pub value: u8,
    /// Fade into this point from the previous one
    pub fade: bool,
}

impl SchedulePoint {
    /// Out-of-range fields are clamped
    pub fn new(day: DaySelector, hour: u8, minute: u8, value: u8, fade: bool) -> Self {
        let point = Self {
            day,
            hour: hour.min(23),
            minute: minute.min(59),
            value: value.min(100),
            fade,
        };
        if point.hour != hour || point.minute != minute || point.value != value {
            warn!(
                "[SchedulePoint.new] {}:{} {}% clamped to {}:{} {}%",
                hour, minute, value, point.hour, point.minute, point.value
            );
        }
        point
    }

    /// Every-day point
    pub fn daily(hour: u8, minute: u8, value: u8, fade: bool) -> Self {
        Self::new(DaySelector::Every, hour, minute, value, fade)
    }
}

/// Which neighbour of `now` to look for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Search {
    Previous,
    Next,
}

/// A set-point pinned to a concrete instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub at: NaiveDateTime,
    pub point: SchedulePoint,
}

/// Drop seconds and sub-second parts
pub fn truncate_to_minute(now: NaiveDateTime) -> NaiveDateTime {
    now.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}

/// Bounded list of set-points
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schedule<const N: usize = MAX_SCHEDULE_POINTS> {
    points: Vec<SchedulePoint, N>,
}

impl<const N: usize> Schedule<N> {
    pub const fn new() -> Self {
        Self { points: Vec::new() }
    }

    pub fn points(&self) -> &[SchedulePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Append a set-point; a full schedule rejects it
    pub fn push(&mut self, point: SchedulePoint) -> Result<(), ScheduleFull> {
        self.points.push(point).map_err(|_| {
            error!("[Schedule.push] maximum of {} points reached", N);
            ScheduleFull(N)
        })
    }

    /// Build a schedule from a full list, rejecting it when it does not fit
    pub fn from_points(points: &[SchedulePoint]) -> Result<Self, ScheduleFull> {
        let mut schedule = Self::new();
        for point in points {
            schedule.push(*point)?;
        }
        Ok(schedule)
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Find the set-point instance closest to `now` on the requested side.
    ///
    /// `Previous` yields the latest instance strictly before `now`, `Next`
    /// the earliest at or after it. Returns `None` only for an empty
    /// schedule.
    pub fn find_nearest(&self, now: NaiveDateTime, search: Search) -> Option<Anchor> {
        let now = truncate_to_minute(now);
        let mut best: Option<Anchor> = None;
        for point in &self.points {
            let Some(at) = candidate(point, now, search) else {
                continue;
            };
            let better = match (best, search) {
                (None, _) => true,
                (Some(current), Search::Previous) => at > current.at,
                (Some(current), Search::Next) => at < current.at,
            };
            if better {
                best = Some(Anchor { at, point: *point });
            }
        }
        best
    }
}

/// Instance of `point` on the `search` side of `now`
fn candidate(point: &SchedulePoint, now: NaiveDateTime, search: Search) -> Option<NaiveDateTime> {
    let today = now.date();
    let offset = match point.day {
        DaySelector::Every => 0,
        DaySelector::On(day) => {
            let wanted = i64::from(day.num_days_from_monday());
            let current = i64::from(today.weekday().num_days_from_monday());
            match search {
                Search::Previous => -(current - wanted).rem_euclid(7),
                Search::Next => (wanted - current).rem_euclid(7),
            }
        }
    };
    let base = today.checked_add_signed(TimeDelta::try_days(offset)?)?;
    let mut at = base.and_hms_opt(u32::from(point.hour), u32::from(point.minute), 0)?;
    let period = TimeDelta::try_days(point.day.period_days())?;
    match search {
        Search::Previous if at >= now => at = at.checked_sub_signed(period)?,
        Search::Next if at < now => at = at.checked_add_signed(period)?,
        _ => {}
    }
    Some(at)
}

/// Round `value` to the nearest multiple of `step`, ties away from zero
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn round_to_step(value: f32, step: u8) -> u8 {
    let step = f32::from(step.max(1));
    let rounded = libm::roundf(value / step) * step;
    rounded.max(0.0).min(100.0) as u8
}

/// Target percentage at `now` between two anchors
pub fn compute_target(previous: &Anchor, next: &Anchor, now: NaiveDateTime, step: u8) -> u8 {
    if !next.point.fade || previous.point.value == next.point.value {
        return next.point.value;
    }

    let total = (next.at - previous.at).num_minutes();
    if total == 0 {
        warn!(
            "[schedule.compute_target] zero-length fade at {}:{}",
            next.point.hour, next.point.minute
        );
        return next.point.value;
    }

    let elapsed = (truncate_to_minute(now) - previous.at).num_minutes();
    #[allow(clippy::cast_precision_loss)]
    let fraction = elapsed as f32 / total as f32;
    let from = f32::from(previous.point.value);
    let to = f32::from(next.point.value);
    round_to_step(from + (to - from) * fraction, step)
}
