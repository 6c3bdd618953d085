mod tests {
    use chrono::{NaiveDate, NaiveDateTime, Weekday};
    use myrtio_led_driver::error::ScheduleFull;
    use myrtio_led_driver::schedule::{compute_target, round_to_step};
    use myrtio_led_driver::{Anchor, DaySelector, Schedule, SchedulePoint, Search};

    fn at(day: u32, hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day)
            .unwrap()
            .and_hms_opt(hour, minute, second)
            .unwrap()
    }

    fn day_schedule(fade: bool) -> Schedule {
        Schedule::from_points(&[
            SchedulePoint::daily(8, 0, 20, false),
            SchedulePoint::daily(20, 0, 80, fade),
        ])
        .unwrap()
    }

    #[test]
    fn test_nearest_points_and_fade() {
        let schedule = day_schedule(true);
        let now = at(8, 10, 0, 0);

        let previous = schedule.find_nearest(now, Search::Previous).unwrap();
        let next = schedule.find_nearest(now, Search::Next).unwrap();
        assert_eq!(previous.at, at(8, 8, 0, 0));
        assert_eq!(previous.point.value, 20);
        assert_eq!(next.at, at(8, 20, 0, 0));
        assert_eq!(next.point.value, 80);

        assert_eq!(compute_target(&previous, &next, now, 5), 30);
    }

    #[test]
    fn test_step_uses_next_value() {
        let schedule = day_schedule(false);
        let now = at(8, 10, 0, 0);
        let previous = schedule.find_nearest(now, Search::Previous).unwrap();
        let next = schedule.find_nearest(now, Search::Next).unwrap();

        assert_eq!(compute_target(&previous, &next, now, 5), 80);
    }

    #[test]
    fn test_day_wraparound() {
        let schedule = Schedule::<4>::from_points(&[SchedulePoint::daily(23, 50, 40, true)]).unwrap();
        let now = at(8, 0, 10, 0);

        let previous = schedule.find_nearest(now, Search::Previous).unwrap();
        let next = schedule.find_nearest(now, Search::Next).unwrap();
        assert_eq!(previous.at, at(7, 23, 50, 0));
        assert_eq!(next.at, at(8, 23, 50, 0));
    }

    #[test]
    fn test_empty_schedule_has_no_points() {
        let schedule = Schedule::<4>::new();
        assert!(schedule.find_nearest(at(8, 12, 0, 0), Search::Previous).is_none());
        assert!(schedule.find_nearest(at(8, 12, 0, 0), Search::Next).is_none());
    }

    #[test]
    fn test_seconds_are_truncated() {
        let schedule = day_schedule(false);
        let now = at(8, 8, 0, 30);

        let previous = schedule.find_nearest(now, Search::Previous).unwrap();
        let next = schedule.find_nearest(now, Search::Next).unwrap();
        assert_eq!(next.at, at(8, 8, 0, 0));
        assert_eq!(previous.at, at(7, 20, 0, 0));
    }

    #[test]
    fn test_ties_keep_first() {
        let schedule = Schedule::<4>::from_points(&[
            SchedulePoint::daily(9, 0, 10, false),
            SchedulePoint::daily(9, 0, 90, false),
        ])
        .unwrap();
        let now = at(8, 12, 0, 0);

        assert_eq!(schedule.find_nearest(now, Search::Previous).unwrap().point.value, 10);
        assert_eq!(schedule.find_nearest(now, Search::Next).unwrap().point.value, 10);
    }

    #[test]
    fn test_weekday_points() {
        // 2024-05-08 is a Wednesday
        let schedule = Schedule::<4>::from_points(&[SchedulePoint::new(
            DaySelector::On(Weekday::Mon),
            8,
            0,
            50,
            false,
        )])
        .unwrap();
        let now = at(8, 10, 0, 0);

        let previous = schedule.find_nearest(now, Search::Previous).unwrap();
        let next = schedule.find_nearest(now, Search::Next).unwrap();
        assert_eq!(previous.at, at(6, 8, 0, 0));
        assert_eq!(next.at, at(13, 8, 0, 0));
    }

    #[test]
    fn test_zero_length_fade_uses_next() {
        let from = Anchor {
            at: at(8, 8, 0, 0),
            point: SchedulePoint::daily(8, 0, 20, true),
        };
        let to = Anchor {
            at: at(8, 8, 0, 0),
            point: SchedulePoint::daily(8, 0, 60, true),
        };
        assert_eq!(compute_target(&from, &to, at(8, 8, 0, 0), 5), 60);
    }

    #[test]
    fn test_round_to_step() {
        assert_eq!(round_to_step(32.5, 5), 35);
        assert_eq!(round_to_step(31.0, 5), 30);
        assert_eq!(round_to_step(104.0, 5), 100);
        assert_eq!(round_to_step(-3.0, 5), 0);
        assert_eq!(round_to_step(33.0, 0), 33);
    }

    #[test]
    fn test_full_schedule_rejects_point() {
        let mut schedule = Schedule::<2>::new();
        schedule.push(SchedulePoint::daily(1, 0, 0, false)).unwrap();
        schedule.push(SchedulePoint::daily(2, 0, 0, false)).unwrap();

        assert_eq!(
            schedule.push(SchedulePoint::daily(3, 0, 0, false)),
            Err(ScheduleFull(2))
        );
        assert_eq!(schedule.len(), 2);
    }

    #[test]
    fn test_point_fields_are_clamped() {
        let point = SchedulePoint::daily(25, 75, 140, true);
        assert_eq!((point.hour, point.minute, point.value), (23, 59, 100));
    }

    #[test]
    fn test_day_selector_encoding() {
        assert_eq!(DaySelector::from_raw(0), DaySelector::Every);
        assert_eq!(DaySelector::from_raw(1), DaySelector::On(Weekday::Mon));
        assert_eq!(DaySelector::from_raw(9), DaySelector::Every);
        assert_eq!(DaySelector::On(Weekday::Sun).to_raw(), 7);
    }
}
