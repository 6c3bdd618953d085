mod tests {
    use chrono::Weekday;
    use myrtio_led_driver::storage::{SCHEDULE_OFFSET, STORAGE_SIZE};
    use myrtio_led_driver::{
        ChannelConfig, ConfigStore, DaySelector, Error, FanConfig, LedDescriptor, LedKind,
        Limits, RamStorage, Schedule, SchedulePoint, Storage, StorageError,
    };

    fn store() -> ConfigStore<RamStorage> {
        ConfigStore::new(RamStorage::new())
    }

    #[test]
    fn test_channel_round_trip() {
        let mut store = store();
        let mut config = ChannelConfig {
            enabled: false,
            limits: Limits::new(20.0, 650.5, 36.0),
            target_current: 300.25,
            ..ChannelConfig::default()
        };
        config
            .leds
            .push(LedDescriptor {
                kelvin: 6500,
                wavelength_nm: 0,
                watts: 3,
                kind: LedKind::White,
            })
            .unwrap();
        config
            .leds
            .push(LedDescriptor {
                kelvin: 0,
                wavelength_nm: 450,
                watts: 1,
                kind: LedKind::Colored,
            })
            .unwrap();

        store.save_channel(&config).unwrap();
        assert_eq!(store.load_channel(), Ok(config));
        assert_eq!(store.storage().commits(), 1);
    }

    #[test]
    fn test_schedule_round_trip() {
        let mut store = store();
        let mut schedule = Schedule::new();
        schedule.push(SchedulePoint::daily(7, 30, 10, false)).unwrap();
        schedule
            .push(SchedulePoint::new(DaySelector::On(Weekday::Sat), 21, 15, 65, true))
            .unwrap();

        store.save_schedule(&schedule, true).unwrap();
        let stored = store.load_schedule().unwrap();
        assert_eq!(stored.schedule, schedule);
        assert!(stored.running);
    }

    #[test]
    fn test_schedule_capacity_round_trip() {
        let mut store = store();
        let mut schedule = Schedule::new();
        for i in 0..50u8 {
            schedule
                .push(SchedulePoint::daily(i % 24, i, i * 2, i % 2 == 0))
                .unwrap();
        }

        store.save_schedule(&schedule, false).unwrap();
        let stored = store.load_schedule().unwrap();
        assert_eq!(stored.schedule.len(), 50);
        assert_eq!(stored.schedule, schedule);
        assert!(!stored.running);
    }

    #[test]
    fn test_empty_schedule_round_trip() {
        let mut store = store();
        store.save_schedule(&Schedule::new(), false).unwrap();
        assert!(store.load_schedule().unwrap().schedule.is_empty());
    }

    #[test]
    fn test_fan_round_trip() {
        let mut store = store();
        let config = FanConfig {
            enabled: false,
            min_level: 100,
            max_level: 900,
            min_channel_percent: 20,
            max_channel_percent: 80,
        };

        store.save_fan(&config).unwrap();
        assert_eq!(store.load_fan(), Ok(config));
    }

    #[test]
    fn test_erased_store_has_no_records() {
        let mut store = store();
        assert_eq!(store.load_channel(), Err(Error::MissingRecord));
        assert_eq!(store.load_schedule().map(|s| s.running), Err(Error::MissingRecord));
        assert_eq!(store.load_fan(), Err(Error::MissingRecord));
    }

    #[test]
    fn test_commit_failure_is_reported() {
        let mut store = store();
        store.storage_mut().set_fail_commit(true);

        assert_eq!(
            store.save_fan(&FanConfig::default()),
            Err(Error::Storage(StorageError::CommitFailed))
        );
        assert_eq!(store.storage().commits(), 0);
    }

    #[test]
    fn test_impossible_count_is_corrupt() {
        let mut store = store();
        store.save_schedule(&Schedule::new(), false).unwrap();
        store.storage_mut().write(SCHEDULE_OFFSET + 3, &[60]).unwrap();

        assert_eq!(store.load_schedule().map(|s| s.running), Err(Error::CorruptRecord));
    }

    #[test]
    fn test_unknown_version_is_corrupt() {
        let mut store = store();
        store.save_channel(&ChannelConfig::default()).unwrap();
        store.storage_mut().write(1, &[9]).unwrap();

        assert_eq!(store.load_channel(), Err(Error::CorruptRecord));
    }

    #[test]
    fn test_small_device_is_out_of_bounds() {
        let mut store = ConfigStore::new(RamStorage::<64>::new());
        assert_eq!(
            store.save_schedule(&Schedule::new(), false),
            Err(Error::Storage(StorageError::OutOfBounds {
                offset: SCHEDULE_OFFSET,
                len: 254
            }))
        );
        assert_eq!(STORAGE_SIZE, RamStorage::<STORAGE_SIZE>::new().bytes().len());
    }
}
