mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use myrtio_led_driver::output::DEFAULT_MAX_LEVEL;
    use myrtio_led_driver::regulator::hysteresis;
    use myrtio_led_driver::{
        Direction, Output, OutputDriver, Polarity, RegulationInput, Regulator, Sample,
    };

    #[derive(Clone, Default)]
    struct Dac {
        writes: Rc<RefCell<Vec<u16>>>,
    }

    impl OutputDriver for Dac {
        fn write_level(&mut self, level: u16) {
            self.writes.borrow_mut().push(level);
        }
    }

    /// Linear LED load: 2 mA per output unit at a fixed 12 V
    fn plant(level: u16) -> Sample {
        Sample::new(12.0, f32::from(level) * 2.0)
    }

    fn input(target_current: f32, generation: u32) -> RegulationInput {
        RegulationInput {
            target_current,
            max_voltage: 24.0,
            max_current: 700.0,
            generation,
        }
    }

    fn output() -> Output<Dac> {
        Output::new(Dac::default(), DEFAULT_MAX_LEVEL, Polarity::Direct)
    }

    /// Feed plant samples until stable; returns the number of samples used
    fn settle(
        regulator: &mut Regulator,
        input: &RegulationInput,
        output: &mut Output<Dac>,
    ) -> usize {
        for samples in 1..=usize::from(DEFAULT_MAX_LEVEL) + 1 {
            let report = regulator.update(input, plant(output.level()), output);
            if report.stable {
                return samples;
            }
        }
        panic!("regulator did not settle");
    }

    #[test]
    fn test_hysteresis_floor() {
        assert_eq!(hysteresis(0.0), 5.0);
        assert_eq!(hysteresis(8.0), 5.0);
        assert_eq!(hysteresis(700.0), 350.0);
    }

    #[test]
    fn test_converges_upward() {
        let mut regulator = Regulator::new();
        let mut output = output();
        let samples = settle(&mut regulator, &input(100.0, 1), &mut output);

        assert_eq!(output.level(), 50);
        assert_eq!(samples, 51);
        assert_eq!(regulator.direction(), Direction::Increase);
    }

    #[test]
    fn test_converges_downward() {
        let mut regulator = Regulator::new();
        let mut output = output();
        output.apply(200);
        settle(&mut regulator, &input(100.0, 1), &mut output);

        assert_eq!(output.level(), 50);
        assert_eq!(regulator.direction(), Direction::Decrease);
    }

    #[test]
    fn test_direction_is_monotonic() {
        let mut regulator = Regulator::new();
        let mut output = output();
        let input = input(150.0, 1);
        let mut previous = output.level();
        loop {
            let report = regulator.update(&input, plant(output.level()), &mut output);
            assert!(report.level >= previous);
            assert!(report.level - previous <= 1);
            previous = report.level;
            if report.stable {
                break;
            }
        }
        assert_eq!(previous, 75);
    }

    #[test]
    fn test_holds_after_stable() {
        let mut regulator = Regulator::new();
        let mut output = output();
        let input = input(100.0, 1);
        settle(&mut regulator, &input, &mut output);

        for _ in 0..20 {
            let report = regulator.update(&input, plant(output.level()), &mut output);
            assert!(report.stable);
            assert_eq!(report.level, 50);
        }
    }

    #[test]
    fn test_saturates_at_rail() {
        let mut regulator = Regulator::new();
        let mut output = output();
        let samples = settle(&mut regulator, &input(600.0, 1), &mut output);

        assert_eq!(output.level(), DEFAULT_MAX_LEVEL);
        assert_eq!(samples, usize::from(DEFAULT_MAX_LEVEL) + 1);
    }

    #[test]
    fn test_rail_stays_latched_outside_band() {
        let dac = Dac::default();
        let writes = dac.writes.clone();
        let mut output = Output::new(dac, DEFAULT_MAX_LEVEL, Polarity::Direct);
        let mut regulator = Regulator::new();
        // 5 mA band, target far above what the load can draw
        let input = RegulationInput {
            target_current: 600.0,
            max_voltage: 24.0,
            max_current: 10.0,
            generation: 1,
        };
        settle(&mut regulator, &input, &mut output);
        assert_eq!(output.level(), DEFAULT_MAX_LEVEL);
        let settled_writes = writes.borrow().len();

        for _ in 0..20 {
            let report = regulator.update(&input, plant(output.level()), &mut output);
            assert!(report.stable);
            assert_eq!(report.level, DEFAULT_MAX_LEVEL);
            assert_eq!(report.direction, Direction::Increase);
        }
        assert_eq!(writes.borrow().len(), settled_writes);

        // Drifting the other way still starts a new episode
        let report = regulator.update(&input, Sample::new(12.0, 700.0), &mut output);
        assert!(!report.stable);
        assert_eq!(report.direction, Direction::Decrease);
        assert_eq!(report.level, DEFAULT_MAX_LEVEL - 1);
    }

    #[test]
    fn test_voltage_ceiling_stops_increase() {
        let mut regulator = Regulator::new();
        let mut output = output();
        let input = RegulationInput {
            target_current: 1000.0,
            max_voltage: 10.0,
            max_current: 1000.0,
            generation: 1,
        };
        loop {
            let level = output.level();
            let sample = Sample::new(f32::from(level) / 10.0, f32::from(level) * 2.0);
            if regulator.update(&input, sample, &mut output).stable {
                break;
            }
        }
        assert_eq!(output.level(), 101);
    }

    #[test]
    fn test_new_generation_restarts_episode() {
        let mut regulator = Regulator::new();
        let mut output = output();
        settle(&mut regulator, &input(100.0, 1), &mut output);

        let next = input(200.0, 2);
        let report = regulator.update(&next, plant(output.level()), &mut output);
        assert!(!report.stable);
        assert_eq!(report.direction, Direction::Increase);
        assert_eq!(report.generation, 2);

        settle(&mut regulator, &next, &mut output);
        assert_eq!(output.level(), 100);
    }

    #[test]
    fn test_leaving_band_restarts_episode() {
        let mut regulator = Regulator::new();
        let mut output = output();
        let input = input(100.0, 1);
        settle(&mut regulator, &input, &mut output);

        // Inside the band: nothing happens
        let report = regulator.update(&input, Sample::new(12.0, 400.0), &mut output);
        assert!(report.stable);
        assert_eq!(report.level, 50);

        let report = regulator.update(&input, Sample::new(12.0, 500.0), &mut output);
        assert!(!report.stable);
        assert_eq!(report.direction, Direction::Decrease);
        assert_eq!(report.level, 49);
    }

    #[test]
    fn test_inverted_polarity_writes_complement() {
        let dac = Dac::default();
        let writes = dac.writes.clone();
        let mut output = Output::new(dac, DEFAULT_MAX_LEVEL, Polarity::Inverted);

        output.apply(0);
        assert!(output.step(Direction::Increase));
        assert_eq!(output.level(), 1);
        assert_eq!(*writes.borrow(), vec![255, 254]);
    }

    #[test]
    fn test_step_refuses_past_rail() {
        let dac = Dac::default();
        let writes = dac.writes.clone();
        let mut output = Output::new(dac, 3, Polarity::Direct);

        assert!(!output.step(Direction::Decrease));
        assert!(output.is_saturated(Direction::Decrease));
        output.apply(10);
        assert_eq!(output.level(), 3);
        assert!(!output.step(Direction::Increase));
        assert!(!output.step(Direction::Undetermined));
        assert_eq!(*writes.borrow(), vec![3]);
    }
}
