//! Property tests for the engine's round-trip and range-filter guarantees.
//!
//! Uses proptest to verify that arbitrary write sequences come back exactly,
//! as a multiset, for any queried series and any inclusive range.

use emberlog::{Engine, EngineConfig, Point};
use proptest::prelude::*;
use std::time::Duration;
use tempfile::TempDir;

const SENSORS: [&str; 3] = ["press/line-a", "temp/line-a", "temp/line-b"];

fn value_strategy() -> impl Strategy<Value = f64> {
    -1.0e12f64..1.0e12f64
}

/// Small blocks so a few hundred points exercise flush and rotation.
fn test_config(dir: &std::path::Path) -> EngineConfig {
    EngineConfig::new(dir)
        .with_block_max_points(8)
        .with_max_segment_size(512)
        .with_force_flush_interval(Duration::from_secs(3600))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_round_trip_multiset(
        writes in prop::collection::vec((0usize..SENSORS.len(), value_strategy()), 1..200)
    ) {
        let dir = TempDir::new().unwrap();
        let engine = Engine::open(test_config(dir.path())).unwrap();

        let mut expected: Vec<Vec<Point>> = vec![Vec::new(); SENSORS.len()];
        for (i, (sensor, value)) in writes.iter().enumerate() {
            let time = i as i64;
            engine.write(SENSORS[*sensor], time, *value).unwrap();
            expected[*sensor].push(Point::new(time, *value));
        }

        for (sensor, expected_points) in expected.iter().enumerate() {
            let mut got = engine.query(SENSORS[sensor], i64::MIN, i64::MAX).unwrap();
            // Timestamps are unique per series, so time order is a total
            // order and sorted comparison is multiset comparison.
            got.sort_by_key(|p| p.time);
            prop_assert_eq!(&got, expected_points);
        }

        engine.close().unwrap();
    }

    #[test]
    fn prop_range_filter_sound(
        count in 1usize..150,
        raw_bounds in (0i64..400, 0i64..400)
    ) {
        let start = raw_bounds.0.min(raw_bounds.1);
        let end = raw_bounds.0.max(raw_bounds.1);

        let dir = TempDir::new().unwrap();
        let engine = Engine::open(test_config(dir.path())).unwrap();

        let written: Vec<Point> = (0..count)
            .map(|i| Point::new(i as i64 * 2, i as f64))
            .collect();
        for p in &written {
            engine.write("s", p.time, p.value).unwrap();
        }

        let mut got = engine.query("s", start, end).unwrap();
        got.sort_by_key(|p| p.time);

        let expected: Vec<Point> = written
            .iter()
            .filter(|p| p.time >= start && p.time <= end)
            .copied()
            .collect();
        prop_assert_eq!(got, expected);

        engine.close().unwrap();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_graceful_restart_preserves_everything(
        writes in prop::collection::vec((0usize..SENSORS.len(), value_strategy()), 1..120)
    ) {
        let dir = TempDir::new().unwrap();

        let mut expected: Vec<Vec<Point>> = vec![Vec::new(); SENSORS.len()];
        {
            let engine = Engine::open(test_config(dir.path())).unwrap();
            for (i, (sensor, value)) in writes.iter().enumerate() {
                let time = i as i64;
                engine.write(SENSORS[*sensor], time, *value).unwrap();
                expected[*sensor].push(Point::new(time, *value));
            }
            engine.close().unwrap();
        }

        let engine = Engine::open(test_config(dir.path())).unwrap();
        for (sensor, expected_points) in expected.iter().enumerate() {
            let mut got = engine.query(SENSORS[sensor], i64::MIN, i64::MAX).unwrap();
            got.sort_by_key(|p| p.time);
            prop_assert_eq!(&got, expected_points);
        }
        engine.close().unwrap();
    }
}
