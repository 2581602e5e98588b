//! Property tests: the shadow model agrees with a correct executor, and
//! generated trees stay within their configured bounds.

use oncecheck_harness::{
    DriverState, HarnessConfig, LocalCluster, RandomCommandTree, SimRng, Step, UnitId,
    WorkloadDriver,
};
use proptest::prelude::*;

fn config(units: u32, messages: u64, depth: u32, seed: u64) -> HarnessConfig {
    HarnessConfig {
        number_of_units: units,
        message_count: messages,
        command_depth: depth,
        max_failures: 0,
        seed: Some(seed),
        ..HarnessConfig::default()
    }
}

fn assert_agreement(driver: &WorkloadDriver, cluster: &LocalCluster, units: u32) {
    let handle = driver.handle();
    for unit in (0..units).map(UnitId::new) {
        assert_eq!(
            handle.expected_state(unit).expect("unit in range"),
            cluster.counter(unit).expect("unit in range"),
            "unit {unit} disagrees"
        );
    }
}

proptest! {
    #[test]
    fn tracker_matches_executor_on_every_prefix(
        seed in any::<u64>(),
        units in 1u32..8,
        messages in 1u64..60,
        depth in 0u32..5,
        prefix in 0u64..60,
    ) {
        let mut driver = WorkloadDriver::new(config(units, messages, depth, seed))
            .expect("valid config");
        let mut cluster = LocalCluster::new(units);

        for _ in 0..prefix.min(messages) {
            let step = driver.step(&mut cluster).expect("step");
            let delivered = matches!(step, Step::Delivered { .. });
            prop_assert!(delivered);
            cluster.advance_tick().expect("tick");
        }
        cluster.flush().expect("flush");
        assert_agreement(&driver, &cluster, units);

        while driver.state() == DriverState::Generating {
            driver.step(&mut cluster).expect("step");
        }
        cluster.flush().expect("flush");
        assert_agreement(&driver, &cluster, units);

        // A sweep over a correct executor never reports a violation.
        let step = driver.step(&mut cluster).expect("sweep");
        prop_assert_eq!(step, Step::Swept { sweep: 1, units });
    }

    #[test]
    fn generated_trees_respect_depth_and_fan_out(
        seed in any::<u64>(),
        depth in 0u32..7,
        fan_out in 1u32..5,
        units in 1u32..20,
    ) {
        let config = HarnessConfig {
            number_of_units: units,
            command_depth: depth,
            max_commands_per_depth: fan_out,
            ..HarnessConfig::default()
        };
        let mut generator = RandomCommandTree::new(&config, SimRng::new(seed));

        for _ in 0..20 {
            let tree = generator.generate();
            prop_assert!(tree.depth() <= depth as usize);
            prop_assert!(tree.max_fan_out() <= fan_out as usize);

            let mut in_range = true;
            tree.for_each_target(UnitId::new(0), &mut |unit, _| {
                in_range &= unit.is_within(units);
            });
            prop_assert!(in_range);
        }
    }
}
