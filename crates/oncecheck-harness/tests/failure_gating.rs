//! The injected failure only fires after a checkpoint has completed, and
//! fires at most `max_failures` times across restarts.

use oncecheck_harness::{
    DriverState, HarnessConfig, HarnessError, RecordingExecutor, Step, WorkloadDriver,
};

const TOTAL: u64 = 40;

fn config(seed: u64) -> HarnessConfig {
    HarnessConfig {
        number_of_units: 4,
        message_count: TOTAL,
        command_depth: 3,
        max_failures: 1,
        seed: Some(seed),
        ..HarnessConfig::default()
    }
}

/// Finds a seed whose failure lands before the last index, so the cursor
/// can move past it.
fn driver_with_early_failure() -> (WorkloadDriver, u64, u64) {
    (0..1_000)
        .find_map(|seed| {
            let driver = WorkloadDriver::new(config(seed)).expect("valid config");
            match driver.scheduled_failure() {
                Some(index) if index + 1 < TOTAL => Some((driver, index, seed)),
                _ => None,
            }
        })
        .expect("some seed schedules an early failure")
}

#[test]
fn test_no_checkpoint_means_no_abort() {
    let (mut driver, _, _) = driver_with_early_failure();
    let mut recorder = RecordingExecutor::new();

    while driver.state() == DriverState::Generating {
        driver.step(&mut recorder).expect("no abort without a checkpoint");
    }

    assert_eq!(recorder.len() as u64, TOTAL);
    assert_eq!(driver.handle().progress().expect("progress").cursor, TOTAL);
}

#[test]
fn test_checkpoint_after_index_aborts_once() {
    let (mut driver, index, seed) = driver_with_early_failure();
    let mut recorder = RecordingExecutor::new();
    let handle = driver.handle();

    while handle.progress().expect("progress").cursor <= index {
        driver.step(&mut recorder).expect("step before checkpoint");
    }

    let checkpoint = handle.snapshot().expect("snapshot");
    assert_eq!(checkpoint.failures_injected, 1);
    handle.notify_checkpoint_complete(1);

    let err = driver.step(&mut recorder).expect_err("armed failure fires");
    assert!(err.is_injected_failure());
    assert!(matches!(err, HarnessError::InjectedFailure { index: at } if at == index + 1));
    // Nothing was delivered for the aborted index.
    assert_eq!(recorder.len() as u64, index + 1);

    // The restarted instance has spent its budget and never aborts again.
    let mut restarted = WorkloadDriver::restore(config(seed), checkpoint).expect("restore");
    assert_eq!(restarted.scheduled_failure(), None);
    restarted.handle().notify_checkpoint_complete(2);
    loop {
        match restarted.step(&mut recorder).expect("no second abort") {
            Step::Delivered { .. } => {}
            Step::GenerationComplete { cursor } => {
                assert_eq!(cursor, TOTAL);
                break;
            }
            other => panic!("unexpected step {other:?}"),
        }
    }
    assert_eq!(
        restarted.handle().progress().expect("progress").failures_injected,
        1
    );
}

#[test]
fn test_checkpoint_before_index_waits_for_index() {
    let (mut driver, index, _) = driver_with_early_failure();
    let mut recorder = RecordingExecutor::new();
    driver.handle().notify_checkpoint_complete(1);

    let mut delivered = 0;
    let err = loop {
        match driver.step(&mut recorder) {
            Ok(Step::Delivered { .. }) => delivered += 1,
            Ok(other) => panic!("generation ended without abort: {other:?}"),
            Err(err) => break err,
        }
    };

    assert_eq!(delivered, index);
    assert!(matches!(err, HarnessError::InjectedFailure { index: at } if at == index));
}

#[test]
fn test_zero_budget_never_schedules() {
    let config = HarnessConfig {
        max_failures: 0,
        ..config(1)
    };
    let driver = WorkloadDriver::new(config).expect("valid config");
    assert_eq!(driver.scheduled_failure(), None);
    assert_eq!(
        driver.handle().progress().expect("progress").failures_injected,
        0
    );
}
