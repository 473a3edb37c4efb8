// Copyright (c) The ticksync Authors.
// Licensed under the MIT License.

use std::sync::LazyLock;
use std::time::Duration;

use ticksync::LocalScheduler;
use tracing::Instrument;
use tracing_subscriber::EnvFilter;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Harness behind `#[ticksync::test]`.
///
/// Runs `future` on a fresh scheduler inside a span named after the test and
/// fails the test if it stalls or outlives [`TEST_TIMEOUT`].
pub fn run_test<F: Future>(test_name: &'static str, future: F) -> F::Output {
    static TRACING: LazyLock<()> = LazyLock::new(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .try_init();
    });
    LazyLock::force(&TRACING);

    let scheduler = LocalScheduler::new();
    let test = future.instrument(tracing::info_span!("test", test_name));
    match scheduler.block_on(scheduler.timeout(TEST_TIMEOUT, test)) {
        Ok(Ok(output)) => output,
        Ok(Err(_elapsed)) => panic!("test timed out"),
        Err(stalled) => panic!("{stalled}"),
    }
}

/// The scheduler running the current test.
pub fn scheduler() -> LocalScheduler {
    LocalScheduler::current().expect("called outside of a ticksync test")
}
