/*!
    Base infrastructure for the test framework. Includes basic setup for
    initializing the logger and loading the test configuration, and the
    [`TestContext`] shared by all operations of one test run.
*/

use alloc::sync::Arc;
use core::fmt;
use core::time::Duration;
use std::fs;
use std::sync::Mutex;
use std::time::SystemTime;
use tracing::{error, info, warn};

use crate::bootstrap::init::init_test;
use crate::error::Error;
use crate::types::config::TestConfig;
use crate::util::clock::{Clock, Deadline};
use crate::util::mutex::MutexUtil;
use crate::util::suspend::hang_on_error;

/**
   Runs a primitive test case implementing [`PrimitiveTest`].
*/
pub fn run_test<Test: PrimitiveTest>(test: &Test) -> Result<(), Error> {
    test.run()
}

/**
   Runs a basic test case implementing [`BasicTest`].
*/
pub fn run_basic_test<Test, Overrides>(test: &Test) -> Result<(), Error>
where
    Test: BasicTest,
    Test: HasOverrides<Overrides = Overrides>,
    Overrides: TestConfigOverride + ClockOverride,
{
    run_test(&RunBasicTest { test })
}

/**
   Used for test case wrappers to indicate that the inner test case
   implements override traits for overriding certain behavior of the test.

   Test writers do not need to be aware of this trait, as this is
   automatically handled by
   [TestOverrides](crate::framework::overrides::TestOverrides).
*/
pub trait HasOverrides {
    /**
       The inner type that implements the override traits.
    */
    type Overrides;

    /**
       Get the reference to the inner override type.
    */
    fn get_overrides(&self) -> &Self::Overrides;
}

/**
   A primitive test case provides no additional logic.
*/
pub trait PrimitiveTest {
    /// Test runner
    fn run(&self) -> Result<(), Error>;
}

/**
   A basic test has the minimal test setup that is essential for almost all
   tests.

   The test runner is given the [`TestContext`] of the run, which carries
   the [`TestConfig`], the clock and the reporter.
*/
pub trait BasicTest {
    /// Test runner
    fn run(&self, ctx: &TestContext) -> Result<(), Error>;
}

pub trait TestConfigOverride {
    fn modify_test_config(&self, config: &mut TestConfig);
}

/**
   An internal trait for choosing the clock of a test run. Tests against
   the simulated network run on a virtual clock by default.
*/
pub trait ClockOverride {
    fn clock(&self) -> Arc<dyn Clock>;
}

/**
   A wrapper type that lifts a test case that implements [`BasicTest`]
   into a test case that implements [`PrimitiveTest`].
*/
pub struct RunBasicTest<'a, Test> {
    /// Inner test
    pub test: &'a Test,
}

impl<'a, Test, Overrides> PrimitiveTest for RunBasicTest<'a, Test>
where
    Test: BasicTest,
    Test: HasOverrides<Overrides = Overrides>,
    Overrides: TestConfigOverride + ClockOverride,
{
    fn run(&self) -> Result<(), Error> {
        let mut config = init_test()?;
        self.test.get_overrides().modify_test_config(&mut config);
        config.validate()?;

        info!("starting test with test config: {:?}", config);

        let ctx = TestContext::new(config, self.test.get_overrides().clock());

        let result = hang_on_error(ctx.config.hang_on_fail, || self.test.run(&ctx));

        ctx.teardown(&result);

        result
    }
}

/**
   The state shared read-only by every operation of one test run. It is
   created once when the run starts and torn down when the run ends.
*/
pub struct TestContext {
    pub config: TestConfig,
    pub clock: Arc<dyn Clock>,
    pub reporter: TestReporter,
}

impl TestContext {
    pub fn new(config: TestConfig, clock: Arc<dyn Clock>) -> Self {
        let reporter = TestReporter::new(clock.clone());

        Self {
            config,
            clock,
            reporter,
        }
    }

    /// A fresh deadline on the clock of this run.
    pub fn deadline(&self, timeout: Duration) -> Deadline {
        Deadline::after(&self.clock, timeout)
    }

    /**
       Log the step summary and remove the data directory of the run,
       unless the run is configured to be kept for inspection.
    */
    pub fn teardown(&self, result: &Result<(), Error>) {
        self.reporter.log_summary();

        match result {
            Ok(()) => info!("test passed"),
            Err(e) => error!("test failed: {}", e),
        }

        if self.config.hang_on_fail {
            info!(
                "keeping test data at {}",
                self.config.chain_store_dir.display()
            );
        } else if let Err(e) = fs::remove_dir_all(&self.config.chain_store_dir) {
            warn!(
                "failed to remove test data at {}: {}",
                self.config.chain_store_dir.display(),
                e
            );
        }
    }
}

impl fmt::Debug for TestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestContext")
            .field("config", &self.config)
            .field("now", &self.clock.now())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Passed,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct StepReport {
    pub name: String,
    pub started: SystemTime,
    pub elapsed: Duration,
    pub outcome: StepOutcome,
}

/**
   Records the named steps of a test run together with their outcome and
   the time they took on the run's clock.
*/
pub struct TestReporter {
    clock: Arc<dyn Clock>,
    steps: Mutex<Vec<StepReport>>,
}

impl TestReporter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            steps: Mutex::new(Vec::new()),
        }
    }

    /**
       Run `step` and record its outcome under `name`. The result of the
       step is passed through unchanged.
    */
    pub fn step<R>(&self, name: &str, step: impl FnOnce() -> Result<R, Error>) -> Result<R, Error> {
        info!("starting step: {}", name);

        let started = self.clock.now();
        let result = step();
        let elapsed = self.clock.now().duration_since(started).unwrap_or_default();

        let outcome = match &result {
            Ok(_) => {
                info!("step `{}` passed after {:?}", name, elapsed);
                StepOutcome::Passed
            }
            Err(e) => {
                error!("step `{}` failed after {:?}: {}", name, elapsed, e);
                StepOutcome::Failed(e.to_string())
            }
        };

        self.steps.acquire_mutex()?.push(StepReport {
            name: name.to_string(),
            started,
            elapsed,
            outcome,
        });

        result
    }

    pub fn steps(&self) -> Vec<StepReport> {
        self.steps
            .acquire_mutex()
            .map(|steps| steps.clone())
            .unwrap_or_default()
    }

    pub fn log_summary(&self) {
        let steps = self.steps();

        let failed = steps
            .iter()
            .filter(|step| step.outcome != StepOutcome::Passed)
            .count();

        info!("{} steps run, {} failed", steps.len(), failed);

        for step in steps {
            match step.outcome {
                StepOutcome::Passed => info!("  passed  {} ({:?})", step.name, step.elapsed),
                StepOutcome::Failed(reason) => {
                    info!("  failed  {} ({:?}): {}", step.name, step.elapsed, reason)
                }
            }
        }
    }
}
