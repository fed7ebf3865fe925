//! Test execution runner
//!
//! Drives one test case through its lifecycle and collects a result per
//! iteration.

use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::harness::{HarnessResult, TestCase, TestContext, TestError};
use crate::models::{RunSummary, TestMeta, TestResult, TestStatus};
use crate::utils::{Stopwatch, Timer};

/// Runs test cases against the device described by its context
pub struct TestRunner {
    ctx: TestContext,
}

impl TestRunner {
    pub fn new(ctx: TestContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &TestContext {
        &self.ctx
    }

    fn summary(&self, meta: TestMeta, results: Vec<TestResult>) -> RunSummary {
        let uut = self.ctx.uut();
        RunSummary::new(meta, uut.uut_ip.clone(), uut.product, results)
            .with_firmware(uut.firmware_version.clone())
    }

    /// Run the whole lifecycle of `case`
    pub async fn run(&self, case: &mut dyn TestCase) -> RunSummary {
        let meta = case.meta();
        let name = meta.name.clone();
        let product = self.ctx.uut().product;
        let settings = self.ctx.settings().clone();

        if !meta.supports(product) {
            info!("Skipping {}: not supported on {}", name, product);
            let result =
                TestResult::skip(&name, 0, format!("{name} does not support {product}"));
            return self.summary(meta, vec![result]);
        }

        info!(
            "Starting {} on {} ({}) for {} iteration(s)",
            name,
            self.ctx.uut().uut_ip,
            product,
            settings.loop_times
        );

        let timer = Timer::start("init");
        if let Err(e) = case.init(&self.ctx).await {
            error!("{} init failed: {}", name, e);
            return self.summary(meta, vec![setup_result(&name, "init", e, timer.stop())]);
        }

        let timer = Timer::start("before_loop");
        if let Err(e) = case.before_loop(&self.ctx).await {
            error!("{} before_loop failed: {}", name, e);
            return self.summary(
                meta,
                vec![setup_result(&name, "before_loop", e, timer.stop())],
            );
        }

        let mut results = Vec::with_capacity(settings.loop_times as usize);

        for iteration in 1..=settings.loop_times {
            info!("=== {} iteration {}/{} ===", name, iteration, settings.loop_times);

            let result = self.run_iteration(case, &name, iteration).await;
            info!("  {}", result);

            let stop = settings.stop_on_failure && result.status.is_failure();
            results.push(result);

            if stop {
                warn!("Stopping {} after failed iteration {}", name, iteration);
                break;
            }

            if iteration < settings.loop_times && settings.iteration_interval_secs > 0 {
                tokio::time::sleep(Duration::from_secs(settings.iteration_interval_secs)).await;
            }
        }

        if let Err(e) = case.after_loop(&self.ctx).await {
            warn!("{} after_loop failed: {}", name, e);
        }

        let summary = self.summary(meta, results);
        info!(
            "{} finished: {}/{} passed ({:.1}%) - {}",
            name,
            summary.passed,
            summary.total,
            summary.pass_rate(),
            summary.overall_status()
        );
        summary
    }

    async fn run_iteration(
        &self,
        case: &mut dyn TestCase,
        name: &str,
        iteration: u32,
    ) -> TestResult {
        let started_at = chrono::Utc::now();
        let mut phases = Stopwatch::new();

        let outcome: HarnessResult<()> = match case.before_test(&self.ctx).await {
            Ok(()) => {
                phases.lap("before_test");
                let outcome = case.test(&self.ctx).await;
                phases.lap("test");
                outcome
            }
            Err(e) => {
                phases.lap("before_test");
                Err(e)
            }
        };

        let outcome = if outcome.is_ok() || self.ctx.settings().run_after_test_on_failure {
            let cleanup = case.after_test(&self.ctx).await;
            phases.lap("after_test");
            match (outcome, cleanup) {
                (Ok(()), Err(cleanup)) => Err(TestError::error(format!(
                    "after_test failed: {cleanup}"
                ))),
                (Err(e), Err(cleanup)) => {
                    warn!("{} after_test failed on failing iteration: {}", name, cleanup);
                    Err(e)
                }
                (outcome, Ok(())) => outcome,
            }
        } else {
            outcome
        };

        debug!("{} #{} phases: {}", name, iteration, phases.format());
        let duration_ms = phases.total().as_millis() as u64;
        let result = match outcome {
            Ok(()) => TestResult::pass(name, iteration, duration_ms),
            Err(e) => TestResult::with_status_of(name, iteration, e.status(), Some(e.to_string()))
                .with_duration(duration_ms),
        };
        result.with_started_at(started_at)
    }
}

fn setup_result(name: &str, phase: &str, e: TestError, elapsed: Duration) -> TestResult {
    let status = e.status();
    let message = match status {
        TestStatus::Skip => e.to_string(),
        _ => format!("{phase} failed: {e}"),
    };
    TestResult::with_status_of(name, 0, status, Some(message))
        .with_duration(elapsed.as_millis() as u64)
}
