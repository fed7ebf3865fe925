//! Test-case harness
//!
//! A test case implements [`TestCase`]; the runner drives it through its
//! lifecycle hooks with a shared [`TestContext`]. Per-test state (clients,
//! created resources) lives in the implementor's own fields.

mod context;
mod error;

pub use context::TestContext;
pub use error::{fail_unless, skip_unless, HarnessResult, TestError, WorkerFailure};

use async_trait::async_trait;

use crate::models::TestMeta;

/// Lifecycle of one test case
///
/// `init` and `before_loop` run once, then `before_test`, `test` and
/// `after_test` run for each iteration, then `after_loop` runs once.
#[async_trait]
pub trait TestCase: Send {
    fn meta(&self) -> TestMeta;

    async fn init(&mut self, _ctx: &TestContext) -> HarnessResult<()> {
        Ok(())
    }

    async fn before_loop(&mut self, _ctx: &TestContext) -> HarnessResult<()> {
        Ok(())
    }

    async fn before_test(&mut self, _ctx: &TestContext) -> HarnessResult<()> {
        Ok(())
    }

    async fn test(&mut self, ctx: &TestContext) -> HarnessResult<()>;

    async fn after_test(&mut self, _ctx: &TestContext) -> HarnessResult<()> {
        Ok(())
    }

    async fn after_loop(&mut self, _ctx: &TestContext) -> HarnessResult<()> {
        Ok(())
    }
}
