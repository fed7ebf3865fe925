//! Serial console checks

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::clients::SerialClient;
use crate::harness::{fail_unless, skip_unless, HarnessResult, TestCase, TestContext, TestError};
use crate::models::{Priority, TestMeta};

const QUIET_PERIOD: Duration = Duration::from_millis(200);

/// Echoes a random marker through the console shell and reads it back
#[derive(Default)]
pub struct SerialConsoleEcho {
    console: Option<SerialClient>,
}

impl SerialConsoleEcho {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn describe() -> TestMeta {
        TestMeta::new("serial_console_echo", "console")
            .jira("NAS-512")
            .priority(Priority::P3)
            .description("Console shell answers at the prompt and echoes a marker")
    }
}

#[async_trait]
impl TestCase for SerialConsoleEcho {
    fn meta(&self) -> TestMeta {
        Self::describe()
    }

    async fn init(&mut self, ctx: &TestContext) -> HarnessResult<()> {
        skip_unless(
            ctx.uut().serial.is_some(),
            "no terminal server port configured for this device",
        )
    }

    async fn before_test(&mut self, ctx: &TestContext) -> HarnessResult<()> {
        let mut console = ctx.serial().await?;
        let pending = console.drain(QUIET_PERIOD).await;
        debug!("Discarded {} bytes of console backlog", pending.len());
        self.console = Some(console);
        Ok(())
    }

    async fn test(&mut self, ctx: &TestContext) -> HarnessResult<()> {
        let wait = Duration::from_secs(ctx.settings().timeout_secs);
        let console = self
            .console
            .as_mut()
            .ok_or_else(|| TestError::error("console not connected"))?;
        let prompt = console.prompt().to_string();

        let marker = format!("nasqa-{:08x}", rand::random::<u32>());
        let output = console
            .execute(&format!("echo {marker}"), &prompt, wait)
            .await?;

        fail_unless(
            output.lines().any(|l| l.trim() == marker),
            format!("console answered {output:?} instead of {marker}"),
        )
    }

    async fn after_test(&mut self, _ctx: &TestContext) -> HarnessResult<()> {
        self.console = None;
        Ok(())
    }
}
