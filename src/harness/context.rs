//! Shared, read-only state handed to every lifecycle hook

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

use crate::clients::{AdbClient, RestClient, SerialClient, SshClient};
use crate::executor::ConcurrentExecutor;
use crate::models::{RunSettings, UutConfig};

#[derive(Clone, Debug)]
pub struct TestContext {
    uut: Arc<UutConfig>,
    settings: Arc<RunSettings>,
    handle: Handle,
}

impl TestContext {
    pub fn new(uut: UutConfig, settings: RunSettings, handle: Handle) -> Self {
        Self {
            uut: Arc::new(uut),
            settings: Arc::new(settings),
            handle,
        }
    }

    /// Context bound to the runtime we are called from
    pub fn from_current(uut: UutConfig, settings: RunSettings) -> Result<Self> {
        let handle = Handle::try_current().context("TestContext needs a tokio runtime")?;
        Ok(Self::new(uut, settings, handle))
    }

    pub fn uut(&self) -> &UutConfig {
        &self.uut
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    pub fn adb(&self) -> AdbClient {
        AdbClient::from_uut(&self.uut)
    }

    pub fn ssh(&self) -> SshClient {
        SshClient::from_uut(&self.uut)
    }

    pub async fn serial(&self) -> Result<SerialClient> {
        let settings = self
            .uut
            .serial
            .as_ref()
            .context("No serial console configured for this device")?;
        SerialClient::connect(settings, Duration::from_secs(self.settings.timeout_secs)).await
    }

    /// RestSDK client; authenticates as the first configured user if any
    pub fn rest(&self) -> Result<RestClient> {
        RestClient::for_uut(&self.uut, self.uut.rest.users.first())
    }

    /// RestSDK client acting as the named user
    pub fn rest_as(&self, user: &str) -> Result<RestClient> {
        let token = self
            .uut
            .rest
            .users
            .iter()
            .find(|t| t.user == user)
            .with_context(|| format!("No access token configured for user '{user}'"))?;
        RestClient::for_uut(&self.uut, Some(token))
    }

    pub fn nas_admin(&self) -> Result<RestClient> {
        Ok(RestClient::with_timeout(self.uut.rest.timeout_secs)?
            .base_url(self.uut.nas_admin_base_url()))
    }

    /// Executor with this run's worker deadline applied
    pub fn executor(&self) -> ConcurrentExecutor {
        let executor = ConcurrentExecutor::new();
        match self.settings.worker_deadline_secs {
            Some(secs) => executor.deadline(Duration::from_secs(secs)),
            None => executor,
        }
    }
}
