//! App installation through RestSDK

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clients::RestClient;
use crate::harness::{fail_unless, skip_unless, HarnessResult, TestCase, TestContext, TestError};
use crate::models::{Priority, ProductLine, TestMeta};
use crate::utils::poll_until;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Two users install the same app at the same moment; both must end up
/// seeing it installed.
#[derive(Default)]
pub struct ConcurrentAppInstall {
    app_id: String,
    owner: Option<RestClient>,
    guest: Option<RestClient>,
}

impl ConcurrentAppInstall {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn describe() -> TestMeta {
        TestMeta::new("concurrent_app_install", "apps")
            .jira("KAM-2183")
            .priority(Priority::P1)
            .product(ProductLine::Kamino)
            .description("Owner and guest install the same app concurrently through RestSDK")
    }

    fn clients(&self) -> HarnessResult<(&RestClient, &RestClient)> {
        match (&self.owner, &self.guest) {
            (Some(owner), Some(guest)) => Ok((owner, guest)),
            _ => Err(TestError::error("REST clients not initialised")),
        }
    }
}

async fn install_as(client: RestClient, app_id: String) -> HarnessResult<()> {
    debug!("{} installing {}", client.user().unwrap_or("anonymous"), app_id);
    client.install_app(&app_id).await?;
    Ok(())
}

async fn wait_installed(client: &RestClient, app_id: &str, timeout: Duration) -> bool {
    poll_until("app installed", timeout, POLL_INTERVAL, || async {
        Ok(client
            .app_status(app_id)
            .await?
            .map(|status| status.is_installed())
            .unwrap_or(false))
    })
    .await
}

#[async_trait]
impl TestCase for ConcurrentAppInstall {
    fn meta(&self) -> TestMeta {
        Self::describe()
    }

    async fn init(&mut self, ctx: &TestContext) -> HarnessResult<()> {
        let uut = ctx.uut();
        let app_id = uut.app_id.clone();
        skip_unless(app_id.is_some(), "no app id configured (--app-id)")?;
        skip_unless(
            uut.rest.users.len() >= 2,
            "needs access tokens for two users",
        )?;

        self.app_id = app_id.unwrap_or_default();
        self.owner = Some(ctx.rest_as(&uut.rest.users[0].user)?);
        self.guest = Some(ctx.rest_as(&uut.rest.users[1].user)?);
        Ok(())
    }

    async fn before_loop(&mut self, _ctx: &TestContext) -> HarnessResult<()> {
        let (owner, _) = self.clients()?;
        match owner.device_info().await {
            Ok(info) => info!("RestSDK device: {}", info),
            Err(e) => debug!("Device info unavailable: {:#}", e),
        }
        Ok(())
    }

    async fn before_test(&mut self, _ctx: &TestContext) -> HarnessResult<()> {
        let (owner, _) = self.clients()?;
        owner.uninstall_app(&self.app_id).await?;
        Ok(())
    }

    async fn test(&mut self, ctx: &TestContext) -> HarnessResult<()> {
        let (owner, guest) = self.clients()?;

        let mut executor = ctx.executor();
        for client in [owner, guest] {
            let client = client.clone();
            let app_id = self.app_id.clone();
            let name = format!("install-{}", client.user().unwrap_or("user"));
            executor = executor.add_async(name, ctx.handle(), move |worker| async move {
                worker.check_cancelled()?;
                install_as(client, app_id).await
            });
        }

        let report = executor.spawn_run().await?;
        info!(
            "Both install requests finished, start skew {:?}",
            report.start_skew()
        );

        let timeout = Duration::from_secs(ctx.settings().timeout_secs);
        for client in [owner, guest] {
            let user = client.user().unwrap_or("user").to_string();
            fail_unless(
                wait_installed(client, &self.app_id, timeout).await,
                format!("{} never saw {} installed", user, self.app_id),
            )?;
        }
        Ok(())
    }

    async fn after_test(&mut self, _ctx: &TestContext) -> HarnessResult<()> {
        let (owner, _) = self.clients()?;
        if let Err(e) = owner.uninstall_app(&self.app_id).await {
            warn!("Failed to uninstall {}: {:#}", self.app_id, e);
            return Err(e.into());
        }
        Ok(())
    }
}
