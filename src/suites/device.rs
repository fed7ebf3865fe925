//! Device health checks over ADB and SSH

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::clients::{AdbClient, SshClient};
use crate::harness::{fail_unless, skip_unless, HarnessResult, TestCase, TestContext, TestError};
use crate::models::{Priority, ProductLine, TestMeta};

const DEFAULT_BOOT_TIMEOUT_SECS: u64 = 300;
const DEFAULT_FIRMWARE_PROP: &str = "ro.build.version.incremental";

/// Waits for Android to report boot completion and checks the firmware build
#[derive(Default)]
pub struct AdbBootCompleted {
    adb: Option<AdbClient>,
}

impl AdbBootCompleted {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn describe() -> TestMeta {
        TestMeta::new("adb_boot_completed", "boot")
            .jira("KAM-1024")
            .priority(Priority::P1)
            .product(ProductLine::Kamino)
            .description("sys.boot_completed reaches 1 and the firmware build matches")
    }

    fn adb(&self) -> HarnessResult<&AdbClient> {
        self.adb
            .as_ref()
            .ok_or_else(|| TestError::error("ADB client not initialised"))
    }
}

#[async_trait]
impl TestCase for AdbBootCompleted {
    fn meta(&self) -> TestMeta {
        Self::describe()
    }

    async fn init(&mut self, ctx: &TestContext) -> HarnessResult<()> {
        skip_unless(ctx.uut().product.has_adb(), "product has no ADB shell")?;
        self.adb = Some(ctx.adb());
        Ok(())
    }

    async fn before_loop(&mut self, _ctx: &TestContext) -> HarnessResult<()> {
        self.adb()?.connect().await?;
        Ok(())
    }

    async fn test(&mut self, ctx: &TestContext) -> HarnessResult<()> {
        let adb = self.adb()?;
        let uut = ctx.uut();

        let timeout_secs = uut
            .param("boot_timeout_secs")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_BOOT_TIMEOUT_SECS);
        fail_unless(
            adb.wait_for_boot_completed(timeout_secs).await,
            format!("sys.boot_completed not 1 after {timeout_secs}s"),
        )?;

        if let Some(expected) = &uut.firmware_version {
            let prop = uut.param("firmware_prop").unwrap_or(DEFAULT_FIRMWARE_PROP);
            let actual = adb.getprop(prop).await?;
            info!("{} = {}", prop, actual);
            fail_unless(
                actual.contains(expected.as_str()),
                format!("{prop} is '{actual}', expected '{expected}'"),
            )?;
        }
        Ok(())
    }

    async fn after_loop(&mut self, _ctx: &TestContext) -> HarnessResult<()> {
        if let Err(e) = self.adb()?.disconnect().await {
            warn!("adb disconnect failed: {:#}", e);
        }
        Ok(())
    }
}

/// One md array from `/proc/mdstat`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MdArray {
    pub name: String,
    /// `active` or `inactive`
    pub state: String,
    pub level: String,
    /// `(expected, working)` from the `[n/m]` token
    pub disks: Option<(u32, u32)>,
    /// Member map such as `UU` or `U_`
    pub members: String,
}

impl MdArray {
    /// Not running, or running with fewer disks than it was built with
    pub fn is_degraded(&self) -> bool {
        self.state != "active"
            || self.members.contains('_')
            || matches!(self.disks, Some((expected, working)) if working < expected)
    }
}

fn bracketed(word: &str) -> Option<&str> {
    word.strip_prefix('[').and_then(|w| w.strip_suffix(']'))
}

fn parse_disk_counts(word: &str) -> Option<(u32, u32)> {
    let (expected, working) = bracketed(word)?.split_once('/')?;
    Some((expected.parse().ok()?, working.parse().ok()?))
}

/// Parse the array lines of `/proc/mdstat`
pub fn parse_mdstat(text: &str) -> Vec<MdArray> {
    let mut arrays = Vec::new();
    let mut lines = text.lines().peekable();

    while let Some(line) = lines.next() {
        let Some((name, rest)) = line.split_once(" : ") else {
            continue;
        };
        let name = name.trim();
        if !name.starts_with("md") {
            continue;
        }

        let state = rest.split_whitespace().next().unwrap_or("unknown").to_string();
        let level = rest
            .split_whitespace()
            .find(|w| w.starts_with("raid") || *w == "linear")
            .unwrap_or("unknown")
            .to_string();

        // Counts and member map sit on the following status line, e.g.
        // `[2/2] [UU]`; inactive arrays have neither
        let status = lines.peek().copied().unwrap_or_default();
        let disks = status.split_whitespace().find_map(parse_disk_counts);
        let members = status
            .split_whitespace()
            .filter_map(bracketed)
            .find(|w| !w.is_empty() && w.chars().all(|c| c == 'U' || c == '_'))
            .unwrap_or_default()
            .to_string();

        arrays.push(MdArray {
            name: name.to_string(),
            state,
            level,
            disks,
            members,
        });
    }

    arrays
}

/// Every md array on the NAS is fully up
#[derive(Default)]
pub struct RaidHealth {
    ssh: Option<SshClient>,
}

impl RaidHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn describe() -> TestMeta {
        TestMeta::new("raid_health", "storage")
            .jira("GZA-3310")
            .priority(Priority::P2)
            .product(ProductLine::Godzilla)
            .product(ProductLine::Kdp)
            .description("No md array in /proc/mdstat is missing a member")
    }
}

#[async_trait]
impl TestCase for RaidHealth {
    fn meta(&self) -> TestMeta {
        Self::describe()
    }

    async fn init(&mut self, ctx: &TestContext) -> HarnessResult<()> {
        skip_unless(ctx.uut().product.has_ssh(), "product has no SSH access")?;
        self.ssh = Some(ctx.ssh());
        Ok(())
    }

    async fn before_loop(&mut self, ctx: &TestContext) -> HarnessResult<()> {
        match ctx.nas_admin()?.nas_admin_system_info().await {
            Ok(info) => info!("nasAdmin system: {}", info),
            Err(e) => debug!("nasAdmin system info unavailable: {:#}", e),
        }
        Ok(())
    }

    async fn test(&mut self, _ctx: &TestContext) -> HarnessResult<()> {
        let ssh = self
            .ssh
            .as_ref()
            .ok_or_else(|| TestError::error("SSH client not initialised"))?;

        let output = ssh.exec_with_retry("cat /proc/mdstat").await?;
        if !output.is_success() {
            return Err(TestError::error(format!(
                "cat /proc/mdstat exited {}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }

        let arrays = parse_mdstat(&output.stdout);
        debug!("Found {} md array(s)", arrays.len());
        skip_unless(!arrays.is_empty(), "no md arrays configured")?;

        let degraded: Vec<String> = arrays
            .iter()
            .filter(|a| a.is_degraded())
            .map(|a| format!("{} ({} {} [{}])", a.name, a.state, a.level, a.members))
            .collect();

        fail_unless(
            degraded.is_empty(),
            format!("degraded arrays: {}", degraded.join(", ")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TestRunner;
    use crate::models::{RunSettings, TestStatus, UutConfig};

    const MDSTAT: &str = "\
Personalities : [linear] [raid0] [raid1]
md1 : active raid1 sdb2[1] sda2[0]
      976630464 blocks super 1.0 [2/2] [UU]

md0 : active raid1 sda1[0]
      2097088 blocks [2/1] [U_]
      bitmap: 0/1 pages [0KB], 65536KB chunk

unused devices: <none>
";

    #[test]
    fn test_parse_mdstat() {
        let arrays = parse_mdstat(MDSTAT);
        assert_eq!(arrays.len(), 2);
        assert_eq!(
            arrays[0],
            MdArray {
                name: "md1".to_string(),
                state: "active".to_string(),
                level: "raid1".to_string(),
                disks: Some((2, 2)),
                members: "UU".to_string(),
            }
        );
        assert!(!arrays[0].is_degraded());
        assert_eq!(arrays[1].disks, Some((2, 1)));
        assert!(arrays[1].is_degraded());
    }

    #[test]
    fn test_inactive_array_is_degraded() {
        let text = "\
Personalities : [raid1]
md127 : inactive sdb1[1](S)
      1953383512 blocks super 1.2

unused devices: <none>
";
        let arrays = parse_mdstat(text);
        assert_eq!(arrays.len(), 1);
        assert_eq!(arrays[0].state, "inactive");
        assert_eq!(arrays[0].level, "unknown");
        assert_eq!(arrays[0].disks, None);
        assert!(arrays[0].members.is_empty());
        assert!(arrays[0].is_degraded());
    }

    #[test]
    fn test_missing_disk_without_member_map() {
        let text = "md2 : active raid5 sdc1[2] sda1[0]\n      3906764800 blocks level 5 [3/2]\n";
        let arrays = parse_mdstat(text);
        assert_eq!(arrays[0].disks, Some((3, 2)));
        assert!(arrays[0].is_degraded());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_raid_health_fails_on_inactive_array() {
        use crate::clients::SshConfig;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let mdstat = dir.path().join("mdstat");
        std::fs::write(&mdstat, "md127 : inactive sdb1[1](S)\n      1953383512 blocks super 1.2\n")
            .unwrap();
        let fake_ssh = dir.path().join("ssh");
        std::fs::write(&fake_ssh, format!("#!/bin/sh\ncat '{}'\n", mdstat.display())).unwrap();
        std::fs::set_permissions(&fake_ssh, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = SshConfig::new("root").retries(1);
        config.ssh_program = fake_ssh.to_string_lossy().to_string();
        let mut case = RaidHealth {
            ssh: Some(SshClient::new("10.0.0.7", config)),
        };

        let uut = UutConfig::new("10.0.0.7", ProductLine::Godzilla);
        let ctx = TestContext::from_current(uut, RunSettings::default()).unwrap();
        match case.test(&ctx).await {
            Err(TestError::Failure(msg)) => assert!(msg.contains("md127 (inactive")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_mdstat_empty() {
        let text = "Personalities : \nunused devices: <none>\n";
        assert!(parse_mdstat(text).is_empty());
    }

    #[tokio::test]
    async fn test_raid_health_skipped_on_kamino() {
        let uut = UutConfig::new("10.0.0.5", ProductLine::Kamino);
        let ctx = TestContext::from_current(uut, RunSettings::default()).unwrap();
        let summary = TestRunner::new(ctx).run(&mut RaidHealth::new()).await;

        assert_eq!(summary.overall_status(), TestStatus::Skip);
    }

    #[tokio::test]
    async fn test_adb_boot_skipped_on_godzilla() {
        let uut = UutConfig::new("10.0.0.5", ProductLine::Godzilla);
        let ctx = TestContext::from_current(uut, RunSettings::default()).unwrap();
        let summary = TestRunner::new(ctx).run(&mut AdbBootCompleted::new()).await;

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.exit_code(), 0);
    }
}
