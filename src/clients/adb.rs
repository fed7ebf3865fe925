//! ADB client for Android-based appliances
//!
//! Wraps the `adb` binary. Every call targets one device over TCP
//! (`adb -s ip:port ...`).

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{run_command, CommandOutput, ShellCommand};
use crate::models::{AdbSettings, UutConfig};
use crate::utils::poll_until;

/// ADB client bound to one device
#[derive(Clone, Debug)]
pub struct AdbClient {
    target: String,
    settings: AdbSettings,
}

impl AdbClient {
    pub fn new(target: impl Into<String>, settings: AdbSettings) -> Self {
        Self {
            target: target.into(),
            settings,
        }
    }

    pub fn from_uut(uut: &UutConfig) -> Self {
        Self::new(uut.adb_target(), uut.adb.clone())
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.settings.command_timeout_secs)
    }

    fn device_args(&self, args: &[&str]) -> Vec<String> {
        let mut full = vec!["-s".to_string(), self.target.clone()];
        full.extend(args.iter().map(|a| a.to_string()));
        full
    }

    async fn adb(&self, args: &[&str]) -> Result<CommandOutput> {
        let command = ShellCommand::new(&self.settings.binary, self.device_args(args));
        run_command(&command, self.timeout()).await
    }

    /// `adb <verb> ip:port`, without `-s`
    async fn adb_target(&self, verb: &str) -> Result<CommandOutput> {
        let command = ShellCommand::new(
            &self.settings.binary,
            vec![verb.to_string(), self.target.clone()],
        );
        run_command(&command, self.timeout()).await
    }

    /// `adb connect ip:port`
    pub async fn connect(&self) -> Result<()> {
        let output = self.adb_target("connect").await?;

        // adb exits 0 even when the connection is refused
        if output.contains("connected to") {
            info!("ADB connected to {}", self.target);
            Ok(())
        } else {
            anyhow::bail!(
                "ADB connect to {} failed: {}",
                self.target,
                output.text()
            )
        }
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.adb_target("disconnect").await?;
        debug!("ADB disconnected from {}", self.target);
        Ok(())
    }

    /// Run a shell command on the device
    pub async fn shell(&self, command: &str) -> Result<CommandOutput> {
        debug!("adb shell on {}: {}", self.target, command);
        self.adb(&["shell", command]).await
    }

    /// Shell with reconnect-and-retry on transport errors
    pub async fn shell_with_retry(&self, command: &str) -> Result<CommandOutput> {
        let attempts = self.settings.retries.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.shell(command).await {
                Ok(output) if !is_transport_error(&output) => return Ok(output),
                Ok(output) => {
                    debug!(
                        "adb transport error (attempt {}/{}): {}",
                        attempt,
                        attempts,
                        output.stderr.trim()
                    );
                    last_error = Some(anyhow::anyhow!("{}", output.stderr.trim()));
                    let _ = self.connect().await;
                }
                Err(e) => {
                    debug!("adb shell error: {}", e);
                    last_error = Some(e);
                }
            }

            if attempt < attempts {
                sleep(Duration::from_secs(self.settings.retry_delay_secs)).await;
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("no attempts made"))
            .context(format!("adb shell failed after {attempts} attempt(s)")))
    }

    /// Read a system property
    pub async fn getprop(&self, name: &str) -> Result<String> {
        let output = self.shell(&format!("getprop {name}")).await?;
        Ok(output.text().to_string())
    }

    /// Install an APK from the host
    pub async fn install(&self, apk_path: &str) -> Result<()> {
        info!("Installing {} on {}", apk_path, self.target);
        let output = self.adb(&["install", "-r", apk_path]).await?;
        if output.contains("Success") {
            Ok(())
        } else {
            anyhow::bail!("adb install failed: {}{}", output.stdout.trim(), output.stderr.trim())
        }
    }

    pub async fn uninstall(&self, package: &str) -> Result<()> {
        info!("Uninstalling {} from {}", package, self.target);
        let output = self.adb(&["uninstall", package]).await?;
        if output.contains("Success") {
            Ok(())
        } else {
            anyhow::bail!("adb uninstall failed: {}", output.text())
        }
    }

    pub async fn list_packages(&self) -> Result<Vec<String>> {
        let output = self.shell("pm list packages").await?;
        Ok(parse_packages(&output.stdout))
    }

    pub async fn is_package_installed(&self, package: &str) -> Result<bool> {
        Ok(self.list_packages().await?.iter().any(|p| p == package))
    }

    pub async fn push(&self, local: &str, remote: &str) -> Result<()> {
        let output = self.adb(&["push", local, remote]).await?;
        if output.is_success() {
            Ok(())
        } else {
            anyhow::bail!("adb push failed: {}", output.stderr.trim())
        }
    }

    pub async fn pull(&self, remote: &str, local: &str) -> Result<()> {
        let output = self.adb(&["pull", remote, local]).await?;
        if output.is_success() {
            Ok(())
        } else {
            anyhow::bail!("adb pull failed: {}", output.stderr.trim())
        }
    }

    pub async fn reboot(&self) -> Result<()> {
        info!("Rebooting {}", self.target);
        self.adb(&["reboot"]).await.context("adb reboot failed")?;
        Ok(())
    }

    /// Dump the current logcat buffer
    pub async fn logcat_dump(&self) -> Result<String> {
        let output = self.adb(&["logcat", "-d"]).await?;
        Ok(output.stdout)
    }

    /// Wait until `sys.boot_completed` reports 1
    pub async fn wait_for_boot_completed(&self, timeout_secs: u64) -> bool {
        info!(
            "Waiting for {} to finish booting (timeout: {}s)",
            self.target, timeout_secs
        );

        let ready = poll_until(
            "boot_completed",
            Duration::from_secs(timeout_secs),
            Duration::from_secs(self.settings.retry_delay_secs),
            || async {
                let _ = self.connect().await;
                Ok(self.getprop("sys.boot_completed").await? == "1")
            },
        )
        .await;

        if !ready {
            warn!("{} did not finish booting in {}s", self.target, timeout_secs);
        }
        ready
    }
}

fn is_transport_error(output: &CommandOutput) -> bool {
    let stderr = output.stderr.to_lowercase();
    stderr.contains("device offline")
        || stderr.contains("no devices/emulators found")
        || stderr.contains("device not found")
        || stderr.contains("closed")
}

fn parse_packages(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .map(|p| p.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProductLine;

    #[test]
    fn test_device_args() {
        let uut = UutConfig::new("10.0.0.5", ProductLine::Kamino);
        let client = AdbClient::from_uut(&uut);
        let args = client.device_args(&["shell", "getprop ro.build.version"]);

        assert_eq!(args, vec!["-s", "10.0.0.5:5555", "shell", "getprop ro.build.version"]);
    }

    #[test]
    fn test_parse_packages() {
        let stdout = "package:com.android.shell\npackage:com.example.plex\r\n\nnoise\n";
        assert_eq!(
            parse_packages(stdout),
            vec!["com.android.shell", "com.example.plex"]
        );
    }

    #[test]
    fn test_transport_error_detection() {
        let offline = CommandOutput {
            stderr: "error: device offline".to_string(),
            exit_code: 1,
            ..Default::default()
        };
        assert!(is_transport_error(&offline));

        let app_error = CommandOutput {
            stdout: "Failure [INSTALL_FAILED_INSUFFICIENT_STORAGE]".to_string(),
            exit_code: 1,
            ..Default::default()
        };
        assert!(!is_transport_error(&app_error));
    }

    #[tokio::test]
    async fn test_missing_adb_binary() {
        let settings = AdbSettings {
            binary: "adb-binary-that-does-not-exist".to_string(),
            ..Default::default()
        };
        let client = AdbClient::new("10.0.0.5:5555", settings);
        assert!(client.shell("true").await.is_err());
    }

    #[cfg(unix)]
    const FAKE_ADB: &str = r#"case "$*" in
  connect*) echo "connected to $2" ;;
  *" install -r "*) echo "Performing Streamed Install"; echo Success ;;
  *" uninstall com.missing"*) echo "Failure [DELETE_FAILED_INTERNAL_ERROR]" ;;
  *" uninstall "*) echo Success ;;
  *" shell pm list packages"*) printf 'package:com.android.shell\npackage:com.example.plex\n' ;;
  *" shell getprop sys.boot_completed"*) echo 1 ;;
  *" shell offline"*) echo "error: device offline" >&2; exit 1 ;;
  *" push /missing"*) echo "adb: error: cannot stat '/missing'" >&2; exit 1 ;;
  *" push "*|*" pull "*) echo "1 file transferred" ;;
  *" logcat -d"*) printf 'I/ActivityManager: Start proc\nE/AndroidRuntime: FATAL EXCEPTION\n' ;;
esac
exit 0"#;

    /// `AdbClient` over a shell script that logs each argv line to `calls.log`
    #[cfg(unix)]
    fn fake_adb(dir: &std::path::Path, retries: u32) -> AdbClient {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("adb");
        let log = dir.join("calls.log");
        let script = format!("#!/bin/sh\necho \"$*\" >> '{}'\n{}\n", log.display(), FAKE_ADB);
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let settings = AdbSettings {
            binary: path.to_string_lossy().to_string(),
            retries,
            retry_delay_secs: 0,
            ..Default::default()
        };
        AdbClient::new("10.0.0.5:5555", settings)
    }

    #[cfg(unix)]
    fn calls(dir: &std::path::Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_and_uninstall() {
        let dir = tempfile::tempdir().unwrap();
        let client = fake_adb(dir.path(), 3);

        client.install("/tmp/plex.apk").await.unwrap();
        client.uninstall("com.example.plex").await.unwrap();
        let err = client.uninstall("com.missing").await.unwrap_err();
        assert!(err.to_string().contains("DELETE_FAILED_INTERNAL_ERROR"));

        let calls = calls(dir.path());
        assert_eq!(calls[0], "-s 10.0.0.5:5555 install -r /tmp/plex.apk");
        assert_eq!(calls[1], "-s 10.0.0.5:5555 uninstall com.example.plex");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_package_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let client = fake_adb(dir.path(), 3);

        assert!(client.is_package_installed("com.example.plex").await.unwrap());
        assert!(!client.is_package_installed("com.example").await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_push_pull() {
        let dir = tempfile::tempdir().unwrap();
        let client = fake_adb(dir.path(), 3);

        client.push("/tmp/a.bin", "/sdcard/a.bin").await.unwrap();
        client.pull("/sdcard/a.bin", "/tmp/b.bin").await.unwrap();
        let err = client.push("/missing", "/sdcard/x").await.unwrap_err();
        assert!(err.to_string().contains("cannot stat"));

        let calls = calls(dir.path());
        assert_eq!(calls[0], "-s 10.0.0.5:5555 push /tmp/a.bin /sdcard/a.bin");
        assert_eq!(calls[1], "-s 10.0.0.5:5555 pull /sdcard/a.bin /tmp/b.bin");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reboot_and_logcat() {
        let dir = tempfile::tempdir().unwrap();
        let client = fake_adb(dir.path(), 3);

        client.reboot().await.unwrap();
        let log = client.logcat_dump().await.unwrap();
        assert_eq!(log.lines().count(), 2);
        assert!(log.contains("FATAL EXCEPTION"));

        let calls = calls(dir.path());
        assert_eq!(calls, vec!["-s 10.0.0.5:5555 reboot", "-s 10.0.0.5:5555 logcat -d"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_connect_and_boot_completed() {
        let dir = tempfile::tempdir().unwrap();
        let client = fake_adb(dir.path(), 3);

        client.connect().await.unwrap();
        assert!(client.wait_for_boot_completed(5).await);
        assert_eq!(calls(dir.path())[0], "connect 10.0.0.5:5555");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_retry_reconnects_on_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = fake_adb(dir.path(), 2);

        let err = client.shell_with_retry("offline").await.unwrap_err();
        assert!(format!("{err:#}").contains("device offline"));
        assert_eq!(
            calls(dir.path()),
            vec![
                "-s 10.0.0.5:5555 shell offline",
                "connect 10.0.0.5:5555",
                "-s 10.0.0.5:5555 shell offline",
                "connect 10.0.0.5:5555",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_retry_zero_retries_still_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let client = fake_adb(dir.path(), 0);

        let output = client.shell_with_retry("getprop sys.boot_completed").await.unwrap();
        assert_eq!(output.text(), "1");
        assert_eq!(calls(dir.path()).len(), 1);
    }
}
