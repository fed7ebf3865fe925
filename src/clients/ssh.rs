//! SSH connectivity for embedded-Linux appliances
//!
//! Shells out to `ssh`/`scp`; password logins go through `sshpass -e` with
//! the password in the child's `SSHPASS` variable, never on argv.

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{run_command, CommandOutput, ShellCommand};
use crate::models::UutConfig;
use crate::utils::poll_until;

/// SSH client configuration
#[derive(Clone, Debug)]
pub struct SshConfig {
    pub username: String,
    pub private_key_path: Option<PathBuf>,
    pub password: Option<String>,
    pub port: u16,
    /// Connection timeout in seconds
    pub timeout_secs: u64,
    /// Upper bound for one remote command
    pub command_timeout_secs: u64,
    pub strict_host_key_checking: bool,
    /// Attempts for `exec_with_retry`; 0 is treated as 1
    pub retries: u32,
    pub retry_delay_secs: u64,
    pub ssh_program: String,
    pub scp_program: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            username: "root".to_string(),
            private_key_path: None,
            password: None,
            port: 22,
            timeout_secs: 30,
            command_timeout_secs: 300,
            strict_host_key_checking: false,
            retries: 3,
            retry_delay_secs: 5,
            ssh_program: "ssh".to_string(),
            scp_program: "scp".to_string(),
        }
    }
}

impl SshConfig {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Default::default()
        }
    }

    /// Settings for the device described by `uut`
    pub fn from_uut(uut: &UutConfig) -> Self {
        let mut config = Self::new(uut.ssh_username());
        config.password = uut.ssh.password.clone();
        config.private_key_path = uut.ssh.private_key_path.as_ref().map(PathBuf::from);
        if let Some(port) = uut.ssh.port {
            config.port = port;
        }
        config
    }

    pub fn private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn retries(mut self, count: u32) -> Self {
        self.retries = count;
        self
    }
}

/// SSH client bound to one device
#[derive(Clone, Debug)]
pub struct SshClient {
    host: String,
    config: SshConfig,
}

impl SshClient {
    pub fn new(host: impl Into<String>, config: SshConfig) -> Self {
        Self {
            host: host.into(),
            config,
        }
    }

    pub fn from_uut(uut: &UutConfig) -> Self {
        Self::new(uut.uut_ip.clone(), SshConfig::from_uut(uut))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn common_options(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            format!(
                "StrictHostKeyChecking={}",
                if self.config.strict_host_key_checking {
                    "yes"
                } else {
                    "no"
                }
            ),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.timeout_secs),
            "-o".to_string(),
            "LogLevel=ERROR".to_string(),
        ];

        if self.config.password.is_none() {
            args.push("-o".to_string());
            args.push("BatchMode=yes".to_string());
        }

        if let Some(ref key_path) = self.config.private_key_path {
            args.push("-i".to_string());
            args.push(key_path.to_string_lossy().to_string());
        }

        args
    }

    /// Command line, wrapped in sshpass when a password is set
    fn wrap(&self, program: &str, mut args: Vec<String>) -> ShellCommand {
        match &self.config.password {
            Some(password) => {
                let mut wrapped = vec!["-e".to_string(), program.to_string()];
                wrapped.append(&mut args);
                ShellCommand::new("sshpass", wrapped).env("SSHPASS", password.clone())
            }
            None => ShellCommand::new(program, args),
        }
    }

    fn build_ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = self.common_options();
        args.push("-p".to_string());
        args.push(self.config.port.to_string());
        args.push(format!("{}@{}", self.config.username, self.host));
        args.push(command.to_string());
        args
    }

    fn build_scp_args(&self, from: String, to: String) -> Vec<String> {
        let mut args = self.common_options();
        args.push("-P".to_string());
        args.push(self.config.port.to_string());
        args.push(from);
        args.push(to);
        args
    }

    fn remote(&self, path: &str) -> String {
        format!("{}@{}:{}", self.config.username, self.host, path)
    }

    /// Execute a command over SSH
    pub async fn exec(&self, command: &str) -> Result<CommandOutput> {
        debug!("Executing SSH command on {}: {}", self.host, command);
        let command = self.wrap(&self.config.ssh_program, self.build_ssh_args(command));
        run_command(
            &command,
            Duration::from_secs(self.config.command_timeout_secs),
        )
        .await
    }

    /// Execute a command with retries; returns the last non-zero output if
    /// every attempt failed
    pub async fn exec_with_retry(&self, command: &str) -> Result<CommandOutput> {
        let attempts = self.config.retries.max(1);
        let mut last_output = None;

        for attempt in 1..=attempts {
            debug!("SSH exec attempt {}/{}: {}", attempt, attempts, command);

            match self.exec(command).await {
                Ok(output) if output.is_success() => return Ok(output),
                Ok(output) => {
                    debug!("Command failed with exit code {}", output.exit_code);
                    last_output = Some(output);
                }
                Err(e) => {
                    debug!("SSH exec error: {}", e);
                }
            }

            if attempt < attempts {
                sleep(Duration::from_secs(self.config.retry_delay_secs)).await;
            }
        }

        match last_output {
            Some(output) => Ok(output),
            None => anyhow::bail!("SSH command failed after {} attempt(s)", attempts),
        }
    }

    /// Test SSH connectivity
    pub async fn test_connection(&self) -> Result<bool> {
        let output = self.exec("echo connected").await?;
        if output.is_success() {
            Ok(output.text() == "connected")
        } else {
            debug!("SSH connection test failed: {}", output.stderr);
            Ok(false)
        }
    }

    /// Wait for SSH to become available
    pub async fn wait_for_ssh(&self, timeout_secs: u64) -> bool {
        info!(
            "Waiting for SSH on {}:{} (timeout: {}s)",
            self.host, self.config.port, timeout_secs
        );

        let ready = poll_until(
            "ssh",
            Duration::from_secs(timeout_secs),
            Duration::from_secs(self.config.retry_delay_secs),
            || self.test_connection(),
        )
        .await;

        if !ready {
            warn!("Timeout waiting for SSH on {}", self.host);
        }
        ready
    }

    /// Copy file to the device
    pub async fn scp_to(&self, local_path: &str, remote_path: &str) -> Result<()> {
        debug!("SCP {} -> {}", local_path, self.remote(remote_path));
        let args = self.build_scp_args(local_path.to_string(), self.remote(remote_path));
        self.scp(args).await
    }

    /// Copy file from the device
    pub async fn scp_from(&self, remote_path: &str, local_path: &str) -> Result<()> {
        debug!("SCP {} -> {}", self.remote(remote_path), local_path);
        let args = self.build_scp_args(self.remote(remote_path), local_path.to_string());
        self.scp(args).await
    }

    async fn scp(&self, args: Vec<String>) -> Result<()> {
        let command = self.wrap(&self.config.scp_program, args);
        let output = run_command(
            &command,
            Duration::from_secs(self.config.command_timeout_secs),
        )
        .await?;

        if output.is_success() {
            Ok(())
        } else {
            anyhow::bail!("SCP failed: {}", output.stderr.trim())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProductLine;

    #[test]
    fn test_ssh_config_builder() {
        let config = SshConfig::new("testuser").port(2222).timeout(60).retries(5);

        assert_eq!(config.username, "testuser");
        assert_eq!(config.port, 2222);
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.retries, 5);
    }

    #[test]
    fn test_config_from_uut() {
        let mut uut = UutConfig::new("192.168.1.100", ProductLine::Kdp);
        uut.ssh.port = Some(2200);
        uut.ssh.password = Some("secret".to_string());

        let config = SshConfig::from_uut(&uut);
        assert_eq!(config.username, "root");
        assert_eq!(config.port, 2200);
        assert_eq!(config.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_ssh_args_key_auth() {
        let client = SshClient::new("192.168.1.100", SshConfig::new("root").port(22));
        let args = client.build_ssh_args("cat /proc/mdstat");

        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"root@192.168.1.100".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("cat /proc/mdstat"));

        let command = client.wrap("ssh", args);
        assert_eq!(command.program, "ssh");
        assert!(command.env.is_empty());
    }

    #[test]
    fn test_password_uses_sshpass() {
        let client = SshClient::new("10.0.0.2", SshConfig::new("sshd").password("pw"));
        let args = client.build_ssh_args("uptime");
        assert!(!args.contains(&"BatchMode=yes".to_string()));

        let command = client.wrap("ssh", args);
        assert_eq!(command.program, "sshpass");
        assert_eq!(&command.args[..2], &["-e", "ssh"]);
        assert!(!command.args.iter().any(|a| a == "pw"));
        assert!(!command.to_string().contains("pw"));
        assert_eq!(command.env, vec![("SSHPASS".to_string(), "pw".to_string())]);
    }

    #[test]
    fn test_scp_args() {
        let client = SshClient::new("10.0.0.2", SshConfig::new("root").port(2222));
        let args = client.build_scp_args("/tmp/fw.bin".to_string(), client.remote("/shares/fw.bin"));

        assert!(args.contains(&"-P".to_string()));
        assert!(args.contains(&"2222".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("root@10.0.0.2:/shares/fw.bin"));
    }

    /// Writes an executable shell script that appends its argv to `calls.log`
    #[cfg(unix)]
    fn fake_tool(dir: &std::path::Path, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        let log = dir.join("calls.log");
        let script = format!("#!/bin/sh\necho \"$*\" >> '{}'\n{}\n", log.display(), body);
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().to_string()
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
    fn fake_client(dir: &std::path::Path, ssh_body: &str, retries: u32) -> SshClient {
        let mut config = SshConfig::new("root").retries(retries);
        config.retry_delay_secs = 0;
        config.ssh_program = fake_tool(dir, "ssh", ssh_body);
        config.scp_program = fake_tool(dir, "scp", "exit 0");
        SshClient::new("10.0.0.9", config)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exec_with_zero_retries_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let client = fake_client(dir.path(), "echo boom >&2\nexit 1", 0);

        let output = client.exec_with_retry("cat /proc/mdstat").await.unwrap();
        assert_eq!(output.exit_code, 1);
        assert_eq!(calls(dir.path()).len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exec_with_retry_exhausts_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let client = fake_client(dir.path(), "exit 255", 3);

        let output = client.exec_with_retry("uptime").await.unwrap();
        assert!(!output.is_success());
        let calls = calls(dir.path());
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|c| c.ends_with("root@10.0.0.9 uptime")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exec_with_retry_stops_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let client = fake_client(dir.path(), "echo md0", 3);

        let output = client.exec_with_retry("cat /proc/mdstat").await.unwrap();
        assert_eq!(output.text(), "md0");
        assert_eq!(calls(dir.path()).len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scp_directions() {
        let dir = tempfile::tempdir().unwrap();
        let client = fake_client(dir.path(), "exit 0", 1);

        client.scp_to("/tmp/fw.bin", "/shares/fw.bin").await.unwrap();
        client.scp_from("/var/log/messages", "/tmp/messages").await.unwrap();

        let calls = calls(dir.path());
        assert_eq!(calls.len(), 2);
        assert!(calls[0].ends_with("/tmp/fw.bin root@10.0.0.9:/shares/fw.bin"));
        assert!(calls[1].ends_with("root@10.0.0.9:/var/log/messages /tmp/messages"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scp_failure_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = fake_client(dir.path(), "exit 0", 1);
        client.config.scp_program = fake_tool(dir.path(), "scp-fail", "echo 'No such file' >&2\nexit 1");

        let err = client.scp_from("/missing", "/tmp/x").await.unwrap_err();
        assert!(err.to_string().contains("No such file"));
    }
}
