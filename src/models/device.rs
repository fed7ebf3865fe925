//! Device under test models
//!
//! Product lines, cloud environments and the typed per-run configuration
//! handed to every test case.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Supported appliance product lines
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductLine {
    /// Android-based appliances driven over ADB
    Kamino,
    /// OS3 appliances
    Godzilla,
    /// Embedded-Linux appliances
    Kdp,
}

impl ProductLine {
    /// Get product display name
    pub fn name(&self) -> &'static str {
        match self {
            ProductLine::Kamino => "Kamino",
            ProductLine::Godzilla => "Godzilla",
            ProductLine::Kdp => "KDP",
        }
    }

    /// Whether the product exposes an ADB shell
    pub fn has_adb(&self) -> bool {
        matches!(self, ProductLine::Kamino)
    }

    /// Whether the product exposes an SSH shell
    pub fn has_ssh(&self) -> bool {
        matches!(self, ProductLine::Godzilla | ProductLine::Kdp)
    }

    /// Default SSH user for the product
    pub fn default_ssh_user(&self) -> &'static str {
        match self {
            ProductLine::Kamino => "root",
            ProductLine::Godzilla => "sshd",
            ProductLine::Kdp => "root",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<ProductLine> {
        match s.to_lowercase().as_str() {
            "kamino" | "android" => Some(ProductLine::Kamino),
            "godzilla" | "os3" => Some(ProductLine::Godzilla),
            "kdp" => Some(ProductLine::Kdp),
            _ => None,
        }
    }
}

impl fmt::Display for ProductLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Cloud environment the device is paired with
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudEnv {
    Dev1,
    Qa1,
    Prod,
}

impl CloudEnv {
    pub fn name(&self) -> &'static str {
        match self {
            CloudEnv::Dev1 => "dev1",
            CloudEnv::Qa1 => "qa1",
            CloudEnv::Prod => "prod",
        }
    }

    /// Built-in cloud API base URL, overridable per environment in the config file
    pub fn default_cloud_url(&self) -> &'static str {
        match self {
            CloudEnv::Dev1 => "https://dev1.cloud.example.com",
            CloudEnv::Qa1 => "https://qa1.cloud.example.com",
            CloudEnv::Prod => "https://prod.cloud.example.com",
        }
    }

    pub fn from_str(s: &str) -> Option<CloudEnv> {
        match s.to_lowercase().as_str() {
            "dev1" | "dev" => Some(CloudEnv::Dev1),
            "qa1" | "qa" => Some(CloudEnv::Qa1),
            "prod" | "production" => Some(CloudEnv::Prod),
            _ => None,
        }
    }
}

impl fmt::Display for CloudEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// ADB connection settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AdbSettings {
    pub port: u16,
    pub binary: String,
    pub command_timeout_secs: u64,
    pub retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for AdbSettings {
    fn default() -> Self {
        Self {
            port: 5555,
            binary: "adb".to_string(),
            command_timeout_secs: 60,
            retries: 3,
            retry_delay_secs: 5,
        }
    }
}

/// SSH connection settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    /// Falls back to the product default when unset
    pub username: Option<String>,
    pub password: Option<String>,
    pub private_key_path: Option<String>,
    pub port: Option<u16>,
}

/// Terminal server port wired to the device console
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerialSettings {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_prompt")]
    pub prompt: String,
}

fn default_prompt() -> String {
    "# ".to_string()
}

impl SerialSettings {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            prompt: default_prompt(),
        }
    }
}

/// Access token for one simulated user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserToken {
    pub user: String,
    pub token: String,
}

impl UserToken {
    pub fn new(user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            token: token.into(),
        }
    }
}

/// On-device REST settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RestSettings {
    pub scheme: String,
    pub port: u16,
    pub nas_admin_port: u16,
    pub timeout_secs: u64,
    /// Tokens per simulated user, owner first
    pub users: Vec<UserToken>,
}

impl Default for RestSettings {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            port: 80,
            nas_admin_port: 8001,
            timeout_secs: 30,
            users: Vec::new(),
        }
    }
}

/// Typed configuration of the unit under test.
///
/// Built once by the config resolver and shared read-only with every test
/// phase. Script-specific flags live in `params`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UutConfig {
    pub uut_ip: String,
    pub product: ProductLine,
    pub cloud_env: CloudEnv,
    pub cloud_url: String,
    pub app_id: Option<String>,
    pub firmware_version: Option<String>,
    pub adb: AdbSettings,
    pub ssh: SshSettings,
    pub serial: Option<SerialSettings>,
    pub rest: RestSettings,
    pub params: BTreeMap<String, String>,
}

impl UutConfig {
    pub fn new(uut_ip: impl Into<String>, product: ProductLine) -> Self {
        let cloud_env = CloudEnv::Qa1;
        Self {
            uut_ip: uut_ip.into(),
            product,
            cloud_env,
            cloud_url: cloud_env.default_cloud_url().to_string(),
            app_id: None,
            firmware_version: None,
            adb: AdbSettings::default(),
            ssh: SshSettings::default(),
            serial: None,
            rest: RestSettings::default(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_cloud_env(mut self, env: CloudEnv) -> Self {
        self.cloud_env = env;
        self.cloud_url = env.default_cloud_url().to_string();
        self
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn with_firmware(mut self, version: impl Into<String>) -> Self {
        self.firmware_version = Some(version.into());
        self
    }

    pub fn with_serial(mut self, serial: SerialSettings) -> Self {
        self.serial = Some(serial);
        self
    }

    pub fn with_user(mut self, user: UserToken) -> Self {
        self.rest.users.push(user);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// `ip:port` target used by `adb -s`
    pub fn adb_target(&self) -> String {
        format!("{}:{}", self.uut_ip, self.adb.port)
    }

    /// RestSDK base URL
    pub fn rest_base_url(&self) -> String {
        format!("{}://{}:{}", self.rest.scheme, self.uut_ip, self.rest.port)
    }

    /// nasAdmin base URL
    pub fn nas_admin_base_url(&self) -> String {
        format!(
            "{}://{}:{}",
            self.rest.scheme, self.uut_ip, self.rest.nas_admin_port
        )
    }

    pub fn ssh_username(&self) -> String {
        self.ssh
            .username
            .clone()
            .unwrap_or_else(|| self.product.default_ssh_user().to_string())
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(|s| s.as_str())
    }
}

/// Execution settings for one run of a test case
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSettings {
    pub loop_times: u32,
    pub timeout_secs: u64,
    pub run_after_test_on_failure: bool,
    pub stop_on_failure: bool,
    pub iteration_interval_secs: u64,
    /// Join deadline for concurrent workers; unset waits indefinitely
    pub worker_deadline_secs: Option<u64>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            loop_times: 1,
            timeout_secs: 30,
            run_after_test_on_failure: true,
            stop_on_failure: false,
            iteration_interval_secs: 0,
            worker_deadline_secs: None,
        }
    }
}

impl RunSettings {
    pub fn with_loop_times(mut self, loop_times: u32) -> Self {
        self.loop_times = loop_times.max(1);
        self
    }

    pub fn stop_on_failure(mut self, stop: bool) -> Self {
        self.stop_on_failure = stop;
        self
    }

    pub fn run_after_test_on_failure(mut self, run: bool) -> Self {
        self.run_after_test_on_failure = run;
        self
    }
}
