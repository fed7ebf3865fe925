//! Device and cloud-environment profiles
//!
//! A device profile names one bench unit so runs can say `--device bench-3`
//! instead of repeating its address, credentials and console port.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{
    AdbSettings, CloudEnv, ProductLine, RestSettings, SerialSettings, SshSettings, UserToken,
    UutConfig,
};

/// Saved settings for one device under test
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Profile name
    pub name: String,
    pub uut_ip: String,
    pub product: ProductLine,
    #[serde(default)]
    pub cloud_env: Option<CloudEnv>,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub adb: AdbSettings,
    #[serde(default)]
    pub ssh: SshSettings,
    #[serde(default)]
    pub serial: Option<SerialSettings>,
    #[serde(default)]
    pub rest: RestSettings,
    /// Script-specific flags
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl DeviceProfile {
    pub fn new(name: impl Into<String>, uut_ip: impl Into<String>, product: ProductLine) -> Self {
        Self {
            name: name.into(),
            uut_ip: uut_ip.into(),
            product,
            cloud_env: None,
            app_id: None,
            firmware_version: None,
            adb: AdbSettings::default(),
            ssh: SshSettings::default(),
            serial: None,
            rest: RestSettings::default(),
            params: BTreeMap::new(),
        }
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

    /// Device configuration seeded from this profile
    pub fn to_uut(&self) -> UutConfig {
        let mut uut = UutConfig::new(self.uut_ip.clone(), self.product);
        if let Some(env) = self.cloud_env {
            uut = uut.with_cloud_env(env);
        }
        uut.app_id = self.app_id.clone();
        uut.firmware_version = self.firmware_version.clone();
        uut.adb = self.adb.clone();
        uut.ssh = self.ssh.clone();
        uut.serial = self.serial.clone();
        uut.rest = self.rest.clone();
        uut.params = self.params.clone();
        uut
    }

    /// Sample Android bench unit
    pub fn kamino_example() -> Self {
        Self::new("kamino-bench", "192.168.1.50", ProductLine::Kamino)
            .with_user(UserToken::new("owner", "<owner-access-token>"))
            .with_user(UserToken::new("guest", "<guest-access-token>"))
    }

    /// Sample embedded-Linux bench unit with a console port
    pub fn godzilla_example() -> Self {
        let mut profile = Self::new("godzilla-bench", "192.168.1.60", ProductLine::Godzilla)
            .with_serial(SerialSettings::new("192.168.1.2", 7003));
        profile.ssh.password = Some("<ssh-password>".to_string());
        profile
    }
}

/// Cloud endpoint override for one environment
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CloudEnvironment {
    pub env: CloudEnv,
    pub cloud_url: String,
    /// Extra environment-specific settings
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl CloudEnvironment {
    pub fn new(env: CloudEnv, cloud_url: impl Into<String>) -> Self {
        Self {
            env,
            cloud_url: cloud_url.into(),
            extra: BTreeMap::new(),
        }
    }
}
