//! Configuration module
//!
//! Settings come from, in increasing priority: built-in defaults, the
//! config file, the selected device profile, `NASQA_*` environment
//! variables and command-line flags. [`ResolvedConfig::resolve`] merges
//! them once; the result is immutable for the rest of the run.

mod env;
mod file;
mod profile;

pub use env::{print_env_help, EnvBuilder, EnvConfig, EnvGuard};
pub use file::ConfigFile;
pub use profile::{CloudEnvironment, DeviceProfile};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::{CloudEnv, ProductLine, RunSettings, UserToken, UutConfig};

/// Application defaults
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Product line when neither a device nor a flag names one
    pub default_product: String,

    /// Cloud environment when none is given
    pub default_cloud_env: String,

    /// Client timeout in seconds
    pub timeout_secs: u64,

    /// Iterations per run
    pub loop_times: u32,

    pub stop_on_failure: bool,

    pub run_after_test_on_failure: bool,

    /// Pause between iterations
    pub iteration_interval_secs: u64,

    /// Join deadline for concurrent workers
    pub worker_deadline_secs: Option<u64>,

    /// Local results directory; platform data dir when unset
    pub results_dir: Option<String>,

    /// Logstash HTTP input
    pub logstash_url: Option<String>,

    /// Popcorn results endpoint
    pub popcorn_url: Option<String>,

    /// Upload results after every run
    pub upload: bool,

    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_product: "kamino".to_string(),
            default_cloud_env: "qa1".to_string(),
            timeout_secs: 30,
            loop_times: 1,
            stop_on_failure: false,
            run_after_test_on_failure: true,
            iteration_interval_secs: 0,
            worker_deadline_secs: None,
            results_dir: None,
            logstash_url: None,
            popcorn_url: None,
            upload: false,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    fn run_settings(&self) -> RunSettings {
        RunSettings {
            loop_times: self.loop_times.max(1),
            timeout_secs: self.timeout_secs,
            run_after_test_on_failure: self.run_after_test_on_failure,
            stop_on_failure: self.stop_on_failure,
            iteration_interval_secs: self.iteration_interval_secs,
            worker_deadline_secs: self.worker_deadline_secs,
        }
    }
}

/// Values given on the command line
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub uut_ip: Option<String>,
    pub product: Option<String>,
    pub cloud_env: Option<String>,
    pub app_id: Option<String>,
    pub device: Option<String>,
    pub firmware: Option<String>,
    pub loop_times: Option<u32>,
    pub timeout: Option<u64>,
    pub upload: bool,
    pub no_save: bool,
}

/// Where results go after a run
#[derive(Clone, Debug)]
pub struct ReportingConfig {
    pub results_dir: PathBuf,
    pub save: bool,
    pub upload: bool,
    pub logstash_url: Option<String>,
    pub popcorn_url: Option<String>,
}

/// Fully merged configuration for one run
#[derive(Clone, Debug)]
pub struct ResolvedConfig {
    pub uut: UutConfig,
    pub settings: RunSettings,
    pub reporting: ReportingConfig,
}

impl ResolvedConfig {
    pub fn resolve(file: &ConfigFile, env: &EnvConfig, cli: &CliOverrides) -> Result<Self> {
        let app = &file.app;

        let profile = match cli.device.as_deref().or(env.device.as_deref()) {
            Some(name) => Some(
                file.device(name)
                    .with_context(|| format!("No device profile named '{name}'"))?,
            ),
            None => None,
        };

        let uut_ip = cli
            .uut_ip
            .clone()
            .or_else(|| env.uut_ip.clone())
            .or_else(|| profile.map(|p| p.uut_ip.clone()))
            .context("No device address: pass --uut-ip, set NASQA_UUT_IP or select a --device")?;

        let product = match cli.product.as_deref().or(env.product.as_deref()) {
            Some(name) => parse_product(name)?,
            None => match profile {
                Some(p) => p.product,
                None => parse_product(&app.default_product)?,
            },
        };

        let cloud_env = match cli.cloud_env.as_deref().or(env.cloud_env.as_deref()) {
            Some(name) => parse_cloud_env(name)?,
            None => match profile.and_then(|p| p.cloud_env) {
                Some(env) => env,
                None => parse_cloud_env(&app.default_cloud_env)?,
            },
        };

        let mut uut = match profile {
            Some(p) => p.to_uut(),
            None => UutConfig::new(uut_ip.clone(), product),
        };
        uut.uut_ip = uut_ip;
        uut.product = product;
        uut = uut.with_cloud_env(cloud_env);
        if let Some(custom) = file.cloud_environment(cloud_env) {
            uut.cloud_url = custom.cloud_url.clone();
        }

        if let Some(app_id) = cli.app_id.clone().or_else(|| env.app_id.clone()) {
            uut.app_id = Some(app_id);
        }
        if let Some(firmware) = cli.firmware.clone().or_else(|| env.firmware.clone()) {
            uut.firmware_version = Some(firmware);
        }
        if let Some(token) = &env.access_token {
            set_owner_token(&mut uut, token);
        }

        let mut settings = app.run_settings();
        if let Some(timeout) = cli.timeout.or(env.timeout) {
            settings.timeout_secs = timeout;
            uut.rest.timeout_secs = timeout;
        }
        if let Some(loop_times) = cli.loop_times.or(env.loop_times) {
            settings = settings.with_loop_times(loop_times);
        }

        let reporting = ReportingConfig {
            results_dir: app
                .results_dir
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(default_results_dir),
            save: !cli.no_save,
            upload: cli.upload || app.upload,
            logstash_url: env.logstash_url.clone().or_else(|| app.logstash_url.clone()),
            popcorn_url: env.popcorn_url.clone().or_else(|| app.popcorn_url.clone()),
        };

        Ok(Self {
            uut,
            settings,
            reporting,
        })
    }
}

fn parse_product(name: &str) -> Result<ProductLine> {
    ProductLine::from_str(name).with_context(|| {
        format!("Unknown product '{name}'. Valid products: kamino, godzilla, kdp")
    })
}

fn parse_cloud_env(name: &str) -> Result<CloudEnv> {
    CloudEnv::from_str(name)
        .with_context(|| format!("Unknown cloud env '{name}'. Valid envs: dev1, qa1, prod"))
}

/// Replace (or add) the owner's token, keeping the owner first
fn set_owner_token(uut: &mut UutConfig, token: &str) {
    uut.rest.users.retain(|u| u.user != "owner");
    uut.rest.users.insert(0, UserToken::new("owner", token));
}

pub fn default_results_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nas-qa")
        .join("results")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with_ip() -> CliOverrides {
        CliOverrides {
            uut_ip: Some("10.0.0.7".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.default_product, "kamino");
        assert_eq!(config.timeout_secs, 30);
        assert!(config.run_after_test_on_failure);
    }

    #[test]
    fn test_app_config_partial_yaml() {
        let config: AppConfig = serde_yaml::from_str("loop_times: 4\nupload: true\n").unwrap();
        assert_eq!(config.loop_times, 4);
        assert!(config.upload);
        assert_eq!(config.default_cloud_env, "qa1");
    }

    #[test]
    fn test_resolve_builtin_defaults() {
        let resolved =
            ResolvedConfig::resolve(&ConfigFile::default(), &EnvConfig::default(), &cli_with_ip())
                .unwrap();

        assert_eq!(resolved.uut.uut_ip, "10.0.0.7");
        assert_eq!(resolved.uut.product, ProductLine::Kamino);
        assert_eq!(resolved.uut.cloud_env, CloudEnv::Qa1);
        assert_eq!(resolved.settings.loop_times, 1);
        assert!(resolved.reporting.save);
        assert!(!resolved.reporting.upload);
    }

    #[test]
    fn test_resolve_requires_address() {
        let result = ResolvedConfig::resolve(
            &ConfigFile::default(),
            &EnvConfig::default(),
            &CliOverrides::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_beats_env_beats_profile() {
        let mut file = ConfigFile::default();
        let mut profile = DeviceProfile::new("bench", "10.9.9.9", ProductLine::Godzilla);
        profile.firmware_version = Some("1.0".to_string());
        file.devices.push(profile);

        let env = EnvConfig {
            device: Some("bench".to_string()),
            product: Some("kdp".to_string()),
            firmware: Some("2.0".to_string()),
            loop_times: Some(3),
            ..Default::default()
        };
        let cli = CliOverrides {
            firmware: Some("3.0".to_string()),
            ..Default::default()
        };

        let resolved = ResolvedConfig::resolve(&file, &env, &cli).unwrap();
        assert_eq!(resolved.uut.uut_ip, "10.9.9.9");
        assert_eq!(resolved.uut.product, ProductLine::Kdp);
        assert_eq!(resolved.uut.firmware_version.as_deref(), Some("3.0"));
        assert_eq!(resolved.settings.loop_times, 3);
    }

    #[test]
    fn test_unknown_device_profile() {
        let cli = CliOverrides {
            device: Some("missing".to_string()),
            ..cli_with_ip()
        };
        assert!(
            ResolvedConfig::resolve(&ConfigFile::default(), &EnvConfig::default(), &cli).is_err()
        );
    }

    #[test]
    fn test_invalid_product_rejected() {
        let cli = CliOverrides {
            product: Some("toaster".to_string()),
            ..cli_with_ip()
        };
        assert!(
            ResolvedConfig::resolve(&ConfigFile::default(), &EnvConfig::default(), &cli).is_err()
        );
    }

    #[test]
    fn test_cloud_url_override_and_token() {
        let mut file = ConfigFile::default();
        file.cloud_environments.push(CloudEnvironment::new(
            CloudEnv::Dev1,
            "https://custom-dev1.example.com",
        ));
        let env = EnvConfig {
            cloud_env: Some("dev1".to_string()),
            access_token: Some("env-token".to_string()),
            ..Default::default()
        };

        let resolved = ResolvedConfig::resolve(&file, &env, &cli_with_ip()).unwrap();
        assert_eq!(resolved.uut.cloud_url, "https://custom-dev1.example.com");
        assert_eq!(resolved.uut.rest.users[0], UserToken::new("owner", "env-token"));
    }

    #[test]
    fn test_reporting_flags() {
        let mut file = ConfigFile::default();
        file.app.results_dir = Some("/tmp/nas-qa-results".to_string());
        let cli = CliOverrides {
            upload: true,
            no_save: true,
            timeout: Some(90),
            ..cli_with_ip()
        };

        let resolved = ResolvedConfig::resolve(&file, &EnvConfig::default(), &cli).unwrap();
        assert!(resolved.reporting.upload);
        assert!(!resolved.reporting.save);
        assert_eq!(resolved.reporting.results_dir, PathBuf::from("/tmp/nas-qa-results"));
        assert_eq!(resolved.settings.timeout_secs, 90);
        assert_eq!(resolved.uut.rest.timeout_secs, 90);
    }
}
