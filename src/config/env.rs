//! Environment variable configuration
//!
//! Every setting can be overridden with a `NASQA_*` variable.

use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "NASQA";

/// Overrides read from the environment
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// NASQA_UUT_IP
    pub uut_ip: Option<String>,
    /// NASQA_PRODUCT
    pub product: Option<String>,
    /// NASQA_CLOUD_ENV
    pub cloud_env: Option<String>,
    /// NASQA_APP_ID
    pub app_id: Option<String>,
    /// NASQA_DEVICE
    pub device: Option<String>,
    /// NASQA_FIRMWARE
    pub firmware: Option<String>,
    /// NASQA_TIMEOUT
    pub timeout: Option<u64>,
    /// NASQA_LOOP_TIMES
    pub loop_times: Option<u32>,
    /// NASQA_CONFIG
    pub config_file: Option<String>,
    /// NASQA_FORMAT
    pub format: Option<String>,
    /// NASQA_LOGSTASH_URL
    pub logstash_url: Option<String>,
    /// NASQA_POPCORN_URL
    pub popcorn_url: Option<String>,
    /// NASQA_ACCESS_TOKEN, used for the owner account
    pub access_token: Option<String>,
    /// NASQA_VERBOSE
    pub verbose: Option<bool>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            uut_ip: get_env("UUT_IP"),
            product: get_env("PRODUCT"),
            cloud_env: get_env("CLOUD_ENV"),
            app_id: get_env("APP_ID"),
            device: get_env("DEVICE"),
            firmware: get_env("FIRMWARE"),
            timeout: get_env_parse("TIMEOUT"),
            loop_times: get_env_parse("LOOP_TIMES"),
            config_file: get_env("CONFIG"),
            format: get_env("FORMAT"),
            logstash_url: get_env("LOGSTASH_URL"),
            popcorn_url: get_env("POPCORN_URL"),
            access_token: get_env("ACCESS_TOKEN"),
            verbose: get_env_bool("VERBOSE"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.uut_ip.is_some()
            || self.product.is_some()
            || self.cloud_env.is_some()
            || self.app_id.is_some()
            || self.device.is_some()
            || self.firmware.is_some()
            || self.timeout.is_some()
            || self.loop_times.is_some()
            || self.config_file.is_some()
            || self.format.is_some()
            || self.logstash_url.is_some()
            || self.popcorn_url.is_some()
            || self.access_token.is_some()
            || self.verbose.is_some()
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {}_UUT_IP:       {:?}", ENV_PREFIX, self.uut_ip);
        println!("  {}_PRODUCT:      {:?}", ENV_PREFIX, self.product);
        println!("  {}_CLOUD_ENV:    {:?}", ENV_PREFIX, self.cloud_env);
        println!("  {}_APP_ID:       {:?}", ENV_PREFIX, self.app_id);
        println!("  {}_DEVICE:       {:?}", ENV_PREFIX, self.device);
        println!("  {}_FIRMWARE:     {:?}", ENV_PREFIX, self.firmware);
        println!("  {}_TIMEOUT:      {:?}", ENV_PREFIX, self.timeout);
        println!("  {}_LOOP_TIMES:   {:?}", ENV_PREFIX, self.loop_times);
        println!("  {}_CONFIG:       {:?}", ENV_PREFIX, self.config_file);
        println!("  {}_FORMAT:       {:?}", ENV_PREFIX, self.format);
        println!("  {}_LOGSTASH_URL: {:?}", ENV_PREFIX, self.logstash_url);
        println!("  {}_POPCORN_URL:  {:?}", ENV_PREFIX, self.popcorn_url);
        println!(
            "  {}_ACCESS_TOKEN: {}",
            ENV_PREFIX,
            if self.access_token.is_some() { "<set>" } else { "None" }
        );
        println!("  {}_VERBOSE:      {:?}", ENV_PREFIX, self.verbose);
        if !self.has_any() {
            println!("\n  No {}_* variables are set.", ENV_PREFIX);
        }
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}"))
        .ok()
        .filter(|v| !v.is_empty())
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Builder for setting environment variables (useful for testing)
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

impl EnvBuilder {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    fn var(mut self, name: &str, value: String) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_{name}"), value));
        self
    }

    pub fn uut_ip(self, ip: impl Into<String>) -> Self {
        self.var("UUT_IP", ip.into())
    }

    pub fn product(self, product: impl Into<String>) -> Self {
        self.var("PRODUCT", product.into())
    }

    pub fn cloud_env(self, env: impl Into<String>) -> Self {
        self.var("CLOUD_ENV", env.into())
    }

    pub fn device(self, device: impl Into<String>) -> Self {
        self.var("DEVICE", device.into())
    }

    pub fn timeout(self, timeout: u64) -> Self {
        self.var("TIMEOUT", timeout.to_string())
    }

    pub fn loop_times(self, loop_times: u32) -> Self {
        self.var("LOOP_TIMES", loop_times.to_string())
    }

    pub fn access_token(self, token: impl Into<String>) -> Self {
        self.var("ACCESS_TOKEN", token.into())
    }

    pub fn verbose(self, verbose: bool) -> Self {
        self.var("VERBOSE", verbose.to_string())
    }

    /// Apply environment variables
    pub fn apply(self) {
        for (key, value) in self.vars {
            env::set_var(key, value);
        }
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        self.apply();

        EnvGuard { previous }
    }
}

impl Default for EnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that restores environment variables on drop
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Print all NASQA environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_UUT_IP        Device IP address");
    println!("  {ENV_PREFIX}_PRODUCT       Product line (kamino, godzilla, kdp)");
    println!("  {ENV_PREFIX}_CLOUD_ENV     Cloud environment (dev1, qa1, prod)");
    println!("  {ENV_PREFIX}_APP_ID        App id for install tests");
    println!("  {ENV_PREFIX}_DEVICE        Device profile name from the config file");
    println!("  {ENV_PREFIX}_FIRMWARE      Expected firmware version");
    println!("  {ENV_PREFIX}_TIMEOUT       Client timeout in seconds");
    println!("  {ENV_PREFIX}_LOOP_TIMES    Number of iterations");
    println!("  {ENV_PREFIX}_CONFIG        Path to configuration file");
    println!("  {ENV_PREFIX}_FORMAT        Output format (table, json, csv, summary)");
    println!("  {ENV_PREFIX}_LOGSTASH_URL  Logstash HTTP input");
    println!("  {ENV_PREFIX}_POPCORN_URL   Popcorn results endpoint");
    println!("  {ENV_PREFIX}_ACCESS_TOKEN  Owner access token for RestSDK");
    println!("  {ENV_PREFIX}_VERBOSE       Enable verbose output (true/false)");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_UUT_IP=192.168.1.50");
    println!("  export {ENV_PREFIX}_PRODUCT=kamino");
    println!("  nas-qa run adb_boot_completed");
}
