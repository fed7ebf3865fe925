//! CLI argument parsing
//!
//! Defines command-line interface using clap. Multi-word flags also accept
//! their underscore spelling (`--uut_ip`) so existing job definitions keep
//! working.

use clap::{Parser, Subcommand};

use nas_qa::config::CliOverrides;

/// NAS appliance QA test runner
#[derive(Parser, Debug)]
#[command(name = "nas-qa")]
#[command(version)]
#[command(about = "Run functional tests against NAS appliances")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to the standard search path)
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one test case against a device
    Run(RunArgs),

    /// List available test cases
    List(ListArgs),

    /// View stored results
    Results(ResultsArgs),

    /// Manage the configuration file
    Config(ConfigArgs),
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Test case name (see `nas-qa list`)
    pub test: String,

    /// Device IP address
    #[arg(long, alias = "uut_ip")]
    pub uut_ip: Option<String>,

    /// Product line (kamino, godzilla, kdp)
    #[arg(short, long)]
    pub product: Option<String>,

    /// Cloud environment (dev1, qa1, prod)
    #[arg(long, alias = "cloud_env")]
    pub cloud_env: Option<String>,

    /// App id for install tests
    #[arg(long, alias = "app_id")]
    pub app_id: Option<String>,

    /// Device profile from the config file
    #[arg(short, long)]
    pub device: Option<String>,

    /// Number of iterations
    #[arg(short = 'n', long, alias = "loop_times")]
    pub loop_times: Option<u32>,

    /// Expected firmware version
    #[arg(long)]
    pub firmware: Option<String>,

    /// Client timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Output format (table, json, json-pretty, csv, summary) [default: table]
    #[arg(short, long)]
    pub format: Option<String>,

    /// Also write the formatted summary to this file
    #[arg(short, long)]
    pub output: Option<String>,

    /// Write JUnit XML to this path
    #[arg(long)]
    pub junit: Option<String>,

    /// Upload results to Logstash and Popcorn
    #[arg(long)]
    pub upload: bool,

    /// Do not store results locally
    #[arg(long, alias = "no_save")]
    pub no_save: bool,
}

impl RunArgs {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            uut_ip: self.uut_ip.clone(),
            product: self.product.clone(),
            cloud_env: self.cloud_env.clone(),
            app_id: self.app_id.clone(),
            device: self.device.clone(),
            firmware: self.firmware.clone(),
            loop_times: self.loop_times,
            timeout: self.timeout,
            upload: self.upload,
            no_save: self.no_save,
        }
    }
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Show detailed test information
    #[arg(short, long)]
    pub detailed: bool,

    /// Only tests supporting this product line
    #[arg(short, long)]
    pub product: Option<String>,

    /// Output format (table, json, json-pretty)
    #[arg(short, long, default_value = "table")]
    pub format: String,
}

/// Arguments for results command
#[derive(Parser, Debug)]
pub struct ResultsArgs {
    /// Test case to show runs for; lists tested cases when omitted
    pub test: Option<String>,

    /// Specific run id (defaults to the latest)
    #[arg(short, long)]
    pub run: Option<String>,

    /// Show summary only
    #[arg(short, long)]
    pub summary: bool,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// Export the selected run as CSV
    #[arg(short, long)]
    pub export: Option<String>,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write an example configuration file
    Init {
        /// Destination path
        #[arg(default_value = "./nas-qa.yaml")]
        path: String,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the loaded configuration
    Show,

    /// Validate a configuration file
    Validate {
        /// Path to validate (defaults to the search path)
        path: Option<String>,
    },

    /// Describe the NASQA_* environment variables
    Env,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_args() {
        let args = Args::parse_from(["nas-qa", "list", "--detailed"]);
        match args.command {
            Command::List(list_args) => assert!(list_args.detailed),
            _ => panic!("Expected List command"),
        }
    }

    #[test]
    fn test_run_args() {
        let args = Args::parse_from([
            "nas-qa",
            "run",
            "raid_health",
            "--uut-ip",
            "10.0.0.5",
            "--product",
            "godzilla",
            "--loop-times",
            "10",
            "--junit",
            "out.xml",
            "--upload",
        ]);
        match args.command {
            Command::Run(run) => {
                assert_eq!(run.test, "raid_health");
                assert_eq!(run.uut_ip.as_deref(), Some("10.0.0.5"));
                assert_eq!(run.loop_times, Some(10));
                assert_eq!(run.junit.as_deref(), Some("out.xml"));
                assert!(run.format.is_none());
                let overrides = run.overrides();
                assert!(overrides.upload);
                assert!(!overrides.no_save);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_underscore_aliases() {
        let args = Args::parse_from([
            "nas-qa",
            "run",
            "concurrent_app_install",
            "--uut_ip",
            "10.0.0.6",
            "--cloud_env",
            "dev1",
            "--app_id",
            "com.example.plex",
        ]);
        match args.command {
            Command::Run(run) => {
                assert_eq!(run.uut_ip.as_deref(), Some("10.0.0.6"));
                assert_eq!(run.cloud_env.as_deref(), Some("dev1"));
                assert_eq!(run.app_id.as_deref(), Some("com.example.plex"));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_config_init_default_path() {
        let args = Args::parse_from(["nas-qa", "config", "init"]);
        match args.command {
            Command::Config(ConfigArgs {
                action: ConfigAction::Init { path, force },
            }) => {
                assert_eq!(path, "./nas-qa.yaml");
                assert!(!force);
            }
            _ => panic!("Expected config init"),
        }
    }
}
