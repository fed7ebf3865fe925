//! nas-qa - hardware-in-the-loop QA harness for NAS appliances
//!
//! Drives test cases against Kamino, Godzilla and KDP devices over ADB, SSH,
//! a serial terminal server and the RestSDK HTTP API.
//!
//! ## Features
//!
//! - Test-case lifecycle with init, per-iteration and per-loop hooks
//! - Concurrent executor that releases workers together behind a start gate
//! - Local JSON result store, JUnit XML, Logstash and Popcorn uploads
//! - Multiple output formats (Table, JSON, CSV)
//!
//! ## Usage
//!
//! ```bash
//! # Run one test case ten times
//! nas-qa run raid_health --uut-ip 10.0.0.5 --product godzilla --loop-times 10
//!
//! # Concurrent install on a Kamino device from a config profile
//! nas-qa run concurrent_app_install --device kamino-lab --app-id com.example.plex
//!
//! # List available tests
//! nas-qa list --detailed
//!
//! # Show stored results
//! nas-qa results raid_health
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use tracing::{info, warn};

mod cli;

use cli::Args;
use nas_qa::config::{self, default_results_dir, ConfigFile, EnvConfig, ResolvedConfig};
use nas_qa::executor::TestRunner;
use nas_qa::harness::TestContext;
use nas_qa::models::ProductLine;
use nas_qa::output::{write_summary_to_file, OutputFormat, ResultFormatter};
use nas_qa::results::{self, generate_run_id, ResultsStorage, StoredRun};
use nas_qa::suites;
use nas_qa::utils::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let env = EnvConfig::load();

    // A broken config file only matters to commands that read it
    let file = load_config_file(args.config.as_deref(), &env);

    let level = if args.verbose || env.verbose.unwrap_or(false) {
        LogLevel::Debug
    } else {
        file.as_ref()
            .ok()
            .and_then(|f| LogLevel::from_str(&f.app.log_level))
            .unwrap_or(LogLevel::Info)
    };
    init_logger(level);

    match args.command {
        cli::Command::Run(run_args) => run_test(run_args, &file?, &env).await,
        cli::Command::List(list_args) => {
            list_tests(list_args)?;
            Ok(ExitCode::SUCCESS)
        }
        cli::Command::Results(results_args) => {
            show_results(results_args, &file?)?;
            Ok(ExitCode::SUCCESS)
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args, file, &env)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// `--config`, then `NASQA_CONFIG`, then the search path
fn load_config_file(path: Option<&str>, env: &EnvConfig) -> Result<ConfigFile> {
    match path.or(env.config_file.as_deref()) {
        Some(path) => ConfigFile::load(path),
        None => ConfigFile::load_default(),
    }
}

fn parse_format(name: &str) -> Result<OutputFormat> {
    OutputFormat::from_str(name).with_context(|| {
        format!("Unknown output format '{name}'. Valid: table, json, json-pretty, csv, summary")
    })
}

async fn run_test(args: cli::RunArgs, file: &ConfigFile, env: &EnvConfig) -> Result<ExitCode> {
    let resolved = ResolvedConfig::resolve(file, env, &args.overrides())?;
    let format = parse_format(
        args.format
            .as_deref()
            .or(env.format.as_deref())
            .unwrap_or("table"),
    )?;

    let mut case = suites::build(&args.test).with_context(|| {
        format!(
            "Unknown test '{}'. Run `nas-qa list` to see available tests",
            args.test
        )
    })?;

    info!(
        "Running {} against {} {} ({} iteration(s))",
        args.test,
        resolved.uut.product,
        resolved.uut.uut_ip,
        resolved.settings.loop_times
    );

    let ctx = TestContext::from_current(resolved.uut.clone(), resolved.settings.clone())?;
    let summary = TestRunner::new(ctx).run(case.as_mut()).await;

    println!("{}", ResultFormatter::new(format).format_summary(&summary));

    if let Some(path) = &args.output {
        write_summary_to_file(Path::new(path), &summary, format)?;
        info!("Summary written to {}", path);
    }

    if let Some(path) = &args.junit {
        std::fs::write(path, results::to_junit_xml(&summary))
            .with_context(|| format!("Failed to write JUnit report: {path}"))?;
        info!("JUnit report written to {}", path);
    }

    let reporting = &resolved.reporting;
    let run_id = if reporting.save {
        let stored = StoredRun::new(summary.clone());
        match ResultsStorage::new(&reporting.results_dir).save(&stored) {
            Ok(path) => info!("Results saved to {}", path.display()),
            Err(e) => warn!("Failed to save results: {:#}", e),
        }
        stored.id
    } else {
        generate_run_id()
    };

    if reporting.upload {
        let outcomes = results::publish(
            &summary,
            &run_id,
            reporting,
            resolved.settings.timeout_secs,
        )
        .await;
        for outcome in outcomes.iter().filter(|o| o.result.is_ok()) {
            info!("Uploaded run {} to {}", run_id, outcome.sink);
        }
    }

    Ok(ExitCode::from(summary.exit_code()))
}

fn list_tests(args: cli::ListArgs) -> Result<()> {
    let mut tests = suites::all_meta();

    if let Some(name) = &args.product {
        let product = ProductLine::from_str(name).with_context(|| {
            format!("Unknown product '{name}'. Valid products: kamino, godzilla, kdp")
        })?;
        tests.retain(|meta| meta.supports(product));
    }

    let formatter = ResultFormatter::new(parse_format(&args.format)?);
    println!("{}", formatter.format_catalogue(&tests, args.detailed));
    Ok(())
}

fn show_results(args: cli::ResultsArgs, file: &ConfigFile) -> Result<()> {
    let results_dir = file
        .app
        .results_dir
        .as_ref()
        .map(std::path::PathBuf::from)
        .unwrap_or_else(default_results_dir);
    let storage = ResultsStorage::new(results_dir);

    let Some(test) = args.test else {
        let tests = storage.list_tests()?;
        if tests.is_empty() {
            println!("\nNo stored results found in {}.", storage.base_dir().display());
            println!("   Run a test with: nas-qa run <test> --uut-ip <address>");
            return Ok(());
        }

        println!("\nStored Test Results\n");
        for test in &tests {
            let runs = storage.list_runs(test)?;
            if let Some(latest) = runs.first() {
                println!(
                    "  {:28} {:3} runs   latest {} {:.1}%",
                    test,
                    runs.len(),
                    latest.status,
                    latest.pass_rate
                );
            }
        }
        println!("\nUse `nas-qa results <test>` to view a test's runs.\n");
        return Ok(());
    };

    let run = match &args.run {
        Some(id) => storage.load(&test, id)?,
        None => storage
            .latest(&test)?
            .with_context(|| format!("No stored runs for {test}"))?,
    };

    if !args.summary {
        println!("\nRuns of {test}\n");
        for info in storage.list_runs(&test)? {
            println!(
                "  {}  {}  {:>3} iteration(s)  {} {:.1}%",
                info.id,
                info.started_at.format("%Y-%m-%d %H:%M:%S"),
                info.iterations,
                info.status,
                info.pass_rate
            );
        }
        println!();
    }

    let format = if args.summary {
        OutputFormat::Summary
    } else {
        parse_format(&args.format)?
    };
    println!("Run {}", run.id);
    println!("{}", ResultFormatter::new(format).format_summary(&run.summary));

    if let Some(path) = &args.export {
        storage.export_csv(&run, Path::new(path))?;
        println!("Exported run {} to {}", run.id, path);
    }

    Ok(())
}

fn manage_config(args: cli::ConfigArgs, file: Result<ConfigFile>, env: &EnvConfig) -> Result<()> {
    match args.action {
        cli::ConfigAction::Init { path, force } => {
            if Path::new(&path).exists() && !force {
                anyhow::bail!(
                    "Configuration file already exists: {path}. Use --force to overwrite."
                );
            }

            ConfigFile::example().save(&path)?;
            println!("✓ Configuration file created: {path}");
            println!("\nEdit the device profiles and tokens to match your lab.");
        }

        cli::ConfigAction::Show => {
            let config = file?;
            println!("{}", serde_yaml::to_string(&config)?);
        }

        cli::ConfigAction::Validate { path } => {
            let path = path.unwrap_or_else(|| {
                ConfigFile::find()
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_else(|| "./nas-qa.yaml".to_string())
            });

            match ConfigFile::load(&path) {
                Ok(config) => {
                    println!("✓ Configuration file is valid: {path}");
                    println!(
                        "  {} device profile(s), {} cloud environment(s)",
                        config.devices.len(),
                        config.cloud_environments.len()
                    );
                }
                Err(e) => {
                    println!("✗ Configuration file is invalid: {path}");
                    println!("  Error: {e:#}");
                    return Err(e);
                }
            }
        }

        cli::ConfigAction::Env => {
            config::print_env_help();
            println!();
            env.print_summary();
        }
    }

    Ok(())
}
