//! # nas-qa
//!
//! Harness library behind the `nas-qa` binary. Test cases implement
//! [`harness::TestCase`] and drive devices through the [`clients`]; the
//! [`executor`] runs them and [`results`] stores and publishes the outcome.
//!
//! - **`clients`**: ADB, SSH/SCP, serial console and RestSDK clients
//! - **`config`**: config file, device profiles, `NASQA_*` environment
//! - **`executor`**: lifecycle runner and the gated concurrent executor
//! - **`harness`**: `TestCase` trait, `TestContext`, `TestError`
//! - **`models`**: device, product line and result types
//! - **`output`**: table, JSON and CSV rendering
//! - **`results`**: local storage, JUnit XML, Logstash and Popcorn
//! - **`suites`**: built-in test cases and their registry
//! - **`utils`**: logging and timing helpers

pub mod clients;
pub mod config;
pub mod executor;
pub mod harness;
pub mod models;
pub mod output;
pub mod results;
pub mod suites;
pub mod utils;
