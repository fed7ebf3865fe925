//! Data models for device testing
//!
//! This module contains all data structures used throughout the application.

mod device;
mod test_result;

pub use device::{
    AdbSettings, CloudEnv, ProductLine, RestSettings, RunSettings, SerialSettings, SshSettings,
    UserToken, UutConfig,
};
pub use test_result::{Priority, RunSummary, TestMeta, TestResult, TestStatus};
