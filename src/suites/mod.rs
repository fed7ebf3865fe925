//! Built-in test cases
//!
//! ### Apps
//! - `concurrent_app_install`: two users install one app at the same time
//!
//! ### Device health
//! - `adb_boot_completed`: Android boot completion and firmware build
//! - `raid_health`: no degraded md arrays
//!
//! ### Console
//! - `serial_console_echo`: console shell round trip

mod console;
mod device;
mod install;

pub use console::SerialConsoleEcho;
pub use device::{AdbBootCompleted, RaidHealth};
pub use install::ConcurrentAppInstall;

use crate::harness::TestCase;
use crate::models::TestMeta;

/// Metadata of every registered test case
pub fn all_meta() -> Vec<TestMeta> {
    vec![
        ConcurrentAppInstall::describe(),
        AdbBootCompleted::describe(),
        RaidHealth::describe(),
        SerialConsoleEcho::describe(),
    ]
}

/// Fresh instance of the named test case
pub fn build(name: &str) -> Option<Box<dyn TestCase>> {
    let case: Box<dyn TestCase> = match name {
        "concurrent_app_install" => Box::new(ConcurrentAppInstall::new()),
        "adb_boot_completed" => Box::new(AdbBootCompleted::new()),
        "raid_health" => Box::new(RaidHealth::new()),
        "serial_console_echo" => Box::new(SerialConsoleEcho::new()),
        _ => return None,
    };
    Some(case)
}
