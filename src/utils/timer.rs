//! Timer utilities
//!
//! Provides timing, lap measurement and the poll loop used while waiting on
//! devices to come up.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::debug;

/// Simple timer for measuring elapsed time
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    label: String,
}

impl Timer {
    /// Create and start a new timer
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            label: label.into(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Stop timer and return elapsed time
    pub fn stop(self) -> Duration {
        let elapsed = self.elapsed();
        debug!("{}: {}ms", self.label, elapsed.as_millis());
        elapsed
    }
}

/// Stopwatch with lap timing, one lap per lifecycle phase
#[derive(Debug)]
pub struct Stopwatch {
    start: Instant,
    laps: Vec<(String, Duration)>,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            laps: Vec::new(),
        }
    }

    pub fn lap(&mut self, label: impl Into<String>) {
        let elapsed = self.start.elapsed();
        self.laps.push((label.into(), elapsed));
    }

    pub fn total(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn laps(&self) -> &[(String, Duration)] {
        &self.laps
    }

    /// Get lap times (duration of each lap, not cumulative)
    pub fn lap_times(&self) -> Vec<(String, Duration)> {
        let mut result = Vec::new();
        let mut prev = Duration::ZERO;

        for (label, cumulative) in &self.laps {
            let lap_time = *cumulative - prev;
            result.push((label.clone(), lap_time));
            prev = *cumulative;
        }

        result
    }

    /// One-line lap summary, e.g. `before_test 3ms, test 120ms (total 123ms)`
    pub fn format(&self) -> String {
        let laps: Vec<String> = self
            .lap_times()
            .into_iter()
            .map(|(label, duration)| format!("{} {}ms", label, duration.as_millis()))
            .collect();
        format!("{} (total {}ms)", laps.join(", "), self.total().as_millis())
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Re-run `check` every `interval` until it returns true or `timeout`
/// elapses. Errors from `check` count as "not yet".
pub async fn poll_until<F, Fut>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut check: F,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<bool>>,
{
    let start = Instant::now();

    loop {
        match check().await {
            Ok(true) => {
                debug!("{} ready after {}ms", what, start.elapsed().as_millis());
                return true;
            }
            Ok(false) => {}
            Err(e) => debug!("{} check failed: {}", what, e),
        }

        if start.elapsed() + interval > timeout {
            debug!("Timeout waiting for {}", what);
            return false;
        }

        sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_timer() {
        let timer = Timer::start("test");
        thread::sleep(Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10);
    }

    #[test]
    fn test_stopwatch() {
        let mut sw = Stopwatch::new();
        thread::sleep(Duration::from_millis(10));
        sw.lap("before_test");
        thread::sleep(Duration::from_millis(10));
        sw.lap("test");

        assert_eq!(sw.laps().len(), 2);
        let lap_times = sw.lap_times();
        assert_eq!(lap_times.len(), 2);
        assert!(sw.format().contains("before_test"));
    }

    #[tokio::test]
    async fn test_poll_until_ready() {
        let mut attempts = 0;
        let ready = poll_until(
            "boot",
            Duration::from_secs(1),
            Duration::from_millis(5),
            || {
                attempts += 1;
                let done = attempts >= 3;
                async move { Ok(done) }
            },
        )
        .await;

        assert!(ready);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_poll_until_timeout() {
        let ready = poll_until(
            "boot",
            Duration::from_millis(30),
            Duration::from_millis(10),
            || async { Err(anyhow::anyhow!("device offline")) },
        )
        .await;

        assert!(!ready);
    }
}
