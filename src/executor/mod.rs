//! Test execution engine
//!
//! `runner` drives a test case through its lifecycle; `concurrent` fans a
//! step out over OS threads inside a single test.

mod concurrent;
mod runner;

pub use concurrent::{
    AggregationPolicy, CancelToken, ConcurrentExecutor, ExecutionReport, WorkerContext,
    WorkerOutcome,
};
pub use runner::TestRunner;
