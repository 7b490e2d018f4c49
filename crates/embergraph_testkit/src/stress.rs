//! Stress tests for EmberGraph.
//!
//! These helpers drive a kernel from many threads at once: transactions,
//! nested transactions, handler registration racing shutdown.

use crate::doubles::{EventLog, RecordingKernelHandler};
use embergraph_core::{CoreResult, GraphDatabase};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Transactions attempted across all threads.
    pub total_ops: usize,
    /// Transactions that committed.
    pub successful_ops: usize,
    /// Transactions that returned an error.
    pub failed_ops: usize,
    /// Threads that took part.
    pub threads: usize,
    /// Wall time of the run.
    pub duration: Duration,
}

impl StressTestResult {
    fn new(successful: usize, failed: usize, threads: usize, duration: Duration) -> Self {
        Self {
            total_ops: successful + failed,
            successful_ops: successful,
            failed_ops: failed,
            threads,
            duration,
        }
    }

    /// Transactions per second over the whole run.
    pub fn ops_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.total_ops as f64 / secs
        } else {
            0.0
        }
    }

    /// Prints a one-block summary, labelled `name`.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ({} threads) ===", self.threads);
        println!("Committed: {}/{}", self.successful_ops, self.total_ops);
        println!("Failed:    {}", self.failed_ops);
        println!("Duration:  {:?}", self.duration);
        println!("Rate:      {:.2} tx/sec", self.ops_per_second());
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Transactions per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Nodes created per transaction.
    pub nodes_per_transaction: usize,
    /// Nesting depth for nested-transaction runs.
    pub nesting_depth: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 1_000,
            threads: 4,
            nodes_per_transaction: 2,
            nesting_depth: 3,
        }
    }
}

fn run_threads<F>(config: &StressConfig, op: F) -> StressTestResult
where
    F: Fn(usize) -> CoreResult<()> + Sync,
{
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let start = Instant::now();

    thread::scope(|scope| {
        for _ in 0..config.threads {
            scope.spawn(|| {
                for i in 0..config.operations {
                    match op(i) {
                        Ok(()) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            });
        }
    });

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        config.threads,
        start.elapsed(),
    )
}

/// Every thread runs its own write transactions.
pub fn stress_concurrent_transactions(
    db: &GraphDatabase,
    config: &StressConfig,
) -> StressTestResult {
    run_threads(config, |_| {
        db.transaction(|_| {
            for _ in 0..config.nodes_per_transaction {
                db.create_node()?;
            }
            Ok(())
        })
    })
}

/// Every thread nests `nesting_depth` transactions and writes in the
/// innermost one.
pub fn stress_nested_transactions(db: &GraphDatabase, config: &StressConfig) -> StressTestResult {
    fn nest(db: &GraphDatabase, depth: usize, nodes: usize) -> CoreResult<()> {
        db.transaction(|_| {
            if depth > 1 {
                nest(db, depth - 1, nodes)
            } else {
                (0..nodes).try_for_each(|_| db.create_node().map(|_| ()))
            }
        })
    }
    run_threads(config, |_| {
        nest(db, config.nesting_depth.max(1), config.nodes_per_transaction)
    })
}

/// Outcome of racing handler registration against shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownRaceResult {
    /// Handlers registered while shutdown ran.
    pub registered: usize,
    /// `before_shutdown` notifications delivered.
    pub notified: usize,
    /// Shutdown calls that returned an error.
    pub failed_shutdowns: usize,
}

/// Registers handlers from `config.threads` threads while as many threads
/// call `shutdown` concurrently.
///
/// Handlers registered before the notification snapshot is taken are
/// notified exactly once; later ones are not notified at all.
pub fn stress_shutdown_race(db: &GraphDatabase, config: &StressConfig) -> ShutdownRaceResult {
    let log = EventLog::new();
    let registered = AtomicUsize::new(0);
    let failed_shutdowns = AtomicUsize::new(0);
    let barrier = Barrier::new(config.threads * 2);

    thread::scope(|scope| {
        for t in 0..config.threads {
            let log = &log;
            let registered = &registered;
            let barrier = &barrier;
            scope.spawn(move || {
                barrier.wait();
                for i in 0..config.operations {
                    let name = format!("handler-{t}-{i}");
                    db.register_kernel_event_handler(
                        RecordingKernelHandler::new(name, log).into_arc(),
                    );
                    registered.fetch_add(1, Ordering::Relaxed);
                }
            });
            let failed_shutdowns = &failed_shutdowns;
            scope.spawn(move || {
                barrier.wait();
                if db.shutdown().is_err() {
                    failed_shutdowns.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    });

    ShutdownRaceResult {
        registered: registered.load(Ordering::Relaxed),
        notified: log.entries().len(),
        failed_shutdowns: failed_shutdowns.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestKernel;

    fn small_config() -> StressConfig {
        StressConfig {
            operations: 100,
            threads: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_concurrent_transactions() {
        let kernel = TestKernel::memory();
        let config = small_config();

        let result = stress_concurrent_transactions(&kernel, &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 400);
        assert_eq!(kernel.all_nodes().unwrap().count(), 800);
        assert!(!kernel.transaction_running());
    }

    #[test]
    fn test_nested_transactions() {
        let kernel = TestKernel::memory();
        let config = StressConfig {
            nesting_depth: 4,
            ..small_config()
        };

        let result = stress_nested_transactions(&kernel, &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(kernel.all_nodes().unwrap().count(), 800);
    }

    #[test]
    fn test_shutdown_race() {
        let kernel = TestKernel::memory();
        let config = StressConfig {
            operations: 50,
            ..small_config()
        };

        let result = stress_shutdown_race(&kernel, &config);
        assert_eq!(result.registered, 200);
        assert!(result.notified <= result.registered);
        assert_eq!(result.failed_shutdowns, 0);
        assert!(!kernel.is_started());
    }
}
