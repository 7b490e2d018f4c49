//! Smoke command implementation.
//!
//! Drives a freshly started kernel through every public path once: write
//! and rolled-back transactions, nesting, lookups, scans, completion and
//! lifecycle handlers, shutdown.

use super::{emit, CliError, CliResult, Format, KernelOptions};
use embergraph_core::{
    CoreError, CoreResult, ErrorState, GraphDatabase, IdType, KernelEventHandler, Node,
    Transaction, TransactionData, TransactionEventHandler,
};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Result of one smoke check.
#[derive(Debug, Serialize)]
pub struct Check {
    /// What was checked.
    pub name: &'static str,
    /// Whether it held.
    pub ok: bool,
}

/// Smoke run report.
#[derive(Debug, Serialize)]
pub struct SmokeReport {
    /// Nodes created by the workload.
    pub nodes_created: usize,
    /// Live nodes after the workload.
    pub nodes_live: usize,
    /// Live relationships after the workload.
    pub relationships_live: usize,
    /// Commits seen by the completion handler.
    pub commits: usize,
    /// Rollbacks seen by the completion handler.
    pub rollbacks: usize,
    /// Lifecycle notifications delivered at shutdown.
    pub shutdown_notifications: usize,
    /// Wall time in milliseconds.
    pub elapsed_ms: u128,
    /// Individual checks.
    pub checks: Vec<Check>,
}

impl SmokeReport {
    fn failed(&self) -> Vec<&'static str> {
        self.checks.iter().filter(|c| !c.ok).map(|c| c.name).collect()
    }
}

#[derive(Default)]
struct Counters {
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    shutdowns: AtomicUsize,
}

struct CountingTxHandler(Arc<Counters>);

impl TransactionEventHandler for CountingTxHandler {
    fn before_commit(&self, _data: &TransactionData) -> CoreResult<()> {
        Ok(())
    }

    fn after_commit(&self, data: &TransactionData) {
        debug!(created = data.created_nodes.len(), "smoke transaction committed");
        self.0.commits.fetch_add(1, Ordering::Relaxed);
    }

    fn after_rollback(&self, _data: &TransactionData) {
        self.0.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    fn name(&self) -> String {
        "smoke-tx".to_string()
    }
}

struct CountingKernelHandler(Arc<Counters>);

impl KernelEventHandler for CountingKernelHandler {
    fn before_shutdown(&self) -> CoreResult<()> {
        self.0.shutdowns.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn kernel_panic(&self, error: ErrorState) {
        tracing::error!(?error, "kernel panic during smoke run");
    }

    fn name(&self) -> String {
        "smoke-kernel".to_string()
    }
}

/// Runs the workload against a new kernel and shuts it down.
pub fn execute(options: &KernelOptions, nodes: usize) -> CliResult<SmokeReport> {
    let start = Instant::now();
    let db = options.open()?;
    let counters = Arc::new(Counters::default());
    db.register_transaction_event_handler(Arc::new(CountingTxHandler(Arc::clone(&counters))));
    db.register_kernel_event_handler(Arc::new(CountingKernelHandler(Arc::clone(&counters))));

    let mut checks = Vec::new();
    let created = build_chain(&db, nodes)?;
    info!(nodes = created.len(), "chain created");

    checks.push(Check {
        name: "scan sees every created node",
        ok: db.all_nodes()?.eq(created.iter().copied()),
    });

    if let Some(tail) = created.last() {
        let tail = tail.id();
        db.transaction(|_| {
            let incoming: Vec<_> = db
                .all_relationships()?
                .filter(|rel| rel.end() == tail)
                .collect();
            for rel in incoming {
                db.delete_relationship(rel.id())?;
            }
            db.delete_node(tail)
        })?;
        checks.push(Check {
            name: "deleted node is not found",
            ok: db
                .node_by_id(tail.as_u64() as i64)
                .is_err_and(|err| err.is_not_found()),
        });
    }

    let before = db.all_nodes()?.count();
    let rolled_back: CoreResult<()> = db.transaction(|_| {
        db.create_node()?;
        Err(CoreError::invalid_operation("smoke rollback"))
    });
    checks.push(Check {
        name: "failed transaction leaves no trace",
        ok: rolled_back.is_err() && db.all_nodes()?.count() == before,
    });

    checks.push(Check {
        name: "nested begin shares one placebo",
        ok: nested_placebo_is_shared(&db)?,
    });

    let max = IdType::Node.max_value() as i64;
    checks.push(Check {
        name: "out-of-range ids are not found",
        ok: [-1, max + 1, i64::MAX]
            .into_iter()
            .all(|id| db.node_by_id(id).is_err_and(|err| err.is_not_found())),
    });

    let nodes_live = db.all_nodes()?.count();
    let relationships_live = db.all_relationships()?.count();
    db.shutdown()?;
    checks.push(Check {
        name: "operations fail after shutdown",
        ok: matches!(db.begin_tx(), Err(CoreError::KernelStopped)),
    });

    Ok(SmokeReport {
        nodes_created: created.len(),
        nodes_live,
        relationships_live,
        commits: counters.commits.load(Ordering::Relaxed),
        rollbacks: counters.rollbacks.load(Ordering::Relaxed),
        shutdown_notifications: counters.shutdowns.load(Ordering::Relaxed),
        elapsed_ms: start.elapsed().as_millis(),
        checks,
    })
}

fn build_chain(db: &GraphDatabase, len: usize) -> CoreResult<Vec<Node>> {
    db.transaction(|_| {
        let nodes = (0..len)
            .map(|_| db.create_node())
            .collect::<CoreResult<Vec<_>>>()?;
        for pair in nodes.windows(2) {
            db.create_relationship(pair[0].id(), pair[1].id(), "NEXT")?;
        }
        Ok(nodes)
    })
}

fn nested_placebo_is_shared(db: &GraphDatabase) -> CoreResult<bool> {
    let outer = db.begin_tx()?;
    let first = db.begin_tx()?;
    let second = db.begin_tx()?;
    let shared = match (&first, &second) {
        (Transaction::Placebo(a), Transaction::Placebo(b)) => Arc::ptr_eq(a, b),
        _ => false,
    };
    first.finish()?;
    second.finish()?;
    let still_running = db.transaction_running();
    outer.finish()?;
    Ok(shared && still_running && !db.transaction_running())
}

/// Runs the smoke command.
pub fn run(options: &KernelOptions, nodes: usize, format: Format) -> CliResult<()> {
    let report = execute(options, nodes)?;
    emit(format, &report, print_report)?;
    let failed = report.failed();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(CliError::CheckFailed(failed.join(", ")))
    }
}

fn print_report(report: &SmokeReport) {
    println!("Smoke run finished in {} ms", report.elapsed_ms);
    println!(
        "  Nodes: {} created, {} live; relationships live: {}",
        report.nodes_created, report.nodes_live, report.relationships_live
    );
    println!(
        "  Transactions: {} committed, {} rolled back",
        report.commits, report.rollbacks
    );
    println!("  Shutdown notifications: {}", report.shutdown_notifications);
    for check in &report.checks {
        println!("  [{}] {}", if check.ok { "ok" } else { "FAIL" }, check.name);
    }
}
