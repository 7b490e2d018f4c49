//! Status command implementation.

use super::{emit, CliResult, Format, KernelOptions};
use serde::Serialize;

/// Kernel status report.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Kernel version.
    pub version: String,
    /// Store directory.
    pub store_dir: String,
    /// Store identity.
    pub store_id: String,
    /// Lifecycle state while the report was taken.
    pub state: String,
    /// Whether mutation is forbidden.
    pub read_only: bool,
    /// Transaction manager implementation.
    pub tx_manager: String,
    /// Loaded extensions.
    pub extensions: Vec<String>,
    /// Registered index providers.
    pub index_providers: Vec<String>,
    /// Live nodes.
    pub nodes: usize,
    /// Live relationships.
    pub relationships: usize,
    /// Relationship type names.
    pub relationship_types: Vec<String>,
}

/// Boots a kernel, reports its status and shuts it down.
pub fn collect(options: &KernelOptions) -> CliResult<StatusReport> {
    let db = options.open()?;
    let report = StatusReport {
        version: embergraph_core::VERSION.to_string(),
        store_dir: db.store_dir().display().to_string(),
        store_id: db.store_id().to_string(),
        state: format!("{:?}", db.state()),
        read_only: db.is_read_only(),
        tx_manager: db.config().tx_manager_name().to_string(),
        extensions: db.loaded_extensions(),
        index_providers: db.index().provider_names(),
        nodes: db.all_nodes()?.count(),
        relationships: db.all_relationships()?.count(),
        relationship_types: db
            .relationship_types()?
            .iter()
            .map(|t| t.name().to_string())
            .collect(),
    };
    db.shutdown()?;
    Ok(report)
}

/// Runs the status command.
pub fn run(options: &KernelOptions, format: Format) -> CliResult<()> {
    let report = collect(options)?;
    emit(format, &report, print_report)
}

fn print_report(report: &StatusReport) {
    println!("EmberGraph kernel v{}", report.version);
    println!("  Store:          {}", report.store_dir);
    println!("  Store id:       {}", report.store_id);
    println!("  State:          {}", report.state);
    println!("  Read-only:      {}", report.read_only);
    println!("  Tx manager:     {}", report.tx_manager);
    println!("  Extensions:     {}", list_or_none(&report.extensions));
    println!("  Index provider: {}", list_or_none(&report.index_providers));
    println!("  Nodes:          {}", report.nodes);
    println!("  Relationships:  {}", report.relationships);
    println!("  Types:          {}", list_or_none(&report.relationship_types));
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}
