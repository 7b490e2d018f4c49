//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use embergraph_core::{Config, CoreResult, GraphDatabase, NodeId};
use embergraph_storage::MemorySink;

/// Opens an in-memory kernel whose message log stays in memory.
pub fn open_kernel() -> CoreResult<GraphDatabase> {
    GraphDatabase::builder(Config::default())
        .with_log_sink(MemorySink::new())
        .open()
}

/// Opens a kernel holding `count` nodes, of which every `gap`-th one
/// (starting at id 0) is deleted again. `gap == 0` deletes nothing.
pub fn kernel_with_nodes(count: usize, gap: usize) -> CoreResult<GraphDatabase> {
    let db = open_kernel()?;
    let created = db.transaction(|_| {
        (0..count)
            .map(|_| db.create_node())
            .collect::<CoreResult<Vec<_>>>()
    })?;
    if gap > 0 {
        db.transaction(|_| {
            created
                .iter()
                .step_by(gap)
                .try_for_each(|node| db.delete_node(node.id()))
        })?;
    }
    Ok(db)
}

/// Returns the number of live nodes [`kernel_with_nodes`] leaves behind.
pub fn live_after_gaps(count: usize, gap: usize) -> usize {
    if gap == 0 {
        count
    } else {
        count - count.div_ceil(gap)
    }
}

/// Returns `count` ids spread over the first `span` node ids.
pub fn lookup_ids(count: usize, span: u64) -> Vec<NodeId> {
    let span = span.max(1);
    (0..count as u64)
        .map(|i| NodeId::new(i.wrapping_mul(7919) % span))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaps_are_deleted() {
        let db = kernel_with_nodes(10, 3).unwrap();
        assert_eq!(db.all_nodes().unwrap().count(), live_after_gaps(10, 3));
        assert_eq!(live_after_gaps(10, 3), 6);
        assert_eq!(live_after_gaps(10, 0), 10);
    }

    #[test]
    fn lookup_ids_stay_in_span() {
        assert!(lookup_ids(100, 10).iter().all(|id| id.as_u64() < 10));
    }
}
