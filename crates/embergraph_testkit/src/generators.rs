//! Property-based test generators using proptest.
//!
//! Provides strategies for entity ids around the id-space bounds, handler
//! registration orders and small graph workloads.

use embergraph_core::{ExecutionOrder, IdType};
use proptest::prelude::*;

/// Strategy for raw ids as a caller might pass them: negative, inside the
/// id space of `id_type`, at its bound, or beyond it.
pub fn raw_id_strategy(id_type: IdType) -> impl Strategy<Value = i64> {
    let max = i64::try_from(id_type.max_value()).unwrap_or(i64::MAX);
    prop_oneof![
        i64::MIN..0,
        0..=max,
        Just(max),
        Just(max.saturating_add(1)),
        max.saturating_add(1)..=i64::MAX,
    ]
}

/// Strategy for ids strictly outside the id space of `id_type`.
pub fn out_of_range_id_strategy(id_type: IdType) -> impl Strategy<Value = i64> {
    let max = i64::try_from(id_type.max_value()).unwrap_or(i64::MAX);
    prop_oneof![i64::MIN..0, max.saturating_add(1)..=i64::MAX]
}

/// Strategy for an ordering preference.
pub fn execution_order_strategy() -> impl Strategy<Value = ExecutionOrder> {
    prop_oneof![
        Just(ExecutionOrder::Before),
        Just(ExecutionOrder::After),
        Just(ExecutionOrder::DoesNotMatter),
    ]
}

/// Strategy for a registration order of `count` handlers, as a permutation
/// of `0..count`.
pub fn registration_order_strategy(count: usize) -> impl Strategy<Value = Vec<usize>> {
    Just((0..count).collect::<Vec<_>>()).prop_shuffle()
}

/// One step of a single-threaded graph workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphOp {
    /// Create a node.
    CreateNode,
    /// Delete the n-th live node (modulo the live count).
    DeleteNode(usize),
    /// Connect two live nodes (modulo the live count).
    Connect(usize, usize),
}

/// Strategy for a single workload step.
pub fn graph_op_strategy() -> impl Strategy<Value = GraphOp> {
    prop_oneof![
        3 => Just(GraphOp::CreateNode),
        1 => any::<usize>().prop_map(GraphOp::DeleteNode),
        2 => (any::<usize>(), any::<usize>()).prop_map(|(a, b)| GraphOp::Connect(a, b)),
    ]
}

/// Strategy for a sequence of workload steps.
pub fn graph_ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<GraphOp>> {
    prop::collection::vec(graph_op_strategy(), 0..max_len)
}
