//! Cross-crate integration test helpers.
//!
//! [`KernelHarness`] mirrors every committed change in a model so the
//! kernel's lookups and scans can be checked against it.

use crate::doubles::EventLog;
use crate::fixtures::TestKernel;
use embergraph_core::{CoreResult, IdType, Node, NodeId, Relationship, RelationshipId};
use std::collections::BTreeMap;

/// A test harness tracking the live entities of a kernel.
pub struct KernelHarness {
    /// The kernel under test.
    pub kernel: TestKernel,
    /// Shared event log for doubles registered with the kernel.
    pub log: EventLog,
    nodes: BTreeMap<NodeId, Node>,
    relationships: BTreeMap<RelationshipId, Relationship>,
}

impl KernelHarness {
    /// Creates a harness around an in-memory kernel.
    pub fn new() -> Self {
        Self::with_kernel(TestKernel::memory())
    }

    /// Creates a harness around `kernel`, which must be empty.
    pub fn with_kernel(kernel: TestKernel) -> Self {
        Self {
            kernel,
            log: EventLog::new(),
            nodes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// Creates `count` nodes in one transaction and tracks them.
    pub fn create_nodes(&mut self, count: usize) -> CoreResult<Vec<Node>> {
        let db = &self.kernel.db;
        let created = db.transaction(|_| {
            (0..count)
                .map(|_| db.create_node())
                .collect::<CoreResult<Vec<_>>>()
        })?;
        self.nodes.extend(created.iter().map(|n| (n.id(), *n)));
        Ok(created)
    }

    /// Connects two nodes and tracks the relationship.
    pub fn connect(
        &mut self,
        start: NodeId,
        end: NodeId,
        type_name: &str,
    ) -> CoreResult<Relationship> {
        let db = &self.kernel.db;
        let rel = db.transaction(|_| db.create_relationship(start, end, type_name))?;
        self.relationships.insert(rel.id(), rel);
        Ok(rel)
    }

    /// Deletes a node and stops tracking it.
    pub fn delete_node(&mut self, id: NodeId) -> CoreResult<()> {
        let db = &self.kernel.db;
        db.transaction(|_| db.delete_node(id))?;
        self.nodes.remove(&id);
        Ok(())
    }

    /// Deletes a relationship and stops tracking it.
    pub fn delete_relationship(&mut self, id: RelationshipId) -> CoreResult<()> {
        let db = &self.kernel.db;
        db.transaction(|_| db.delete_relationship(id))?;
        self.relationships.remove(&id);
        Ok(())
    }

    /// Checks every lookup and both scans against the tracked model.
    pub fn verify_all(&self) {
        let db = &self.kernel.db;
        for (id, expected) in &self.nodes {
            let actual = db
                .node_by_id(id.as_u64() as i64)
                .expect("Tracked node should exist");
            assert_eq!(actual, *expected, "Node mismatch for {id}");
        }
        for (id, expected) in &self.relationships {
            let actual = db
                .relationship_by_id(id.as_u64() as i64)
                .expect("Tracked relationship should exist");
            assert_eq!(actual, *expected, "Relationship mismatch for {id}");
        }

        let scanned: Vec<Node> = db.all_nodes().expect("Kernel should run").collect();
        assert_eq!(scanned, self.nodes.values().copied().collect::<Vec<_>>());
        let scanned: Vec<Relationship> =
            db.all_relationships().expect("Kernel should run").collect();
        assert_eq!(
            scanned,
            self.relationships.values().copied().collect::<Vec<_>>()
        );
    }

    /// Checks that no id up to `limit` outside the model resolves.
    pub fn verify_absent_up_to(&self, limit: u64) {
        let db = &self.kernel.db;
        for raw in 0..=limit.min(IdType::Node.max_value()) {
            if !self.nodes.contains_key(&NodeId::new(raw)) {
                let err = db.node_by_id(raw as i64).unwrap_err();
                assert!(err.is_not_found(), "Node[{raw}]: {err}");
            }
        }
    }

    /// Returns the count of tracked nodes.
    pub fn tracked_nodes(&self) -> usize {
        self.nodes.len()
    }
}

impl Default for KernelHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doubles::{RecordingExtension, RecordingKernelHandler, RecordingTransactionHandler};
    use embergraph_core::extension::{ExtensionPhase, RemoteShellCapability};
    use embergraph_core::{
        Capability, Config, CoreError, ErrorState, TransactionEventHandler, Transaction,
    };
    use embergraph_core::kernel::StartupPhase;
    use std::sync::Arc;

    #[test]
    fn harness_tracks_lifecycle() {
        let mut harness = KernelHarness::new();
        let nodes = harness.create_nodes(3).unwrap();
        harness
            .connect(nodes[0].id(), nodes[2].id(), "KNOWS")
            .unwrap();
        harness.delete_node(nodes[1].id()).unwrap();

        assert_eq!(harness.tracked_nodes(), 2);
        harness.verify_all();
        harness.verify_absent_up_to(10);
    }

    #[test]
    fn scan_skips_deleted_node() {
        let mut harness = KernelHarness::new();
        let nodes = harness.create_nodes(3).unwrap();
        harness.delete_node(nodes[1].id()).unwrap();

        let scanned: Vec<Node> = harness.kernel.all_nodes().unwrap().collect();
        assert_eq!(scanned, [nodes[0], nodes[2]]);
    }

    #[test]
    fn nested_begin_returns_the_same_placebo() {
        let kernel = TestKernel::memory();
        let outer = kernel.begin_tx().unwrap();
        let first = kernel.begin_tx().unwrap();
        let second = kernel.begin_tx().unwrap();

        let (Transaction::Placebo(a), Transaction::Placebo(b)) = (&first, &second) else {
            panic!("nested begin_tx must return placebo handles");
        };
        assert!(Arc::ptr_eq(a, b));
        assert!(!outer.is_placebo());

        first.finish().unwrap();
        second.finish().unwrap();
        assert!(kernel.transaction_running());
        outer.finish().unwrap();
        assert!(!kernel.transaction_running());
    }

    #[test]
    fn placebo_failure_rolls_back_outer() {
        let kernel = TestKernel::memory();
        let outer = kernel.begin_tx().unwrap();
        let node = kernel.create_node().unwrap();

        let inner = kernel.begin_tx().unwrap();
        inner.failure();
        inner.finish().unwrap();

        outer.success();
        let err = outer.finish().unwrap_err();
        assert!(matches!(err, CoreError::TransactionFailure { .. }), "{err}");
        assert!(kernel
            .node_by_id(node.id().as_u64() as i64)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn load_failure_unloads_both_extensions() {
        let log = EventLog::new();
        let failed = TestKernel::try_build(Config::default(), |builder| {
            builder
                .with_extension(RecordingExtension::new("first", &log).into_arc())
                .with_extension(
                    RecordingExtension::new("second", &log)
                        .failing_at(ExtensionPhase::Load)
                        .into_arc(),
                )
        })
        .err()
        .expect("startup should fail");

        assert!(matches!(
            failed.error,
            CoreError::StartupFailed {
                phase: StartupPhase::ExtensionLoad,
                ..
            }
        ));
        for key in ["first", "second"] {
            assert_eq!(
                log.events_of(key),
                ["configure", "index_providers", "load", "unload"],
                "{key}"
            );
        }
        assert!(failed.message_log.contains("injected load failure"));
    }

    #[test]
    fn configure_failure_unloads_nothing() {
        let log = EventLog::new();
        let failed = TestKernel::try_build(Config::default(), |builder| {
            builder
                .with_extension(RecordingExtension::new("a", &log).into_arc())
                .with_extension(
                    RecordingExtension::new("b", &log)
                        .failing_at(ExtensionPhase::Configure)
                        .into_arc(),
                )
        })
        .err()
        .expect("startup should fail");

        assert!(matches!(
            failed.error,
            CoreError::StartupFailed {
                phase: StartupPhase::ExtensionConfiguration,
                ..
            }
        ));
        assert_eq!(log.count("a", "unload"), 0);
        assert_eq!(log.count("b", "unload"), 0);
    }

    #[test]
    fn unknown_tx_manager_leaves_no_extension_loaded() {
        let log = EventLog::new();
        let failed = TestKernel::try_build(Config::new().tx_manager_impl("missing"), |builder| {
            builder.with_extension(RecordingExtension::new("ext", &log).into_arc())
        })
        .err()
        .expect("startup should fail");

        assert!(matches!(
            failed.error,
            CoreError::StartupFailed {
                phase: StartupPhase::TransactionModule,
                ..
            }
        ));
        assert!(log.entries().is_empty());
    }

    #[test]
    fn index_providers_are_registered_then_removed() {
        let log = EventLog::new();
        let kernel = TestKernel::build(|builder| {
            builder.with_extension(
                RecordingExtension::new("lucene", &log)
                    .with_index_provider("fulltext")
                    .into_arc(),
            )
        })
        .unwrap();

        let index = Arc::clone(kernel.index());
        assert_eq!(index.provider_names(), ["fulltext"]);
        assert_eq!(kernel.loaded_extensions(), ["lucene"]);

        kernel.shutdown().unwrap();
        assert!(index.is_empty());
        assert_eq!(log.events_of("lucene").last().map(String::as_str), Some("unload"));
    }

    #[test]
    fn shutdown_notifies_once_in_order() {
        let log = EventLog::new();
        let kernel = TestKernel::memory();
        kernel.register_kernel_event_handler(RecordingKernelHandler::new("b", &log).into_arc());
        kernel.register_kernel_event_handler(
            RecordingKernelHandler::new("a", &log).before("b").into_arc(),
        );

        kernel.shutdown().unwrap();
        kernel.shutdown().unwrap();

        assert_eq!(log.entries(), ["a:before_shutdown", "b:before_shutdown"]);
        assert!(kernel.message_log().contains("Shutdown complete"));
    }

    #[test]
    fn failing_shutdown_handlers_are_isolated() {
        let log = EventLog::new();
        let kernel = TestKernel::memory();
        kernel.register_kernel_event_handler(
            RecordingKernelHandler::new("broken", &log).failing().into_arc(),
        );
        kernel.register_kernel_event_handler(
            RecordingKernelHandler::new("crashing", &log).panicking().into_arc(),
        );
        kernel.register_kernel_event_handler(RecordingKernelHandler::new("fine", &log).into_arc());

        let err = kernel.shutdown().unwrap_err();
        let CoreError::ShutdownFailed { failures } = err else {
            panic!("expected aggregated shutdown failure");
        };
        assert_eq!(failures.len(), 2);
        assert_eq!(log.count("fine", "before_shutdown"), 1);
        assert!(!kernel.is_started());
    }

    #[test]
    fn duplicate_and_unknown_handlers() {
        let log = EventLog::new();
        let kernel = TestKernel::memory();
        let handler = RecordingKernelHandler::new("h", &log).into_arc();

        let first = kernel.register_kernel_event_handler(Arc::clone(&handler));
        let again = kernel.register_kernel_event_handler(Arc::clone(&handler));
        assert!(Arc::ptr_eq(&first, &again));

        let stranger = RecordingKernelHandler::new("stranger", &log).into_arc();
        let err = kernel.unregister_kernel_event_handler(&stranger).unwrap_err();
        assert!(matches!(err, CoreError::UnregisteredHandler { .. }));

        kernel.unregister_kernel_event_handler(&handler).unwrap();
        kernel.shutdown().unwrap();
        assert!(log.entries().is_empty());
    }

    #[test]
    fn transaction_handler_sees_commit() {
        let log = EventLog::new();
        let kernel = TestKernel::memory();
        let handler = Arc::new(RecordingTransactionHandler::new("tx", &log));
        kernel.register_transaction_event_handler(
            Arc::clone(&handler) as Arc<dyn TransactionEventHandler>
        );

        let node = kernel.transaction(|_| kernel.create_node()).unwrap();

        assert_eq!(log.events_of("tx"), ["before_commit(1)", "after_commit"]);
        assert_eq!(handler.last_data().unwrap().created_nodes, [node.id()]);
    }

    #[test]
    fn hook_keeps_the_snapshot_taken_at_begin() {
        let log = EventLog::new();
        let kernel = TestKernel::memory();
        kernel.register_transaction_event_handler(Arc::new(RecordingTransactionHandler::new(
            "early", &log,
        )));

        let tx = kernel.begin_tx().unwrap();
        kernel.register_transaction_event_handler(Arc::new(RecordingTransactionHandler::new(
            "late", &log,
        )));
        kernel.create_node().unwrap();
        tx.success();
        tx.finish().unwrap();

        assert_eq!(log.events_of("early"), ["before_commit(1)", "after_commit"]);
        assert!(log.events_of("late").is_empty());
    }

    #[test]
    fn vetoing_handler_rolls_back() {
        let log = EventLog::new();
        let kernel = TestKernel::memory();
        kernel.register_transaction_event_handler(Arc::new(
            RecordingTransactionHandler::new("veto", &log).vetoing(),
        ));

        let err = kernel.transaction(|_| kernel.create_node()).unwrap_err();
        assert!(matches!(err, CoreError::TransactionFailure { .. }), "{err}");
        assert_eq!(log.events_of("veto"), ["before_commit(1)", "after_rollback"]);
        assert_eq!(kernel.all_nodes().unwrap().count(), 0);
    }

    #[test]
    fn kernel_panic_reaches_handlers() {
        let log = EventLog::new();
        let kernel = TestKernel::memory();
        kernel.register_kernel_event_handler(RecordingKernelHandler::new("h", &log).into_arc());

        kernel
            .kernel_panic_events()
            .generate_event(ErrorState::StorageMediaFull);
        assert_eq!(log.entries(), ["h:kernel_panic(StorageMediaFull)"]);
    }

    #[test]
    fn remote_shell_from_loaded_extension() {
        struct Shell(EventLog);
        impl RemoteShellCapability for Shell {
            fn enable(
                &self,
                params: &std::collections::BTreeMap<String, String>,
            ) -> CoreResult<()> {
                self.0.record("shell", &format!("enable({})", params.len()));
                Ok(())
            }
        }

        let log = EventLog::new();
        let kernel = TestKernel::build(|builder| {
            builder.with_extension(
                RecordingExtension::new("shell", &log)
                    .with_capability(Capability::RemoteShell(Arc::new(Shell(log.clone()))))
                    .into_arc(),
            )
        })
        .unwrap();

        let mut params = std::collections::BTreeMap::new();
        params.insert("port".to_string(), "1337".to_string());
        assert!(kernel.enable_remote_shell(&params).unwrap());
        assert_eq!(log.events_of("shell").last().map(String::as_str), Some("enable(1)"));

        let plain = TestKernel::memory();
        assert!(!plain.enable_remote_shell(&params).unwrap());
    }

    #[test]
    fn read_only_kernel_rejects_writes() {
        let kernel = TestKernel::try_build(Config::new().read_only(true), |b| b)
            .ok()
            .expect("read-only kernel should start");
        let err = kernel.transaction(|_| kernel.create_node()).unwrap_err();
        assert!(matches!(err, CoreError::ReadOnly));
    }
}
