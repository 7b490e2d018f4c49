//! Ordered kernel lifecycle handlers.

use super::same_handler;
use crate::error::{panic_message, CoreError, CoreResult};
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Relative position a handler asks for when it is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOrder {
    /// Run before the other handler.
    Before,
    /// Run after the other handler.
    After,
    /// No preference.
    DoesNotMatter,
}

/// Unrecoverable kernel conditions reported through `kernel_panic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorState {
    /// The transaction manager can no longer be trusted to commit.
    TxManagerNotOk,
    /// The storage media ran out of space.
    StorageMediaFull,
}

/// Receives kernel lifecycle notifications.
pub trait KernelEventHandler: Send + Sync {
    /// Called once when the kernel begins shutting down.
    fn before_shutdown(&self) -> CoreResult<()>;

    /// Called when the kernel hits an unrecoverable condition.
    fn kernel_panic(&self, error: ErrorState);

    /// Ordering preference relative to an already registered handler.
    fn order_compared_to(&self, _other: &dyn KernelEventHandler) -> ExecutionOrder {
        ExecutionOrder::DoesNotMatter
    }

    /// Name used in logs and error messages.
    fn name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Ordered, copy-on-write registry of [`KernelEventHandler`]s.
///
/// Membership is by `Arc` identity.
#[derive(Default)]
pub struct KernelEventHandlers {
    handlers: RwLock<Arc<Vec<Arc<dyn KernelEventHandler>>>>,
}

impl KernelEventHandlers {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` and returns the registered instance.
    ///
    /// An already registered handler is returned unchanged. Otherwise the new
    /// handler is compared with each registered handler in order: it goes
    /// in front of the first one it must run [`ExecutionOrder::Before`], or
    /// right behind the first one it must run [`ExecutionOrder::After`].
    /// Without any preference it is appended.
    pub fn register(&self, handler: Arc<dyn KernelEventHandler>) -> Arc<dyn KernelEventHandler> {
        loop {
            let snapshot = self.snapshot();
            if let Some(existing) = snapshot.iter().find(|&h| same_handler(h, &handler)) {
                return Arc::clone(existing);
            }

            // Preferences are queried without holding the lock; retry if
            // another writer got in first.
            let position = insertion_index(&snapshot, handler.as_ref());
            let mut current = self.handlers.write();
            if !Arc::ptr_eq(&current, &snapshot) {
                continue;
            }
            let mut next = Vec::with_capacity(snapshot.len() + 1);
            next.extend(snapshot.iter().cloned());
            next.insert(position, Arc::clone(&handler));
            *current = Arc::new(next);
            drop(current);

            debug!(handler = %handler.name(), position, "registered kernel event handler");
            return handler;
        }
    }

    /// Removes `handler`.
    ///
    /// Fails with [`CoreError::UnregisteredHandler`] if it is not registered.
    pub fn unregister(&self, handler: &Arc<dyn KernelEventHandler>) -> CoreResult<()> {
        let removed = {
            let mut current = self.handlers.write();
            match current.iter().position(|h| same_handler(h, handler)) {
                Some(index) => {
                    let mut next: Vec<_> = current.iter().cloned().collect();
                    next.remove(index);
                    *current = Arc::new(next);
                    true
                }
                None => false,
            }
        };

        if removed {
            debug!(handler = %handler.name(), "unregistered kernel event handler");
            Ok(())
        } else {
            Err(CoreError::unregistered_handler(handler.name()))
        }
    }

    /// Returns the handlers in notification order.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Arc<dyn KernelEventHandler>>> {
        Arc::clone(&self.handlers.read())
    }

    /// Returns whether `handler` is registered.
    #[must_use]
    pub fn contains(&self, handler: &Arc<dyn KernelEventHandler>) -> bool {
        self.handlers.read().iter().any(|h| same_handler(h, handler))
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Returns whether no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls `before_shutdown` on every handler in order.
    ///
    /// A failing or panicking handler does not stop the others. Returns one
    /// `"<name>: <failure>"` entry per handler that failed.
    pub fn fire_before_shutdown(&self) -> Vec<String> {
        let mut failures = Vec::new();
        for handler in self.snapshot().iter() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.before_shutdown()));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(payload) => panic_message(payload.as_ref()),
            };
            let name = handler.name();
            warn!(handler = %name, error = %failure, "before-shutdown handler failed");
            failures.push(format!("{name}: {failure}"));
        }
        failures
    }

    /// Calls `kernel_panic` on every handler in order.
    pub fn fire_kernel_panic(&self, state: ErrorState) {
        for handler in self.snapshot().iter() {
            if panic::catch_unwind(AssertUnwindSafe(|| handler.kernel_panic(state))).is_err() {
                warn!(handler = %handler.name(), ?state, "kernel panic handler panicked");
            }
        }
    }
}

impl std::fmt::Debug for KernelEventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.snapshot().iter().map(|h| h.name()).collect();
        f.debug_struct("KernelEventHandlers")
            .field("handlers", &names)
            .finish()
    }
}

fn insertion_index(
    registered: &[Arc<dyn KernelEventHandler>],
    handler: &dyn KernelEventHandler,
) -> usize {
    for (index, other) in registered.iter().enumerate() {
        match handler.order_compared_to(other.as_ref()) {
            ExecutionOrder::Before => return index,
            ExecutionOrder::After => return index + 1,
            ExecutionOrder::DoesNotMatter => {}
        }
    }
    registered.len()
}

/// Fires kernel panic events on the shared handler registry.
#[derive(Clone, Debug)]
pub struct KernelPanicEventGenerator {
    handlers: Arc<KernelEventHandlers>,
}

impl KernelPanicEventGenerator {
    /// Creates a generator firing on `handlers`.
    #[must_use]
    pub fn new(handlers: Arc<KernelEventHandlers>) -> Self {
        Self { handlers }
    }

    /// Notifies every registered handler of `state`.
    pub fn generate_event(&self, state: ErrorState) {
        error!(?state, "kernel panic");
        self.handlers.fire_kernel_panic(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use proptest::prelude::*;

    struct Named {
        name: String,
        before: Vec<String>,
        after: Vec<String>,
        fail: bool,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Named {
        fn new(name: &str, calls: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name: name.to_string(),
                before: Vec::new(),
                after: Vec::new(),
                fail: false,
                calls: Arc::clone(calls),
            }
        }

        fn before(mut self, other: &str) -> Self {
            self.before.push(other.to_string());
            self
        }

        fn after(mut self, other: &str) -> Self {
            self.after.push(other.to_string());
            self
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }
    }

    impl KernelEventHandler for Named {
        fn before_shutdown(&self) -> CoreResult<()> {
            self.calls.lock().push(self.name.clone());
            if self.fail {
                Err(CoreError::handler_failed("refused"))
            } else {
                Ok(())
            }
        }

        fn kernel_panic(&self, _error: ErrorState) {
            self.calls.lock().push(format!("panic:{}", self.name));
        }

        fn order_compared_to(&self, other: &dyn KernelEventHandler) -> ExecutionOrder {
            let other = other.name();
            if self.before.contains(&other) {
                ExecutionOrder::Before
            } else if self.after.contains(&other) {
                ExecutionOrder::After
            } else {
                ExecutionOrder::DoesNotMatter
            }
        }

        fn name(&self) -> String {
            self.name.clone()
        }
    }

    fn names(registry: &KernelEventHandlers) -> Vec<String> {
        registry.snapshot().iter().map(|h| h.name()).collect()
    }

    fn calls() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn register_twice_returns_existing() {
        let log = calls();
        let registry = KernelEventHandlers::new();
        let a: Arc<dyn KernelEventHandler> = Arc::new(Named::new("a", &log));

        let first = registry.register(Arc::clone(&a));
        let second = registry.register(Arc::clone(&a));

        assert_eq!(registry.len(), 1);
        assert!(same_handler(&first, &second));
    }

    #[test]
    fn before_preference_wins_in_either_registration_order() {
        let log = calls();

        let registry = KernelEventHandlers::new();
        registry.register(Arc::new(Named::new("b", &log)));
        registry.register(Arc::new(Named::new("a", &log).before("b")));
        assert_eq!(names(&registry), ["a", "b"]);

        let registry = KernelEventHandlers::new();
        registry.register(Arc::new(Named::new("a", &log).before("b")));
        registry.register(Arc::new(Named::new("b", &log)));
        assert_eq!(names(&registry), ["a", "b"]);
    }

    #[test]
    fn after_preference_inserts_behind_first_match() {
        let log = calls();
        let registry = KernelEventHandlers::new();
        registry.register(Arc::new(Named::new("x", &log)));
        registry.register(Arc::new(Named::new("y", &log)));
        registry.register(Arc::new(Named::new("z", &log)));
        registry.register(Arc::new(Named::new("n", &log).after("x").after("z")));

        assert_eq!(names(&registry), ["x", "n", "y", "z"]);
    }

    #[test]
    fn first_preference_in_scan_order_wins() {
        let log = calls();
        let registry = KernelEventHandlers::new();
        registry.register(Arc::new(Named::new("x", &log)));
        registry.register(Arc::new(Named::new("y", &log)));
        registry.register(Arc::new(Named::new("n", &log).after("x").before("y")));
        assert_eq!(names(&registry), ["x", "n", "y"]);

        let registry = KernelEventHandlers::new();
        registry.register(Arc::new(Named::new("x", &log)));
        registry.register(Arc::new(Named::new("y", &log)));
        registry.register(Arc::new(Named::new("n", &log).after("y").before("x")));
        assert_eq!(names(&registry), ["n", "x", "y"]);
    }

    #[test]
    fn pairwise_scan_ignores_preferences_of_earlier_handlers() {
        let log = calls();
        let registry = KernelEventHandlers::new();
        registry.register(Arc::new(Named::new("a", &log).after("b")));
        registry.register(Arc::new(Named::new("b", &log)));

        // `a` only expressed its preference when it was inserted.
        assert_eq!(names(&registry), ["a", "b"]);
    }

    #[test]
    fn unregister_unknown_fails_and_leaves_registry() {
        let log = calls();
        let registry = KernelEventHandlers::new();
        registry.register(Arc::new(Named::new("a", &log)));
        let stranger: Arc<dyn KernelEventHandler> = Arc::new(Named::new("stranger", &log));

        let err = registry.unregister(&stranger).unwrap_err();
        assert!(matches!(
            err,
            CoreError::UnregisteredHandler { ref handler } if handler == "stranger"
        ));
        assert_eq!(names(&registry), ["a"]);
    }

    #[test]
    fn unregister_removes_handler() {
        let log = calls();
        let registry = KernelEventHandlers::new();
        let a: Arc<dyn KernelEventHandler> = Arc::new(Named::new("a", &log));
        registry.register(Arc::clone(&a));

        registry.unregister(&a).unwrap();
        assert!(registry.is_empty());
        assert!(!registry.contains(&a));
        assert!(registry.unregister(&a).is_err());
    }

    #[test]
    fn before_shutdown_failures_are_isolated() {
        let log = calls();
        let registry = KernelEventHandlers::new();
        registry.register(Arc::new(Named::new("a", &log).failing()));
        registry.register(Arc::new(Named::new("b", &log)));
        registry.register(Arc::new(Named::new("c", &log).failing()));

        let failures = registry.fire_before_shutdown();

        assert_eq!(*log.lock(), ["a", "b", "c"]);
        assert_eq!(failures.len(), 2);
        assert!(failures[0].starts_with("a: "));
        assert!(failures[1].starts_with("c: "));
    }

    #[test]
    fn panicking_handler_is_reported_as_failure() {
        struct Panics;
        impl KernelEventHandler for Panics {
            fn before_shutdown(&self) -> CoreResult<()> {
                panic!("handler blew up");
            }
            fn kernel_panic(&self, _error: ErrorState) {}
        }

        let log = calls();
        let registry = KernelEventHandlers::new();
        registry.register(Arc::new(Panics));
        registry.register(Arc::new(Named::new("after", &log)));

        let failures = registry.fire_before_shutdown();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("handler blew up"));
        assert_eq!(*log.lock(), ["after"]);
    }

    #[test]
    fn panic_generator_notifies_in_order() {
        let log = calls();
        let registry = Arc::new(KernelEventHandlers::new());
        registry.register(Arc::new(Named::new("b", &log)));
        registry.register(Arc::new(Named::new("a", &log).before("b")));

        KernelPanicEventGenerator::new(Arc::clone(&registry))
            .generate_event(ErrorState::TxManagerNotOk);

        assert_eq!(*log.lock(), ["panic:a", "panic:b"]);
    }

    #[test]
    fn snapshot_is_unaffected_by_later_registration() {
        let log = calls();
        let registry = KernelEventHandlers::new();
        registry.register(Arc::new(Named::new("a", &log)));
        let snapshot = registry.snapshot();
        registry.register(Arc::new(Named::new("b", &log)));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(), 2);
    }

    proptest! {
        #[test]
        fn registering_without_preferences_keeps_registration_order(count in 1usize..12) {
            let log = calls();
            let registry = KernelEventHandlers::new();
            let expected: Vec<String> = (0..count).map(|i| format!("h{i}")).collect();
            for name in &expected {
                registry.register(Arc::new(Named::new(name, &log)));
            }
            prop_assert_eq!(names(&registry), expected);
        }

        #[test]
        fn before_target_always_precedes(
            others in 0usize..8,
            target_at in 0usize..8,
        ) {
            let log = calls();
            let registry = KernelEventHandlers::new();
            let target_at = target_at.min(others);
            for i in 0..=others {
                let name = if i == target_at { "target".to_string() } else { format!("h{i}") };
                registry.register(Arc::new(Named::new(&name, &log)));
            }
            registry.register(Arc::new(Named::new("eager", &log).before("target")));

            let order = names(&registry);
            let eager = order.iter().position(|n| n == "eager").unwrap();
            let target = order.iter().position(|n| n == "target").unwrap();
            prop_assert_eq!(eager + 1, target);
            prop_assert_eq!(order.len(), others + 2);
        }
    }
}
