//! Kernel assembly and lifecycle.
//!
//! Startup resolves the transaction module, builds the lock manager, lock
//! releaser and tx-id generator from it, assembles the [`Subsystems`]
//! aggregate, starts storage and runs the first two extension phases. A
//! failure at any step unwinds everything done so far.

mod data;
mod instance;
mod subsystems;

pub use data::KernelData;
pub use instance::{
    Collaborators, KernelInstance, KernelServices, LifecycleState, RunningKernel, StartupPhase,
};
pub use subsystems::{Subsystems, TxModule};

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::Config;
    use crate::extension::ExtensionLoader;
    use crate::logging::MessageLog;
    use embergraph_storage::MemorySink;
    use std::sync::Arc;

    /// A started in-memory kernel's extension view.
    pub(crate) fn kernel_data() -> Arc<KernelData> {
        kernel_data_with(Config::default().param("a.setting", "1"))
    }

    /// Same as [`kernel_data`], configured by `config`.
    pub(crate) fn kernel_data_with(config: Config) -> Arc<KernelData> {
        let services = KernelServices::new(Arc::new(MessageLog::new(MemorySink::new())));
        let instance = KernelInstance::new(config, Collaborators::in_memory(), services);
        instance
            .start(&ExtensionLoader::new(Vec::new()))
            .expect("in-memory kernel starts");
        instance.running().expect("kernel running").kernel_data
    }
}
