//! Kernel configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Parameter key selecting read-only mode.
pub const READ_ONLY: &str = "read_only";

/// Parameter key naming the transaction manager implementation.
pub const TX_MANAGER_IMPLEMENTATION: &str = "tx_manager_impl";

/// Name of the built-in transaction manager.
pub const NATIVE_TX_MANAGER: &str = "native";

const MESSAGE_LOG_FILE: &str = "messages.log";

/// Configuration for opening a kernel.
#[derive(Debug, Clone)]
pub struct Config {
    /// Store location. Passed through to collaborators; the kernel only
    /// places its message log there.
    pub store_dir: PathBuf,

    /// Whether the kernel forbids mutation.
    pub read_only: bool,

    /// Transaction manager implementation; `None` selects the native one.
    pub tx_manager_impl: Option<String>,

    /// Raw string parameters, handed to extensions as-is.
    pub params: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("graph.db"),
            read_only: false,
            tx_manager_impl: None,
            params: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a configuration from a raw parameter map.
    ///
    /// `read_only` is true only for a case-insensitive `"true"`.
    #[must_use]
    pub fn from_params(store_dir: impl Into<PathBuf>, params: BTreeMap<String, String>) -> Self {
        let mut config = Self::new().store_dir(store_dir);
        for (key, value) in &params {
            config.resolve(key, value);
        }
        config.params = params;
        config
    }

    fn resolve(&mut self, key: &str, value: &str) {
        match key {
            READ_ONLY => self.read_only = value.trim().eq_ignore_ascii_case("true"),
            TX_MANAGER_IMPLEMENTATION => {
                let name = value.trim();
                self.tx_manager_impl = (!name.is_empty()).then(|| name.to_string());
            }
            _ => {}
        }
    }

    /// Sets the store location.
    #[must_use]
    pub fn store_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_dir = path.into();
        self
    }

    /// Sets read-only mode.
    #[must_use]
    pub const fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Selects a transaction manager implementation by name.
    #[must_use]
    pub fn tx_manager_impl(mut self, name: impl Into<String>) -> Self {
        self.tx_manager_impl = Some(name.into());
        self
    }

    /// Adds a raw parameter.
    ///
    /// [`READ_ONLY`] and [`TX_MANAGER_IMPLEMENTATION`] are interpreted the
    /// same way [`from_params`](Self::from_params) interprets them.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let (key, value) = (key.into(), value.into());
        self.resolve(&key, &value);
        self.params.insert(key, value);
        self
    }

    /// Returns the name of the selected transaction manager.
    #[must_use]
    pub fn tx_manager_name(&self) -> &str {
        self.tx_manager_impl.as_deref().unwrap_or(NATIVE_TX_MANAGER)
    }

    /// Returns the location of the persistent message log.
    #[must_use]
    pub fn message_log_path(&self) -> PathBuf {
        self.store_dir.join(MESSAGE_LOG_FILE)
    }

    /// Returns the store location.
    #[must_use]
    pub fn store_path(&self) -> &Path {
        &self.store_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(!config.read_only);
        assert_eq!(config.tx_manager_name(), NATIVE_TX_MANAGER);
        assert!(config.params.is_empty());
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .store_dir("/tmp/graph")
            .read_only(true)
            .tx_manager_impl("custom")
            .param("shell.port", "1337");

        assert!(config.read_only);
        assert_eq!(config.tx_manager_name(), "custom");
        assert_eq!(config.params.get("shell.port").map(String::as_str), Some("1337"));
        assert_eq!(
            config.message_log_path(),
            PathBuf::from("/tmp/graph/messages.log")
        );
    }

    #[test]
    fn from_params_resolves_well_known_keys() {
        let mut params = BTreeMap::new();
        params.insert(READ_ONLY.to_string(), "TRUE".to_string());
        params.insert(TX_MANAGER_IMPLEMENTATION.to_string(), " custom ".to_string());

        let config = Config::from_params("db", params);
        assert!(config.read_only);
        assert_eq!(config.tx_manager_name(), "custom");
        assert_eq!(config.params.len(), 2);
    }

    #[test]
    fn param_resolves_like_from_params() {
        let built = Config::new()
            .store_dir("db")
            .param(READ_ONLY, "true")
            .param(TX_MANAGER_IMPLEMENTATION, "custom");

        let mut params = BTreeMap::new();
        params.insert(READ_ONLY.to_string(), "true".to_string());
        params.insert(TX_MANAGER_IMPLEMENTATION.to_string(), "custom".to_string());
        let parsed = Config::from_params("db", params);

        assert_eq!(built.read_only, parsed.read_only);
        assert_eq!(built.tx_manager_name(), parsed.tx_manager_name());
        assert_eq!(built.params, parsed.params);

        let reset = built.param(READ_ONLY, "false").param(TX_MANAGER_IMPLEMENTATION, "");
        assert!(!reset.read_only);
        assert_eq!(reset.tx_manager_name(), NATIVE_TX_MANAGER);
    }

    #[test]
    fn read_only_requires_literal_true() {
        for value in ["yes", "1", "", "truthy"] {
            let mut params = BTreeMap::new();
            params.insert(READ_ONLY.to_string(), value.to_string());
            assert!(!Config::from_params("db", params).read_only, "{value}");
        }
    }

    #[test]
    fn blank_tx_manager_falls_back_to_native() {
        let mut params = BTreeMap::new();
        params.insert(TX_MANAGER_IMPLEMENTATION.to_string(), "  ".to_string());
        let config = Config::from_params("db", params);
        assert_eq!(config.tx_manager_name(), NATIVE_TX_MANAGER);
    }
}
