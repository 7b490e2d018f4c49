//! Optional kernel capabilities contributed by extensions.

use crate::error::CoreResult;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Stable identifier of an optional capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CapabilityKey {
    /// Management beans.
    Management,
    /// Remote shell.
    RemoteShell,
}

/// Key string of the management capability.
pub const CAPABILITY_MANAGEMENT: &str = "kernel jmx";
/// Key string of the remote shell capability.
pub const CAPABILITY_REMOTE_SHELL: &str = "shell";

impl CapabilityKey {
    /// Stable string id.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Management => CAPABILITY_MANAGEMENT,
            Self::RemoteShell => CAPABILITY_REMOTE_SHELL,
        }
    }

    /// Parses a stable string id.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            CAPABILITY_MANAGEMENT => Some(Self::Management),
            CAPABILITY_REMOTE_SHELL => Some(Self::RemoteShell),
            _ => None,
        }
    }
}

impl fmt::Display for CapabilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named set of management attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementBean {
    name: String,
    attributes: BTreeMap<String, String>,
}

impl ManagementBean {
    /// Creates a bean without attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns the bean name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns an attribute value.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Returns all attributes.
    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }
}

/// Exposes management beans.
pub trait ManagementCapability: Send + Sync {
    /// Returns the bean named `name`.
    fn bean(&self, name: &str) -> Option<ManagementBean>;

    /// Returns the names of all beans.
    fn bean_names(&self) -> Vec<String>;
}

/// Starts a remote shell.
pub trait RemoteShellCapability: Send + Sync {
    /// Enables the shell with `params`.
    fn enable(&self, params: &BTreeMap<String, String>) -> CoreResult<()>;
}

/// A capability advertised by an extension.
#[derive(Clone)]
pub enum Capability {
    /// Management beans.
    Management(Arc<dyn ManagementCapability>),
    /// Remote shell.
    RemoteShell(Arc<dyn RemoteShellCapability>),
}

impl Capability {
    /// Returns the stable key of this capability.
    #[must_use]
    pub fn key(&self) -> CapabilityKey {
        match self {
            Self::Management(_) => CapabilityKey::Management,
            Self::RemoteShell(_) => CapabilityKey::RemoteShell,
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Capability").field(&self.key()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_round_trip_through_stable_ids() {
        for key in [CapabilityKey::Management, CapabilityKey::RemoteShell] {
            assert_eq!(CapabilityKey::parse(key.as_str()), Some(key));
        }
        assert_eq!(CapabilityKey::Management.to_string(), "kernel jmx");
        assert_eq!(CapabilityKey::parse("udc"), None);
    }

    #[test]
    fn bean_attributes() {
        let bean = ManagementBean::new("Kernel").with_attribute("ReadOnly", "false");
        assert_eq!(bean.name(), "Kernel");
        assert_eq!(bean.attribute("ReadOnly"), Some("false"));
        assert_eq!(bean.attribute("missing"), None);
    }
}
