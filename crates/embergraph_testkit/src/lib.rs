//! # EmberGraph Testkit
//!
//! Test utilities for EmberGraph.
//!
//! This crate provides:
//! - Kernel fixtures with captured message logs
//! - Recording extensions and event handlers with failure injection
//! - Property-based test generators using proptest
//! - A harness checking lookups and scans against a model
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use embergraph_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_kernel() {
//!     with_kernel(|db| {
//!         db.transaction(|_| db.create_node()).unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod doubles;
pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::doubles::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
}

pub use doubles::*;
pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
