//! # Writebehind Testkit
//!
//! Test utilities for writebehind.
//!
//! This crate provides:
//! - Scriptable sinks: recording, failing, flaky and panicking
//! - A capturing log sink for asserting on flush-path reports
//! - Fixtures: an `Event` record type, temporary backup spools, polling helpers
//! - Property-based test generators using proptest
//! - Concurrent producer stress helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use writebehind_testkit::prelude::*;
//!
//! #[test]
//! fn flushes_to_primary() {
//!     let primary = RecordingSink::new();
//!     let buffer = WriteBuffer::new(primary.clone(), FailingSink::new("down"), quiet_config().0);
//!     buffer.add(Event::new(1, "login"));
//!     buffer.stop().unwrap();
//!     assert_eq!(primary.record_count(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod capture;
pub mod fixtures;
pub mod generators;
pub mod sinks;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::capture::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::sinks::*;
    pub use crate::stress::*;
    pub use writebehind_core::{BufferConfig, BufferState, WriteBuffer};
}

pub use capture::*;
pub use fixtures::*;
pub use generators::*;
pub use sinks::*;
pub use stress::*;
