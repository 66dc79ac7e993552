//! Differential contract checking between a golden and a candidate backend.
//!
//! - [`diff`]: structural and schema comparison of JSON values
//! - [`probe`]: JSON-over-HTTP requests against one target
//! - [`capture`]: optional on-disk recording of every probe exchange

pub mod capture;
pub mod diff;
pub mod probe;

pub use diff::{assert_same_schema, assert_same_shape, JsonPath, JsonType, Mismatch, ToleranceSet};
pub use probe::{HttpResponse, Probe, ProbeError};
