//! Golden-vs-candidate contract runner.
//!
//! Seeds both databases, then drives every selected case against the golden and the
//! candidate backend and reports PASS/FAIL per case.

pub mod cases;
pub mod config;
pub mod paths;
pub mod registry;
pub mod seed;
