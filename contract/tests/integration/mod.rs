//! Probe and capture tests against wiremock backends.

pub mod test_probe;
