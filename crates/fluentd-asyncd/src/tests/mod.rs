//! Test suites for the plugin daemon.

pub(crate) mod support;
