//! Utility modules for mptcp-shim
//!
//! This module contains utility functions used by mptcp-shim.

pub mod logging;

pub use logging::init_logging;
