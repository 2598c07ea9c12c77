//! Logging utilities for mptcp-shim
//!
//! All diagnostics go to stderr; the host's stdout is never written.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Full `EnvFilter` directive for the shim's own events
pub const LOG_ENV: &str = "MPTCP_SHIM_LOG";

/// Switches the shim's events to debug level when set
pub const DEBUG_ENV: &str = "MPTCP_SHIM_DEBUG";

// Initialize logging once
static INIT: Once = Once::new();

/// Initialize the tracing system
///
/// This function sets up tracing with an `EnvFilter` that:
/// - Honors the `MPTCP_SHIM_LOG` environment variable if set
/// - Uses the `MPTCP_SHIM_DEBUG` environment variable to enable debug output
/// - Logs notable actions (info) and failures by default
///
/// The host's own `RUST_LOG` is not consulted. If a global
/// subscriber is already installed it is left in place.
pub fn init_logging() {
	INIT.call_once(|| {
		let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directives()));

		let _ = tracing_subscriber::registry()
			.with(fmt::layer().with_target(true).with_writer(std::io::stderr))
			.with(filter)
			.try_init();
	});
}

fn default_directives() -> &'static str {
	if std::env::var_os(DEBUG_ENV).is_some() {
		"mptcp_shim=debug,mptcp_preload=debug"
	} else {
		"mptcp_shim=info,mptcp_preload=info"
	}
}
