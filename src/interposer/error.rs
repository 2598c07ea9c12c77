//! Error types for the interposer
//!
//! This module contains error types and a result type for the interposer.

use libc::c_int;
use nix::errno::Errno;
use thiserror::Error;

/// Result type for interposer operations
pub type Result<T> = std::result::Result<T, InterposerError>;

/// Error type for interposer operations
#[derive(Debug, Error)]
pub enum InterposerError {
	/// No original implementation could be found for an intercepted symbol
	#[error("{symbol}: dlsym failed: {reason}")]
	Resolve {
		/// The symbol that was looked up
		symbol: String,
		/// The dynamic linker's explanation
		reason: String,
	},

	/// One entry of the multipath configuration was rejected
	#[error("setsockopt: {option} error {errno}!")]
	MultipathOption {
		/// Name of the rejected option
		option: &'static str,
		/// Return value of the original `setsockopt`
		code: c_int,
		/// errno left by the failed call
		errno: Errno,
	},
}

impl InterposerError {
	/// The value handed back to the caller in place of its own call's result
	#[must_use]
	pub const fn return_code(&self) -> c_int {
		match self {
			Self::Resolve { .. } => -1,
			Self::MultipathOption { code, .. } => *code,
		}
	}
}
