//! Multipath TCP configuration
//!
//! A fixed, ordered list of options that turns on the multipath extension
//! for a TCP socket and selects its path manager and scheduler.

use std::ffi::{CStr, c_void};

use libc::{c_int, socklen_t};
use nix::errno::Errno;
use tracing::debug;

use crate::ffi::{MPTCP_ENABLED, MPTCP_INFO, MPTCP_INFO_FLAG_SAVE_MASTER, MPTCP_PATH_MANAGER, MPTCP_SCHEDULER};
use crate::interposer::{InterposerError, Result};
use crate::table::SetsockoptFn;

/// Value passed for one configuration entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionValue {
	/// An `int` option
	Int(c_int),
	/// A name, passed with its terminating NUL
	Name(&'static CStr),
}

/// One `(option, value)` pair of the multipath configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultipathEntry {
	/// Option name, for diagnostics
	pub name: &'static str,
	/// Option identifier at the `IPPROTO_TCP` level
	pub option: c_int,
	/// Value to set
	pub value: OptionValue,
}

/// The multipath configuration, in application order
pub const MULTIPATH_CONFIG: [MultipathEntry; 4] = [
	MultipathEntry {
		name: "MPTCP_ENABLED",
		option: MPTCP_ENABLED,
		value: OptionValue::Int(1),
	},
	MultipathEntry {
		name: "MPTCP_PATH_MANAGER",
		option: MPTCP_PATH_MANAGER,
		value: OptionValue::Name(c"fullmesh"),
	},
	MultipathEntry {
		name: "MPTCP_SCHEDULER",
		option: MPTCP_SCHEDULER,
		value: OptionValue::Name(c"default"),
	},
	MultipathEntry {
		name: "MPTCP_INFO",
		option: MPTCP_INFO,
		value: OptionValue::Int(MPTCP_INFO_FLAG_SAVE_MASTER),
	},
];

/// Applies [`MULTIPATH_CONFIG`] to a socket
#[derive(Debug, Clone)]
pub struct MultipathPolicy {
	entries: &'static [MultipathEntry],
}

impl Default for MultipathPolicy {
	fn default() -> Self {
		Self::new()
	}
}

impl MultipathPolicy {
	/// Create a policy applying the standard configuration
	#[must_use]
	pub const fn new() -> Self {
		Self {
			entries: &MULTIPATH_CONFIG,
		}
	}

	/// The entries this policy applies, in order
	#[must_use]
	pub const fn entries(&self) -> &'static [MultipathEntry] {
		self.entries
	}

	/// Whether a call at `level` on `fd` is one this policy configures
	#[must_use]
	pub const fn applies_to(fd: c_int, level: c_int) -> bool {
		fd > 0 && level == libc::IPPROTO_TCP
	}

	/// Set every entry on `fd` through `setsockopt`
	///
	/// Stops at the first rejected entry; the remaining entries are not
	/// attempted. Returns the last entry's result when all succeed, and 0
	/// without touching the socket when [`Self::applies_to`] is false.
	///
	/// # Safety
	///
	/// `setsockopt` must be the original implementation.
	pub unsafe fn apply(&self, fd: c_int, level: c_int, setsockopt: SetsockoptFn) -> Result<c_int> {
		if !Self::applies_to(fd, level) {
			return Ok(0);
		}

		let mut rc = 0;
		for entry in self.entries {
			rc = unsafe { entry.set(fd, level, setsockopt) };
			if rc < 0 {
				return Err(InterposerError::MultipathOption {
					option: entry.name,
					code: rc,
					errno: Errno::last(),
				});
			}
		}

		debug!("Multipath configuration applied to socket {fd}");
		Ok(rc)
	}
}

impl MultipathEntry {
	unsafe fn set(&self, fd: c_int, level: c_int, setsockopt: SetsockoptFn) -> c_int {
		match self.value {
			OptionValue::Int(value) => unsafe {
				setsockopt(
					fd,
					level,
					self.option,
					(&raw const value).cast::<c_void>(),
					std::mem::size_of::<c_int>() as socklen_t,
				)
			},
			OptionValue::Name(name) => {
				let bytes = name.to_bytes_with_nul();
				unsafe {
					setsockopt(
						fd,
						level,
						self.option,
						bytes.as_ptr().cast::<c_void>(),
						bytes.len() as socklen_t,
					)
				}
			},
		}
	}
}
