//! One-shot TCP_NODELAY from the external store
//!
//! The store is asked at most once per process. Whatever the outcome, the
//! gate stays closed afterwards.

use std::ffi::c_void;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};

use libc::{c_int, socklen_t};
use nix::errno::Errno;
use tracing::{debug, info, warn};

use crate::ffi::ErrnoGuard;
use crate::store::ValueStore;
use crate::table::SetsockoptFn;

/// Store key holding the TCP_NODELAY value
pub const NO_DELAY_KEY: &str = "tcp-no-delay";

/// Gate around the single store lookup and its application
pub struct NoDelayOnce {
	store: Box<dyn ValueStore>,
	key: String,
	attempted: AtomicBool,
}

impl std::fmt::Debug for NoDelayOnce {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("NoDelayOnce")
			.field("store", &self.store.name())
			.field("key", &self.key)
			.field("attempted", &self.attempted.load(Ordering::Relaxed))
			.finish()
	}
}

impl NoDelayOnce {
	/// Create an unused gate that reads `key` from `store`
	pub fn new(store: Box<dyn ValueStore>, key: impl Into<String>) -> Self {
		Self {
			store,
			key: key.into(),
			attempted: AtomicBool::new(false),
		}
	}

	/// Whether the lookup has been attempted in this process
	pub fn attempted(&self) -> bool {
		self.attempted.load(Ordering::Acquire)
	}

	/// On the first call only, fetch the value and set it as TCP_NODELAY
	/// on `fd`. Returns whether the option was set.
	///
	/// Failures are logged and swallowed. The caller's errno is preserved.
	///
	/// # Safety
	///
	/// `setsockopt` must be the original implementation.
	pub unsafe fn apply_once(&self, fd: RawFd, setsockopt: SetsockoptFn) -> bool {
		if self
			.attempted
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.is_err()
		{
			return false;
		}

		let _errno = ErrnoGuard::save();

		let value = match self.store.get(&self.key) {
			Ok(Some(value)) => value,
			Ok(None) => {
				debug!("No {} value in the store", self.key);
				return false;
			},
			Err(err) => {
				warn!("setsockopt: could not load {}: {err}", self.key);
				return false;
			},
		};

		let Ok(value) = c_int::try_from(value) else {
			warn!("setsockopt: ignoring out of range {} value {value}", self.key);
			return false;
		};
		if value < 0 {
			debug!("Ignoring negative {} value {value}", self.key);
			return false;
		}

		info!("setsockopt: TCP_NODELAY => {value}");
		let rc = unsafe {
			setsockopt(
				fd,
				libc::IPPROTO_TCP,
				libc::TCP_NODELAY,
				(&raw const value).cast::<c_void>(),
				std::mem::size_of::<c_int>() as socklen_t,
			)
		};
		if rc < 0 {
			warn!("setsockopt: TCP_NODELAY error {}!", Errno::last());
			return false;
		}

		true
	}
}
