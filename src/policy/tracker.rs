//! Per-socket bookkeeping for the multipath trigger

use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
	Configuring,
	Configured,
}

/// Remembers which socket handles already had the multipath configuration
/// attempted.
///
/// Handles are reused by the kernel, so a handle is forgotten when it is
/// closed or handed out again by `socket` or `accept`. While one thread is
/// configuring a handle, other threads claiming it wait until it is done.
#[derive(Debug, Default)]
pub struct SocketTracker {
	claimed: Mutex<HashMap<RawFd, Progress>>,
	settled: Condvar,
}

/// Exclusive right to configure one handle
///
/// The handle counts as configured once this is dropped, whether or not
/// the configuration succeeded.
#[derive(Debug)]
#[must_use = "the handle is settled as soon as the claim is dropped"]
pub struct Claim<'a> {
	tracker: &'a SocketTracker,
	fd: RawFd,
}

impl SocketTracker {
	/// Create an empty tracker
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	fn lock(&self) -> MutexGuard<'_, HashMap<RawFd, Progress>> {
		self.claimed.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Claim `fd`; `Some` only for the first claim since it was last
	/// forgotten
	///
	/// Blocks while another thread holds the claim on `fd`.
	pub fn claim(&self, fd: RawFd) -> Option<Claim<'_>> {
		let mut claimed = self.lock();
		loop {
			match claimed.get(&fd) {
				None => {
					claimed.insert(fd, Progress::Configuring);
					return Some(Claim { tracker: self, fd });
				},
				Some(Progress::Configured) => return None,
				Some(Progress::Configuring) => {
					claimed = self.settled.wait(claimed).unwrap_or_else(PoisonError::into_inner);
				},
			}
		}
	}

	/// Forget `fd`, so its next claim succeeds again
	pub fn forget(&self, fd: RawFd) {
		self.lock().remove(&fd);
		self.settled.notify_all();
	}

	/// Whether `fd` is currently claimed
	pub fn is_claimed(&self, fd: RawFd) -> bool {
		self.lock().contains_key(&fd)
	}

	fn settle(&self, fd: RawFd) {
		if let Some(progress) = self.lock().get_mut(&fd) {
			*progress = Progress::Configured;
		}
		self.settled.notify_all();
	}
}

impl Drop for Claim<'_> {
	fn drop(&mut self) {
		self.tracker.settle(self.fd);
	}
}
