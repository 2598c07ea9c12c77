//! Interposer functionality
//!
//! This module contains the process-scoped [`Interposer`] context. It holds
//! the table of original implementations and the tuning policies, and
//! provides one method per intercepted operation with the same arguments
//! as the C function it stands in for.

mod builder;
mod error;

pub use builder::{InterposerBuilder, InterposerConfig, STORE_SOCKET_ENV};
pub use error::{InterposerError, Result};

use std::ffi::c_void;

use libc::{c_int, size_t, sockaddr, socklen_t, ssize_t};
use tracing::error;

use crate::ffi::{self, ErrnoGuard};
use crate::policy::{MultipathPolicy, NoDelayOnce, SocketTracker};
use crate::resolver::SymbolResolver;
use crate::table::OperationTable;

/// Process-scoped interposition context
///
/// Built once with [`InterposerBuilder`]. Every method forwards to the
/// original implementation with the caller's arguments and hands back its
/// result untouched; errno is whatever the original left. Only `setsockopt`
/// adds calls of its own.
pub struct Interposer {
	pub(crate) config: InterposerConfig,
	pub(crate) table: OperationTable,
	pub(crate) resolver: Box<dyn SymbolResolver>,
	pub(crate) multipath: Option<MultipathPolicy>,
	pub(crate) sockets: SocketTracker,
	pub(crate) nodelay: Option<NoDelayOnce>,
}

impl std::fmt::Debug for Interposer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Interposer")
			.field("config", &self.config)
			.field("table", &self.table)
			.field("resolver", &self.resolver.name())
			.field("sockets", &self.sockets)
			.field("nodelay", &self.nodelay)
			.finish()
	}
}

impl Interposer {
	/// Get the interposer configuration
	#[must_use]
	pub const fn config(&self) -> &InterposerConfig {
		&self.config
	}

	/// Get the table of original implementations
	#[must_use]
	pub const fn table(&self) -> &OperationTable {
		&self.table
	}

	/// Get the multipath bookkeeping
	#[must_use]
	pub const fn sockets(&self) -> &SocketTracker {
		&self.sockets
	}

	/// Whether the one-shot store lookup has happened in this process
	#[must_use]
	pub fn nodelay_attempted(&self) -> bool {
		self.nodelay.as_ref().is_some_and(NoDelayOnce::attempted)
	}

	/// Fetch an original implementation, terminating the process if it
	/// cannot be resolved
	fn original<F>(&self, lookup: impl FnOnce(&OperationTable, &dyn SymbolResolver) -> Result<F>) -> F {
		match lookup(&self.table, self.resolver.as_ref()) {
			Ok(original) => original,
			Err(err) => ffi::die(&err.to_string()),
		}
	}

	/// Intercepted `socket`
	///
	/// # Safety
	///
	/// Same contract as `socket(2)`.
	pub unsafe fn socket(&self, domain: c_int, ty: c_int, protocol: c_int) -> c_int {
		let original = self.original(OperationTable::socket);
		let fd = unsafe { original(domain, ty, protocol) };
		if fd >= 0 {
			self.sockets.forget(fd);
		}
		fd
	}

	/// Intercepted `setsockopt`
	///
	/// For the first `IPPROTO_TCP` level call in the process, the store's
	/// TCP_NODELAY value is set first. For the first `IPPROTO_TCP` level call
	/// on a socket, the multipath configuration is set next; if one of its
	/// entries fails, that failure is returned and the caller's option is not
	/// set. Otherwise the caller's option is forwarded as given.
	///
	/// # Safety
	///
	/// Same contract as `setsockopt(2)`.
	pub unsafe fn setsockopt(
		&self,
		sockfd: c_int,
		level: c_int,
		optname: c_int,
		optval: *const c_void,
		optlen: socklen_t,
	) -> c_int {
		let original = self.original(OperationTable::setsockopt);

		if level == libc::IPPROTO_TCP {
			if let Some(nodelay) = &self.nodelay {
				unsafe { nodelay.apply_once(sockfd, original) };
			}

			if let Some(multipath) = &self.multipath {
				if MultipathPolicy::applies_to(sockfd, level) {
					if let Some(_claim) = self.sockets.claim(sockfd) {
						if let Err(err) = unsafe { multipath.apply(sockfd, level, original) } {
							let _errno = ErrnoGuard::save();
							error!("{err}");
							return err.return_code();
						}
					}
				}
			}
		}

		unsafe { original(sockfd, level, optname, optval, optlen) }
	}

	/// Intercepted `bind`
	///
	/// # Safety
	///
	/// Same contract as `bind(2)`.
	pub unsafe fn bind(&self, sockfd: c_int, addr: *const sockaddr, len: socklen_t) -> c_int {
		let original = self.original(OperationTable::bind);
		unsafe { original(sockfd, addr, len) }
	}

	/// Intercepted `listen`
	///
	/// # Safety
	///
	/// Same contract as `listen(2)`.
	pub unsafe fn listen(&self, sockfd: c_int, backlog: c_int) -> c_int {
		let original = self.original(OperationTable::listen);
		unsafe { original(sockfd, backlog) }
	}

	/// Intercepted `accept`
	///
	/// # Safety
	///
	/// Same contract as `accept(2)`.
	pub unsafe fn accept(&self, sockfd: c_int, addr: *mut sockaddr, len: *mut socklen_t) -> c_int {
		let original = self.original(OperationTable::accept);
		let fd = unsafe { original(sockfd, addr, len) };
		if fd >= 0 {
			self.sockets.forget(fd);
		}
		fd
	}

	/// Intercepted `connect`
	///
	/// # Safety
	///
	/// Same contract as `connect(2)`.
	pub unsafe fn connect(&self, sockfd: c_int, addr: *const sockaddr, len: socklen_t) -> c_int {
		let original = self.original(OperationTable::connect);
		unsafe { original(sockfd, addr, len) }
	}

	/// Intercepted `close`
	///
	/// # Safety
	///
	/// Same contract as `close(2)`.
	pub unsafe fn close(&self, fd: c_int) -> c_int {
		let original = self.original(OperationTable::close);
		// Forget first: once closed, the handle may be handed out again
		self.sockets.forget(fd);
		unsafe { original(fd) }
	}

	// read and write must not log: the subscriber writes to stderr through
	// the intercepted `write`.

	/// Intercepted `read`
	///
	/// # Safety
	///
	/// Same contract as `read(2)`.
	pub unsafe fn read(&self, fd: c_int, buf: *mut c_void, count: size_t) -> ssize_t {
		let original = self.original(OperationTable::read);
		unsafe { original(fd, buf, count) }
	}

	/// Intercepted `write`
	///
	/// # Safety
	///
	/// Same contract as `write(2)`.
	pub unsafe fn write(&self, fd: c_int, buf: *const c_void, count: size_t) -> ssize_t {
		let original = self.original(OperationTable::write);
		unsafe { original(fd, buf, count) }
	}
}
