//! Operation table
//!
//! One slot per intercepted operation. A slot is filled the first time its
//! operation is used and never changes afterwards.

use std::ffi::c_void;
use std::ptr::NonNull;

use libc::{c_int, size_t, sockaddr, socklen_t, ssize_t};
use mptcp_shim_macros::operation_table;
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::interposer::Result;
use crate::resolver::SymbolResolver;

operation_table! {
	/// Original `socket`
	fn socket(domain: c_int, ty: c_int, protocol: c_int) -> c_int;
	/// Original `setsockopt`
	fn setsockopt(
		sockfd: c_int,
		level: c_int,
		optname: c_int,
		optval: *const c_void,
		optlen: socklen_t,
	) -> c_int;
	/// Original `bind`
	fn bind(sockfd: c_int, addr: *const sockaddr, len: socklen_t) -> c_int;
	/// Original `listen`
	fn listen(sockfd: c_int, backlog: c_int) -> c_int;
	/// Original `accept`
	fn accept(sockfd: c_int, addr: *mut sockaddr, len: *mut socklen_t) -> c_int;
	/// Original `connect`
	fn connect(sockfd: c_int, addr: *const sockaddr, len: socklen_t) -> c_int;
	/// Original `close`
	fn close(fd: c_int) -> c_int;
	/// Original `read`
	fn read(fd: c_int, buf: *mut c_void, count: size_t) -> ssize_t;
	/// Original `write`
	fn write(fd: c_int, buf: *const c_void, count: size_t) -> ssize_t;
}

impl Operation {
	/// Whether filling this operation's slot may emit a log event
	///
	/// The log writer goes through the intercepted `write`, and the standard
	/// error handle is still borrowed while that call resolves its slot.
	#[must_use]
	pub const fn reports_resolution(self) -> bool {
		!matches!(self, Self::Read | Self::Write)
	}
}

/// A lazily resolved original function pointer
///
/// Concurrent first callers block until the single resolution finishes and
/// then all read the same pointer. A failed resolution leaves the slot empty.
pub struct Slot<F> {
	operation: Operation,
	resolved: OnceCell<F>,
}

impl<F: Copy> Slot<F> {
	/// Create an empty slot for `operation`
	#[must_use]
	pub const fn new(operation: Operation) -> Self {
		Self {
			operation,
			resolved: OnceCell::new(),
		}
	}

	/// The operation this slot belongs to
	#[must_use]
	pub const fn operation(&self) -> Operation {
		self.operation
	}

	/// Whether the slot has been filled
	pub fn is_resolved(&self) -> bool {
		self.resolved.get().is_some()
	}

	/// Return the original, resolving it first if the slot is empty
	///
	/// # Safety
	///
	/// `F` must be a function pointer type whose signature matches the C
	/// symbol named by this slot's operation.
	pub unsafe fn get_or_resolve(&self, resolver: &dyn SymbolResolver) -> Result<F> {
		if let Some(original) = self.resolved.get() {
			return Ok(*original);
		}

		let mut fresh = None;
		let original = *self.resolved.get_or_try_init(|| -> Result<F> {
			// No logging in here: the subscriber writes through the intercepted
			// `write`, which may be the slot being filled.
			let address = resolver.resolve(self.operation.symbol())?;
			fresh = Some(address);
			Ok(unsafe { pointer_from_address::<F>(address) })
		})?;

		if let Some(address) = fresh {
			if self.operation.reports_resolution() {
				debug!("Loaded original {} => {:p}", self.operation, address);
			}
		}

		Ok(original)
	}
}

impl<F> std::fmt::Debug for Slot<F> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Slot")
			.field("operation", &self.operation)
			.field("resolved", &self.resolved.get().is_some())
			.finish()
	}
}

/// Reinterpret a symbol address as a function pointer
///
/// # Safety
///
/// `F` must be a function pointer type matching the code at `address`.
unsafe fn pointer_from_address<F: Copy>(address: NonNull<c_void>) -> F {
	assert_eq!(
		std::mem::size_of::<F>(),
		std::mem::size_of::<*mut c_void>(),
		"operation slots only hold function pointers"
	);
	let raw = address.as_ptr();
	unsafe { std::mem::transmute_copy::<*mut c_void, F>(&raw) }
}
