//! Fake originals for exercising the interposer in-process
//!
//! The fake C functions record every call in thread-local storage, so each
//! test thread sees only its own calls.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{CStr, c_void};
use std::io;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use libc::{c_int, size_t, sockaddr, socklen_t, ssize_t};
use mptcp_shim::ffi::set_errno;
use mptcp_shim::store::{StoreError, ValueStore};
use mptcp_shim::table::SetsockoptFn;
use mptcp_shim::{InterposerError, Result, SymbolResolver};

/// Handle returned by the fake `socket`
pub const FAKE_SOCKET_FD: c_int = 5;
/// Handle returned by the fake `accept`
pub const FAKE_ACCEPTED_FD: c_int = 6;

/// One call that reached a fake original
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
	Socket { domain: c_int, ty: c_int, protocol: c_int },
	Setsockopt { fd: c_int, level: c_int, optname: c_int, value: Vec<u8> },
	Bind { fd: c_int, addr: usize, len: socklen_t },
	Listen { fd: c_int, backlog: c_int },
	Accept { fd: c_int, addr: usize, len: usize },
	Connect { fd: c_int, addr: usize, len: socklen_t },
	Close { fd: c_int },
	Read { fd: c_int, buf: usize, count: size_t },
	Write { fd: c_int, buf: usize, count: size_t },
}

impl Call {
	/// A `setsockopt` call carrying an `int` value
	pub fn int_option(fd: c_int, level: c_int, optname: c_int, value: c_int) -> Self {
		Self::Setsockopt {
			fd,
			level,
			optname,
			value: value.to_ne_bytes().to_vec(),
		}
	}

	/// A `setsockopt` call carrying a NUL-terminated name
	pub fn name_option(fd: c_int, level: c_int, optname: c_int, name: &CStr) -> Self {
		Self::Setsockopt {
			fd,
			level,
			optname,
			value: name.to_bytes_with_nul().to_vec(),
		}
	}
}

#[derive(Debug, Clone, Copy)]
enum Failure {
	Operation(&'static str),
	Option(c_int),
}

thread_local! {
	static CALLS: RefCell<Vec<Call>> = const { RefCell::new(Vec::new()) };
	static FAILURES: RefCell<Vec<(Failure, c_int)>> = const { RefCell::new(Vec::new()) };
}

/// Take the calls recorded on this thread so far
pub fn take_calls() -> Vec<Call> {
	CALLS.with(|calls| std::mem::take(&mut *calls.borrow_mut()))
}

/// Make every call to the fake `operation` on this thread fail with `errno`
pub fn fail_operation(operation: &'static str, errno: c_int) {
	FAILURES.with(|failures| failures.borrow_mut().push((Failure::Operation(operation), errno)));
}

/// Make the fake `setsockopt` fail with `errno` for `optname` on this thread
pub fn fail_option(optname: c_int, errno: c_int) {
	FAILURES.with(|failures| failures.borrow_mut().push((Failure::Option(optname), errno)));
}

/// Forget recorded calls and configured failures on this thread
pub fn reset() {
	take_calls();
	FAILURES.with(|failures| failures.borrow_mut().clear());
}

fn record(call: Call) {
	CALLS.with(|calls| calls.borrow_mut().push(call));
}

fn injected_failure(operation: &'static str, optname: Option<c_int>) -> Option<c_int> {
	FAILURES.with(|failures| {
		failures.borrow().iter().find_map(|(failure, errno)| match failure {
			Failure::Operation(name) if *name == operation => Some(*errno),
			Failure::Option(option) if Some(*option) == optname => Some(*errno),
			_ => None,
		})
	})
}

fn finish(operation: &'static str, optname: Option<c_int>, success: c_int) -> c_int {
	match injected_failure(operation, optname) {
		Some(errno) => {
			set_errno(errno);
			-1
		},
		None => success,
	}
}

unsafe extern "C" fn fake_socket(domain: c_int, ty: c_int, protocol: c_int) -> c_int {
	record(Call::Socket { domain, ty, protocol });
	finish("socket", None, FAKE_SOCKET_FD)
}

unsafe extern "C" fn fake_setsockopt(
	fd: c_int,
	level: c_int,
	optname: c_int,
	optval: *const c_void,
	optlen: socklen_t,
) -> c_int {
	let value = if optval.is_null() {
		Vec::new()
	} else {
		unsafe { std::slice::from_raw_parts(optval.cast::<u8>(), optlen as usize) }.to_vec()
	};
	record(Call::Setsockopt {
		fd,
		level,
		optname,
		value,
	});
	finish("setsockopt", Some(optname), 0)
}

unsafe extern "C" fn fake_bind(fd: c_int, addr: *const sockaddr, len: socklen_t) -> c_int {
	record(Call::Bind {
		fd,
		addr: addr as usize,
		len,
	});
	finish("bind", None, 0)
}

unsafe extern "C" fn fake_listen(fd: c_int, backlog: c_int) -> c_int {
	record(Call::Listen { fd, backlog });
	finish("listen", None, 0)
}

unsafe extern "C" fn fake_accept(fd: c_int, addr: *mut sockaddr, len: *mut socklen_t) -> c_int {
	record(Call::Accept {
		fd,
		addr: addr as usize,
		len: len as usize,
	});
	finish("accept", None, FAKE_ACCEPTED_FD)
}

unsafe extern "C" fn fake_connect(fd: c_int, addr: *const sockaddr, len: socklen_t) -> c_int {
	record(Call::Connect {
		fd,
		addr: addr as usize,
		len,
	});
	finish("connect", None, 0)
}

unsafe extern "C" fn fake_close(fd: c_int) -> c_int {
	record(Call::Close { fd });
	finish("close", None, 0)
}

unsafe extern "C" fn fake_read(fd: c_int, buf: *mut c_void, count: size_t) -> ssize_t {
	record(Call::Read {
		fd,
		buf: buf as usize,
		count,
	});
	match injected_failure("read", None) {
		Some(errno) => {
			set_errno(errno);
			-1
		},
		None => count as ssize_t,
	}
}

unsafe extern "C" fn fake_write(fd: c_int, buf: *const c_void, count: size_t) -> ssize_t {
	record(Call::Write {
		fd,
		buf: buf as usize,
		count,
	});
	match injected_failure("write", None) {
		Some(errno) => {
			set_errno(errno);
			-1
		},
		None => count as ssize_t,
	}
}

/// The fake `setsockopt`, for driving the policies directly
pub fn fake_setsockopt_fn() -> SetsockoptFn {
	fake_setsockopt
}

/// Resolves every intercepted name to its fake and counts lookups
#[derive(Debug, Clone, Default)]
pub struct FakeResolver {
	resolutions: Arc<Mutex<HashMap<String, usize>>>,
	missing: Vec<&'static str>,
}

impl FakeResolver {
	pub fn new() -> Self {
		Self::default()
	}

	/// A resolver that cannot find `symbol`
	pub fn without(symbol: &'static str) -> Self {
		Self {
			missing: vec![symbol],
			..Self::default()
		}
	}

	/// How many times `symbol` was looked up
	pub fn resolutions(&self, symbol: &str) -> usize {
		self.resolutions.lock().unwrap().get(symbol).copied().unwrap_or(0)
	}

	/// Total lookups across all symbols
	pub fn total_resolutions(&self) -> usize {
		self.resolutions.lock().unwrap().values().sum()
	}
}

impl SymbolResolver for FakeResolver {
	fn resolve(&self, symbol: &CStr) -> Result<NonNull<c_void>> {
		let name = symbol.to_str().unwrap_or_default();
		*self.resolutions.lock().unwrap().entry(name.to_string()).or_insert(0) += 1;

		let missing = || InterposerError::Resolve {
			symbol: name.to_string(),
			reason: "undefined symbol".to_string(),
		};
		if self.missing.iter().any(|symbol| *symbol == name) {
			return Err(missing());
		}

		let address = match name {
			"socket" => fake_socket as *const (),
			"setsockopt" => fake_setsockopt as *const (),
			"bind" => fake_bind as *const (),
			"listen" => fake_listen as *const (),
			"accept" => fake_accept as *const (),
			"connect" => fake_connect as *const (),
			"close" => fake_close as *const (),
			"read" => fake_read as *const (),
			"write" => fake_write as *const (),
			_ => return Err(missing()),
		};
		NonNull::new(address as *mut c_void).ok_or_else(missing)
	}

	fn name(&self) -> &'static str {
		"FakeResolver"
	}
}

/// What the fake store answers
#[derive(Debug, Clone, Copy)]
pub enum StoreReply {
	Value(i64),
	Absent,
	Unreachable,
}

/// In-memory store that counts queries
#[derive(Debug, Clone)]
pub struct FakeStore {
	reply: StoreReply,
	queries: Arc<AtomicUsize>,
}

impl FakeStore {
	pub fn new(reply: StoreReply) -> Self {
		Self {
			reply,
			queries: Arc::new(AtomicUsize::new(0)),
		}
	}

	pub fn queries(&self) -> usize {
		self.queries.load(Ordering::SeqCst)
	}
}

impl ValueStore for FakeStore {
	fn get(&self, key: &str) -> std::result::Result<Option<i64>, StoreError> {
		assert_eq!(key, "tcp-no-delay");
		self.queries.fetch_add(1, Ordering::SeqCst);
		// The lookup must not leak into the caller's errno
		set_errno(libc::ECONNREFUSED);
		match self.reply {
			StoreReply::Value(value) => Ok(Some(value)),
			StoreReply::Absent => Ok(None),
			StoreReply::Unreachable => Err(StoreError::Io(io::Error::from(io::ErrorKind::ConnectionRefused))),
		}
	}

	fn name(&self) -> &'static str {
		"FakeStore"
	}
}

/// Call the interposer's `setsockopt` with an `int` value
pub fn set_int_option(interposer: &mptcp_shim::Interposer, fd: c_int, level: c_int, optname: c_int, value: c_int) -> c_int {
	unsafe {
		interposer.setsockopt(
			fd,
			level,
			optname,
			(&raw const value).cast::<c_void>(),
			std::mem::size_of::<c_int>() as socklen_t,
		)
	}
}
