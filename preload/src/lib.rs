//! Preload library for mptcp-shim
//!
//! Exports the intercepted socket calls with C linkage so that loading this
//! library ahead of libc attaches the interposer to an unmodified program:
//!
//! ```bash
//! LD_PRELOAD=/path/to/libmptcp_preload.so ssh root@sip-server.de
//! ```
//!
//! The single process-wide [`Interposer`] is built on first use, which may
//! come from another library's constructor before ours has run.

use std::ffi::c_void;
use std::sync::OnceLock;

use libc::{c_int, size_t, sockaddr, socklen_t, ssize_t};
use mptcp_shim::Interposer;

static INTERPOSER: OnceLock<Interposer> = OnceLock::new();

#[unsafe(link_section = ".init_array")]
#[used]
static CONSTRUCTOR: extern "C" fn() = activate;

extern "C" fn activate() {
	let interposer = interposer();
	mptcp_shim::util::init_logging();
	tracing::debug!(
		"mptcp-shim active: multipath {}, nodelay store {}",
		interposer.config().multipath,
		interposer.config().nodelay_store
	);
}

/// The process-wide interposer
///
/// Building it must not log or touch sockets: either would re-enter this
/// function while the cell is being initialised.
fn interposer() -> &'static Interposer {
	INTERPOSER.get_or_init(|| mptcp_shim::from_env().build())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn socket(domain: c_int, ty: c_int, protocol: c_int) -> c_int {
	unsafe { interposer().socket(domain, ty, protocol) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn setsockopt(
	sockfd: c_int,
	level: c_int,
	optname: c_int,
	optval: *const c_void,
	optlen: socklen_t,
) -> c_int {
	unsafe { interposer().setsockopt(sockfd, level, optname, optval, optlen) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn bind(sockfd: c_int, addr: *const sockaddr, len: socklen_t) -> c_int {
	unsafe { interposer().bind(sockfd, addr, len) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn listen(sockfd: c_int, backlog: c_int) -> c_int {
	unsafe { interposer().listen(sockfd, backlog) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn accept(sockfd: c_int, addr: *mut sockaddr, len: *mut socklen_t) -> c_int {
	unsafe { interposer().accept(sockfd, addr, len) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn connect(sockfd: c_int, addr: *const sockaddr, len: socklen_t) -> c_int {
	unsafe { interposer().connect(sockfd, addr, len) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn close(fd: c_int) -> c_int {
	unsafe { interposer().close(fd) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn read(fd: c_int, buf: *mut c_void, count: size_t) -> ssize_t {
	unsafe { interposer().read(fd, buf, count) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn write(fd: c_int, buf: *const c_void, count: size_t) -> ssize_t {
	unsafe { interposer().write(fd, buf, count) }
}
