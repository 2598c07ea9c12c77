//! Platform constants and low-level helpers
//!
//! The multipath option identifiers belong to the out-of-tree multipath TCP
//! kernel (`linux/tcp.h` of the multipath-tcp.org tree). The mainline kernel
//! rejects them with `ENOPROTOOPT`, which the tuning policy reports like any
//! other option failure.

use libc::c_int;
use nix::errno::Errno;

/// Enable multipath on a TCP socket (int)
pub const MPTCP_ENABLED: c_int = 42;
/// Select the packet scheduler (NUL-terminated name)
pub const MPTCP_SCHEDULER: c_int = 43;
/// Select the path manager (NUL-terminated name)
pub const MPTCP_PATH_MANAGER: c_int = 44;
/// Control subflow information collection (int flags)
pub const MPTCP_INFO: c_int = 45;

/// Keep the initial subflow's information after it closes
pub const MPTCP_INFO_FLAG_SAVE_MASTER: c_int = 0x01;

/// Saves the calling thread's errno and puts it back on drop.
///
/// Work done after an original call has produced the caller's result
/// (logging, bookkeeping) must not change the errno the caller observes.
#[derive(Debug)]
pub struct ErrnoGuard {
	saved: Errno,
}

impl ErrnoGuard {
	/// Capture the current errno
	#[must_use]
	pub fn save() -> Self {
		Self { saved: Errno::last() }
	}

	/// The captured errno
	#[must_use]
	pub const fn saved(&self) -> Errno {
		self.saved
	}
}

impl Drop for ErrnoGuard {
	fn drop(&mut self) {
		set_errno(self.saved as c_int);
	}
}

/// Set the calling thread's errno
#[inline]
pub fn set_errno(value: c_int) {
	unsafe { *libc::__errno_location() = value };
}

/// Writes `message` to stderr with a raw `write(2)` system call.
///
/// `libc::write` would land in this library's own `write` export, which is
/// unusable while a resolution failure is being reported.
pub fn write_stderr_raw(message: &str) {
	let bytes = message.as_bytes();
	let mut offset = 0;
	while offset < bytes.len() {
		let rest = &bytes[offset..];
		let written = unsafe {
			libc::syscall(
				libc::SYS_write,
				libc::STDERR_FILENO,
				rest.as_ptr(),
				rest.len(),
			)
		};
		if written <= 0 {
			break;
		}
		offset += written as usize;
	}
}

/// Report a fatal condition and terminate the process immediately.
pub fn die(message: &str) -> ! {
	write_stderr_raw(message);
	write_stderr_raw("\n");
	unsafe { libc::_exit(1) }
}
