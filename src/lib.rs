//! mptcp-shim - socket interposition with multipath TCP tuning
//!
//! This crate is the core of a preloadable library that sits between an
//! unmodified program and the C library's socket calls. Every intercepted
//! call (`socket`, `setsockopt`, `bind`, `listen`, `accept`, `connect`,
//! `close`, `read`, `write`) is forwarded to the original implementation,
//! which is looked up by name on first use and cached for the life of the
//! process. The `setsockopt` path additionally:
//!
//! - sets TCP_NODELAY from an external key/value store, once per process
//! - turns on and configures multipath TCP, once per socket
//!
//! The exported C symbols live in the `mptcp-shim-preload` crate.
//!
//! # Getting Started
//!
//! ```rust,no_run
//! let interposer = mptcp_shim::new().multipath(true).nodelay_store(false).build();
//!
//! let fd = unsafe { interposer.socket(libc::AF_INET, libc::SOCK_STREAM, 0) };
//! let enable: libc::c_int = 1;
//! let rc = unsafe {
//!     interposer.setsockopt(
//!         fd,
//!         libc::IPPROTO_TCP,
//!         libc::TCP_NODELAY,
//!         (&raw const enable).cast(),
//!         std::mem::size_of::<libc::c_int>() as libc::socklen_t,
//!     )
//! };
//! println!("setsockopt returned {rc}");
//! ```

pub mod ffi;
pub mod interposer;
pub mod policy;
pub mod resolver;
pub mod store;
pub mod table;
pub mod util;

pub use interposer::{Interposer, InterposerBuilder, InterposerConfig, InterposerError, Result};
pub use policy::{MULTIPATH_CONFIG, MultipathEntry, MultipathPolicy, OptionValue};
pub use resolver::{NextSymbolResolver, SymbolResolver};
pub use store::{StoreError, UnixStore, ValueStore};
pub use table::{Operation, OperationTable};

/// Create a new interposer builder
#[must_use]
pub fn new() -> InterposerBuilder {
	InterposerBuilder::new()
}

/// Create an interposer builder honoring the environment overrides
#[must_use]
pub fn from_env() -> InterposerBuilder {
	InterposerBuilder::from_env()
}
