//! Symbol resolution
//!
//! The only place the interposer touches the dynamic linker. Everything
//! else asks a [`SymbolResolver`] for the next implementation of a name.

use std::ffi::{CStr, c_void};
use std::ptr::NonNull;

use crate::interposer::{InterposerError, Result};

/// Looks up the original implementation of an intercepted symbol
pub trait SymbolResolver: Send + Sync {
	/// Resolve `symbol` to the address of the next implementation in the
	/// dynamic symbol search order, skipping this library.
	fn resolve(&self, symbol: &CStr) -> Result<NonNull<c_void>>;

	/// Get the name of the resolver
	///
	/// This is used for debugging and logging purposes.
	fn name(&self) -> &'static str {
		std::any::type_name::<Self>()
	}
}

/// Resolves through `dlsym(RTLD_NEXT, ..)`
///
/// `RTLD_NEXT` is relative to the object that calls `dlsym`, so this must be
/// linked into the preloaded library that exports the wrappers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NextSymbolResolver;

impl NextSymbolResolver {
	/// Create a new `NextSymbolResolver`
	#[must_use]
	pub const fn new() -> Self {
		Self
	}
}

impl SymbolResolver for NextSymbolResolver {
	fn resolve(&self, symbol: &CStr) -> Result<NonNull<c_void>> {
		unsafe {
			// Drop any stale error so the one read below belongs to this lookup
			libc::dlerror();

			let address = libc::dlsym(libc::RTLD_NEXT, symbol.as_ptr());
			let error = libc::dlerror();

			if !error.is_null() {
				return Err(InterposerError::Resolve {
					symbol: symbol.to_string_lossy().into_owned(),
					reason: CStr::from_ptr(error).to_string_lossy().into_owned(),
				});
			}

			NonNull::new(address).ok_or_else(|| InterposerError::Resolve {
				symbol: symbol.to_string_lossy().into_owned(),
				reason: "symbol resolved to a null address".to_string(),
			})
		}
	}

	fn name(&self) -> &'static str {
		"NextSymbolResolver"
	}
}
