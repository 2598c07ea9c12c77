//! Builder for creating interposers
//!
//! This module contains the `InterposerBuilder` struct and related
//! functionality for configuring and building interposers.

use std::path::PathBuf;
use std::time::Duration;

use crate::interposer::Interposer;
use crate::policy::{MultipathPolicy, NO_DELAY_KEY, NoDelayOnce, SocketTracker};
use crate::resolver::{NextSymbolResolver, SymbolResolver};
use crate::store::{DEFAULT_STORE_SOCKET, DEFAULT_STORE_TIMEOUT, UnixStore, ValueStore};
use crate::table::OperationTable;

/// Overrides the store socket path
pub const STORE_SOCKET_ENV: &str = "MPTCP_SHIM_STORE_SOCKET";

/// Configuration for an interposer
#[derive(Debug, Clone)]
pub struct InterposerConfig {
	/// Whether to apply the multipath configuration to TCP sockets
	pub multipath: bool,
	/// Whether to fetch and apply the one-shot TCP_NODELAY value
	pub nodelay_store: bool,
	/// Unix socket of the value store
	pub store_socket: PathBuf,
	/// Bound for the single store query
	pub store_timeout: Duration,
	/// Store key holding the TCP_NODELAY value
	pub nodelay_key: String,
}

impl Default for InterposerConfig {
	fn default() -> Self {
		Self {
			multipath: cfg!(feature = "mptcp"),
			nodelay_store: cfg!(feature = "nodelay-store"),
			store_socket: PathBuf::from(DEFAULT_STORE_SOCKET),
			store_timeout: DEFAULT_STORE_TIMEOUT,
			nodelay_key: NO_DELAY_KEY.to_string(),
		}
	}
}

/// Builder for creating interposers
///
/// This struct provides a builder pattern for configuring and
/// creating interposers.
pub struct InterposerBuilder {
	/// The configuration for the interposer
	config: InterposerConfig,
	/// Where originals are looked up
	resolver: Option<Box<dyn SymbolResolver>>,
	/// Store used instead of the unix socket client
	store: Option<Box<dyn ValueStore>>,
}

impl Default for InterposerBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for InterposerBuilder {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("InterposerBuilder")
			.field("config", &self.config)
			.field("resolver", &self.resolver.as_ref().map(|resolver| resolver.name()))
			.field("store", &self.store.as_ref().map(|store| store.name()))
			.finish()
	}
}

impl InterposerBuilder {
	/// Create a new interposer builder with default settings
	#[must_use]
	pub fn new() -> Self {
		Self {
			config: InterposerConfig::default(),
			resolver: None,
			store: None,
		}
	}

	/// Create a builder with default settings, taking the store socket
	/// from `MPTCP_SHIM_STORE_SOCKET` when it is set
	#[must_use]
	pub fn from_env() -> Self {
		let builder = Self::new();
		match std::env::var_os(STORE_SOCKET_ENV) {
			Some(path) if !path.is_empty() => builder.store_socket(path),
			_ => builder,
		}
	}

	/// Enable or disable the multipath configuration
	#[must_use]
	pub const fn multipath(mut self, enable: bool) -> Self {
		self.config.multipath = enable;
		self
	}

	/// Enable or disable the one-shot TCP_NODELAY lookup
	#[must_use]
	pub const fn nodelay_store(mut self, enable: bool) -> Self {
		self.config.nodelay_store = enable;
		self
	}

	/// Set the unix socket of the value store
	#[must_use]
	pub fn store_socket(mut self, path: impl Into<PathBuf>) -> Self {
		self.config.store_socket = path.into();
		self
	}

	/// Set the bound for the store query
	#[must_use]
	pub const fn store_timeout(mut self, timeout: Duration) -> Self {
		self.config.store_timeout = timeout;
		self
	}

	/// Set the store key holding the TCP_NODELAY value
	#[must_use]
	pub fn nodelay_key(mut self, key: impl Into<String>) -> Self {
		self.config.nodelay_key = key.into();
		self
	}

	/// Set the resolver for original implementations
	#[must_use]
	pub fn resolver<R: SymbolResolver + 'static>(mut self, resolver: R) -> Self {
		self.resolver = Some(Box::new(resolver));
		self
	}

	/// Use `store` for the TCP_NODELAY lookup instead of the unix socket client
	#[must_use]
	pub fn store<S: ValueStore + 'static>(mut self, store: S) -> Self {
		self.store = Some(Box::new(store));
		self
	}

	/// Build the interposer
	#[must_use]
	pub fn build(self) -> Interposer {
		let config = self.config;

		let resolver = self
			.resolver
			.unwrap_or_else(|| Box::new(NextSymbolResolver::new()));

		let multipath = config.multipath.then(MultipathPolicy::new);

		let nodelay = config.nodelay_store.then(|| {
			let store = self.store.unwrap_or_else(|| {
				Box::new(UnixStore::new(config.store_socket.clone()).timeout(config.store_timeout))
			});
			NoDelayOnce::new(store, config.nodelay_key.clone())
		});

		Interposer {
			config,
			table: OperationTable::new(),
			resolver,
			multipath,
			sockets: SocketTracker::new(),
			nodelay,
		}
	}
}
