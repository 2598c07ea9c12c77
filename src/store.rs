//! External value store client
//!
//! A minimal client for a Redis-compatible key/value store listening on a
//! local unix domain socket. It issues a single `GET` and understands the
//! integer, bulk string, null and error replies; nothing else is needed to
//! read one numeric setting.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

/// Where the store listens unless configured otherwise
pub const DEFAULT_STORE_SOCKET: &str = "/var/run/redis/redis-server.sock";

/// Upper bound for one complete query, connect to reply
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(1500);

// Longest reply line or bulk payload accepted
const MAX_REPLY_LEN: usize = 512;

/// Error type for store queries
#[derive(Debug, Error)]
pub enum StoreError {
	/// Connecting, sending or receiving failed, including timeouts
	#[error("store I/O error: {0}")]
	Io(#[from] io::Error),

	/// The store answered with an error reply
	#[error("store replied with an error: {0}")]
	Server(String),

	/// The reply could not be understood
	#[error("malformed store reply: {0}")]
	Malformed(String),
}

/// A synchronous key/value lookup
pub trait ValueStore: Send + Sync {
	/// Fetch the integer stored under `key`; `Ok(None)` when absent
	fn get(&self, key: &str) -> Result<Option<i64>, StoreError>;

	/// Get the name of the store
	///
	/// This is used for debugging and logging purposes.
	fn name(&self) -> &'static str {
		std::any::type_name::<Self>()
	}
}

/// Store reached over a unix domain socket
#[derive(Debug, Clone)]
pub struct UnixStore {
	path: PathBuf,
	timeout: Duration,
}

impl UnixStore {
	/// Create a client for the store listening at `path`
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			timeout: DEFAULT_STORE_TIMEOUT,
		}
	}

	/// Set the bound for one complete query
	#[must_use]
	pub const fn timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	/// The socket path of the store
	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn connect(&self) -> io::Result<UnixStream> {
		let (address, len) = unix_address(&self.path)?;

		let fd = unsafe {
			libc::socket(
				libc::AF_UNIX,
				libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
				0,
			)
		};
		if fd < 0 {
			return Err(io::Error::last_os_error());
		}
		let stream = unsafe { UnixStream::from_raw_fd(fd) };

		// A non-blocking AF_UNIX connect completes at once or fails with
		// EAGAIN when the listener's backlog is full; it never waits.
		let rc = unsafe {
			libc::connect(
				stream.as_raw_fd(),
				(&raw const address).cast::<libc::sockaddr>(),
				len,
			)
		};
		if rc < 0 {
			return Err(io::Error::last_os_error());
		}

		stream.set_nonblocking(false)?;
		stream.set_write_timeout(Some(self.timeout))?;
		Ok(stream)
	}
}

impl Default for UnixStore {
	fn default() -> Self {
		Self::new(DEFAULT_STORE_SOCKET)
	}
}

impl ValueStore for UnixStore {
	fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
		let deadline = Instant::now() + self.timeout;
		debug!("Querying store at {} for {key}", self.path.display());

		let mut stream = self.connect()?;
		stream.write_all(&encode_get(key))?;

		let mut reader = BufReader::new(DeadlineReader {
			stream: &stream,
			deadline,
		});
		read_reply(&mut reader)
	}

	fn name(&self) -> &'static str {
		"UnixStore"
	}
}

/// Reads from a stream, failing once `deadline` has passed
struct DeadlineReader<'a> {
	stream: &'a UnixStream,
	deadline: Instant,
}

impl Read for DeadlineReader<'_> {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		let remaining = self
			.deadline
			.checked_duration_since(Instant::now())
			.filter(|remaining| !remaining.is_zero())
			.ok_or_else(|| io::Error::new(io::ErrorKind::TimedOut, "store reply timed out"))?;
		self.stream.set_read_timeout(Some(remaining))?;
		let mut stream = self.stream;
		stream.read(buf)
	}
}

fn unix_address(path: &Path) -> io::Result<(libc::sockaddr_un, libc::socklen_t)> {
	let mut address: libc::sockaddr_un = unsafe { std::mem::zeroed() };
	address.sun_family = libc::AF_UNIX as libc::sa_family_t;

	let bytes = path.as_os_str().as_bytes();
	if bytes.is_empty() || bytes.len() >= address.sun_path.len() {
		return Err(io::Error::new(
			io::ErrorKind::InvalidInput,
			format!("unusable store socket path {}", path.display()),
		));
	}
	for (dst, src) in address.sun_path.iter_mut().zip(bytes) {
		*dst = *src as libc::c_char;
	}

	let len = std::mem::size_of::<libc::sa_family_t>() + bytes.len() + 1;
	Ok((address, len as libc::socklen_t))
}

/// Encode `GET <key>` as a RESP array of bulk strings
fn encode_get(key: &str) -> Vec<u8> {
	format!("*2\r\n$3\r\nGET\r\n${}\r\n{key}\r\n", key.len()).into_bytes()
}

/// Parse one reply to `GET`
fn read_reply(reader: &mut impl BufRead) -> Result<Option<i64>, StoreError> {
	let line = read_line(reader)?;
	let mut chars = line.chars();
	let kind = chars
		.next()
		.ok_or_else(|| StoreError::Malformed("empty reply".to_string()))?;
	let rest = chars.as_str();

	match kind {
		':' => parse_integer(rest).map(Some),
		'_' => Ok(None),
		'-' => Err(StoreError::Server(rest.to_string())),
		'$' => {
			let len: i64 = rest
				.parse()
				.map_err(|_| StoreError::Malformed(format!("bad bulk length {rest:?}")))?;
			if len < 0 {
				return Ok(None);
			}
			let len = len as usize;
			if len > MAX_REPLY_LEN {
				return Err(StoreError::Malformed(format!("bulk reply of {len} bytes")));
			}

			let mut body = vec![0u8; len + 2];
			reader.read_exact(&mut body)?;
			if !body.ends_with(b"\r\n") {
				return Err(StoreError::Malformed("unterminated bulk reply".to_string()));
			}
			body.truncate(len);

			let text = String::from_utf8(body)
				.map_err(|_| StoreError::Malformed("bulk reply is not text".to_string()))?;
			parse_integer(text.trim()).map(Some)
		},
		_ => Err(StoreError::Malformed(format!("unexpected reply {line:?}"))),
	}
}

fn read_line(reader: &mut impl BufRead) -> Result<String, StoreError> {
	let mut line = String::new();
	let read = reader.take(MAX_REPLY_LEN as u64).read_line(&mut line)?;
	if read == 0 {
		return Err(StoreError::Malformed("connection closed before reply".to_string()));
	}
	match line.strip_suffix("\r\n") {
		Some(stripped) => Ok(stripped.to_string()),
		None => Err(StoreError::Malformed(format!("unterminated reply {line:?}"))),
	}
}

fn parse_integer(text: &str) -> Result<i64, StoreError> {
	text.parse()
		.map_err(|_| StoreError::Malformed(format!("{text:?} is not an integer")))
}
