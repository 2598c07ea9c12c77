//! Store client against a local unix socket server

mod common;

use std::io::{Read, Write};
use std::os::unix::net::UnixListener;
use std::path::Path;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use common::{Call, FakeResolver};
use libc::{IPPROTO_TCP, TCP_NODELAY};
use mptcp_shim::{StoreError, UnixStore, ValueStore};

const GET_REQUEST: &[u8] = b"*2\r\n$3\r\nGET\r\n$12\r\ntcp-no-delay\r\n";

/// Accept one client, read its request and answer with `reply`
fn serve_once(path: &Path, reply: &'static [u8]) -> JoinHandle<Vec<u8>> {
	let listener = UnixListener::bind(path).unwrap();
	std::thread::spawn(move || {
		let (mut stream, _) = listener.accept().unwrap();
		let mut request = Vec::new();
		let mut chunk = [0u8; 64];
		while !request.ends_with(b"tcp-no-delay\r\n") {
			let n = stream.read(&mut chunk).unwrap();
			if n == 0 {
				break;
			}
			request.extend_from_slice(&chunk[..n]);
		}
		stream.write_all(reply).unwrap();
		request
	})
}

#[test]
fn reads_an_integer_reply() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("store.sock");
	let server = serve_once(&path, b":1\r\n");

	let value = UnixStore::new(&path).get("tcp-no-delay").unwrap();
	assert_eq!(value, Some(1));
	assert_eq!(server.join().unwrap(), GET_REQUEST);
}

#[test]
fn reads_a_bulk_string_reply() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("store.sock");
	let server = serve_once(&path, b"$1\r\n0\r\n");

	assert_eq!(UnixStore::new(&path).get("tcp-no-delay").unwrap(), Some(0));
	server.join().unwrap();
}

#[test]
fn null_reply_is_absent() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("store.sock");
	let server = serve_once(&path, b"$-1\r\n");

	assert_eq!(UnixStore::new(&path).get("tcp-no-delay").unwrap(), None);
	server.join().unwrap();
}

#[test]
fn error_reply_is_reported() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("store.sock");
	let server = serve_once(&path, b"-NOAUTH Authentication required.\r\n");

	match UnixStore::new(&path).get("tcp-no-delay") {
		Err(StoreError::Server(message)) => assert!(message.starts_with("NOAUTH")),
		other => panic!("unexpected result: {other:?}"),
	}
	server.join().unwrap();
}

#[test]
fn missing_socket_is_an_io_error() {
	let dir = tempfile::tempdir().unwrap();
	let result = UnixStore::new(dir.path().join("absent.sock")).get("tcp-no-delay");
	assert!(matches!(result, Err(StoreError::Io(_))));
}

#[test]
fn silent_store_times_out() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("store.sock");
	let listener = UnixListener::bind(&path).unwrap();
	let server = std::thread::spawn(move || {
		let (stream, _) = listener.accept().unwrap();
		std::thread::sleep(Duration::from_millis(800));
		drop(stream);
	});

	let started = Instant::now();
	let result = UnixStore::new(&path)
		.timeout(Duration::from_millis(200))
		.get("tcp-no-delay");

	assert!(matches!(result, Err(StoreError::Io(_))), "unexpected result: {result:?}");
	assert!(started.elapsed() < Duration::from_millis(700));
	server.join().unwrap();
}

#[test]
fn interposer_applies_the_served_value() {
	common::reset();
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("store.sock");
	let server = serve_once(&path, b":1\r\n");

	let interposer = mptcp_shim::new()
		.resolver(FakeResolver::new())
		.multipath(false)
		.nodelay_store(true)
		.store_socket(&path)
		.build();

	common::set_int_option(&interposer, 7, IPPROTO_TCP, libc::TCP_KEEPIDLE, 30);
	assert_eq!(
		common::take_calls(),
		vec![
			Call::int_option(7, IPPROTO_TCP, TCP_NODELAY, 1),
			Call::int_option(7, IPPROTO_TCP, libc::TCP_KEEPIDLE, 30),
		]
	);
	server.join().unwrap();
}

#[test]
fn interposer_survives_a_missing_store() {
	common::reset();
	let dir = tempfile::tempdir().unwrap();

	let interposer = mptcp_shim::new()
		.resolver(FakeResolver::new())
		.multipath(false)
		.nodelay_store(true)
		.store_socket(dir.path().join("absent.sock"))
		.build();

	let rc = common::set_int_option(&interposer, 7, IPPROTO_TCP, TCP_NODELAY, 1);
	assert_eq!(rc, 0);
	assert_eq!(
		common::take_calls(),
		vec![Call::int_option(7, IPPROTO_TCP, TCP_NODELAY, 1)]
	);
	assert!(interposer.nodelay_attempted());
}
