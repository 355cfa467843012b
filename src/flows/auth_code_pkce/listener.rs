// std
use std::{
	io,
	net::{Ipv4Addr, SocketAddr},
	time::Duration as StdDuration,
};
// crates.io
use tokio::{
	io::{AsyncReadExt, AsyncWriteExt},
	net::{TcpListener, TcpStream},
	task::JoinSet,
	time,
};
// self
use crate::error::ConfigError;

const MAX_HEAD_BYTES: usize = 8 * 1024;
const MAX_PENDING_HEADS: usize = 64;
const HEAD_READ_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// One-shot HTTP receiver for the browser redirect, bound to `127.0.0.1`.
///
/// Request heads are read on their own tasks, so a connection that never sends anything
/// cannot hold up the redirect behind it. Dropping the receiver aborts those tasks and closes
/// their connections.
#[derive(Debug)]
pub(crate) struct LoopbackReceiver {
	listener: TcpListener,
	local_addr: SocketAddr,
	pending: JoinSet<Option<Callback>>,
}
impl LoopbackReceiver {
	/// Binds `port` on the loopback interface; 0 picks an ephemeral port.
	pub(crate) async fn bind(port: u16) -> Result<Self, ConfigError> {
		let bind_err = |source| ConfigError::ListenerBind { port, source };
		let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await.map_err(bind_err)?;
		let local_addr = listener.local_addr().map_err(bind_err)?;

		Ok(Self { listener, local_addr, pending: JoinSet::new() })
	}

	pub(crate) fn local_addr(&self) -> SocketAddr {
		self.local_addr
	}

	/// Waits for the next well-formed `GET` request head.
	///
	/// Connections that send garbage, stall, or use another method are answered (when
	/// possible) and dropped without surfacing to the caller. Cancel-safe: heads still being
	/// read stay queued for the next call.
	pub(crate) async fn accept(&mut self) -> io::Result<Callback> {
		loop {
			tokio::select! {
				accepted = self.listener.accept() => {
					let (stream, _) = accepted?;

					// Over the cap the connection is closed right away.
					if self.pending.len() < MAX_PENDING_HEADS {
						self.pending.spawn(read_request(stream));
					}
				},
				Some(joined) = self.pending.join_next(), if !self.pending.is_empty() => {
					if let Ok(Some(callback)) = joined {
						return Ok(callback);
					}
				},
			}
		}
	}
}

async fn read_request(mut stream: TcpStream) -> Option<Callback> {
	let head = time::timeout(HEAD_READ_TIMEOUT, read_head(&mut stream)).await.ok()?.ok()??;
	let mut parts = head.split_ascii_whitespace();

	match (parts.next(), parts.next()) {
		(Some("GET"), Some(target)) => Some(Callback { stream, target: target.to_owned() }),
		_ => {
			Callback { stream, target: String::new() }.respond(405, "Method Not Allowed", "").await;

			None
		},
	}
}

/// Accepted browser request, awaiting its response.
#[derive(Debug)]
pub(crate) struct Callback {
	stream: TcpStream,
	target: String,
}
impl Callback {
	pub(crate) fn path(&self) -> &str {
		self.target.split_once('?').map_or(self.target.as_str(), |(path, _)| path)
	}

	pub(crate) fn query(&self) -> &str {
		self.target.split_once('?').map_or("", |(_, query)| query)
	}

	/// Writes a complete HTML response and closes the connection.
	pub(crate) async fn respond(mut self, status: u16, reason: &str, body: &str) {
		let response = format!(
			"HTTP/1.1 {status} {reason}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
			body.len()
		);

		// The browser may already be gone; the flow outcome does not depend on it.
		let _ = self.stream.write_all(response.as_bytes()).await;
		let _ = self.stream.shutdown().await;
	}
}

// Reads until the end of the request head and returns its first line.
async fn read_head(stream: &mut TcpStream) -> io::Result<Option<String>> {
	let mut buffer = Vec::with_capacity(1024);
	let mut chunk = [0_u8; 1024];

	loop {
		let read = stream.read(&mut chunk).await?;

		if read == 0 {
			return Ok(None);
		}

		buffer.extend_from_slice(&chunk[..read]);

		if buffer.windows(4).any(|window| window == b"\r\n\r\n") {
			break;
		}
		if buffer.len() > MAX_HEAD_BYTES {
			return Ok(None);
		}
	}

	let head = String::from_utf8_lossy(&buffer);

	Ok(head.lines().next().map(str::to_owned))
}
