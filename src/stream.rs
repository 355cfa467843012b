//! Lazy many-valued results and the incremental stream reader behind them.
//!
//! [`StreamReader`] turns a chunked body into decoded values one frame at a time. Frames are
//! NDJSON lines or PGN games; a chunk boundary may fall anywhere, so the reader keeps the
//! current partial line buffered until its newline arrives. Lines that fail to decode are
//! skipped and counted. A transport error is yielded once and ends the sequence. The body is
//! dropped as soon as the sequence ends or the reader is dropped, which releases the
//! underlying connection.

// std
use std::task::{Context, Poll};
// crates.io
use bytes::BytesMut;
use futures_util::{Stream, StreamExt, future::poll_fn};
// self
use crate::{
	_prelude::*,
	endpoint::Framing,
	error::DecodeError,
	http::BodyStream,
	obs,
};

/// Longest line the reader buffers while waiting for its newline.
pub const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// Frame decoder used by a [`StreamReader`].
pub type FrameDecoder<T> = fn(&[u8]) -> Result<T, DecodeError>;

/// Lazy, forward-only sequence of decoded values.
///
/// Pull values with [`next`](Self::next) or use the [`Stream`] implementation. Dropping the
/// sequence (or calling [`close`](Self::close)) before the end releases the connection.
pub struct Sequence<T> {
	source: Source<T>,
}
enum Source<T> {
	Buffered(VecDeque<T>),
	Live(StreamReader<T>),
}
impl<T> Sequence<T> {
	/// Sequence over values that are already decoded.
	pub fn buffered(values: impl IntoIterator<Item = T>) -> Self {
		Self { source: Source::Buffered(values.into_iter().collect()) }
	}

	/// Sequence driven by a stream reader.
	pub fn live(reader: StreamReader<T>) -> Self {
		Self { source: Source::Live(reader) }
	}

	/// Next value; `None` once the sequence has ended.
	pub async fn next(&mut self) -> Option<Result<T>> {
		poll_fn(|cx| self.poll_item(cx)).await
	}

	/// Drains the sequence, stopping at the first error.
	pub async fn to_vec(mut self) -> Result<Vec<T>> {
		let mut values = Vec::new();

		while let Some(value) = self.next().await {
			values.push(value?);
		}

		Ok(values)
	}

	/// Stops the sequence and releases the connection, if one is held.
	pub fn close(&mut self) {
		match &mut self.source {
			Source::Buffered(values) => values.clear(),
			Source::Live(reader) => reader.close(),
		}
	}

	/// Number of frames skipped because they failed to decode.
	pub fn skipped(&self) -> u64 {
		match &self.source {
			Source::Buffered(_) => 0,
			Source::Live(reader) => reader.skipped(),
		}
	}

	fn poll_item(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<T>>> {
		match &mut self.source {
			Source::Buffered(values) => Poll::Ready(values.pop_front().map(Ok)),
			Source::Live(reader) => reader.poll_next_unpin(cx),
		}
	}
}
// Values are never pinned in place; only the boxed body is polled.
impl<T> Unpin for Sequence<T> {}
impl<T> Stream for Sequence<T> {
	type Item = Result<T>;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		self.get_mut().poll_item(cx)
	}
}
impl<T> Debug for Sequence<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match &self.source {
			Source::Buffered(values) => f.debug_struct("Sequence").field("buffered", &values.len()).finish(),
			Source::Live(reader) => f.debug_struct("Sequence").field("live", reader).finish(),
		}
	}
}

/// Incremental decoder over a chunked body.
pub struct StreamReader<T> {
	endpoint: &'static str,
	body: Option<BodyStream>,
	buffer: BytesMut,
	framer: Framer,
	frames: VecDeque<Bytes>,
	decode: FrameDecoder<T>,
	skipped: u64,
	overflowed: bool,
	finished: bool,
}
impl<T> StreamReader<T> {
	/// Reader over `body`, splitting frames as `framing` dictates.
	///
	/// `Json` and `JsonArray` bodies are read as NDJSON, one document per line.
	pub fn new(
		endpoint: &'static str,
		body: BodyStream,
		framing: Framing,
		decode: FrameDecoder<T>,
	) -> Self {
		Self {
			endpoint,
			body: Some(body),
			buffer: BytesMut::new(),
			framer: Framer::new(framing),
			frames: VecDeque::new(),
			decode,
			skipped: 0,
			overflowed: false,
			finished: false,
		}
	}

	/// Drops the body, releasing the connection; further pulls yield `None`.
	pub fn close(&mut self) {
		self.release();
		self.frames.clear();

		self.overflowed = false;
	}

	/// Number of frames skipped because they failed to decode.
	pub fn skipped(&self) -> u64 {
		self.skipped
	}

	/// Returns true while the underlying body is still held.
	pub fn is_open(&self) -> bool {
		self.body.is_some()
	}

	fn release(&mut self) {
		self.body = None;
		self.finished = true;
		self.buffer = BytesMut::new();
	}

	fn next_line(&mut self) -> Option<BytesMut> {
		let end = self.buffer.iter().position(|byte| *byte == b'\n')?;

		Some(self.buffer.split_to(end + 1))
	}
}
impl<T> Stream for StreamReader<T> {
	type Item = Result<T>;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		let this = &mut *self;

		loop {
			if let Some(frame) = this.frames.pop_front() {
				match (this.decode)(&frame) {
					Ok(value) => return Poll::Ready(Some(Ok(value))),
					Err(e) => {
						this.skipped += 1;

						obs::record_skipped_frame(this.endpoint, &e);

						continue;
					},
				}
			}
			if let Some(line) = this.next_line() {
				this.framer.push_line(&line, &mut this.frames);

				continue;
			}
			if this.overflowed {
				this.overflowed = false;

				this.release();

				return Poll::Ready(Some(Err(DecodeError::BodyTooLarge { limit: MAX_LINE_BYTES }.into())));
			}
			if this.finished {
				return Poll::Ready(None);
			}

			let Some(body) = this.body.as_mut() else {
				this.finished = true;

				continue;
			};

			match body.poll_next_unpin(cx) {
				Poll::Pending => return Poll::Pending,
				// Only the unterminated tail of the buffer counts against the limit. Lines the
				// chunk completes are still delivered before the error.
				Poll::Ready(Some(Ok(chunk))) => match chunk.iter().rposition(|byte| *byte == b'\n') {
					Some(end) if chunk.len() - end - 1 > MAX_LINE_BYTES => {
						this.buffer.extend_from_slice(&chunk[..=end]);

						this.body = None;
						this.overflowed = true;
					},
					None if this.buffer.len() + chunk.len() > MAX_LINE_BYTES => {
						this.buffer.clear();

						this.body = None;
						this.overflowed = true;
					},
					_ => this.buffer.extend_from_slice(&chunk),
				},
				Poll::Ready(Some(Err(e))) => {
					this.release();
					this.frames.clear();

					return Poll::Ready(Some(Err(Error::Transport(e))));
				},
				Poll::Ready(None) => {
					let rest = this.buffer.split();

					this.framer.push_line(&rest, &mut this.frames);
					this.framer.finish(&mut this.frames);
					this.release();
				},
			}
		}
	}
}
impl<T> Debug for StreamReader<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("StreamReader")
			.field("endpoint", &self.endpoint)
			.field("open", &self.is_open())
			.field("buffered_bytes", &self.buffer.len())
			.field("skipped", &self.skipped)
			.finish()
	}
}

/// Splits lines into frames.
#[derive(Debug)]
enum Framer {
	Ndjson,
	Pgn { game: BytesMut, in_moves: bool },
}
impl Framer {
	fn new(framing: Framing) -> Self {
		match framing {
			Framing::Pgn => Framer::Pgn { game: BytesMut::new(), in_moves: false },
			Framing::Json | Framing::JsonArray | Framing::Ndjson => Framer::Ndjson,
		}
	}

	fn push_line(&mut self, line: &[u8], frames: &mut VecDeque<Bytes>) {
		let line = line.trim_ascii();

		match self {
			// Blank lines are keepalives.
			Framer::Ndjson if line.is_empty() => (),
			Framer::Ndjson => frames.push_back(Bytes::copy_from_slice(line)),
			Framer::Pgn { game, in_moves } => {
				if line.is_empty() {
					if *in_moves {
						frames.push_back(game.split().freeze());

						*in_moves = false;
					}

					return;
				}
				if line.starts_with(b"[") && *in_moves {
					frames.push_back(game.split().freeze());

					*in_moves = false;
				}
				if !line.starts_with(b"[") {
					*in_moves = true;
				}

				game.extend_from_slice(line);
				game.extend_from_slice(b"\n");
			},
		}
	}

	fn finish(&mut self, frames: &mut VecDeque<Bytes>) {
		if let Framer::Pgn { game, in_moves } = self {
			if !game.is_empty() {
				frames.push_back(game.split().freeze());
			}

			*in_moves = false;
		}
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use futures_util::stream;
	// self
	use super::*;
	use crate::{
		decode::{decode_json, decode_pgn},
		error::TransportError,
	};

	#[derive(Debug, Deserialize, PartialEq)]
	struct A {
		a: u8,
	}

	fn body(chunks: &[&'static str]) -> BodyStream {
		Box::pin(stream::iter(
			chunks
				.iter()
				.map(|chunk| Ok::<_, TransportError>(Bytes::from_static(chunk.as_bytes())))
				.collect::<Vec<_>>(),
		))
	}

	fn reader(chunks: &[&'static str]) -> StreamReader<A> {
		StreamReader::new("test.stream", body(chunks), Framing::Ndjson, decode_json::<A>)
	}

	#[tokio::test]
	async fn lines_split_across_chunks_are_reassembled() {
		let values = Sequence::live(reader(&["{\"a\"", ":1}\n{\"a\":", "2}\n\n{\"a\":3}"]))
			.to_vec()
			.await
			.expect("Stream should decode.");

		assert_eq!(values, vec![A { a: 1 }, A { a: 2 }, A { a: 3 }]);
	}

	#[tokio::test]
	async fn undecodable_lines_are_skipped() {
		let mut sequence = Sequence::live(reader(&["{\"a\":1}\nnot-json\n{\"a\":2}\n"]));
		let mut values = Vec::new();

		while let Some(value) = sequence.next().await {
			values.push(value.expect("Skipped lines never surface as errors.").a);
		}

		assert_eq!(values, vec![1, 2]);
		assert_eq!(sequence.skipped(), 1);
	}

	#[tokio::test]
	async fn transport_error_is_terminal() {
		let chunks: Vec<Result<Bytes, TransportError>> = vec![
			Ok(Bytes::from_static(b"{\"a\":1}\n{\"a\"")),
			Err(TransportError::network(std::io::Error::other("reset"))),
			Ok(Bytes::from_static(b":2}\n")),
		];
		let mut sequence = Sequence::live(StreamReader::new(
			"test.stream",
			Box::pin(stream::iter(chunks)),
			Framing::Ndjson,
			decode_json::<A>,
		));

		assert_eq!(sequence.next().await.map(|v| v.ok()), Some(Some(A { a: 1 })));
		assert!(matches!(sequence.next().await, Some(Err(Error::Transport(_)))));
		assert!(sequence.next().await.is_none());
	}

	#[tokio::test]
	async fn pgn_games_split_on_blank_line_after_moves() {
		let chunks = [
			"[Event \"R1\"]\n[White \"A\"]\n\n1. e4 e5\n2. Nf3 1-0\n\n[Event ",
			"\"R2\"]\n\n1. d4 *\n[Event \"R3\"]\n\n1. c4 *",
		];
		let games = Sequence::live(StreamReader::new(
			"test.pgn",
			body(&chunks),
			Framing::Pgn,
			decode_pgn,
		))
		.to_vec()
		.await
		.expect("Games should decode.");

		assert_eq!(
			games.iter().map(|game| game.tag("Event")).collect::<Vec<_>>(),
			vec![Some("R1"), Some("R2"), Some("R3")]
		);
		assert_eq!(games[0].moves, "1. e4 e5 2. Nf3 1-0");
	}

	#[tokio::test]
	async fn oversized_tail_fails_after_the_complete_lines() {
		let mut chunk = b"{\"a\":1}\n".to_vec();

		chunk.resize(chunk.len() + MAX_LINE_BYTES + 1, b'x');

		let chunks = vec![Ok::<_, TransportError>(Bytes::from(chunk))];
		let mut sequence = Sequence::live(StreamReader::new(
			"test.stream",
			Box::pin(stream::iter(chunks)),
			Framing::Ndjson,
			decode_json::<A>,
		));

		assert_eq!(sequence.next().await.map(|v| v.ok()), Some(Some(A { a: 1 })));
		assert!(matches!(
			sequence.next().await,
			Some(Err(Error::Decode(DecodeError::BodyTooLarge { limit: MAX_LINE_BYTES })))
		));
		assert!(sequence.next().await.is_none());
	}

	#[tokio::test]
	async fn oversized_line_without_newline_fails() {
		let chunks = vec![
			Ok::<_, TransportError>(Bytes::from(vec![b'x'; MAX_LINE_BYTES])),
			Ok(Bytes::from_static(b"x")),
		];
		let mut reader =
			StreamReader::new("test.stream", Box::pin(stream::iter(chunks)), Framing::Ndjson, decode_json::<A>);

		assert!(matches!(reader.next().await, Some(Err(Error::Decode(DecodeError::BodyTooLarge { .. })))));
		assert!(!reader.is_open());
		assert!(reader.next().await.is_none());
	}

	#[tokio::test]
	async fn close_releases_the_body() {
		let mut sequence = Sequence::live(reader(&["{\"a\":1}\n", "{\"a\":2}\n"]));

		assert!(sequence.next().await.is_some());

		sequence.close();

		assert!(sequence.next().await.is_none());
	}

	#[tokio::test]
	async fn buffered_sequences_yield_in_order() {
		let sequence = Sequence::buffered([1, 2, 3]);

		assert_eq!(sequence.collect::<Vec<_>>().await.len(), 3);
	}
}
