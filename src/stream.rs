//! Framed packet I/O over a duplex byte stream.
//!
//! [`PacketIo`] owns the transport for a session. Sends and receives
//! are each serialized by their own async mutex so that at most one
//! sender and one receiver touch the stream at a time, and an optional
//! deadline bounds every operation.
use crate::{packets::DecodeError, Error, Packet, Result, Version};
use bytes::BytesMut;
use std::{io, time::Duration};
use tokio::{
	io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
	sync::Mutex,
	time,
};

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// A duplex byte transport a session can run over.
pub trait Transport: AsyncRead + AsyncWrite + Send {}
impl<T: AsyncRead + AsyncWrite + Send> Transport for T {}

type BoxedTransport = Box<dyn Transport + Unpin>;

struct FrameReader {
	stream: ReadHalf<BoxedTransport>,
	buffer: BytesMut,
}

impl FrameReader {
	/// Reads until the buffer holds one complete packet, then parses
	/// it. Returns `None` on clean end-of-stream.
	async fn read_packet(&mut self, version: Version) -> Result<Option<Packet>> {
		loop {
			if let Some((header, offset, length)) = Packet::check(&self.buffer[..])? {
				let frame = self.buffer.split_to(offset + length);
				let packet = Packet::parse(header, &frame[offset..], version)?;
				tracing::trace!(packet = ?packet, "read from stream");
				return Ok(Some(packet));
			}

			// Not enough buffered data for a whole packet; read more.
			if 0 == self.stream.read_buf(&mut self.buffer).await? {
				// A clean shutdown leaves the buffer empty; anything
				// else is a peer that died mid-packet.
				if self.buffer.is_empty() {
					return Ok(None);
				}
				return Err(DecodeError::UnexpectedEof.into());
			}
		}
	}
}

pub struct PacketIo {
	reader: Mutex<FrameReader>,
	writer: Mutex<WriteHalf<BoxedTransport>>,
	version: Version,
	timeout: Duration,
}

impl PacketIo {
	/// Takes ownership of `transport`. `timeout` bounds each send and
	/// each recv; `Duration::ZERO` disables the deadline.
	pub fn new(transport: BoxedTransport, version: Version, timeout: Duration) -> Self {
		let (read, write) = tokio::io::split(transport);
		Self {
			reader: Mutex::new(FrameReader {
				stream: read,
				buffer: BytesMut::with_capacity(READ_BUFFER_SIZE),
			}),
			writer: Mutex::new(write),
			version,
			timeout,
		}
	}

	#[inline]
	pub fn version(&self) -> Version {
		self.version
	}

	/// Serializes and writes one packet atomically.
	pub async fn send(&self, packet: &Packet) -> Result<()> {
		let mut buffer = BytesMut::new();
		packet.encode(&mut buffer)?;

		let mut writer = self.writer.lock().await;
		tracing::trace!(packet = ?packet, len = buffer.len(), "writing to stream");
		self.deadline(async {
			writer.write_all(&buffer).await?;
			writer.flush().await?;
			Ok(())
		})
		.await
	}

	/// Reads exactly one packet. Returns `None` on clean end-of-stream.
	pub async fn recv(&self) -> Result<Option<Packet>> {
		let mut reader = self.reader.lock().await;
		self.deadline(reader.read_packet(self.version)).await
	}

	/// Shuts down the write half of the transport.
	pub async fn close(&self) -> Result<()> {
		let mut writer = self.writer.lock().await;
		writer.shutdown().await?;
		Ok(())
	}

	async fn deadline<T>(&self, operation: impl std::future::Future<Output = Result<T>>) -> Result<T> {
		if self.timeout.is_zero() {
			operation.await
		} else {
			match time::timeout(self.timeout, operation).await {
				Ok(result) => result,
				Err(_) => Err(Error::Io(io::Error::from(io::ErrorKind::TimedOut))),
			}
		}
	}
}
