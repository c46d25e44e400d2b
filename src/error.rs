use crate::packets::{DecodeError, EncodeError};
use std::{io, sync::Arc};
use thiserror::Error;

/// Errors surfaced by a client session.
///
/// Codec and protocol failures keep their own kinds; CONNACK refusal
/// codes map onto the `Connect*`-style variants; errors observed by
/// the background reader are re-emitted to blocked callers as
/// [`Fatal`](Error::Fatal).
#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Decode(#[from] DecodeError),

	#[error(transparent)]
	Encode(#[from] EncodeError),

	#[error(transparent)]
	Io(#[from] io::Error),

	/// CONNACK return code 1.
	#[error("connect refused: unacceptable protocol version")]
	BadVersion,

	/// CONNACK return code 2.
	#[error("connect refused: client identifier not allowed")]
	IdNotAllowed,

	/// CONNACK return code 3.
	#[error("connect refused: server unavailable")]
	Unavailable,

	/// CONNACK return code 4.
	#[error("connect refused: bad username or password")]
	BadCredentials,

	/// CONNACK return code 5.
	#[error("connect refused: not authorized")]
	NotAuthorized,

	/// The server sent a packet the client cannot reconcile with any
	/// outstanding request, or a CONNACK code outside the known range.
	#[error("illegal response received from server")]
	IllegalResponse,

	/// An ack waiter produced a packet of the wrong kind.
	#[error("received unexpected packet")]
	InternalConflict,

	/// All 65,535 packet identifiers are outstanding.
	#[error("ran out of packet identifiers")]
	OutOfPacketIds,

	/// The transport reached end-of-stream.
	#[error("connection closed")]
	ConnectionClosed,

	/// A fatal error previously observed by the background reader,
	/// re-emitted to a blocked caller.
	#[error("session failed: {0}")]
	Fatal(Arc<Error>),
}
