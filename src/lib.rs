//! # mqttling
//!
//! An asynchronous client library for the MQTT publish/subscribe
//! protocol. Speaks MQTT 3.1.1 and the MQTT 5.0 connect superset over
//! any duplex byte transport.
mod codec;
mod error;
mod packet;
mod qos;

pub mod client;
pub mod filter;
pub mod misc;
pub mod options;
pub mod packets;
pub mod properties;
pub mod router;
pub mod stream;
pub mod tables;
pub mod topic;

pub use self::{
	client::{Client, Subscription},
	error::Error,
	filter::{Filter, FilterBuf, InvalidFilter},
	options::{ConnectOptions, PublishOptions, SessionOptions},
	packet::{Packet, PacketType},
	qos::{InvalidQoS, QoS},
	topic::{InvalidTopic, Topic, TopicBuf},
};

pub type PacketId = core::num::NonZeroU16;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// MQTT protocol version, as carried in the CONNECT variable header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Version {
	V3_1_1 = 0x04,
	V5 = 0x05,
}

impl TryFrom<u8> for Version {
	type Error = packets::DecodeError;
	#[inline]
	fn try_from(value: u8) -> Result<Self, Self::Error> {
		match value {
			0x04 => Ok(Self::V3_1_1),
			0x05 => Ok(Self::V5),
			_ => Err(packets::DecodeError::UnknownVersion(value)),
		}
	}
}
