use crate::{
	codec,
	filter::InvalidFilter,
	misc::{Credentials, Will},
	properties::ConnectProperties,
	topic::InvalidTopic,
	FilterBuf, InvalidQoS, Packet, PacketId, QoS, TopicBuf, Version,
};
use bytes::{Buf, BufMut, Bytes};
use std::{fmt, io::Cursor};
use thiserror::Error;

const PROTOCOL_NAME: &str = "MQTT";

const CONNECT_FLAG_USERNAME: u8 = 0x80;
const CONNECT_FLAG_PASSWORD: u8 = 0x40;
const CONNECT_FLAG_WILL_RETAIN: u8 = 0x20;
const CONNECT_FLAG_WILL: u8 = 0x04;
const CONNECT_FLAG_CLEAN_SESSION: u8 = 0x02;

/// Failure to parse a packet or one of its fields.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
	#[error("packet malformed: remaining length too short")]
	PacketShort,
	#[error("packet malformed: remaining length too long")]
	PacketLong,
	#[error("varint too long: more than 4 bytes")]
	VarintTooLong,
	#[error("unexpected end of stream")]
	UnexpectedEof,
	#[error("invalid command byte: 0x{0:02X}")]
	IllegalCommand(u8),
	#[error("illegal fixed-header flags: 0x{0:02X}")]
	IllegalFlags(u8),
	#[error("illegal QoS value (highest: 2)")]
	IllegalQoS,
	#[error("unknown protocol: {0:?}")]
	UnknownProtocol(String),
	#[error("unknown protocol version: {0}")]
	UnknownVersion(u8),
	#[error("unknown property id: 0x{0:02X}")]
	UnknownPropertyId(u32),
	#[error("protocol violation: {0}")]
	ProtocolViolation(&'static str),
	#[error("invalid topic: {0}")]
	InvalidTopic(#[from] InvalidTopic),
	#[error("invalid filter: {0}")]
	InvalidFilter(#[from] InvalidFilter),
}

impl From<InvalidQoS> for DecodeError {
	#[inline]
	fn from(_: InvalidQoS) -> Self {
		Self::IllegalQoS
	}
}

/// Failure to serialize a packet. Encoders validate every length
/// before writing, so a failed encode leaves the buffer untouched.
#[derive(Debug, Error, PartialEq)]
pub enum EncodeError {
	#[error("string exceeds maximum encodable length (65,535 bytes)")]
	StringTooLong,
	#[error("varint exceeds maximum encodable value")]
	VarintTooLong,
	#[error("illegal QoS value (highest: 2)")]
	IllegalQoS,
	#[error("protocol violation: {0}")]
	ProtocolViolation(&'static str),
}

//
// Packet Types
//

#[derive(Clone, Debug, PartialEq)]
pub struct Connect {
	pub version: Version,
	pub client_id: String,
	pub clean_session: bool,
	pub keep_alive: u16,
	pub will: Option<Will>,
	pub credentials: Option<Credentials>,
	pub properties: ConnectProperties,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConnAck {
	pub session_present: bool,
	pub code: u8,
}

impl ConnAck {
	pub const ACCEPTED: u8 = 0;
	pub const BAD_VERSION: u8 = 1;
	pub const ID_NOT_ALLOWED: u8 = 2;
	pub const SERVER_UNAVAILABLE: u8 = 3;
	pub const BAD_CREDENTIALS: u8 = 4;
	pub const NOT_AUTHORIZED: u8 = 5;
}

#[derive(Clone, PartialEq)]
pub enum Publish {
	AtMostOnce {
		retain: bool,
		topic: TopicBuf,
		payload: Bytes,
	},
	AtLeastOnce {
		id: PacketId,
		retain: bool,
		duplicate: bool,
		topic: TopicBuf,
		payload: Bytes,
	},
	ExactlyOnce {
		id: PacketId,
		retain: bool,
		duplicate: bool,
		topic: TopicBuf,
		payload: Bytes,
	},
}

id_packet!(PubAck, Packet::PubAck, 0x40);
id_packet!(PubRec, Packet::PubRec, 0x50);
id_packet!(PubRel, Packet::PubRel, 0x62);
id_packet!(PubComp, Packet::PubComp, 0x70);

#[derive(Clone, Debug, PartialEq)]
pub struct Subscribe {
	pub id: PacketId,
	pub filters: Vec<(FilterBuf, QoS)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubAck {
	pub id: PacketId,
	/// Raw per-filter return codes: a granted QoS in `0..=2` or the
	/// failure code `0x80`.
	pub return_codes: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Unsubscribe {
	pub id: PacketId,
	pub filters: Vec<FilterBuf>,
}

id_packet!(UnsubAck, Packet::UnsubAck, 0xb0);
nul_packet!(PingReq, Packet::PingReq, 0xc0);
nul_packet!(PingResp, Packet::PingResp, 0xd0);
nul_packet!(Disconnect, Packet::Disconnect, 0xe0);

/// MQTT 5 enhanced-authentication packet. Recognized so that a v5
/// stream survives framing, but its body is reserved and ignored.
#[derive(Clone, Debug, PartialEq)]
pub struct Auth;

impl Default for Connect {
	fn default() -> Self {
		Self {
			version: Version::V3_1_1,
			client_id: String::new(),
			clean_session: false,
			keep_alive: 0,
			will: None,
			credentials: None,
			properties: ConnectProperties::default(),
		}
	}
}

impl Connect {
	fn flags(&self) -> u8 {
		let mut flags = 0;

		if self.clean_session {
			flags |= CONNECT_FLAG_CLEAN_SESSION;
		}

		if let Some(will) = &self.will {
			flags |= CONNECT_FLAG_WILL;
			flags |= (will.qos as u8) << 3;
			if will.retain {
				flags |= CONNECT_FLAG_WILL_RETAIN;
			}
		}

		if let Some(credentials) = &self.credentials {
			flags |= CONNECT_FLAG_USERNAME;
			if credentials.password.is_some() {
				flags |= CONNECT_FLAG_PASSWORD;
			}
		}

		flags
	}

	fn remaining_len(&self) -> Result<usize, EncodeError> {
		// "MQTT" + version + flags + keep-alive
		let mut len = 10 + codec::str_len(&self.client_id)?;

		if self.version == Version::V5 {
			len += self.properties.encoded_len()?;
		}

		if let Some(will) = &self.will {
			if self.version == Version::V5 {
				len += will.properties.encoded_len()?;
			}
			len += codec::str_len(will.topic.as_str())?;
			len += codec::bin_len(&will.payload)?;
		}

		if let Some(credentials) = &self.credentials {
			len += codec::str_len(&credentials.username)?;
			if let Some(password) = &credentials.password {
				len += codec::str_len(password)?;
			}
		}

		Ok(len)
	}

	pub fn encode(&self, dst: &mut impl BufMut) -> Result<usize, EncodeError> {
		let remaining = self.remaining_len()?;

		codec::put_u8(dst, 0x10);
		codec::put_var(dst, remaining)?;

		codec::put_str(dst, PROTOCOL_NAME)?;
		codec::put_u8(dst, self.version as u8);
		codec::put_u8(dst, self.flags());
		codec::put_u16(dst, self.keep_alive);

		if self.version == Version::V5 {
			self.properties.encode(dst)?;
		}

		codec::put_str(dst, &self.client_id)?;

		if let Some(will) = &self.will {
			if self.version == Version::V5 {
				will.properties.encode(dst)?;
			}
			codec::put_str(dst, will.topic.as_str())?;
			codec::put_bin(dst, &will.payload)?;
		}

		if let Some(credentials) = &self.credentials {
			codec::put_str(dst, &credentials.username)?;
			if let Some(password) = &credentials.password {
				codec::put_str(dst, password)?;
			}
		}

		Ok(1 + codec::uvarint_size(remaining) + remaining)
	}

	pub fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
		let mut cursor = Cursor::new(payload);

		let protocol = codec::get_str(&mut cursor)?;
		if protocol != PROTOCOL_NAME {
			return Err(DecodeError::UnknownProtocol(String::from(protocol)));
		}

		let version: Version = codec::get_u8(&mut cursor)?.try_into()?;
		let flags = codec::get_u8(&mut cursor)?;
		let keep_alive = codec::get_u16(&mut cursor)?;

		if flags & 0x01 != 0 {
			return Err(DecodeError::ProtocolViolation("reserved connect flag set"));
		}

		let flag_will = flags & CONNECT_FLAG_WILL != 0;
		if flags & CONNECT_FLAG_WILL_RETAIN != 0 && !flag_will {
			return Err(DecodeError::ProtocolViolation("will retain without will"));
		}

		let will_qos: QoS = ((flags & 0x18) >> 3).try_into()?;
		if !flag_will && will_qos != QoS::AtMostOnce {
			return Err(DecodeError::ProtocolViolation("will QoS without will"));
		}

		let flag_username = flags & CONNECT_FLAG_USERNAME != 0;
		let flag_password = flags & CONNECT_FLAG_PASSWORD != 0;
		if flag_password && !flag_username && version == Version::V3_1_1 {
			return Err(DecodeError::ProtocolViolation("password without username"));
		}

		let properties = if version == Version::V5 {
			ConnectProperties::parse(&mut cursor)?
		} else {
			ConnectProperties::default()
		};

		let client_id = String::from(codec::get_str(&mut cursor)?);

		let will = if flag_will {
			let will_properties = if version == Version::V5 {
				crate::properties::WillProperties::parse(&mut cursor)?
			} else {
				Default::default()
			};
			let topic = TopicBuf::new(codec::get_str(&mut cursor)?)?;
			let payload = codec::get_bin(&mut cursor)?;

			Some(Will {
				topic,
				payload,
				qos: will_qos,
				retain: flags & CONNECT_FLAG_WILL_RETAIN != 0,
				properties: will_properties,
			})
		} else {
			None
		};

		let credentials = if flag_username {
			let username = String::from(codec::get_str(&mut cursor)?);
			let password = if flag_password {
				Some(String::from(codec::get_str(&mut cursor)?))
			} else {
				None
			};
			Some(Credentials { username, password })
		} else {
			None
		};

		if cursor.has_remaining() {
			return Err(DecodeError::PacketLong);
		}

		Ok(Self {
			version,
			client_id,
			clean_session: flags & CONNECT_FLAG_CLEAN_SESSION != 0,
			keep_alive,
			will,
			credentials,
			properties,
		})
	}
}

impl ConnAck {
	pub fn encode(&self, dst: &mut impl BufMut) -> Result<usize, EncodeError> {
		codec::put_u8(dst, 0x20);
		codec::put_var(dst, 2)?;
		codec::put_u8(dst, u8::from(self.session_present));
		codec::put_u8(dst, self.code);
		Ok(4)
	}

	pub fn parse(payload: &[u8], version: Version) -> Result<Self, DecodeError> {
		let mut cursor = Cursor::new(payload);

		let flags = codec::get_u8(&mut cursor)?;
		if flags & 0xfe != 0 {
			return Err(DecodeError::IllegalFlags(flags));
		}
		let code = codec::get_u8(&mut cursor)?;

		// A v5 server may append a property list; nothing in it is
		// recognized outside CONNECT, so it is parsed past and dropped.
		if version == Version::V5 && cursor.has_remaining() {
			let len = codec::get_var(&mut cursor)?;
			codec::get_slice(&mut cursor, len)?;
		}

		if cursor.has_remaining() {
			return Err(DecodeError::PacketLong);
		}

		Ok(Self {
			session_present: flags & 0x01 != 0,
			code,
		})
	}
}

const PUBLISH_FLAG_RETAIN: u8 = 0x01;
const PUBLISH_FLAG_DUPLICATE: u8 = 0x08;
const PUBLISH_QOS_MASK: u8 = 0x06;

impl Publish {
	pub fn parse(payload: &[u8], flags: u8) -> Result<Self, DecodeError> {
		let mut cursor = Cursor::new(payload);

		let retain = flags & PUBLISH_FLAG_RETAIN != 0;
		let duplicate = flags & PUBLISH_FLAG_DUPLICATE != 0;
		let qos: QoS = ((flags & PUBLISH_QOS_MASK) >> 1).try_into()?;

		let topic = TopicBuf::new(codec::get_str(&mut cursor)?)?;

		// The interpretation of the remaining bytes depends on the QoS.
		match qos {
			QoS::AtMostOnce => {
				if duplicate {
					return Err(DecodeError::ProtocolViolation(
						"duplicate flag set on a QoS 0 publish",
					));
				}
				let remaining = cursor.remaining();
				let payload = Bytes::copy_from_slice(codec::get_slice(&mut cursor, remaining)?);

				Ok(Self::AtMostOnce {
					retain,
					topic,
					payload,
				})
			}
			QoS::AtLeastOnce => {
				let id = codec::get_id(&mut cursor)?;
				let remaining = cursor.remaining();
				let payload = Bytes::copy_from_slice(codec::get_slice(&mut cursor, remaining)?);

				Ok(Self::AtLeastOnce {
					id,
					retain,
					duplicate,
					topic,
					payload,
				})
			}
			QoS::ExactlyOnce => {
				let id = codec::get_id(&mut cursor)?;
				let remaining = cursor.remaining();
				let payload = Bytes::copy_from_slice(codec::get_slice(&mut cursor, remaining)?);

				Ok(Self::ExactlyOnce {
					id,
					retain,
					duplicate,
					topic,
					payload,
				})
			}
		}
	}

	fn remaining_len(&self) -> Result<usize, EncodeError> {
		let id_len = if self.qos() == QoS::AtMostOnce { 0 } else { 2 };
		Ok(codec::str_len(self.topic().as_str())? + id_len + self.payload().len())
	}

	pub fn encode(&self, dst: &mut impl BufMut) -> Result<usize, EncodeError> {
		let remaining = self.remaining_len()?;

		let mut header = 0x30 | (self.qos() as u8) << 1;
		if self.retain() {
			header |= PUBLISH_FLAG_RETAIN;
		}
		if self.duplicate() {
			header |= PUBLISH_FLAG_DUPLICATE;
		}

		codec::put_u8(dst, header);
		codec::put_var(dst, remaining)?;
		codec::put_str(dst, self.topic().as_str())?;
		if let Some(id) = self.id() {
			codec::put_u16(dst, id.get());
		}
		codec::put_slice(dst, self.payload());

		Ok(1 + codec::uvarint_size(remaining) + remaining)
	}

	/// Returns the topic of the Publish packet.
	#[inline]
	pub fn topic(&self) -> &crate::Topic {
		match self {
			Self::AtMostOnce { topic, .. } => topic,
			Self::AtLeastOnce { topic, .. } => topic,
			Self::ExactlyOnce { topic, .. } => topic,
		}
	}

	/// Returns the payload of the Publish packet.
	#[inline]
	pub fn payload(&self) -> &Bytes {
		match self {
			Self::AtMostOnce { payload, .. } => payload,
			Self::AtLeastOnce { payload, .. } => payload,
			Self::ExactlyOnce { payload, .. } => payload,
		}
	}

	/// Returns the QoS of the Publish packet.
	#[inline]
	pub fn qos(&self) -> QoS {
		match self {
			Self::AtMostOnce { .. } => QoS::AtMostOnce,
			Self::AtLeastOnce { .. } => QoS::AtLeastOnce,
			Self::ExactlyOnce { .. } => QoS::ExactlyOnce,
		}
	}

	/// Returns the retain flag of the Publish packet.
	#[inline]
	pub fn retain(&self) -> bool {
		match self {
			Self::AtMostOnce { retain, .. } => *retain,
			Self::AtLeastOnce { retain, .. } => *retain,
			Self::ExactlyOnce { retain, .. } => *retain,
		}
	}

	/// Returns the packet id of the Publish packet.
	///
	/// This will always return `None` for Publish packets with a QoS of
	/// `AtMostOnce`.
	#[inline]
	pub fn id(&self) -> Option<PacketId> {
		match self {
			Self::AtMostOnce { .. } => None,
			Self::AtLeastOnce { id, .. } => Some(*id),
			Self::ExactlyOnce { id, .. } => Some(*id),
		}
	}

	/// Returns the duplicate flag of the Publish packet.
	#[inline]
	pub fn duplicate(&self) -> bool {
		match self {
			Self::AtMostOnce { .. } => false,
			Self::AtLeastOnce { duplicate, .. } => *duplicate,
			Self::ExactlyOnce { duplicate, .. } => *duplicate,
		}
	}
}

impl fmt::Debug for Publish {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Publish")
			.field("id", &self.id())
			.field("qos", &self.qos())
			.field("retain", &self.retain())
			.field("duplicate", &self.duplicate())
			.field("topic", &self.topic())
			.field("payload length", &self.payload().len())
			.finish()
	}
}

impl Subscribe {
	pub fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
		let mut cursor = Cursor::new(payload);
		let id = codec::get_id(&mut cursor)?;

		if !cursor.has_remaining() {
			return Err(DecodeError::PacketShort);
		}

		let mut filters = Vec::new();
		while cursor.has_remaining() {
			let filter = FilterBuf::new(codec::get_str(&mut cursor)?)?;
			let qos: QoS = codec::get_u8(&mut cursor)?.try_into()?;
			filters.push((filter, qos));
		}

		Ok(Self { id, filters })
	}

	fn remaining_len(&self) -> Result<usize, EncodeError> {
		let mut len = 2;
		for (filter, _) in &self.filters {
			len += codec::str_len(filter.as_str())? + 1;
		}
		Ok(len)
	}

	pub fn encode(&self, dst: &mut impl BufMut) -> Result<usize, EncodeError> {
		let remaining = self.remaining_len()?;

		codec::put_u8(dst, 0x82);
		codec::put_var(dst, remaining)?;
		codec::put_u16(dst, self.id.get());
		for (filter, qos) in &self.filters {
			codec::put_str(dst, filter.as_str())?;
			codec::put_u8(dst, *qos as u8);
		}

		Ok(1 + codec::uvarint_size(remaining) + remaining)
	}
}

impl SubAck {
	/// Per-filter failure return code.
	pub const FAILURE: u8 = 0x80;

	pub fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
		let mut cursor = Cursor::new(payload);
		let id = codec::get_id(&mut cursor)?;

		if !cursor.has_remaining() {
			return Err(DecodeError::PacketShort);
		}

		let remaining = cursor.remaining();
		let return_codes = codec::get_slice(&mut cursor, remaining)?.to_vec();

		Ok(Self { id, return_codes })
	}

	pub fn encode(&self, dst: &mut impl BufMut) -> Result<usize, EncodeError> {
		let remaining = 2 + self.return_codes.len();

		codec::put_u8(dst, 0x90);
		codec::put_var(dst, remaining)?;
		codec::put_u16(dst, self.id.get());
		codec::put_slice(dst, &self.return_codes);

		Ok(1 + codec::uvarint_size(remaining) + remaining)
	}
}

impl Unsubscribe {
	pub fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
		let mut cursor = Cursor::new(payload);
		let id = codec::get_id(&mut cursor)?;

		if !cursor.has_remaining() {
			return Err(DecodeError::PacketShort);
		}

		let mut filters = Vec::new();
		while cursor.has_remaining() {
			filters.push(FilterBuf::new(codec::get_str(&mut cursor)?)?);
		}

		Ok(Self { id, filters })
	}

	fn remaining_len(&self) -> Result<usize, EncodeError> {
		let mut len = 2;
		for filter in &self.filters {
			len += codec::str_len(filter.as_str())?;
		}
		Ok(len)
	}

	pub fn encode(&self, dst: &mut impl BufMut) -> Result<usize, EncodeError> {
		let remaining = self.remaining_len()?;

		codec::put_u8(dst, 0xa2);
		codec::put_var(dst, remaining)?;
		codec::put_u16(dst, self.id.get());
		for filter in &self.filters {
			codec::put_str(dst, filter.as_str())?;
		}

		Ok(1 + codec::uvarint_size(remaining) + remaining)
	}
}

impl Auth {
	pub fn encode(&self, dst: &mut impl BufMut) -> Result<usize, EncodeError> {
		codec::put_u8(dst, 0xf0);
		codec::put_var(dst, 0)?;
		Ok(2)
	}

	pub fn parse(_payload: &[u8]) -> Result<Self, DecodeError> {
		// Reserved: the body is consumed without interpretation.
		Ok(Self)
	}
}

impl From<Auth> for Packet {
	#[inline]
	fn from(_: Auth) -> Packet {
		Packet::Auth
	}
}

macro_rules! id_packet {
	($name:tt,$variant:expr,$header:literal) => {
		#[derive(Clone, Debug, PartialEq)]
		pub struct $name {
			pub id: crate::PacketId,
		}

		impl $name {
			/// Parses the packet body, which must be exactly a packet id.
			pub fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
				if payload.len() < 2 {
					return Err(DecodeError::PacketShort);
				}
				if payload.len() > 2 {
					return Err(DecodeError::PacketLong);
				}

				let mut cursor = std::io::Cursor::new(payload);
				let id = crate::codec::get_id(&mut cursor)?;
				Ok(Self { id })
			}

			pub fn encode(&self, dst: &mut impl bytes::BufMut) -> Result<usize, EncodeError> {
				crate::codec::put_u8(dst, $header);
				crate::codec::put_var(dst, 2)?;
				crate::codec::put_u16(dst, self.id.get());
				Ok(4)
			}
		}

		impl From<$name> for Packet {
			#[inline]
			fn from(value: $name) -> Packet {
				$variant(value)
			}
		}
	};
}
use id_packet;

macro_rules! nul_packet {
	($name:tt,$variant:expr,$header:literal) => {
		#[derive(Clone, Debug, PartialEq)]
		pub struct $name;

		impl $name {
			pub fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
				if !payload.is_empty() {
					return Err(DecodeError::PacketLong);
				}
				Ok(Self)
			}

			pub fn encode(&self, dst: &mut impl bytes::BufMut) -> Result<usize, EncodeError> {
				crate::codec::put_u8(dst, $header);
				crate::codec::put_var(dst, 0)?;
				Ok(2)
			}
		}

		impl From<$name> for Packet {
			#[inline]
			fn from(_: $name) -> Packet {
				$variant
			}
		}
	};
}
use nul_packet;
