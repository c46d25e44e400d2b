use crate::{
	packets::{
		Auth, ConnAck, Connect, DecodeError, Disconnect, EncodeError, PingReq, PingResp, PubAck,
		PubComp, PubRec, PubRel, Publish, SubAck, Subscribe, UnsubAck, Unsubscribe,
	},
	Version,
};
use bytes::BufMut;

/// One MQTT control packet.
///
/// Each variant knows how to serialize itself and how to parse itself
/// from the body that follows its fixed header.
#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
	Connect(Box<Connect>),
	ConnAck(ConnAck),
	Publish(Box<Publish>),
	PubAck(PubAck),
	PubRec(PubRec),
	PubRel(PubRel),
	PubComp(PubComp),
	Subscribe(Subscribe),
	SubAck(SubAck),
	Unsubscribe(Unsubscribe),
	UnsubAck(UnsubAck),
	PingReq,
	PingResp,
	Disconnect,
	Auth,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketType {
	Connect,
	ConnAck,
	Publish,
	PubAck,
	PubRec,
	PubRel,
	PubComp,
	Subscribe,
	SubAck,
	Unsubscribe,
	UnsubAck,
	PingReq,
	PingResp,
	Disconnect,
	Auth,
}

const CONNECT: u8 = 0x10;
const CONNACK: u8 = 0x20;
const PUBLISH: u8 = 0x30;
const PUBACK: u8 = 0x40;
const PUBREC: u8 = 0x50;
const PUBREL: u8 = 0x60;
const PUBCOMP: u8 = 0x70;
const SUBSCRIBE: u8 = 0x80;
const SUBACK: u8 = 0x90;
const UNSUBSCRIBE: u8 = 0xa0;
const UNSUBACK: u8 = 0xb0;
const PINGREQ: u8 = 0xc0;
const PINGRESP: u8 = 0xd0;
const DISCONNECT: u8 = 0xe0;
const AUTH: u8 = 0xf0;

impl Packet {
	/// Checks whether `src` starts with one complete packet.
	///
	/// Returns the fixed-header byte, the offset of the packet body and
	/// the body length, or `None` when more bytes are needed. The
	/// remaining-length varint itself is validated here; nothing else
	/// is interpreted.
	pub(crate) fn check(src: &[u8]) -> Result<Option<(u8, usize, usize)>, DecodeError> {
		let Some(&header) = src.first() else {
			return Ok(None);
		};

		let mut length = 0usize;
		let mut offset = 1;
		loop {
			if offset > 4 {
				return Err(DecodeError::VarintTooLong);
			}
			let Some(&encoded) = src.get(offset) else {
				return Ok(None);
			};
			length += ((encoded & 0x7f) as usize) << (7 * (offset - 1));
			offset += 1;
			if encoded & 0x80 == 0 {
				break;
			}
		}

		if src.len() < offset + length {
			return Ok(None);
		}

		Ok(Some((header, offset, length)))
	}

	/// Parses one packet from the body following its fixed header.
	///
	/// The low nibble of `header` is validated against the packet type;
	/// PUBLISH flags are forwarded to the PUBLISH decoder.
	pub fn parse(header: u8, payload: &[u8], version: Version) -> Result<Self, DecodeError> {
		match (header & 0xf0, header & 0x0f) {
			(CONNECT, 0x00) => Ok(Connect::parse(payload)?.into()),
			(CONNACK, 0x00) => Ok(ConnAck::parse(payload, version)?.into()),
			(PUBLISH, flags) => Ok(Publish::parse(payload, flags)?.into()),
			(PUBACK, 0x00) => Ok(PubAck::parse(payload)?.into()),
			(PUBREC, 0x00) => Ok(PubRec::parse(payload)?.into()),
			(PUBREL, 0x02) => Ok(PubRel::parse(payload)?.into()),
			(PUBCOMP, 0x00) => Ok(PubComp::parse(payload)?.into()),
			(SUBSCRIBE, 0x02) => Ok(Subscribe::parse(payload)?.into()),
			(SUBACK, 0x00) => Ok(SubAck::parse(payload)?.into()),
			(UNSUBSCRIBE, 0x02) => Ok(Unsubscribe::parse(payload)?.into()),
			(UNSUBACK, 0x00) => Ok(UnsubAck::parse(payload)?.into()),
			(PINGREQ, 0x00) => Ok(PingReq::parse(payload)?.into()),
			(PINGRESP, 0x00) => Ok(PingResp::parse(payload)?.into()),
			(DISCONNECT, 0x00) => Ok(Disconnect::parse(payload)?.into()),
			(AUTH, 0x00) if version == Version::V5 => Ok(Auth::parse(payload)?.into()),
			(AUTH, _) if version != Version::V5 => Err(DecodeError::IllegalCommand(header)),
			(
				CONNECT | CONNACK | PUBACK | PUBREC | PUBREL | PUBCOMP | SUBSCRIBE | SUBACK
				| UNSUBSCRIBE | UNSUBACK | PINGREQ | PINGRESP | DISCONNECT | AUTH,
				_,
			) => Err(DecodeError::IllegalFlags(header)),
			_ => Err(DecodeError::IllegalCommand(header)),
		}
	}

	pub fn encode(&self, dst: &mut impl BufMut) -> Result<usize, EncodeError> {
		match self {
			Self::Connect(connect) => connect.encode(dst),
			Self::ConnAck(connack) => connack.encode(dst),
			Self::Publish(publish) => publish.encode(dst),
			Self::PubAck(puback) => puback.encode(dst),
			Self::PubRec(pubrec) => pubrec.encode(dst),
			Self::PubRel(pubrel) => pubrel.encode(dst),
			Self::PubComp(pubcomp) => pubcomp.encode(dst),
			Self::Subscribe(subscribe) => subscribe.encode(dst),
			Self::SubAck(suback) => suback.encode(dst),
			Self::Unsubscribe(unsubscribe) => unsubscribe.encode(dst),
			Self::UnsubAck(unsuback) => unsuback.encode(dst),
			Self::PingReq => PingReq.encode(dst),
			Self::PingResp => PingResp.encode(dst),
			Self::Disconnect => Disconnect.encode(dst),
			Self::Auth => Auth.encode(dst),
		}
	}

	#[inline]
	pub fn packet_type(&self) -> PacketType {
		match self {
			Self::Connect(_) => PacketType::Connect,
			Self::ConnAck(_) => PacketType::ConnAck,
			Self::Publish(_) => PacketType::Publish,
			Self::PubAck(_) => PacketType::PubAck,
			Self::PubRec(_) => PacketType::PubRec,
			Self::PubRel(_) => PacketType::PubRel,
			Self::PubComp(_) => PacketType::PubComp,
			Self::Subscribe(_) => PacketType::Subscribe,
			Self::SubAck(_) => PacketType::SubAck,
			Self::Unsubscribe(_) => PacketType::Unsubscribe,
			Self::UnsubAck(_) => PacketType::UnsubAck,
			Self::PingReq => PacketType::PingReq,
			Self::PingResp => PacketType::PingResp,
			Self::Disconnect => PacketType::Disconnect,
			Self::Auth => PacketType::Auth,
		}
	}
}

impl From<Connect> for Packet {
	#[inline]
	fn from(value: Connect) -> Self {
		Self::Connect(value.into())
	}
}

impl From<ConnAck> for Packet {
	#[inline]
	fn from(value: ConnAck) -> Self {
		Self::ConnAck(value)
	}
}

impl From<Publish> for Packet {
	#[inline]
	fn from(value: Publish) -> Self {
		Self::Publish(value.into())
	}
}

impl From<Subscribe> for Packet {
	#[inline]
	fn from(value: Subscribe) -> Self {
		Self::Subscribe(value)
	}
}

impl From<SubAck> for Packet {
	#[inline]
	fn from(value: SubAck) -> Self {
		Self::SubAck(value)
	}
}

impl From<Unsubscribe> for Packet {
	#[inline]
	fn from(value: Unsubscribe) -> Self {
		Self::Unsubscribe(value)
	}
}
