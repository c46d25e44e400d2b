//! MQTT 5 property lists.
//!
//! A property list is a varint byte count followed by entries, each an
//! identifier byte and a typed value. Only the properties recognized
//! on CONNECT and its will section are implemented; anything else is
//! rejected during parsing.
use crate::{
	codec,
	packets::{DecodeError, EncodeError},
};
use bytes::{BufMut, Bytes};
use std::io::Cursor;

const PAYLOAD_FORMAT_INDICATOR: u8 = 0x01;
const MESSAGE_EXPIRY_INTERVAL: u8 = 0x02;
const CONTENT_TYPE: u8 = 0x03;
const RESPONSE_TOPIC: u8 = 0x08;
const CORRELATION_DATA: u8 = 0x09;
const SESSION_EXPIRY_INTERVAL: u8 = 0x11;
const AUTH_METHOD: u8 = 0x15;
const AUTH_DATA: u8 = 0x16;
const REQUEST_PROBLEM_INFO: u8 = 0x17;
const WILL_DELAY_INTERVAL: u8 = 0x18;
const REQUEST_RESPONSE_INFO: u8 = 0x19;
const RECEIVE_MAXIMUM: u8 = 0x21;
const TOPIC_ALIAS_MAXIMUM: u8 = 0x22;
const USER_PROPERTY: u8 = 0x26;
const MAXIMUM_PACKET_SIZE: u8 = 0x27;

/// Properties carried between the CONNECT variable header and payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConnectProperties {
	pub session_expiry: Option<u32>,
	pub receive_max: Option<u16>,
	pub max_packet_size: Option<u32>,
	pub topic_alias_max: Option<u16>,
	pub request_response_info: bool,
	pub disable_problem_info: bool,
	pub user_properties: Vec<(String, String)>,
	pub auth_method: Option<String>,
	pub auth_data: Option<Bytes>,
}

/// Properties carried between the client id and the will topic.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WillProperties {
	pub delay: Option<u32>,
	pub payload_format_utf8: bool,
	pub message_expiry: Option<u32>,
	pub content_type: Option<String>,
	pub response_topic: Option<String>,
	pub correlation_data: Option<Bytes>,
	pub user_properties: Vec<(String, String)>,
}

fn user_properties_len(user_properties: &[(String, String)]) -> Result<usize, EncodeError> {
	let mut len = 0;
	for (key, value) in user_properties {
		len += 1 + codec::str_len(key)? + codec::str_len(value)?;
	}
	Ok(len)
}

fn get_bool(src: &mut Cursor<&[u8]>) -> Result<bool, DecodeError> {
	match codec::get_u8(src)? {
		0 => Ok(false),
		1 => Ok(true),
		_ => Err(DecodeError::ProtocolViolation(
			"boolean property value must be 0 or 1",
		)),
	}
}

impl ConnectProperties {
	pub fn is_empty(&self) -> bool {
		*self == Self::default()
	}

	/// Byte length of the entries, excluding the list length prefix.
	pub(crate) fn entries_len(&self) -> Result<usize, EncodeError> {
		let mut len = 0;
		if self.session_expiry.is_some() {
			len += 5;
		}
		if self.receive_max.is_some() {
			len += 3;
		}
		if self.max_packet_size.is_some() {
			len += 5;
		}
		if self.topic_alias_max.is_some() {
			len += 3;
		}
		if self.request_response_info {
			len += 2;
		}
		if self.disable_problem_info {
			len += 2;
		}
		len += user_properties_len(&self.user_properties)?;
		if let Some(method) = &self.auth_method {
			len += 1 + codec::str_len(method)?;
		}
		if let Some(data) = &self.auth_data {
			len += 1 + codec::bin_len(data)?;
		}
		Ok(len)
	}

	/// Full encoded length, including the list length prefix.
	pub(crate) fn encoded_len(&self) -> Result<usize, EncodeError> {
		let entries = self.entries_len()?;
		Ok(codec::uvarint_size(entries) + entries)
	}

	pub(crate) fn encode(&self, dst: &mut impl BufMut) -> Result<(), EncodeError> {
		codec::put_var(dst, self.entries_len()?)?;
		if let Some(expiry) = self.session_expiry {
			codec::put_u8(dst, SESSION_EXPIRY_INTERVAL);
			codec::put_u32(dst, expiry);
		}
		if let Some(max) = self.receive_max {
			codec::put_u8(dst, RECEIVE_MAXIMUM);
			codec::put_u16(dst, max);
		}
		if let Some(size) = self.max_packet_size {
			codec::put_u8(dst, MAXIMUM_PACKET_SIZE);
			codec::put_u32(dst, size);
		}
		if let Some(max) = self.topic_alias_max {
			codec::put_u8(dst, TOPIC_ALIAS_MAXIMUM);
			codec::put_u16(dst, max);
		}
		if self.request_response_info {
			codec::put_u8(dst, REQUEST_RESPONSE_INFO);
			codec::put_u8(dst, 1);
		}
		if self.disable_problem_info {
			codec::put_u8(dst, REQUEST_PROBLEM_INFO);
			codec::put_u8(dst, 0);
		}
		for (key, value) in &self.user_properties {
			codec::put_u8(dst, USER_PROPERTY);
			codec::put_str(dst, key)?;
			codec::put_str(dst, value)?;
		}
		if let Some(method) = &self.auth_method {
			codec::put_u8(dst, AUTH_METHOD);
			codec::put_str(dst, method)?;
		}
		if let Some(data) = &self.auth_data {
			codec::put_u8(dst, AUTH_DATA);
			codec::put_bin(dst, data)?;
		}
		Ok(())
	}

	pub(crate) fn parse(src: &mut Cursor<&[u8]>) -> Result<Self, DecodeError> {
		let mut properties = Self::default();
		let len = codec::get_var(src)?;
		let end = src.position() as usize + len;
		if end > src.get_ref().len() {
			return Err(DecodeError::PacketShort);
		}

		while (src.position() as usize) < end {
			match codec::get_u8(src)? {
				SESSION_EXPIRY_INTERVAL => {
					properties.session_expiry = Some(codec::get_u32(src)?);
				}
				RECEIVE_MAXIMUM => {
					properties.receive_max = Some(codec::get_u16(src)?);
				}
				MAXIMUM_PACKET_SIZE => {
					properties.max_packet_size = Some(codec::get_u32(src)?);
				}
				TOPIC_ALIAS_MAXIMUM => {
					properties.topic_alias_max = Some(codec::get_u16(src)?);
				}
				REQUEST_RESPONSE_INFO => {
					properties.request_response_info = get_bool(src)?;
				}
				REQUEST_PROBLEM_INFO => {
					properties.disable_problem_info = !get_bool(src)?;
				}
				USER_PROPERTY => {
					let key = String::from(codec::get_str(src)?);
					let value = String::from(codec::get_str(src)?);
					properties.user_properties.push((key, value));
				}
				AUTH_METHOD => {
					properties.auth_method = Some(String::from(codec::get_str(src)?));
				}
				AUTH_DATA => {
					properties.auth_data = Some(codec::get_bin(src)?);
				}
				unknown => return Err(DecodeError::UnknownPropertyId(unknown as u32)),
			}
		}

		Ok(properties)
	}
}

impl WillProperties {
	pub(crate) fn entries_len(&self) -> Result<usize, EncodeError> {
		let mut len = 0;
		if self.delay.is_some() {
			len += 5;
		}
		if self.payload_format_utf8 {
			len += 2;
		}
		if self.message_expiry.is_some() {
			len += 5;
		}
		if let Some(content_type) = &self.content_type {
			len += 1 + codec::str_len(content_type)?;
		}
		if let Some(topic) = &self.response_topic {
			len += 1 + codec::str_len(topic)?;
		}
		if let Some(data) = &self.correlation_data {
			len += 1 + codec::bin_len(data)?;
		}
		len += user_properties_len(&self.user_properties)?;
		Ok(len)
	}

	pub(crate) fn encoded_len(&self) -> Result<usize, EncodeError> {
		let entries = self.entries_len()?;
		Ok(codec::uvarint_size(entries) + entries)
	}

	pub(crate) fn encode(&self, dst: &mut impl BufMut) -> Result<(), EncodeError> {
		codec::put_var(dst, self.entries_len()?)?;
		if let Some(delay) = self.delay {
			codec::put_u8(dst, WILL_DELAY_INTERVAL);
			codec::put_u32(dst, delay);
		}
		if self.payload_format_utf8 {
			codec::put_u8(dst, PAYLOAD_FORMAT_INDICATOR);
			codec::put_u8(dst, 1);
		}
		if let Some(expiry) = self.message_expiry {
			codec::put_u8(dst, MESSAGE_EXPIRY_INTERVAL);
			codec::put_u32(dst, expiry);
		}
		if let Some(content_type) = &self.content_type {
			codec::put_u8(dst, CONTENT_TYPE);
			codec::put_str(dst, content_type)?;
		}
		if let Some(topic) = &self.response_topic {
			codec::put_u8(dst, RESPONSE_TOPIC);
			codec::put_str(dst, topic)?;
		}
		if let Some(data) = &self.correlation_data {
			codec::put_u8(dst, CORRELATION_DATA);
			codec::put_bin(dst, data)?;
		}
		for (key, value) in &self.user_properties {
			codec::put_u8(dst, USER_PROPERTY);
			codec::put_str(dst, key)?;
			codec::put_str(dst, value)?;
		}
		Ok(())
	}

	pub(crate) fn parse(src: &mut Cursor<&[u8]>) -> Result<Self, DecodeError> {
		let mut properties = Self::default();
		let len = codec::get_var(src)?;
		let end = src.position() as usize + len;
		if end > src.get_ref().len() {
			return Err(DecodeError::PacketShort);
		}

		while (src.position() as usize) < end {
			match codec::get_u8(src)? {
				WILL_DELAY_INTERVAL => {
					properties.delay = Some(codec::get_u32(src)?);
				}
				PAYLOAD_FORMAT_INDICATOR => {
					properties.payload_format_utf8 = get_bool(src)?;
				}
				MESSAGE_EXPIRY_INTERVAL => {
					properties.message_expiry = Some(codec::get_u32(src)?);
				}
				CONTENT_TYPE => {
					properties.content_type = Some(String::from(codec::get_str(src)?));
				}
				RESPONSE_TOPIC => {
					properties.response_topic = Some(String::from(codec::get_str(src)?));
				}
				CORRELATION_DATA => {
					properties.correlation_data = Some(codec::get_bin(src)?);
				}
				USER_PROPERTY => {
					let key = String::from(codec::get_str(src)?);
					let value = String::from(codec::get_str(src)?);
					properties.user_properties.push((key, value));
				}
				unknown => return Err(DecodeError::UnknownPropertyId(unknown as u32)),
			}
		}

		Ok(properties)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bytes::BytesMut;

	#[test]
	fn connect_properties_round_trip() {
		let properties = ConnectProperties {
			session_expiry: Some(123_456),
			receive_max: Some(10),
			max_packet_size: Some(4096),
			topic_alias_max: Some(7),
			request_response_info: true,
			disable_problem_info: true,
			user_properties: vec![(String::from("key"), String::from("value"))],
			auth_method: Some(String::from("Trusty auth")),
			auth_data: Some(Bytes::from_static(b"authorize me pls")),
		};

		let mut buf = BytesMut::new();
		properties.encode(&mut buf).unwrap();
		assert_eq!(buf.len(), properties.encoded_len().unwrap());

		let mut cursor = Cursor::new(&buf[..]);
		assert_eq!(ConnectProperties::parse(&mut cursor).unwrap(), properties);
	}

	#[test]
	fn empty_list_is_one_byte() {
		let properties = ConnectProperties::default();
		let mut buf = BytesMut::new();
		properties.encode(&mut buf).unwrap();
		assert_eq!(&buf[..], &[0x00]);
	}

	#[test]
	fn unknown_property_id_is_rejected() {
		// length 3, id 0x7f (unassigned), two value bytes
		let raw = [0x03, 0x7f, 0x00, 0x00];
		let mut cursor = Cursor::new(&raw[..]);
		assert!(matches!(
			ConnectProperties::parse(&mut cursor),
			Err(DecodeError::UnknownPropertyId(0x7f))
		));
	}

	#[test]
	fn will_properties_round_trip() {
		let properties = WillProperties {
			delay: Some(1_234_567),
			payload_format_utf8: true,
			message_expiry: Some(u32::MAX),
			content_type: Some(String::from("application/grbg")),
			response_topic: Some(String::from("rsp/here/pls")),
			correlation_data: Some(Bytes::from_static(b"correlate this!")),
			user_properties: vec![(String::from("this"), String::from("is"))],
		};

		let mut buf = BytesMut::new();
		properties.encode(&mut buf).unwrap();
		assert_eq!(buf.len(), properties.encoded_len().unwrap());

		let mut cursor = Cursor::new(&buf[..]);
		assert_eq!(WillProperties::parse(&mut cursor).unwrap(), properties);
	}

	#[test]
	fn truncated_list_is_short() {
		// declares 5 bytes of entries but only 2 follow
		let raw = [0x05, 0x11, 0x00];
		let mut cursor = Cursor::new(&raw[..]);
		assert!(matches!(
			ConnectProperties::parse(&mut cursor),
			Err(DecodeError::PacketShort)
		));
	}
}
