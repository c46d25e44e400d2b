//! Low-level wire primitives: the remaining-length varint, length-
//! prefixed UTF-8 strings and binary blobs, and big-endian scalars.
use crate::{
	packets::{DecodeError, EncodeError},
	PacketId,
};
use bytes::{Buf, BufMut, Bytes};
use std::{io::Cursor, str::from_utf8};

/// Largest value representable by the 4-byte remaining-length varint.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Returns the encoded width in bytes of `value` as a remaining-length
/// varint. Values above [`MAX_REMAINING_LENGTH`] are not encodable.
#[inline]
pub const fn uvarint_size(value: usize) -> usize {
	match value {
		0..=0x7f => 1,
		0x80..=0x3fff => 2,
		0x4000..=0x1f_ffff => 3,
		_ => 4,
	}
}

pub(crate) fn require(src: &Cursor<&[u8]>, len: usize) -> Result<(), DecodeError> {
	if src.remaining() < len {
		Err(DecodeError::PacketShort)
	} else {
		Ok(())
	}
}

pub(crate) fn get_u8(src: &mut Cursor<&[u8]>) -> Result<u8, DecodeError> {
	require(src, 1)?;
	Ok(src.get_u8())
}

pub(crate) fn get_u16(src: &mut Cursor<&[u8]>) -> Result<u16, DecodeError> {
	require(src, 2)?;
	Ok(src.get_u16())
}

pub(crate) fn get_u32(src: &mut Cursor<&[u8]>) -> Result<u32, DecodeError> {
	require(src, 4)?;
	Ok(src.get_u32())
}

pub(crate) fn get_id(src: &mut Cursor<&[u8]>) -> Result<PacketId, DecodeError> {
	let id = get_u16(src)?;
	PacketId::new(id).ok_or(DecodeError::ProtocolViolation("zero packet identifier"))
}

pub(crate) fn get_slice<'s>(src: &mut Cursor<&'s [u8]>, len: usize) -> Result<&'s [u8], DecodeError> {
	require(src, len)?;
	let position = src.position() as usize;
	src.advance(len);
	Ok(&src.get_ref()[position..position + len])
}

pub(crate) fn get_str<'s>(src: &mut Cursor<&'s [u8]>) -> Result<&'s str, DecodeError> {
	let len = get_u16(src)? as usize;
	let slice = get_slice(src, len)?;
	from_utf8(slice).map_err(|_| DecodeError::ProtocolViolation("string is not valid UTF-8"))
}

pub(crate) fn get_bin(src: &mut Cursor<&[u8]>) -> Result<Bytes, DecodeError> {
	let len = get_u16(src)? as usize;
	let slice = get_slice(src, len)?;
	Ok(Bytes::copy_from_slice(slice))
}

pub(crate) fn get_var(src: &mut Cursor<&[u8]>) -> Result<usize, DecodeError> {
	let mut value = 0;
	for multiplier in [0x01, 0x80, 0x4000, 0x20_0000, usize::MAX] {
		// A fifth byte means the varint is malformed.
		if multiplier == usize::MAX {
			return Err(DecodeError::VarintTooLong);
		}

		let encoded = get_u8(src)? as usize;
		value += (encoded & 0x7f) * multiplier;

		if encoded & 0x80 == 0 {
			break;
		}
	}

	Ok(value)
}

pub(crate) fn put_u8(dst: &mut impl BufMut, value: u8) {
	dst.put_u8(value);
}

pub(crate) fn put_u16(dst: &mut impl BufMut, value: u16) {
	dst.put_u16(value);
}

pub(crate) fn put_u32(dst: &mut impl BufMut, value: u32) {
	dst.put_u32(value);
}

pub(crate) fn put_slice(dst: &mut impl BufMut, slice: &[u8]) {
	dst.put_slice(slice);
}

pub(crate) fn put_str(dst: &mut impl BufMut, s: &str) -> Result<(), EncodeError> {
	if s.len() > u16::MAX as usize {
		return Err(EncodeError::StringTooLong);
	}
	put_u16(dst, s.len() as u16);
	put_slice(dst, s.as_bytes());
	Ok(())
}

pub(crate) fn put_bin(dst: &mut impl BufMut, data: &[u8]) -> Result<(), EncodeError> {
	if data.len() > u16::MAX as usize {
		return Err(EncodeError::StringTooLong);
	}
	put_u16(dst, data.len() as u16);
	put_slice(dst, data);
	Ok(())
}

pub(crate) fn put_var(dst: &mut impl BufMut, mut value: usize) -> Result<(), EncodeError> {
	if value > MAX_REMAINING_LENGTH {
		return Err(EncodeError::VarintTooLong);
	}

	loop {
		let mut encoded = value % 0x80;
		value /= 0x80;
		if value > 0 {
			encoded |= 0x80;
		}
		put_u8(dst, encoded as u8);
		if value == 0 {
			break Ok(());
		}
	}
}

/// Validated length of a string field as encoded on the wire.
pub(crate) fn str_len(s: &str) -> Result<usize, EncodeError> {
	if s.len() > u16::MAX as usize {
		return Err(EncodeError::StringTooLong);
	}
	Ok(2 + s.len())
}

/// Validated length of a binary field as encoded on the wire.
pub(crate) fn bin_len(data: &[u8]) -> Result<usize, EncodeError> {
	if data.len() > u16::MAX as usize {
		return Err(EncodeError::StringTooLong);
	}
	Ok(2 + data.len())
}

#[cfg(test)]
mod tests {
	use super::*;
	use bytes::BytesMut;

	#[test]
	fn varint_round_trips() {
		for (value, width) in [
			(0, 1),
			(1, 1),
			(127, 1),
			(128, 2),
			(16_383, 2),
			(16_384, 3),
			(2_097_151, 3),
			(2_097_152, 4),
			(MAX_REMAINING_LENGTH, 4),
		] {
			let mut buf = BytesMut::new();
			put_var(&mut buf, value).unwrap();
			assert_eq!(buf.len(), width);
			assert_eq!(uvarint_size(value), width);

			let mut cursor = Cursor::new(&buf[..]);
			assert_eq!(get_var(&mut cursor).unwrap(), value);
		}
	}

	#[test]
	fn varint_bounds() {
		let mut buf = BytesMut::new();
		assert!(matches!(
			put_var(&mut buf, MAX_REMAINING_LENGTH + 1),
			Err(EncodeError::VarintTooLong)
		));

		// A fifth continuation byte is rejected.
		let malformed = [0xff, 0xff, 0xff, 0xff, 0x01];
		let mut cursor = Cursor::new(&malformed[..]);
		assert!(matches!(
			get_var(&mut cursor),
			Err(DecodeError::VarintTooLong)
		));
	}

	#[test]
	fn varint_short_read() {
		let truncated = [0x80, 0x80];
		let mut cursor = Cursor::new(&truncated[..]);
		assert!(matches!(get_var(&mut cursor), Err(DecodeError::PacketShort)));
	}

	#[test]
	fn strings_round_trip() {
		let mut buf = BytesMut::new();
		put_str(&mut buf, "foo/bar").unwrap();
		assert_eq!(&buf[..], &[0x00, 0x07, b'f', b'o', b'o', b'/', b'b', b'a', b'r']);

		let mut cursor = Cursor::new(&buf[..]);
		assert_eq!(get_str(&mut cursor).unwrap(), "foo/bar");
	}

	#[test]
	fn oversized_string_is_rejected() {
		let huge = "x".repeat(u16::MAX as usize + 1);
		let mut buf = BytesMut::new();
		assert!(matches!(
			put_str(&mut buf, &huge),
			Err(EncodeError::StringTooLong)
		));
		assert!(buf.is_empty());
		assert!(matches!(str_len(&huge), Err(EncodeError::StringTooLong)));
	}

	#[test]
	fn short_string_read_fails() {
		let truncated = [0x00, 0x05, b'a', b'b'];
		let mut cursor = Cursor::new(&truncated[..]);
		assert!(matches!(get_str(&mut cursor), Err(DecodeError::PacketShort)));
	}

	#[test]
	fn scalars_are_big_endian() {
		let mut buf = BytesMut::new();
		put_u16(&mut buf, 0x1234);
		put_u32(&mut buf, 0xdead_beef);
		assert_eq!(&buf[..], &[0x12, 0x34, 0xde, 0xad, 0xbe, 0xef]);

		let mut cursor = Cursor::new(&buf[..]);
		assert_eq!(get_u16(&mut cursor).unwrap(), 0x1234);
		assert_eq!(get_u32(&mut cursor).unwrap(), 0xdead_beef);
	}

	#[test]
	fn zero_packet_id_is_rejected() {
		let zero = [0x00, 0x00];
		let mut cursor = Cursor::new(&zero[..]);
		assert!(get_id(&mut cursor).is_err());
	}
}
