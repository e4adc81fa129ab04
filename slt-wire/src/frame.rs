use bytes::{BufMut, Bytes, BytesMut};
use slt_core::{Result, SlateError, SLATE_MAGIC};

use crate::PROTOCOL_VERSION;

/// Frame header layout:
/// magic(4) | version(1) | method(1) | reserved(2) | payload_len(4) | payload_crc(4)
pub const FRAME_HEADER_SIZE: usize = 16;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcMethod {
    // Master catalog plane (0x01-0x0F)
    CreateTable = 0x01,
    IsCreateTableDone = 0x02,
    AlterTable = 0x03,
    IsAlterTableDone = 0x04,
    DeleteTable = 0x05,
    GetTableSchema = 0x06,
    GetTableLocations = 0x07,

    // Tablet-server data plane (0x20-0x2F)
    Write = 0x20,
    Scan = 0x21,

    /// Transport-level failure (malformed request, unknown method).
    ErrorResponse = 0xFF,
}

impl TryFrom<u8> for RpcMethod {
    type Error = SlateError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::CreateTable),
            0x02 => Ok(Self::IsCreateTableDone),
            0x03 => Ok(Self::AlterTable),
            0x04 => Ok(Self::IsAlterTableDone),
            0x05 => Ok(Self::DeleteTable),
            0x06 => Ok(Self::GetTableSchema),
            0x07 => Ok(Self::GetTableLocations),
            0x20 => Ok(Self::Write),
            0x21 => Ok(Self::Scan),
            0xFF => Ok(Self::ErrorResponse),
            other => Err(SlateError::Protocol(format!(
                "unknown RPC method {:#04x}",
                other
            ))),
        }
    }
}

/// A single request or response on the wire. Responses echo the
/// request's method byte.
#[derive(Debug, Clone)]
pub struct Frame {
    pub method: RpcMethod,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(method: RpcMethod, payload: Bytes) -> Self {
        Self { method, payload }
    }
}

pub fn encode_frame(frame: &Frame) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + frame.payload.len());
    buf.put_slice(&SLATE_MAGIC);
    buf.put_u8(PROTOCOL_VERSION);
    buf.put_u8(frame.method as u8);
    buf.put_slice(&[0u8; 2]);
    buf.put_u32_le(frame.payload.len() as u32);
    buf.put_u32_le(crc32fast::hash(&frame.payload));
    buf.put_slice(&frame.payload);
    buf.freeze()
}

/// Parse one frame from the front of `buf`. Returns `Ok(None)` when the
/// buffer does not yet hold a complete frame, otherwise the frame and
/// the number of bytes consumed.
pub fn parse_frame(buf: &[u8]) -> Result<Option<(Frame, usize)>> {
    if buf.len() < FRAME_HEADER_SIZE {
        return Ok(None);
    }
    if buf[0..4] != SLATE_MAGIC {
        return Err(SlateError::InvalidMagic);
    }
    let version = buf[4];
    if version != PROTOCOL_VERSION {
        return Err(SlateError::UnsupportedVersion(version));
    }
    let method = RpcMethod::try_from(buf[5])?;

    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&buf[8..12]);
    let payload_len = u32::from_le_bytes(len_bytes) as usize;

    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&buf[12..16]);
    let expected_crc = u32::from_le_bytes(crc_bytes);

    let total = FRAME_HEADER_SIZE + payload_len;
    if buf.len() < total {
        return Ok(None);
    }

    let payload = Bytes::copy_from_slice(&buf[FRAME_HEADER_SIZE..total]);
    let actual_crc = crc32fast::hash(&payload);
    if actual_crc != expected_crc {
        return Err(SlateError::CrcMismatch {
            expected: expected_crc,
            actual: actual_crc,
        });
    }

    Ok(Some((Frame { method, payload }, total)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let frame = Frame::new(RpcMethod::Scan, Bytes::from_static(b"{\"x\":1}"));
        let encoded = encode_frame(&frame);

        let (parsed, consumed) = parse_frame(&encoded).unwrap().unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(parsed.method, RpcMethod::Scan);
        assert_eq!(parsed.payload, frame.payload);
    }

    #[test]
    fn test_partial_buffer() {
        let frame = Frame::new(RpcMethod::CreateTable, Bytes::from_static(b"payload"));
        let encoded = encode_frame(&frame);

        // Header-only and mid-payload reads are both incomplete.
        assert!(parse_frame(&encoded[..10]).unwrap().is_none());
        assert!(parse_frame(&encoded[..encoded.len() - 1]).unwrap().is_none());
    }

    #[test]
    fn test_bad_magic() {
        let frame = Frame::new(RpcMethod::Write, Bytes::new());
        let mut encoded = encode_frame(&frame).to_vec();
        encoded[0] = b'X';
        assert!(matches!(
            parse_frame(&encoded),
            Err(SlateError::InvalidMagic)
        ));
    }

    #[test]
    fn test_corrupt_payload() {
        let frame = Frame::new(RpcMethod::Write, Bytes::from_static(b"abcdef"));
        let mut encoded = encode_frame(&frame).to_vec();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;
        assert!(matches!(
            parse_frame(&encoded),
            Err(SlateError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_two_frames_consume_one() {
        let a = encode_frame(&Frame::new(RpcMethod::Scan, Bytes::from_static(b"a")));
        let b = encode_frame(&Frame::new(RpcMethod::Write, Bytes::from_static(b"bb")));
        let mut joined = a.to_vec();
        joined.extend_from_slice(&b);

        let (first, consumed) = parse_frame(&joined).unwrap().unwrap();
        assert_eq!(first.method, RpcMethod::Scan);
        assert_eq!(consumed, a.len());

        let (second, _) = parse_frame(&joined[consumed..]).unwrap().unwrap();
        assert_eq!(second.method, RpcMethod::Write);
    }
}
