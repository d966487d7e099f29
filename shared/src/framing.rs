//! Length-prefixed message framing
//!
//! Every message on the wire is a single frame:
//!
//! ```text
//! <FRAME_MARKER><8 ASCII decimal digits, zero padded><payload of that many bytes>
//! ```
//!
//! The reader discards anything that precedes a marker byte, so stray bytes
//! between frames are skipped rather than tearing the connection down.

use crate::error::ProtocolError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Byte that opens every frame
pub const FRAME_MARKER: u8 = b'\n';
/// Width of the decimal length field
pub const LENGTH_DIGITS: usize = 8;
/// Largest payload the length field can describe
pub const MAX_PAYLOAD_LEN: usize = 99_999_999;
/// Payload bytes reserved before any have arrived
const INITIAL_PAYLOAD_CAPACITY: usize = 4096;

/// Builds a complete frame around `payload`
pub fn encode(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge(payload.len()));
    }

    let mut frame = Vec::with_capacity(1 + LENGTH_DIGITS + payload.len());
    frame.push(FRAME_MARKER);
    frame.extend_from_slice(format!("{:0width$}", payload.len(), width = LENGTH_DIGITS).as_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Parses the 8-byte length field
fn parse_length(digits: &[u8; LENGTH_DIGITS]) -> Result<usize, ProtocolError> {
    if !digits.iter().all(u8::is_ascii_digit) {
        return Err(ProtocolError::Framing(
            String::from_utf8_lossy(digits).into_owned(),
        ));
    }

    Ok(digits
        .iter()
        .fold(0usize, |len, digit| len * 10 + usize::from(digit - b'0')))
}

/// Reads exactly one frame from `stream` and returns its payload
///
/// Suspends until a full frame is available. Bytes before the marker are
/// dropped. A stream that ends part-way through yields `ConnectionClosed`.
pub async fn read_frame<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Vec<u8>, ProtocolError> {
    // Scan byte by byte so nothing past the current frame is consumed
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte).await?;
        if byte[0] == FRAME_MARKER {
            break;
        }
    }

    let mut digits = [0u8; LENGTH_DIGITS];
    stream.read_exact(&mut digits).await?;
    let len = parse_length(&digits)?;

    // The buffer grows with the bytes that arrive, not with the claimed length
    let mut payload = Vec::with_capacity(len.min(INITIAL_PAYLOAD_CAPACITY));
    let read = (&mut *stream).take(len as u64).read_to_end(&mut payload).await?;
    if read < len {
        return Err(ProtocolError::ConnectionClosed);
    }
    Ok(payload)
}

/// Frames `payload` and writes it to `stream`
pub async fn write_frame<W: AsyncWrite + Unpin>(
    stream: &mut W,
    payload: &[u8],
) -> Result<(), ProtocolError> {
    let frame = encode(payload)?;
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn test_encode_layout() {
        let frame = encode(b"{\"players\":[]}").unwrap();
        assert_eq!(frame, b"\n00000014{\"players\":[]}".to_vec());
    }

    #[test]
    fn test_encode_empty_payload() {
        assert_eq!(encode(b"").unwrap(), b"\n00000000".to_vec());
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let payload = vec![b'a'; MAX_PAYLOAD_LEN + 1];
        match encode(&payload) {
            Err(ProtocolError::PayloadTooLarge(len)) => assert_eq!(len, MAX_PAYLOAD_LEN + 1),
            other => panic!("Expected PayloadTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_length() {
        assert_eq!(parse_length(b"00000000").unwrap(), 0);
        assert_eq!(parse_length(b"00001234").unwrap(), 1234);
        assert_eq!(parse_length(b"99999999").unwrap(), MAX_PAYLOAD_LEN);
        assert!(matches!(
            parse_length(b"0000 12a"),
            Err(ProtocolError::Framing(_))
        ));
        assert!(matches!(
            parse_length(b"-0000001"),
            Err(ProtocolError::Framing(_))
        ));
    }

    #[tokio::test]
    async fn test_read_frame_roundtrip() {
        let payload = br#"{"x":10,"y":10,"id":1000,"in_game":true}"#;
        let frame = encode(payload).unwrap();
        let mut stream = &frame[..];

        let decoded = read_frame(&mut stream).await.unwrap();
        assert_eq!(decoded, payload.to_vec());
        assert!(stream.is_empty());
    }

    #[tokio::test]
    async fn test_read_frame_skips_leading_garbage() {
        let mut bytes = b"garbage\x00\xff12345".to_vec();
        bytes.extend(encode(b"hello").unwrap());
        let mut stream = &bytes[..];

        assert_eq!(read_frame(&mut stream).await.unwrap(), b"hello".to_vec());
    }

    #[tokio::test]
    async fn test_read_frame_across_fragmented_reads() {
        let mut stream = Builder::new()
            .read(b"xx\n0000")
            .read(b"0005he")
            .read(b"llo")
            .build();

        assert_eq!(read_frame(&mut stream).await.unwrap(), b"hello".to_vec());
    }

    #[tokio::test]
    async fn test_read_frame_consecutive_frames() {
        let mut bytes = encode(b"first").unwrap();
        bytes.extend(encode(b"").unwrap());
        bytes.extend(encode(b"third").unwrap());
        let mut stream = &bytes[..];

        assert_eq!(read_frame(&mut stream).await.unwrap(), b"first".to_vec());
        assert_eq!(read_frame(&mut stream).await.unwrap(), Vec::<u8>::new());
        assert_eq!(read_frame(&mut stream).await.unwrap(), b"third".to_vec());
    }

    #[tokio::test]
    async fn test_read_frame_bad_length_then_recovers() {
        let mut bytes = b"\n12ab5678".to_vec();
        bytes.extend(encode(b"ok").unwrap());
        let mut stream = &bytes[..];

        assert!(matches!(
            read_frame(&mut stream).await,
            Err(ProtocolError::Framing(_))
        ));
        assert_eq!(read_frame(&mut stream).await.unwrap(), b"ok".to_vec());
    }

    #[tokio::test]
    async fn test_read_frame_eof_before_marker() {
        let mut stream: &[u8] = b"no marker here";
        assert!(matches!(
            read_frame(&mut stream).await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_read_frame_eof_inside_length() {
        let mut stream: &[u8] = b"\n0000";
        assert!(matches!(
            read_frame(&mut stream).await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_read_frame_eof_inside_payload() {
        let mut stream: &[u8] = b"\n00000010short";
        assert!(matches!(
            read_frame(&mut stream).await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_read_frame_huge_claim_short_body() {
        let mut stream = Builder::new().read(b"\n99999999").read(b"abc").build();
        assert!(matches!(
            read_frame(&mut stream).await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_read_frame_payload_larger_than_reserve() {
        let payload = vec![b'p'; INITIAL_PAYLOAD_CAPACITY * 3 + 17];
        let frame = encode(&payload).unwrap();

        let mut builder = Builder::new();
        for chunk in frame.chunks(1000) {
            builder.read(chunk);
        }
        let mut stream = builder.build();

        assert_eq!(read_frame(&mut stream).await.unwrap(), payload);
    }

    #[tokio::test]
    async fn test_write_frame() {
        let mut stream = Builder::new().write(b"\n00000002hi").build();
        write_frame(&mut stream, b"hi").await.unwrap();
    }
}
