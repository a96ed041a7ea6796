//! Framing Codec Implementation
//!
//! This module turns a TCP byte stream into whole application messages and
//! back, under one of three wire framings:
//!
//! - Length-prefixed: a 4-byte big-endian length followed by the payload
//! - Delimited: the payload followed by a configured byte sequence
//! - Netstring: `<decimal-length>:<payload>,`
//!
//! Encoding is stateless and produces one contiguous buffer per message.
//! Decoding is a per-connection state machine fed by reads of arbitrary
//! size; a decoder never assumes a chunk boundary lines up with a message
//! boundary, and it drains every complete message it already holds before
//! touching the socket again.
//!
//! The framing is chosen per connection at runtime through [`Framing`].

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::AppError::InvalidValue;
use crate::{AppError, AppResult, NetworkConfig};

pub use delimited::DelimitedDecoder;
pub use length_prefixed::LengthPrefixedDecoder;
pub use netstring::NetstringDecoder;

mod delimited;
mod length_prefixed;
mod netstring;

/// Width of the length-prefixed header on the wire.
pub const HEADER_SIZE: usize = 4;

/// Wire framing for a connection.
///
/// All connections produced by one listener or dialer share a framing, but
/// nothing stops a process from running different framings on different
/// endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    #[default]
    LengthPrefixed,
    /// Terminator byte sequence, at least one byte. Payloads are not
    /// escaped; the caller must ensure they never contain the delimiter.
    Delimited(Vec<u8>),
    Netstring,
}

impl Framing {
    pub fn validate(&self) -> AppResult<()> {
        match self {
            Framing::Delimited(delimiter) if delimiter.is_empty() => Err(InvalidValue(
                "delimiter",
                "must be at least one byte".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Frames `payload` for the wire.
///
/// Refuses payloads larger than `max_message_size` synchronously; nothing
/// is queued on failure.
pub fn encode_message(
    framing: &Framing,
    payload: &[u8],
    max_message_size: usize,
) -> AppResult<Bytes> {
    if payload.len() > max_message_size || payload.len() > u32::MAX as usize {
        return Err(AppError::MaxMessageSizeExceeded(
            payload.len(),
            max_message_size,
        ));
    }
    let framed = match framing {
        Framing::LengthPrefixed => {
            let mut buffer = BytesMut::with_capacity(HEADER_SIZE + payload.len());
            buffer.put_u32(payload.len() as u32);
            buffer.put_slice(payload);
            buffer
        }
        Framing::Delimited(delimiter) => {
            let mut buffer = BytesMut::with_capacity(payload.len() + delimiter.len());
            buffer.put_slice(payload);
            buffer.put_slice(delimiter);
            buffer
        }
        Framing::Netstring => {
            let header = format!("{}:", payload.len());
            let mut buffer = BytesMut::with_capacity(header.len() + payload.len() + 1);
            buffer.put_slice(header.as_bytes());
            buffer.put_slice(payload);
            buffer.put_u8(b',');
            buffer
        }
    };
    Ok(framed.freeze())
}

/// Per-connection read state machine, one variant per framing.
#[derive(Debug)]
pub enum FrameDecoder {
    LengthPrefixed(LengthPrefixedDecoder),
    Delimited(DelimitedDecoder),
    Netstring(NetstringDecoder),
}

impl FrameDecoder {
    pub fn new(framing: &Framing, config: &NetworkConfig) -> FrameDecoder {
        match framing {
            Framing::LengthPrefixed => {
                FrameDecoder::LengthPrefixed(LengthPrefixedDecoder::new(config.max_message_size))
            }
            Framing::Delimited(delimiter) => FrameDecoder::Delimited(DelimitedDecoder::new(
                delimiter.clone(),
                config.max_message_size,
                config.read_buffer_size,
            )),
            Framing::Netstring => {
                FrameDecoder::Netstring(NetstringDecoder::new(config.max_message_size))
            }
        }
    }

    /// Pulls the next whole message off `reader`.
    ///
    /// Returns `Ok(None)` when the peer closes the stream cleanly at a
    /// message boundary. A close in the middle of a message surfaces as a
    /// connection-reset error. After any error the decoder is unusable and
    /// no further reads may be issued.
    pub async fn read_message<'a, R>(&'a mut self, reader: &mut R) -> AppResult<Option<&'a [u8]>>
    where
        R: AsyncRead + Unpin,
    {
        match self {
            FrameDecoder::LengthPrefixed(decoder) => decoder.read_message(reader).await,
            FrameDecoder::Delimited(decoder) => decoder.read_message(reader).await,
            FrameDecoder::Netstring(decoder) => decoder.read_message(reader).await,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_length_prefixed() {
        let framed = encode_message(&Framing::LengthPrefixed, b"hello", 1024).unwrap();
        assert_eq!(&framed[..], b"\x00\x00\x00\x05hello");

        let empty = encode_message(&Framing::LengthPrefixed, b"", 1024).unwrap();
        assert_eq!(&empty[..], b"\x00\x00\x00\x00");
    }

    #[test]
    fn encode_delimited() {
        let framing = Framing::Delimited(b"\r\n".to_vec());
        let framed = encode_message(&framing, b"hello", 1024).unwrap();
        assert_eq!(&framed[..], b"hello\r\n");
    }

    #[test]
    fn encode_netstring() {
        let framed = encode_message(&Framing::Netstring, b"hello", 1024).unwrap();
        assert_eq!(&framed[..], b"5:hello,");

        let empty = encode_message(&Framing::Netstring, b"", 1024).unwrap();
        assert_eq!(&empty[..], b"0:,");
    }

    #[test]
    fn encode_refuses_oversize_synchronously() {
        for framing in [
            Framing::LengthPrefixed,
            Framing::Delimited(b"\n".to_vec()),
            Framing::Netstring,
        ] {
            let result = encode_message(&framing, b"too large", 4);
            assert!(matches!(
                result,
                Err(AppError::MaxMessageSizeExceeded(9, 4))
            ));
        }
    }

    #[test]
    fn empty_delimiter_is_rejected() {
        assert!(Framing::Delimited(Vec::new()).validate().is_err());
        assert!(Framing::Delimited(b"\n".to_vec()).validate().is_ok());
        assert!(Framing::LengthPrefixed.validate().is_ok());
    }

    #[tokio::test]
    async fn round_trip_all_framings() {
        let config = NetworkConfig::default();
        let payloads: Vec<Vec<u8>> = vec![
            Vec::new(),
            b"x".to_vec(),
            b"hello world".to_vec(),
            vec![0xA5; 4096],
        ];
        for framing in [
            Framing::LengthPrefixed,
            Framing::Delimited(b"\r\n".to_vec()),
            Framing::Netstring,
        ] {
            let mut stream = Vec::new();
            for payload in &payloads {
                let framed =
                    encode_message(&framing, payload, config.max_message_size).unwrap();
                stream.extend_from_slice(&framed);
            }
            let mut decoder = FrameDecoder::new(&framing, &config);
            let mut reader = testing::ChunkReader::whole(&stream);
            let messages = testing::collect_messages(&mut decoder, &mut reader)
                .await
                .unwrap();
            assert_eq!(messages, payloads, "framing {:?}", framing);
        }
    }

    #[tokio::test]
    async fn round_trip_survives_one_byte_chunks() {
        let config = NetworkConfig::default();
        let payloads: Vec<Vec<u8>> = vec![b"a".to_vec(), Vec::new(), b"chunky".to_vec()];
        for framing in [
            Framing::LengthPrefixed,
            Framing::Delimited(b"\r\n".to_vec()),
            Framing::Netstring,
        ] {
            let mut stream = Vec::new();
            for payload in &payloads {
                let framed =
                    encode_message(&framing, payload, config.max_message_size).unwrap();
                stream.extend_from_slice(&framed);
            }
            let mut decoder = FrameDecoder::new(&framing, &config);
            let mut reader = testing::ChunkReader::byte_by_byte(&stream);
            let messages = testing::collect_messages(&mut decoder, &mut reader)
                .await
                .unwrap();
            assert_eq!(messages, payloads, "framing {:?}", framing);
        }
    }
}
