use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::app_error::{connection_reset, map_eof};
use crate::{AppError, AppResult};

/// Decoder for netstring framing: `<decimal-length>:<payload>,`.
///
/// Netstrings are surprisingly awkward to read asynchronously: the length
/// is variable-width, so there is no fixed header to complete-read, and a
/// chunk sized for the header may contain anything from a partial length
/// to several whole small netstrings. Header bytes are therefore gathered
/// through a scratch buffer bounded at `digits(max_message_size) + 1`
/// bytes; a length that cannot announce itself within that bound is
/// malformed. Once the length is known the body is a complete read of
/// `length + 1` bytes, and whatever already arrived past the colon is
/// carried over as the start of it. Leftover bytes beyond a complete
/// message stay in the pending buffer and are parsed on the next call, so
/// a stream of tiny netstrings costs no stack.
#[derive(Debug)]
pub struct NetstringDecoder {
    max_message_size: usize,
    header_capacity: usize,
    scratch: Vec<u8>,
    /// Bytes read but not yet consumed by a parse; never grows past
    /// `header_capacity`.
    pending: BytesMut,
    /// Storage for the most recently emitted message.
    frame: BytesMut,
}

impl NetstringDecoder {
    pub fn new(max_message_size: usize) -> NetstringDecoder {
        let header_capacity = max_message_size.to_string().len() + 1;
        NetstringDecoder {
            max_message_size,
            header_capacity,
            scratch: vec![0; header_capacity],
            pending: BytesMut::with_capacity(header_capacity),
            frame: BytesMut::new(),
        }
    }

    pub async fn read_message<'a, R>(&'a mut self, reader: &mut R) -> AppResult<Option<&'a [u8]>>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let mut colon = None;
            for (i, byte) in self.pending.iter().copied().enumerate() {
                match byte {
                    b':' => {
                        colon = Some(i);
                        break;
                    }
                    b'0'..=b'9' => {}
                    other => {
                        return Err(AppError::NetstringMalformedHeader(format!(
                            "unexpected byte {:#04x} in length",
                            other
                        )))
                    }
                }
            }

            let Some(colon) = colon else {
                if self.pending.len() >= self.header_capacity {
                    return Err(AppError::NetstringMalformedHeader(format!(
                        "no ':' within {} bytes",
                        self.header_capacity
                    )));
                }
                let want = self.header_capacity - self.pending.len();
                let n = reader.read(&mut self.scratch[..want]).await?;
                if n == 0 {
                    return if self.pending.is_empty() {
                        Ok(None)
                    } else {
                        Err(connection_reset())
                    };
                }
                self.pending.extend_from_slice(&self.scratch[..n]);
                continue;
            };

            let length = std::str::from_utf8(&self.pending[..colon])
                .ok()
                .and_then(|digits| digits.parse::<usize>().ok())
                .ok_or_else(|| {
                    AppError::NetstringMalformedHeader("unparseable length".to_string())
                })?;
            if length > self.max_message_size {
                return Err(AppError::MaxMessageSizeExceeded(
                    length,
                    self.max_message_size,
                ));
            }

            // payload plus the trailing ','
            let body_total = length + 1;
            let superfluous = self.pending.len() - colon - 1;

            if superfluous >= body_total {
                // the whole message already arrived with the header
                let mut body = self.pending.split_to(colon + 1 + body_total);
                body.advance(colon + 1);
                if body[length] != b',' {
                    return Err(AppError::NetstringDelimiterNotFound);
                }
                self.frame = body;
                return Ok(Some(&self.frame[..length]));
            }

            let mut body = BytesMut::zeroed(body_total);
            body[..superfluous].copy_from_slice(&self.pending[colon + 1..]);
            self.pending.clear();
            reader
                .read_exact(&mut body[superfluous..])
                .await
                .map_err(map_eof)?;
            if body[length] != b',' {
                return Err(AppError::NetstringDelimiterNotFound);
            }
            self.frame = body;
            return Ok(Some(&self.frame[..length]));
        }
    }
}
