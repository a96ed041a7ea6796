use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::app_error::{connection_reset, map_eof};
use crate::codec::HEADER_SIZE;
use crate::{AppError, AppResult};

/// Decoder for length-prefixed framing: a 4-byte big-endian length, then
/// exactly that many payload bytes. Both header and body are complete
/// reads, so the state machine is just the alternation between them.
#[derive(Debug)]
pub struct LengthPrefixedDecoder {
    max_message_size: usize,
    body: BytesMut,
}

impl LengthPrefixedDecoder {
    pub fn new(max_message_size: usize) -> LengthPrefixedDecoder {
        LengthPrefixedDecoder {
            max_message_size,
            body: BytesMut::new(),
        }
    }

    pub async fn read_message<'a, R>(&'a mut self, reader: &mut R) -> AppResult<Option<&'a [u8]>>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; HEADER_SIZE];
        let mut filled = 0;
        while filled < HEADER_SIZE {
            let n = reader.read(&mut header[filled..]).await?;
            if n == 0 {
                // EOF before the first header byte is a clean close;
                // anywhere later the peer abandoned a frame.
                return if filled == 0 {
                    Ok(None)
                } else {
                    Err(connection_reset())
                };
            }
            filled += n;
        }

        let length = u32::from_be_bytes(header) as usize;
        if length > self.max_message_size {
            return Err(AppError::MaxMessageSizeExceeded(
                length,
                self.max_message_size,
            ));
        }

        self.body = BytesMut::zeroed(length);
        reader.read_exact(&mut self.body).await.map_err(map_eof)?;
        Ok(Some(&self.body))
    }
}
