use tokio::io::{AsyncRead, AsyncReadExt};

use crate::app_error::connection_reset;
use crate::{AppError, AppResult};

/// Decoder for delimiter framing: a configured byte sequence terminates
/// each message.
///
/// A single growable buffer holds both the message being scanned and any
/// bytes read beyond it. Rather than rotating or copying on every message,
/// the buffer is only moved or resized when one of three conditions holds:
///
/// - A: a message was just emitted and less than 5% of the buffer remains
///   behind it, so the pending tail is moved to the front and the buffer
///   resized to `max(initial, tail)` — the one place the buffer shrinks.
/// - B: a read filled the buffer and the partial message occupies more
///   than 80% of it, so the buffer is doubled in place; it would not fit
///   after a move anyway.
/// - C: a read filled the buffer but the partial message occupies no more
///   than 80%, so the message is moved to the front without resizing.
///
/// The thresholds are heuristics carried from long use, not tuning runs.
#[derive(Debug)]
pub struct DelimitedDecoder {
    delimiter: Vec<u8>,
    max_message_size: usize,
    initial_buffer_size: usize,
    buf: Vec<u8>,
    /// Offset of the first byte of the in-progress message.
    message_start: usize,
    /// Bytes of the in-progress message scanned so far.
    read_progress: usize,
    /// Length of the suffix of the scanned bytes that matches a prefix of
    /// the delimiter.
    delimiter_progress: usize,
    /// End of valid data in `buf`.
    data_end: usize,
    /// Rule A is evaluated after the emitted message has been delivered,
    /// which in this pull interface means on the next call.
    compact_after_emit: bool,
}

impl DelimitedDecoder {
    pub fn new(
        delimiter: Vec<u8>,
        max_message_size: usize,
        initial_buffer_size: usize,
    ) -> DelimitedDecoder {
        debug_assert!(!delimiter.is_empty());
        let initial_buffer_size = initial_buffer_size.max(1);
        DelimitedDecoder {
            delimiter,
            max_message_size,
            initial_buffer_size,
            buf: vec![0; initial_buffer_size],
            message_start: 0,
            read_progress: 0,
            delimiter_progress: 0,
            data_end: 0,
            compact_after_emit: false,
        }
    }

    /// Current logical size of the read buffer.
    #[cfg(test)]
    fn buffer_size(&self) -> usize {
        self.buf.len()
    }

    pub async fn read_message<'a, R>(&'a mut self, reader: &mut R) -> AppResult<Option<&'a [u8]>>
    where
        R: AsyncRead + Unpin,
    {
        if self.compact_after_emit {
            self.compact_after_emit = false;
            let space_behind = self.buf.len() - self.message_start;
            if space_behind < self.buf.len().div_ceil(20) {
                // A
                let tail = self.data_end - self.message_start;
                self.buf.copy_within(self.message_start..self.data_end, 0);
                self.buf.resize(self.initial_buffer_size.max(tail), 0);
                self.message_start = 0;
                self.data_end = tail;
            }
        }

        loop {
            while self.message_start + self.read_progress < self.data_end {
                let byte = self.buf[self.message_start + self.read_progress];
                if byte == self.delimiter[self.delimiter_progress] {
                    self.delimiter_progress += 1;
                } else {
                    self.delimiter_progress = 0;
                }
                if self.delimiter_progress == self.delimiter.len() {
                    let start = self.message_start;
                    let length = self.read_progress + 1 - self.delimiter.len();
                    self.message_start += self.read_progress + 1;
                    self.read_progress = 0;
                    self.delimiter_progress = 0;
                    self.compact_after_emit = true;
                    return Ok(Some(&self.buf[start..start + length]));
                }
                self.read_progress += 1;
            }

            if self.message_start + self.read_progress == self.buf.len() {
                if self.read_progress * 5 > self.buf.len() * 4 {
                    // B
                    let doubled = self.buf.len() * 2;
                    self.buf.resize(doubled, 0);
                } else {
                    // C
                    self.buf.copy_within(self.message_start..self.data_end, 0);
                    self.message_start = 0;
                    self.data_end = self.read_progress;
                }
            }

            if self.read_progress > self.max_message_size {
                return Err(AppError::MaxMessageSizeExceeded(
                    self.read_progress,
                    self.max_message_size,
                ));
            }

            let write_from = self.message_start + self.read_progress;
            let n = reader.read(&mut self.buf[write_from..]).await?;
            if n == 0 {
                return if self.read_progress == 0 {
                    Ok(None)
                } else {
                    Err(connection_reset())
                };
            }
            self.data_end = write_from + n;
        }
    }
}
