use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// One newline-terminated unit read off a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// The line was not valid UTF-8.
    Invalid,
    /// The line exceeded the size cap; its bytes were skipped.
    Oversized,
}

/// Splits a byte stream into frames without ever buffering more than
/// `max_len` bytes of a single line. Cancel safe: partial lines are kept
/// across calls.
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
    line: Vec<u8>,
    max_len: usize,
    discarding: bool,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, max_len: usize) -> Self {
        Self {
            reader,
            line: Vec::new(),
            max_len,
            discarding: false,
        }
    }

    /// Next frame, or `None` at end of stream. A trailing line without a
    /// newline is discarded.
    pub async fn next_frame(&mut self) -> io::Result<Option<Frame>> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(None);
            }

            let newline = available.iter().position(|&b| b == b'\n');
            let body = match newline {
                Some(end) => &available[..end],
                None => available,
            };
            if !self.discarding {
                if self.line.len() + body.len() > self.max_len {
                    self.discarding = true;
                    self.line.clear();
                } else {
                    self.line.extend_from_slice(body);
                }
            }
            let consumed = newline.map_or(available.len(), |end| end + 1);
            self.reader.consume(consumed);

            if newline.is_some() {
                return Ok(Some(self.finish_line()));
            }
        }
    }

    fn finish_line(&mut self) -> Frame {
        if std::mem::take(&mut self.discarding) {
            return Frame::Oversized;
        }
        match String::from_utf8(std::mem::take(&mut self.line)) {
            Ok(mut text) => {
                if text.ends_with('\r') {
                    text.pop();
                }
                Frame::Text(text)
            }
            Err(_) => Frame::Invalid,
        }
    }
}
