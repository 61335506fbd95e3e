//! Newline framing over a byte stream
//!
//! [`LineFramer`] pulls chunks from an [`AsyncRead`] until it sees the
//! terminator byte and hands back the record, terminator included. The
//! buffer starts at [`INITIAL_BUFFER_SIZE`] and doubles each time it fills
//! without a terminator. Bytes that arrive after the terminator stay
//! buffered and start the next record.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::error::{AesdError, AesdResult};
use crate::TERMINATOR;

/// Starting size of the framing buffer
pub const INITIAL_BUFFER_SIZE: usize = 1024;

/// One record pulled from a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Record bytes, terminator included when `complete`
    pub bytes: Bytes,
    /// False when the stream closed before a terminator arrived
    pub complete: bool,
}

impl Frame {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Extracts terminator-delimited records from a byte stream
#[derive(Debug)]
pub struct LineFramer {
    buf: Vec<u8>,
    initial_capacity: usize,
    max_record_len: Option<usize>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_initial_capacity(INITIAL_BUFFER_SIZE)
    }

    /// Use a different starting buffer size (at least one byte)
    pub fn with_initial_capacity(initial_capacity: usize) -> Self {
        Self {
            buf: Vec::new(),
            initial_capacity: initial_capacity.max(1),
            max_record_len: None,
        }
    }

    /// Fail with [`AesdError::ResourceExhaustion`] once a record grows past `max`
    pub fn with_max_record_len(mut self, max: usize) -> Self {
        self.max_record_len = Some(max);
        self
    }

    /// Bytes received past the last returned terminator
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Read the next record from `source`
    ///
    /// Returns as soon as a terminator is seen. If the source reaches EOF
    /// first, whatever was accumulated comes back with `complete == false`.
    pub async fn read_record<R>(&mut self, source: &mut R) -> AesdResult<Frame>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut scanned = 0;

        loop {
            if let Some(pos) = self.buf[scanned..].iter().position(|&b| b == TERMINATOR) {
                let end = scanned + pos + 1;
                self.check_len(end)?;
                let rest = self.buf.split_off(end);
                let record = std::mem::replace(&mut self.buf, rest);
                return Ok(Frame {
                    bytes: Bytes::from(record),
                    complete: true,
                });
            }
            scanned = self.buf.len();

            // Without a terminator the record will be at least one byte longer
            self.check_len(self.buf.len() + 1)?;

            if self.buf.len() == self.buf.capacity() {
                self.grow()?;
            }

            let read = source.read_buf(&mut self.buf).await?;
            if read == 0 {
                let partial = std::mem::take(&mut self.buf);
                trace!(len = partial.len(), "Stream closed before terminator");
                return Ok(Frame {
                    bytes: Bytes::from(partial),
                    complete: false,
                });
            }
        }
    }

    fn check_len(&self, record_len: usize) -> AesdResult<()> {
        match self.max_record_len {
            Some(max) if record_len > max => Err(AesdError::resource_exhaustion(format!(
                "record of {record_len} bytes exceeds the {max} byte limit"
            ))),
            _ => Ok(()),
        }
    }

    /// Double the buffer, starting from the initial capacity
    fn grow(&mut self) -> AesdResult<()> {
        let target = (self.buf.capacity() * 2).max(self.initial_capacity);
        self.buf
            .try_reserve_exact(target - self.buf.len())
            .map_err(|e| AesdError::resource_exhaustion(e.to_string()))?;
        trace!(capacity = self.buf.capacity(), "Grew framing buffer");
        Ok(())
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}
