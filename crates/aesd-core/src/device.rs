//! Device-style front-end over the shared store
//!
//! [`CharDevice`] is the contract a character-driver shim calls into:
//! byte writes that are assembled into records, positional reads over the
//! flat content, and two kinds of seek (the record/offset directive and a
//! plain file-position seek). Each opened [`DeviceHandle`] owns its own
//! cursor; the partial record being written belongs to the device.

use std::io::SeekFrom;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::error::{AesdError, AesdResult};
use crate::seek::SeekDirective;
use crate::shared::SharedStore;
use crate::TERMINATOR;

/// A command log exposed through file-like handles
#[derive(Debug, Clone)]
pub struct CharDevice {
    store: SharedStore,
    /// Bytes written since the last terminator, not yet visible to readers
    pending: Arc<Mutex<Vec<u8>>>,
}

impl CharDevice {
    /// Create a device with its own empty store
    pub fn new(capacity: usize) -> AesdResult<Self> {
        Ok(Self::from_shared(SharedStore::with_capacity(capacity)?))
    }

    /// Expose an existing store through the device interface
    pub fn from_shared(store: SharedStore) -> Self {
        Self {
            store,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Open a new handle positioned at offset 0
    pub fn open(&self) -> DeviceHandle {
        DeviceHandle {
            device: self.clone(),
            position: 0,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Length of the partial record waiting for its terminator
    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }
}

/// An open handle with its own read cursor
#[derive(Debug)]
pub struct DeviceHandle {
    device: CharDevice,
    position: usize,
}

impl DeviceHandle {
    /// Current cursor as a flat offset
    pub fn position(&self) -> usize {
        self.position
    }

    /// Accept bytes into the pending record
    ///
    /// Every terminator completes a record and installs it in the store,
    /// possibly evicting the oldest one. Returns the number of bytes
    /// accepted, which is always all of them.
    #[instrument(skip(self, data), fields(len = data.len()))]
    pub async fn write(&mut self, data: &[u8]) -> AesdResult<usize> {
        let mut pending = self.device.pending.lock().await;
        pending
            .try_reserve(data.len())
            .map_err(|e| AesdError::resource_exhaustion(e.to_string()))?;

        let mut rest = data;
        if rest.contains(&TERMINATOR) {
            let mut store = self.device.store.lock().await?;
            while let Some(pos) = rest.iter().position(|&b| b == TERMINATOR) {
                pending.extend_from_slice(&rest[..=pos]);
                let record = Bytes::from(std::mem::take(&mut *pending));
                let evicted = store.append(record);
                debug!(evicted, records = store.len(), "Installed record");
                rest = &rest[pos + 1..];
            }
        }
        pending.extend_from_slice(rest);

        self.position += data.len();
        Ok(data.len())
    }

    /// Read up to `max_len` bytes at the cursor and advance it
    pub async fn read(&mut self, max_len: usize) -> AesdResult<Bytes> {
        let bytes = self.read_at(self.position, max_len).await?;
        self.position += bytes.len();
        Ok(bytes)
    }

    /// Read up to `max_len` bytes at `flat_offset` without moving the cursor
    pub async fn read_at(&self, flat_offset: usize, max_len: usize) -> AesdResult<Bytes> {
        Ok(self.device.store.lock().await?.read_at(flat_offset, max_len))
    }

    /// Move the cursor to a record and byte offset
    ///
    /// On [`AesdError::OutOfRange`] the cursor is left where it was.
    pub async fn seek_to(&mut self, directive: SeekDirective) -> AesdResult<u64> {
        let offset = self.device.store.lock().await?.resolve(
            directive.record_index as usize,
            directive.intra_offset as usize,
        )?;
        self.position = offset;
        Ok(offset as u64)
    }

    /// File-position seek relative to the start, cursor, or end of content
    pub async fn seek(&mut self, target: SeekFrom) -> AesdResult<u64> {
        let total = self.device.store.lock().await?.total_size() as i128;
        let requested = match target {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
            SeekFrom::End(delta) => total + delta as i128,
        };

        if requested < 0 || requested > total {
            return Err(AesdError::InvalidSeek(format!(
                "position {requested} outside 0..={total}"
            )));
        }

        self.position = requested as usize;
        Ok(self.position as u64)
    }
}
