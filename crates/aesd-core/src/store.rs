//! Fixed-capacity ring buffer of command records
//!
//! The store keeps at most `capacity` records. Appending to a full store
//! evicts the oldest record in the same step. Content can be addressed two
//! ways:
//!
//! - **Flat offset**: a byte position in the concatenation of all records,
//!   oldest first.
//! - **Entry position**: a `(record_index, intra_offset)` pair where index 0
//!   is the oldest record still held.
//!
//! Converting between the two is a pure function of the record lengths.

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::error::{AesdError, AesdResult};
use crate::TERMINATOR;

/// Number of records a store holds unless configured otherwise
pub const DEFAULT_CAPACITY: usize = 10;

/// One newline-terminated command held by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    data: Bytes,
}

impl Record {
    /// Wrap a completed record
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Length in bytes, terminator included
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the record ends with the terminator byte
    pub fn is_terminated(&self) -> bool {
        self.data.last() == Some(&TERMINATOR)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Location of a byte inside the store, as a record index and offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPosition {
    /// Index of the record, 0 = oldest
    pub record_index: usize,
    /// Byte offset inside that record
    pub intra_offset: usize,
}

/// Fixed-capacity FIFO of records with oldest-first eviction
#[derive(Debug)]
pub struct RecordStore {
    /// Ring slots; `None` marks an unused slot
    slots: Box<[Option<Record>]>,
    /// Slot holding the oldest record
    head: usize,
    /// Number of valid records
    len: usize,
    /// Sum of the lengths of all valid records
    total_size: usize,
}

impl RecordStore {
    /// Create an empty store with room for `capacity` records
    pub fn new(capacity: usize) -> AesdResult<Self> {
        if capacity == 0 {
            return Err(AesdError::InvalidCapacity);
        }

        Ok(Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            total_size: 0,
        })
    }

    /// Create an empty store holding [`DEFAULT_CAPACITY`] records
    pub fn with_default_capacity() -> Self {
        Self {
            slots: (0..DEFAULT_CAPACITY).map(|_| None).collect(),
            head: 0,
            len: 0,
            total_size: 0,
        }
    }

    /// Append a completed record as the newest entry
    ///
    /// When the store is already full the oldest record is dropped first.
    /// Returns `true` if an eviction happened.
    pub fn append(&mut self, data: impl Into<Bytes>) -> bool {
        let record = Record::new(data);
        let capacity = self.slots.len();

        let evicted = if self.len == capacity {
            if let Some(oldest) = self.slots[self.head].take() {
                self.total_size -= oldest.len();
                trace!(evicted_len = oldest.len(), "Evicted oldest record");
            }
            self.head = (self.head + 1) % capacity;
            self.len -= 1;
            true
        } else {
            false
        };

        let tail = (self.head + self.len) % capacity;
        self.total_size += record.len();
        self.slots[tail] = Some(record);
        self.len += 1;

        evicted
    }

    /// All bytes from `flat_offset` to the end of the newest record
    ///
    /// Offsets at or past [`total_size`](Self::total_size) yield an empty buffer.
    pub fn read_from(&self, flat_offset: usize) -> Bytes {
        self.read_at(flat_offset, usize::MAX)
    }

    /// Everything from `(record_index, intra_offset)` to the end of the store
    pub fn read_from_entry(&self, record_index: usize, intra_offset: usize) -> AesdResult<Bytes> {
        let offset = self.resolve(record_index, intra_offset)?;
        Ok(self.read_from(offset))
    }

    /// Up to `max_len` bytes starting at `flat_offset`, crossing record boundaries
    pub fn read_at(&self, flat_offset: usize, max_len: usize) -> Bytes {
        let Some(start) = self.find_entry(flat_offset) else {
            return Bytes::new();
        };

        let Some(first) = self.get(start.record_index) else {
            return Bytes::new();
        };
        let wanted = (self.total_size - flat_offset).min(max_len);

        // Single-record reads share the stored buffer
        if first.len() - start.intra_offset >= wanted {
            return first
                .data
                .slice(start.intra_offset..start.intra_offset + wanted);
        }

        let mut out = BytesMut::with_capacity(wanted);
        let mut skip = start.intra_offset;
        for record in self.iter().skip(start.record_index) {
            let remaining = wanted - out.len();
            if remaining == 0 {
                break;
            }
            let chunk = &record.as_bytes()[skip..];
            out.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
            skip = 0;
        }
        out.freeze()
    }

    /// Flat offset of `(record_index, intra_offset)`
    ///
    /// Fails with [`AesdError::OutOfRange`] unless `record_index < len()` and
    /// `intra_offset` is inside that record.
    pub fn resolve(&self, record_index: usize, intra_offset: usize) -> AesdResult<usize> {
        match self.get(record_index) {
            Some(record) if intra_offset < record.len() => {
                let preceding: usize = self.iter().take(record_index).map(Record::len).sum();
                Ok(preceding + intra_offset)
            }
            _ => Err(AesdError::out_of_range(record_index, intra_offset)),
        }
    }

    /// Map a flat offset to the record containing it
    ///
    /// Walks records oldest to newest, accumulating lengths.
    pub fn find_entry(&self, flat_offset: usize) -> Option<EntryPosition> {
        let mut start = 0;
        for (record_index, record) in self.iter().enumerate() {
            let end = start + record.len();
            if flat_offset < end {
                return Some(EntryPosition {
                    record_index,
                    intra_offset: flat_offset - start,
                });
            }
            start = end;
        }
        None
    }

    /// Record at `index`, 0 = oldest
    pub fn get(&self, index: usize) -> Option<&Record> {
        if index >= self.len {
            return None;
        }
        self.slots[self.slot_index(index)].as_ref()
    }

    /// Iterate records oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Record> + '_ {
        (0..self.len).filter_map(move |i| self.slots[self.slot_index(i)].as_ref())
    }

    /// Sum of all valid record lengths
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Number of valid records
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Drop every record
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.head = 0;
        self.len = 0;
        self.total_size = 0;
    }

    fn slot_index(&self, logical: usize) -> usize {
        (self.head + logical) % self.slots.len()
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
