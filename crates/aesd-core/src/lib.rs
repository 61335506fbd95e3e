//! # AESD Core
//!
//! Bounded, concurrently accessible command log.
//!
//! The log is a fixed-capacity ring of newline-terminated records with
//! oldest-first eviction. Its content can be read back as one continuous
//! byte stream or from an explicit `(record_index, intra_offset)` position.
//!
//! ## Features
//!
//! - **RecordStore**: the ring buffer itself, with flat and entry addressing
//! - **SharedStore**: the single coarse lock every producer and consumer goes through
//! - **LineFramer**: reassembles records from a byte stream
//! - **Seek directives**: `AESDCHAR_IOCSEEKTO:<i>,<o>` control lines
//! - **CharDevice**: file-like handles with a per-handle cursor
//!
//! ## Example
//!
//! ```rust
//! use aesd_core::{RecordStore, seek};
//!
//! let mut store = RecordStore::new(10).unwrap();
//! store.append(&b"one\n"[..]);
//! store.append(&b"two\n"[..]);
//!
//! let directive = seek::parse(b"AESDCHAR_IOCSEEKTO:1,0\n").unwrap();
//! let tail = store
//!     .read_from_entry(directive.record_index as usize, directive.intra_offset as usize)
//!     .unwrap();
//! assert_eq!(&tail[..], b"two\n");
//! ```

pub mod device;
pub mod error;
pub mod framer;
pub mod seek;
pub mod shared;
pub mod store;

// Re-exports
pub use device::{CharDevice, DeviceHandle};
pub use error::{AesdError, AesdResult};
pub use framer::{Frame, INITIAL_BUFFER_SIZE, LineFramer};
pub use seek::{Command, SeekDirective};
pub use shared::{DEFAULT_LOCK_TIMEOUT, SharedStore};
pub use store::{DEFAULT_CAPACITY, EntryPosition, Record, RecordStore};

/// Byte that ends every record
pub const TERMINATOR: u8 = b'\n';
