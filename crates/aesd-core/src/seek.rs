//! Seek directive parsing
//!
//! A record of the form `AESDCHAR_IOCSEEKTO:<record_index>,<intra_offset>\n`
//! asks for the read cursor to move instead of being appended. Anything
//! that does not match the grammar exactly, including near-misses such as a
//! missing separator or non-numeric fields, is ordinary payload.
//!
//! Bounds are not checked here; that happens against the live store.

use std::fmt;

use bytes::Bytes;

use crate::TERMINATOR;

/// Textual prefix that marks a seek directive
pub const SEEK_PREFIX: &[u8] = b"AESDCHAR_IOCSEEKTO:";

/// Separator between the two directive fields
pub const SEPARATOR: u8 = b',';

/// Minimum bytes after the prefix, terminator included
pub const MIN_PARAM_CHARS: usize = 3;

/// Request to reposition the read cursor at a record and byte offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeekDirective {
    /// Record to seek to, 0 = oldest
    pub record_index: u32,
    /// Byte offset inside that record
    pub intra_offset: u32,
}

impl SeekDirective {
    pub fn new(record_index: u32, intra_offset: u32) -> Self {
        Self {
            record_index,
            intra_offset,
        }
    }

    /// The directive as a terminated control line
    pub fn to_line(&self) -> Bytes {
        Bytes::from(format!("{self}\n"))
    }
}

impl fmt::Display for SeekDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{},{}",
            String::from_utf8_lossy(SEEK_PREFIX),
            self.record_index,
            self.intra_offset
        )
    }
}

/// What a framed record asks the log to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Reposition the cursor
    Seek(SeekDirective),
    /// Store the record as a new entry
    Append(Bytes),
}

/// Classify a complete record as a seek directive or payload
pub fn classify(record: Bytes) -> Command {
    match parse(&record) {
        Some(directive) => Command::Seek(directive),
        None => Command::Append(record),
    }
}

/// Parse a record as a seek directive
///
/// Returns `None` for anything that is not exactly
/// `prefix + digits + ',' + digits + '\n'`.
pub fn parse(record: &[u8]) -> Option<SeekDirective> {
    if record.len() < SEEK_PREFIX.len() + MIN_PARAM_CHARS {
        return None;
    }

    let body = record.strip_suffix(&[TERMINATOR])?;
    let params = body.strip_prefix(SEEK_PREFIX)?;

    let mut fields = params.split(|&b| b == SEPARATOR);
    let record_index = parse_field(fields.next()?)?;
    let intra_offset = parse_field(fields.next()?)?;
    if fields.next().is_some() {
        return None;
    }

    Some(SeekDirective {
        record_index,
        intra_offset,
    })
}

fn parse_field(field: &[u8]) -> Option<u32> {
    if field.is_empty() || !field.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(field).ok()?.parse().ok()
}
