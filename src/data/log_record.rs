//! L2 — Record Codec: the on-disk layout of a single log entry and the
//! position tuple the index stores for it.
//!
//! ```text
//! +-------- header (variable, <= 15 bytes) --------+---- body ----+
//! | crc32 (4 LE) | type (1) | keyLen varint | valLen varint | key | value |
//! ```
//!
//! CRC32 (IEEE) is computed over every byte after the CRC field itself:
//! `type || keyLen || valLen || key || value`.

use crate::util::varint::{decode_varint, encode_varint, MAX_VARINT_LEN_32};
use bytes::{BufMut, BytesMut};

/// `4` (crc) + `1` (type) + `5` (keyLen) + `5` (valLen).
pub const MAX_LOG_RECORD_HEADER_SIZE: usize = 4 + 1 + MAX_VARINT_LEN_32 + MAX_VARINT_LEN_32;

/// What a [`LogRecord`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordType {
    /// A live Put.
    Normal = 1,
    /// A tombstone recording a Delete.
    Tombstone = 2,
    /// Seals a write batch; its presence during replay is the commit point.
    TxnCommit = 3,
}

impl LogRecordType {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Normal),
            2 => Some(Self::Tombstone),
            3 => Some(Self::TxnCommit),
            _ => None,
        }
    }
}

/// The unit of the on-disk log.
///
/// `key` carries the sequence-number prefix (`varint(seq_no) || real_key`)
/// while in this form; callers separate the two via
/// [`crate::batch::parse_log_record_key`] before handing the record to the
/// index.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub record_type: LogRecordType,
}

impl LogRecord {
    /// Encodes this record to its on-disk byte form, computing the header
    /// and CRC32 as it goes.
    pub fn encode(&self) -> Vec<u8> {
        let mut header = Vec::with_capacity(MAX_LOG_RECORD_HEADER_SIZE);
        header.push(self.record_type as u8);
        encode_varint(self.key.len() as i64, &mut header);
        encode_varint(self.value.len() as i64, &mut header);

        let mut buf = BytesMut::with_capacity(4 + header.len() + self.key.len() + self.value.len());
        buf.put_u32(0); // placeholder, patched below
        buf.extend_from_slice(&header);
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);

        let crc = crc32fast::hash(&buf[4..]);
        buf[0..4].copy_from_slice(&crc.to_le_bytes());
        buf.to_vec()
    }

    /// The encoded size of this record, without actually allocating the
    /// encoding — used by the merge ratio/reclaim-size bookkeeping.
    pub fn encoded_len(&self) -> usize {
        let mut header = Vec::with_capacity(MAX_LOG_RECORD_HEADER_SIZE);
        encode_varint(self.key.len() as i64, &mut header);
        encode_varint(self.value.len() as i64, &mut header);
        4 + 1 + header.len() + self.key.len() + self.value.len()
    }
}

/// A parsed record header plus how many bytes it occupied.
struct RecordHeader {
    crc: u32,
    record_type: Option<LogRecordType>,
    key_len: usize,
    value_len: usize,
    header_len: usize,
}

/// Decodes a record header from the front of `buf`.
///
/// Returns `None` when `buf` is the EOF sentinel: too short to hold a
/// minimal header, or a header that decodes to an all-zero
/// crc/type/key-len/value-len tail (the pattern a clean end of file or a
/// zero-padded tail produces; real records can never decode this way
/// because keys are never empty).
fn decode_header(buf: &[u8]) -> Option<RecordHeader> {
    if buf.len() <= 4 {
        return None;
    }
    let crc = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let rest = &buf[4..];
    if rest.is_empty() {
        return None;
    }
    let record_type_byte = rest[0];
    let (key_len, key_n) = decode_varint(&rest[1..])?;
    let (value_len, value_n) = decode_varint(&rest[1 + key_n..])?;

    if crc == 0 && record_type_byte == 0 && key_len == 0 && value_len == 0 {
        return None;
    }
    if key_len < 0 || value_len < 0 {
        return None;
    }

    Some(RecordHeader {
        crc,
        record_type: LogRecordType::from_u8(record_type_byte),
        key_len: key_len as usize,
        value_len: value_len as usize,
        header_len: 4 + 1 + key_n + value_n,
    })
}

/// Peeks the header at the front of `buf`, returning
/// `(header_len, key_len, value_len)` without decoding the body or
/// verifying the CRC.
///
/// Used by [`crate::data::DataFile::read_log_record`] to learn how many
/// more bytes the record's body needs after a capped header-only read, so
/// the body can be read with a second, exactly-sized read instead of
/// reading the rest of the file on every call.
pub(crate) fn peek_header_lengths(buf: &[u8]) -> Option<(usize, usize, usize)> {
    let header = decode_header(buf)?;
    Some((header.header_len, header.key_len, header.value_len))
}

/// A record read back from a data file, together with the total number of
/// bytes it occupied on disk (header + body) — the value a reader advances
/// its cursor by to reach the next record.
pub struct ReadLogRecord {
    pub record: LogRecord,
    pub size: usize,
}

/// Decodes one full record (header + body) from `buf`, which must contain
/// at least the record's bytes starting at index 0 (extra trailing bytes
/// are ignored). Verifies the CRC.
pub fn decode_record(buf: &[u8]) -> crate::error::Result<Option<ReadLogRecord>> {
    use crate::error::Error;

    let Some(header) = decode_header(buf) else {
        return Ok(None);
    };
    let body_start = header.header_len;
    let body_end = body_start + header.key_len + header.value_len;
    if buf.len() < body_end {
        return Ok(None);
    }

    let record_type = header
        .record_type
        .ok_or_else(|| Error::DataDirectoryCorrupted("unknown log record type".into()))?;
    let key = buf[body_start..body_start + header.key_len].to_vec();
    let value = buf[body_start + header.key_len..body_end].to_vec();

    let computed_crc = crc32fast::hash(&buf[4..body_end]);
    if computed_crc != header.crc {
        return Err(Error::InvalidCRC);
    }

    Ok(Some(ReadLogRecord {
        record: LogRecord {
            key,
            value,
            record_type,
        },
        size: body_end,
    }))
}

/// An index entry: uniquely locates a record in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordPosition {
    pub file_id: u32,
    pub offset: i64,
    /// Encoded byte length of the record this position points to. Not part
    /// of the Go original's position tuple; carried here (and never
    /// persisted in the hint-file encoding) so `reclaim_size` and the merge
    /// ratio precondition can be computed without re-reading the log.
    pub size: u32,
}

impl RecordPosition {
    /// Encodes as `varint(file_id) || varint(offset)`, the form used by
    /// hint files and the on-disk B+ tree index.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(10);
        encode_varint(i64::from(self.file_id), &mut buf);
        encode_varint(self.offset, &mut buf);
        buf
    }

    /// Decodes the `varint(file_id) || varint(offset)` form. `size` is not
    /// part of this encoding and is left as `0`; callers that need it
    /// recompute it from the record they subsequently read.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let (file_id, n) = decode_varint(buf)?;
        let (offset, _) = decode_varint(&buf[n..])?;
        Some(Self {
            file_id: u32::try_from(file_id).ok()?,
            offset,
            size: 0,
        })
    }
}

/// A record staged while its write batch has not yet been sealed by a
/// [`LogRecordType::TxnCommit`] terminator.
pub struct TransactionRecord {
    pub record: LogRecord,
    pub position: RecordPosition,
}
