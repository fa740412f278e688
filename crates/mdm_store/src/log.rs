//! Commit log record framing.
//!
//! Every committed transaction is appended as one record:
//!
//! ```text
//! | magic (4) | version (2) | kind (1) | payload len (4) | payload | crc32 (4) |
//! ```
//!
//! The CRC covers the header and payload. Integers are little-endian.

use crate::error::{StoreError, StoreResult};

/// Magic bytes identifying a log record.
pub const LOG_MAGIC: [u8; 4] = *b"MDMS";

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

const HEADER_SIZE: usize = 11;
const CRC_SIZE: usize = 4;

const OP_PUT: u8 = 1;
const OP_DELETE: u8 = 2;

/// Kind of log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// Mutations of one committed transaction, applied on top of prior state.
    Commit = 1,
    /// Full image of the store; replaces all prior state.
    Snapshot = 2,
}

impl RecordKind {
    /// Converts a byte to a record kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Commit),
            2 => Some(Self::Snapshot),
            _ => None,
        }
    }
}

/// A single change to one bucket entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Insert or replace an entry.
    Put {
        /// Bucket name.
        bucket: String,
        /// Entry key.
        key: String,
        /// Entry value.
        value: Vec<u8>,
    },
    /// Remove an entry.
    Delete {
        /// Bucket name.
        bucket: String,
        /// Entry key.
        key: String,
    },
}

impl Mutation {
    fn encode_into(&self, buf: &mut Vec<u8>) -> StoreResult<()> {
        match self {
            Self::Put { bucket, key, value } => {
                buf.push(OP_PUT);
                put_short_str(buf, bucket)?;
                put_short_str(buf, key)?;
                let len = u32::try_from(value.len()).map_err(|_| {
                    StoreError::invalid_argument(format!(
                        "value for {bucket}/{key} is {} bytes, larger than a log record allows",
                        value.len()
                    ))
                })?;
                buf.extend_from_slice(&len.to_le_bytes());
                buf.extend_from_slice(value);
            }
            Self::Delete { bucket, key } => {
                buf.push(OP_DELETE);
                put_short_str(buf, bucket)?;
                put_short_str(buf, key)?;
            }
        }
        Ok(())
    }
}

/// A decoded log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Record kind.
    pub kind: RecordKind,
    /// Mutations, in the order they were written.
    pub mutations: Vec<Mutation>,
}

impl LogRecord {
    /// Creates a commit record.
    pub fn commit(mutations: Vec<Mutation>) -> Self {
        Self {
            kind: RecordKind::Commit,
            mutations,
        }
    }

    /// Creates a snapshot record.
    pub fn snapshot(mutations: Vec<Mutation>) -> Self {
        Self {
            kind: RecordKind::Snapshot,
            mutations,
        }
    }

    /// Serializes the record with its header and checksum.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        let mut payload = Vec::new();
        let count = u32::try_from(self.mutations.len())
            .map_err(|_| StoreError::invalid_argument("too many mutations in one record"))?;
        payload.extend_from_slice(&count.to_le_bytes());
        for mutation in &self.mutations {
            mutation.encode_into(&mut payload)?;
        }

        let payload_len = u32::try_from(payload.len())
            .map_err(|_| StoreError::invalid_argument("record payload exceeds 4 GiB"))?;

        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        buf.extend_from_slice(&LOG_MAGIC);
        buf.extend_from_slice(&LOG_VERSION.to_le_bytes());
        buf.push(self.kind as u8);
        buf.extend_from_slice(&payload_len.to_le_bytes());
        buf.extend_from_slice(&payload);
        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    fn decode_payload(kind: RecordKind, payload: &[u8], offset: u64) -> StoreResult<Self> {
        let mut reader = PayloadReader {
            data: payload,
            pos: 0,
            offset,
        };
        let count = reader.u32()?;
        let mut mutations = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            let op = reader.u8()?;
            let bucket = reader.short_str()?;
            let key = reader.short_str()?;
            let mutation = match op {
                OP_PUT => {
                    let len = reader.u32()? as usize;
                    let value = reader.bytes(len)?.to_vec();
                    Mutation::Put { bucket, key, value }
                }
                OP_DELETE => Mutation::Delete { bucket, key },
                other => {
                    return Err(StoreError::corrupted(
                        offset,
                        format!("unknown mutation op {other}"),
                    ))
                }
            };
            mutations.push(mutation);
        }
        if reader.pos != payload.len() {
            return Err(StoreError::corrupted(offset, "trailing bytes in record"));
        }
        Ok(Self { kind, mutations })
    }
}

/// Outcome of scanning a log.
#[derive(Debug)]
pub(crate) struct Replay {
    /// Valid records with their offsets.
    pub records: Vec<(u64, LogRecord)>,
    /// Length of the valid prefix; anything after it is a torn tail.
    pub valid_len: u64,
}

/// Scans log bytes into records.
///
/// An incomplete final record is reported through `valid_len` rather than as
/// an error; a bad magic, unknown kind, or checksum mismatch is corruption.
pub(crate) fn replay(data: &[u8]) -> StoreResult<Replay> {
    let mut records = Vec::new();
    let mut pos = 0usize;

    while pos < data.len() {
        let offset = pos as u64;
        let remaining = &data[pos..];
        if remaining.len() < HEADER_SIZE {
            break;
        }

        let header = &remaining[..HEADER_SIZE];
        if header[0..4] != LOG_MAGIC {
            return Err(StoreError::corrupted(offset, "invalid magic"));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version > LOG_VERSION {
            return Err(StoreError::corrupted(
                offset,
                format!("unsupported version {version}"),
            ));
        }
        let kind = RecordKind::from_byte(header[6]).ok_or_else(|| {
            StoreError::corrupted(offset, format!("unknown record kind {}", header[6]))
        })?;
        let payload_len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;

        let total = HEADER_SIZE + payload_len + CRC_SIZE;
        if remaining.len() < total {
            break;
        }

        let body_end = HEADER_SIZE + payload_len;
        let stored = u32::from_le_bytes([
            remaining[body_end],
            remaining[body_end + 1],
            remaining[body_end + 2],
            remaining[body_end + 3],
        ]);
        let computed = compute_crc32(&remaining[..body_end]);
        if stored != computed {
            return Err(StoreError::ChecksumMismatch {
                offset,
                expected: stored,
                actual: computed,
            });
        }

        let record = LogRecord::decode_payload(kind, &remaining[HEADER_SIZE..body_end], offset)?;
        records.push((offset, record));
        pos += total;
    }

    Ok(Replay {
        records,
        valid_len: pos as u64,
    })
}

fn put_short_str(buf: &mut Vec<u8>, s: &str) -> StoreResult<()> {
    let len = u16::try_from(s.len()).map_err(|_| {
        StoreError::invalid_argument(format!("name of {} bytes exceeds 65535", s.len()))
    })?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
    offset: u64,
}

impl<'a> PayloadReader<'a> {
    fn bytes(&mut self, len: usize) -> StoreResult<&'a [u8]> {
        let end = self.pos.saturating_add(len);
        if end > self.data.len() {
            return Err(StoreError::corrupted(self.offset, "record payload truncated"));
        }
        let data = self.data;
        let slice = &data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> StoreResult<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> StoreResult<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> StoreResult<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn short_str(&mut self) -> StoreResult<String> {
        let len = self.u16()? as usize;
        let offset = self.offset;
        let raw = self.bytes(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| StoreError::corrupted(offset, "name is not valid UTF-8"))
    }
}

/// Computes the IEEE CRC32 of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ TABLE[index];
    }
    !crc
}
