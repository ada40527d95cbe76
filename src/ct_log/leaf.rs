// src/ct_log/leaf.rs
//! Decoding of RFC 6962 `MerkleTreeLeaf` structures and their extra data
//!
//! Every length prefix is checked against the bytes that are actually left;
//! a short buffer is reported with the field and byte offset where it ran out.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Protocol version v1
pub const LOG_VERSION: u8 = 0;

/// `MerkleLeafType.timestamped_entry`
pub const TIMESTAMPED_ENTRY: u8 = 0;

const ISSUER_KEY_HASH_LEN: usize = 32;

/// `LogEntryType` as it appears on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    X509,
    PreCert,
}

impl TryFrom<u8> for EntryType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EntryType::X509),
            1 => Ok(EntryType::PreCert),
            other => Err(DecodeError::UnknownEntryType(other)),
        }
    }
}

/// Variant-specific part of a timestamped entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafPayload {
    /// A logged end-entity certificate
    X509 { certificate: Vec<u8> },
    /// A precertificate: issuer key hash plus the TBS certificate
    PreCert {
        issuer_key_hash: [u8; ISSUER_KEY_HASH_LEN],
        tbs_certificate: Vec<u8>,
    },
}

/// One decoded log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafEntry {
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    pub payload: LeafPayload,
    /// Certificate blocks from `extra_data`, in wire order
    pub extra_certs: Vec<Vec<u8>>,
}

impl LeafEntry {
    pub fn entry_type(&self) -> EntryType {
        match self.payload {
            LeafPayload::X509 { .. } => EntryType::X509,
            LeafPayload::PreCert { .. } => EntryType::PreCert,
        }
    }

    /// Certificate DER for X509 entries, TBS DER for precertificates
    pub fn certificate_bytes(&self) -> &[u8] {
        match &self.payload {
            LeafPayload::X509 { certificate } => certificate,
            LeafPayload::PreCert {
                tbs_certificate, ..
            } => tbs_certificate,
        }
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.timestamp)
            .ok()
            .and_then(DateTime::from_timestamp_millis)
    }
}

/// Wire-format errors. All of them are fatal for the batch being read.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{field} truncated at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        field: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("unknown leaf version {0}")]
    UnknownVersion(u8),

    #[error("unknown leaf type {0}")]
    UnknownLeafType(u8),

    #[error("unknown entry type {0}")]
    UnknownEntryType(u8),

    #[error("extra data declares {declared} bytes but {actual} remain")]
    ExtraDataLength { declared: usize, actual: usize },
}

impl DecodeError {
    /// Byte offset of the failure, where one applies
    pub fn offset(&self) -> Option<usize> {
        match self {
            DecodeError::Truncated { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}

/// Big-endian cursor that never reads past its buffer
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, field: &'static str, n: usize) -> Result<&'a [u8], DecodeError> {
        if n > self.remaining() {
            return Err(DecodeError::Truncated {
                field,
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn read_uint(&mut self, field: &'static str, width: usize) -> Result<u64, DecodeError> {
        let bytes = self.take(field, width)?;
        Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    fn read_u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        Ok(self.take(field, 1)?[0])
    }

    fn read_u24(&mut self, field: &'static str) -> Result<usize, DecodeError> {
        Ok(self.read_uint(field, 3)? as usize)
    }

    fn read_u64(&mut self, field: &'static str) -> Result<u64, DecodeError> {
        self.read_uint(field, 8)
    }

    /// Reads a `width`-byte length prefix followed by that many bytes
    fn read_prefixed(
        &mut self,
        field: &'static str,
        width: usize,
    ) -> Result<&'a [u8], DecodeError> {
        let len = self.read_uint(field, width)? as usize;
        self.take(field, len)
    }
}

/// Parse a log entry from its `leaf_input` and `extra_data` bytes
pub fn parse_entry(leaf_input: &[u8], extra_data: &[u8]) -> Result<LeafEntry, DecodeError> {
    let mut leaf = Reader::new(leaf_input);

    let version = leaf.read_u8("version")?;
    if version != LOG_VERSION {
        return Err(DecodeError::UnknownVersion(version));
    }

    let leaf_type = leaf.read_u8("leaf type")?;
    if leaf_type != TIMESTAMPED_ENTRY {
        return Err(DecodeError::UnknownLeafType(leaf_type));
    }

    let timestamp = leaf.read_u64("timestamp")?;
    leaf.take("reserved", 1)?;
    let entry_type = EntryType::try_from(leaf.read_u8("entry type")?)?;

    let payload = match entry_type {
        EntryType::X509 => LeafPayload::X509 {
            certificate: leaf.read_prefixed("certificate", 3)?.to_vec(),
        },
        EntryType::PreCert => {
            let mut issuer_key_hash = [0u8; ISSUER_KEY_HASH_LEN];
            issuer_key_hash.copy_from_slice(leaf.take("issuer key hash", ISSUER_KEY_HASH_LEN)?);
            LeafPayload::PreCert {
                issuer_key_hash,
                tbs_certificate: leaf.read_prefixed("tbs certificate", 2)?.to_vec(),
            }
        }
    };

    Ok(LeafEntry {
        timestamp,
        payload,
        extra_certs: parse_extra_data(extra_data)?,
    })
}

/// Split `extra_data` into its certificate blocks.
///
/// The outer 24-bit length must match the rest of the buffer exactly and the
/// blocks must tile it with nothing left over.
pub fn parse_extra_data(extra_data: &[u8]) -> Result<Vec<Vec<u8>>, DecodeError> {
    let mut extra = Reader::new(extra_data);
    let mut blocks = Vec::new();

    if extra.is_empty() {
        return Ok(blocks);
    }

    let declared = extra.read_u24("extra data length")?;
    if declared != extra.remaining() {
        return Err(DecodeError::ExtraDataLength {
            declared,
            actual: extra.remaining(),
        });
    }

    while !extra.is_empty() {
        blocks.push(extra.read_prefixed("extra certificate", 3)?.to_vec());
    }

    Ok(blocks)
}
