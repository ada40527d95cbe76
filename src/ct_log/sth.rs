// src/ct_log/sth.rs
//! Signed tree head verification (RFC 6962 sections 3.5 and 4.3)
//!
//! A tree head is only returned once its signature checks out against the
//! log's key; there is no "unverified but usable" path.

use base64::Engine;
use chrono::{DateTime, Utc};
use p256::ecdsa::signature::hazmat::PrehashVerifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::DecodePublicKey;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::client::CtLogClient;
use super::leaf::LOG_VERSION;
use super::types::SthResponse;
use crate::error::{CryptoError, CtError};

/// `HashAlgorithm.sha256` (RFC 5246 section 7.4.1.4.1)
pub const HASH_SHA256: u8 = 4;

/// `SignatureAlgorithm.ecdsa`
pub const SIG_ECDSA: u8 = 3;

/// `SignatureType.tree_hash`
const TREE_HASH: u8 = 1;

const ROOT_HASH_LEN: usize = 32;

/// Length of the signed `TreeHeadSignature` structure
pub const TREE_HEAD_INPUT_LEN: usize = 2 + 8 + 8 + ROOT_HASH_LEN;

/// A log's endpoint and the key its tree heads are signed with
#[derive(Debug, Clone)]
pub struct LogIdentity {
    url: String,
    key: VerifyingKey,
}

impl LogIdentity {
    pub fn new(url: impl Into<String>, key: VerifyingKey) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            key,
        }
    }

    /// Build from a DER SubjectPublicKeyInfo holding a P-256 key
    pub fn from_spki_der(url: impl Into<String>, der: &[u8]) -> Result<Self, CryptoError> {
        let public_key = p256::PublicKey::from_public_key_der(der)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;

        let point = public_key.to_encoded_point(false);
        let key = VerifyingKey::from_sec1_bytes(point.as_bytes())
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;

        Ok(Self::new(url, key))
    }

    /// Build from the base64 key format used by log lists and config files
    pub fn from_base64_key(url: impl Into<String>, key: &str) -> Result<Self, CryptoError> {
        let der = base64::engine::general_purpose::STANDARD
            .decode(key.trim())
            .map_err(|e| CryptoError::InvalidPublicKey(format!("bad base64: {}", e)))?;
        Self::from_spki_der(url, &der)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn key(&self) -> &VerifyingKey {
        &self.key
    }
}

/// A tree head whose signature has been verified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTreeHead {
    /// Number of entries; valid indices are `0..tree_size`
    pub tree_size: u64,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    pub time: DateTime<Utc>,
    pub root_hash: [u8; ROOT_HASH_LEN],
    pub signature: Vec<u8>,
}

/// The exact bytes a log signs for a tree head
pub fn tree_head_signature_input(
    timestamp: u64,
    tree_size: u64,
    root_hash: &[u8; ROOT_HASH_LEN],
) -> [u8; TREE_HEAD_INPUT_LEN] {
    let mut signed = [0u8; TREE_HEAD_INPUT_LEN];
    signed[0] = LOG_VERSION;
    signed[1] = TREE_HASH;
    signed[2..10].copy_from_slice(&timestamp.to_be_bytes());
    signed[10..18].copy_from_slice(&tree_size.to_be_bytes());
    signed[18..].copy_from_slice(root_hash);
    signed
}

/// Parse a TLS `DigitallySigned` blob carrying an ECDSA/SHA-256 signature
pub fn parse_signature(blob: &[u8]) -> Result<Signature, CryptoError> {
    if blob.len() < 4 {
        return Err(CryptoError::SignatureTruncated { len: blob.len() });
    }
    if blob[0] != HASH_SHA256 {
        return Err(CryptoError::UnknownHashAlgorithm(blob[0]));
    }
    if blob[1] != SIG_ECDSA {
        return Err(CryptoError::UnknownSignatureAlgorithm(blob[1]));
    }

    let declared = usize::from(u16::from_be_bytes([blob[2], blob[3]]));
    let rest = &blob[4..];
    if declared > rest.len() {
        return Err(CryptoError::SignatureLength {
            declared,
            available: rest.len(),
        });
    }
    if rest.len() > declared {
        return Err(CryptoError::TrailingBytes(rest.len() - declared));
    }

    // from_der rejects anything after the (r, s) SEQUENCE as well
    Signature::from_der(rest).map_err(|e| CryptoError::MalformedSignature(e.to_string()))
}

/// Check a get-sth response against the log's key
pub fn verify_head(log: &LogIdentity, sth: SthResponse) -> Result<SignedTreeHead, CtError> {
    let root_hash: [u8; ROOT_HASH_LEN] =
        sth.sha256_root_hash
            .as_slice()
            .try_into()
            .map_err(|_| CtError::InvalidHead {
                field: "sha256_root_hash",
                reason: format!(
                    "expected {} bytes, got {}",
                    ROOT_HASH_LEN,
                    sth.sha256_root_hash.len()
                ),
            })?;

    let signature = parse_signature(&sth.tree_head_signature)?;

    let signed = tree_head_signature_input(sth.timestamp, sth.tree_size, &root_hash);
    let digest = Sha256::digest(signed);

    log.key
        .verify_prehash(&digest, &signature)
        .map_err(|_| CryptoError::VerificationFailed)?;

    let time = i64::try_from(sth.timestamp)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| CtError::InvalidHead {
            field: "timestamp",
            reason: format!("{} is out of range", sth.timestamp),
        })?;

    debug!(
        "{}: verified tree head size={} root={}",
        log.url,
        sth.tree_size,
        hex::encode(root_hash)
    );

    Ok(SignedTreeHead {
        tree_size: sth.tree_size,
        timestamp: sth.timestamp,
        time,
        root_hash,
        signature: sth.tree_head_signature,
    })
}

/// Fetch the current tree head and verify it
pub async fn fetch_head(client: &CtLogClient, log: &LogIdentity) -> Result<SignedTreeHead, CtError> {
    let sth = client.get_sth().await?;
    verify_head(log, sth)
}
