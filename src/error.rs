// src/error.rs
//! Error types for ct-sift
//!
//! Library code returns structured errors so callers can tell a broken
//! transport from a tampered tree head or a corrupt leaf without matching on
//! strings. Collaborator traits (datastore, config) stay on `anyhow` and get
//! wrapped into [`CtError::Storage`] at the pipeline boundary.

use thiserror::Error;
use x509_parser::error::X509Error;
use x509_parser::nom;

use crate::ct_log::leaf::DecodeError;

/// Broad failure classes, used for reporting and process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Network,
    Protocol,
    Format,
    Crypto,
    CertificateParse,
    Storage,
}

impl ErrorClass {
    /// Process exit code for a run aborted by this class of error
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorClass::Network => 2,
            ErrorClass::Protocol => 3,
            ErrorClass::Format => 4,
            ErrorClass::Crypto => 5,
            ErrorClass::Storage => 6,
            // Never fatal on its own, but give it a code anyway
            ErrorClass::CertificateParse => 7,
        }
    }
}

/// Errors raised while talking to a CT log and processing its entries
#[derive(Debug, Error)]
pub enum CtError {
    /// Transport failure (connect, TLS, timeout, reset while reading)
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("response body from {url} is empty")]
    EmptyBody { url: String },

    #[error("response body from {url} exceeds the {limit} byte limit")]
    BodyTooLarge { url: String, limit: usize },

    #[error("log returned {returned} entries for a request of {requested} (start {start})")]
    BatchSize {
        start: u64,
        requested: u64,
        returned: u64,
    },

    #[error("malformed JSON from {url}: {source}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("tree head field {field} is invalid: {reason}")]
    InvalidHead { field: &'static str, reason: String },

    #[error("entry {index} is malformed: {source}")]
    Decode {
        index: u64,
        #[source]
        source: DecodeError,
    },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("certificate at entry {index} could not be parsed: {source}")]
    CertificateParse {
        index: u64,
        #[source]
        source: CertificateParseError,
    },

    #[error("storage failure: {0:#}")]
    Storage(#[source] anyhow::Error),
}

impl CtError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CtError::Network { .. } => ErrorClass::Network,
            CtError::UnexpectedStatus { .. }
            | CtError::EmptyBody { .. }
            | CtError::BodyTooLarge { .. }
            | CtError::BatchSize { .. } => ErrorClass::Protocol,
            CtError::Json { .. } | CtError::InvalidHead { .. } | CtError::Decode { .. } => {
                ErrorClass::Format
            }
            CtError::Crypto(_) => ErrorClass::Crypto,
            CtError::CertificateParse { .. } => ErrorClass::CertificateParse,
            CtError::Storage(_) => ErrorClass::Storage,
        }
    }

    /// Soft failures are archived and skipped; everything else aborts the range
    pub fn is_fatal(&self) -> bool {
        self.class() != ErrorClass::CertificateParse
    }
}

/// Failures verifying a log's signed tree head or loading its key
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("signature blob is {len} bytes, too short for the digitally-signed header")]
    SignatureTruncated { len: usize },

    #[error("unknown hash algorithm {0} (expected SHA-256)")]
    UnknownHashAlgorithm(u8),

    #[error("unknown signature algorithm {0} (expected ECDSA)")]
    UnknownSignatureAlgorithm(u8),

    #[error("signature declares {declared} bytes but {available} are present")]
    SignatureLength { declared: usize, available: usize },

    #[error("failed to parse DER signature: {0}")]
    MalformedSignature(String),

    #[error("{0} trailing bytes after signature")]
    TrailingBytes(usize),

    #[error("invalid log public key: {0}")]
    InvalidPublicKey(String),

    #[error("tree head signature verification failed")]
    VerificationFailed,
}

/// Why an entry's certificate bytes were archived instead of classified
#[derive(Debug, Error)]
pub enum CertificateParseError {
    #[error("malformed DER: {0}")]
    Der(#[source] X509Error),

    #[error("DER structure ends early")]
    Incomplete,

    #[error("{0} trailing bytes after the certificate")]
    TrailingBytes(usize),
}

impl From<nom::Err<X509Error>> for CertificateParseError {
    fn from(err: nom::Err<X509Error>) -> Self {
        match err {
            nom::Err::Error(e) | nom::Err::Failure(e) => CertificateParseError::Der(e),
            nom::Err::Incomplete(_) => CertificateParseError::Incomplete,
        }
    }
}

/// Fatal error from a range download, with the resume checkpoint
#[derive(Debug, Error)]
#[error("range download stopped at index {done}: {source}")]
pub struct RangeError {
    /// Every index below this one was fully processed
    pub done: u64,
    #[source]
    pub source: CtError,
}

impl RangeError {
    pub fn new(done: u64, source: CtError) -> Self {
        Self { done, source }
    }
}
