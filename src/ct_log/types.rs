// src/ct_log/types.rs
use serde::{Deserialize, Serialize};

/// Response from CT log's get-sth endpoint (RFC 6962 section 4.3)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SthResponse {
    pub tree_size: u64,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    #[serde(with = "base64_bytes")]
    pub sha256_root_hash: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub tree_head_signature: Vec<u8>,
}

/// Single entry from CT log's get-entries endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    #[serde(with = "base64_bytes")]
    pub leaf_input: Vec<u8>,
    #[serde(with = "base64_bytes", default)]
    pub extra_data: Vec<u8>,
}

/// Response wrapper for get-entries endpoint (RFC 6962 section 4.6)
#[derive(Debug, Serialize, Deserialize)]
pub struct GetEntriesResponse {
    pub entries: Vec<RawEntry>,
}

/// Google's CT log list V3 format
#[derive(Debug, Serialize, Deserialize)]
pub struct LogListV3 {
    pub operators: Vec<Operator>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Operator {
    pub name: String,
    #[serde(default)]
    pub logs: Vec<LogInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogInfo {
    #[serde(default)]
    pub description: String,
    /// Base64 SubjectPublicKeyInfo
    pub key: Option<String>,
    #[serde(default)]
    pub url: String,
    pub mmd: Option<u64>,
    #[serde(default)]
    pub state: Option<StateWrapper>,
}

/// State wrapper that can contain different state types
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateWrapper {
    #[serde(default)]
    pub usable: Option<StateTimestamp>,
    #[serde(default)]
    pub qualified: Option<StateTimestamp>,
    #[serde(default)]
    pub readonly: Option<StateTimestamp>,
    #[serde(default)]
    pub retired: Option<StateTimestamp>,
    #[serde(default)]
    pub rejected: Option<StateTimestamp>,
}

impl StateWrapper {
    /// Log is actively accepting new entries
    pub fn is_usable(&self) -> bool {
        self.usable.is_some() || self.qualified.is_some()
    }

    /// Log is frozen but its entries can still be read
    pub fn is_readonly(&self) -> bool {
        self.readonly.is_some()
    }

    pub fn is_acceptable(&self, include_readonly: bool) -> bool {
        self.is_usable() || (include_readonly && self.is_readonly())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTimestamp {
    pub timestamp: String,
}

/// Standard base64 on the wire, raw bytes in memory
mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
