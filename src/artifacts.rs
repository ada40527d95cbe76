// src/artifacts.rs
//! On-disk archive for certificates that failed to parse
//!
//! Each artifact is a PEM file named after its entry index, kept in a
//! per-log subdirectory so indices from different logs never collide.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

/// Writes raw certificate bytes for later inspection
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store scoped to one log, under a directory derived from its URL
    pub fn for_log(&self, log_url: &str) -> Self {
        Self {
            dir: self.dir.join(log_dir_name(log_url)),
        }
    }

    pub fn artifact_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("{}.pem", index))
    }

    /// Persist `der` as `<index>.pem`, creating the directory if needed
    pub async fn write_artifact(&self, index: u64, der: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create artifact directory {:?}", self.dir))?;

        let path = self.artifact_path(index);
        fs::write(&path, encode_pem(der))
            .await
            .with_context(|| format!("Failed to open {:?} for writing", path))?;

        debug!("Archived entry {} to {:?}", index, path);

        Ok(path)
    }
}

/// `https://ct.example.com/logs/2025/` becomes `ct.example.com_logs_2025`
fn log_dir_name(log_url: &str) -> String {
    let trimmed = match url::Url::parse(log_url) {
        Ok(url) => format!("{}{}", url.host_str().unwrap_or_default(), url.path()),
        Err(_) => log_url.to_string(),
    };

    let name: String = trimmed
        .trim_matches('/')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();

    if name.is_empty() {
        "log".to_string()
    } else {
        name
    }
}

/// PEM-armour `der` as a CERTIFICATE block
pub fn encode_pem(der: &[u8]) -> String {
    pem::encode(&pem::Pem::new("CERTIFICATE", der.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_log_dir_name() {
        assert_eq!(
            log_dir_name("https://ct.googleapis.com/logs/us1/argon2025h1/"),
            "ct.googleapis.com_logs_us1_argon2025h1"
        );
        assert_eq!(log_dir_name("https://oak.ct.letsencrypt.org"), "oak.ct.letsencrypt.org");
        assert_eq!(log_dir_name("not a url"), "not_a_url");
    }

    #[test]
    fn test_encode_pem_wraps_lines() {
        let armoured = encode_pem(&[0xab; 100]);
        let lines: Vec<&str> = armoured.lines().collect();

        assert_eq!(lines.first(), Some(&"-----BEGIN CERTIFICATE-----"));
        assert_eq!(lines.last(), Some(&"-----END CERTIFICATE-----"));
        // 100 bytes -> 136 base64 chars -> 64 + 64 + 8
        assert_eq!(lines[1].len(), 64);
        assert_eq!(lines[2].len(), 64);
        assert_eq!(lines[3].len(), 8);

        let decoded = pem::parse(&armoured).unwrap();
        assert_eq!(decoded.tag(), "CERTIFICATE");
        assert_eq!(decoded.contents(), &[0xab; 100][..]);
    }

    #[tokio::test]
    async fn test_write_artifact_named_by_index() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path()).for_log("https://log.example/ct");

        let path = store.write_artifact(4242, b"garbage").await.unwrap();

        assert_eq!(path, temp.path().join("log.example_ct").join("4242.pem"));
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("Z2FyYmFnZQ=="));
    }

    #[tokio::test]
    async fn test_write_artifact_failure_reported() {
        let temp = TempDir::new().unwrap();
        // A regular file where the directory should be
        let blocker = temp.path().join("blocked");
        std::fs::write(&blocker, b"").unwrap();

        let store = ArtifactStore::new(&blocker);
        assert!(store.write_artifact(1, b"x").await.is_err());
    }
}
