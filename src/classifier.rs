// src/classifier.rs
//! Certificate classification
//!
//! Every decoded entry ends up in exactly one bucket: archived (the bytes
//! are not a certificate we can parse), recorded, matched, or skipped when
//! the record policy only keeps matches.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::prelude::*;

use crate::artifacts::ArtifactStore;
use crate::ct_log::fetcher::EntrySink;
use crate::ct_log::leaf::{LeafEntry, LeafPayload};
use crate::database::Datastore;
use crate::error::{CertificateParseError, CtError};
use crate::stats::StatsCollector;

/// Which parsed certificates are written to the datastore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordPolicy {
    /// Record every parsed certificate; matches are recorded in addition
    #[default]
    All,
    /// Record only certificates that match the search term
    MatchesOnly,
}

/// Case-sensitive suffix matched against names in a certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTerm(String);

impl SearchTerm {
    pub fn new(term: impl Into<String>) -> Self {
        Self(term.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, name: &str) -> bool {
        name.ends_with(&self.0)
    }
}

/// Fields extracted from a certificate or precertificate TBS
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedCertificate {
    /// Raw X.509 version field (0 for v1, 2 for v3)
    pub version: u32,
    /// Hex-encoded serial number
    pub serial: String,
    /// Unix seconds
    pub not_before: i64,
    pub not_after: i64,
    pub issuer: String,
    pub subject_common_name: Option<String>,
    pub country: Vec<String>,
    pub state: Vec<String>,
    pub locality: Vec<String>,
    pub organization: Vec<String>,
    pub organizational_unit: Vec<String>,
    pub dns_names: Vec<String>,
    /// SHA-256 of the parsed bytes, hex
    pub fingerprint: String,
    pub is_precert: bool,
}

impl ParsedCertificate {
    /// Parse a full DER certificate. Trailing bytes are rejected.
    pub fn from_der(der: &[u8]) -> Result<Self, CertificateParseError> {
        let (rest, cert) = X509Certificate::from_der(der)?;
        if !rest.is_empty() {
            return Err(CertificateParseError::TrailingBytes(rest.len()));
        }
        Ok(Self::from_tbs(&cert.tbs_certificate, der, false))
    }

    /// Parse the TBS portion of a precertificate
    pub fn from_tbs_der(der: &[u8]) -> Result<Self, CertificateParseError> {
        let (rest, tbs) = TbsCertificate::from_der(der)?;
        if !rest.is_empty() {
            return Err(CertificateParseError::TrailingBytes(rest.len()));
        }
        Ok(Self::from_tbs(&tbs, der, true))
    }

    fn from_tbs(tbs: &TbsCertificate, der: &[u8], is_precert: bool) -> Self {
        let fingerprint = hex::encode(Sha256::digest(der));

        let mut dns_names = Vec::new();
        for ext in tbs.extensions() {
            if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
                for name in &san.general_names {
                    if let GeneralName::DNSName(dns) = name {
                        dns_names.push(dns.to_string());
                    }
                }
            }
        }

        let subject = tbs.subject();
        let issuer = first_str(tbs.issuer().iter_common_name())
            .unwrap_or_else(|| tbs.issuer().to_string());

        Self {
            version: tbs.version().0,
            serial: hex::encode(tbs.raw_serial()),
            not_before: tbs.validity().not_before.timestamp(),
            not_after: tbs.validity().not_after.timestamp(),
            issuer,
            subject_common_name: first_str(subject.iter_common_name()),
            country: all_str(subject.iter_country()),
            state: all_str(subject.iter_state_or_province()),
            locality: all_str(subject.iter_locality()),
            organization: all_str(subject.iter_organization()),
            organizational_unit: all_str(subject.iter_organizational_unit()),
            dns_names,
            fingerprint,
            is_precert,
        }
    }

    /// True if the common name or any DNS SAN ends with the search term
    pub fn matches(&self, search: &SearchTerm) -> bool {
        self.subject_common_name
            .iter()
            .chain(self.dns_names.iter())
            .any(|name| search.matches(name))
    }
}

fn first_str<'a, 'b: 'a>(
    mut attrs: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>,
) -> Option<String> {
    attrs.find_map(|attr| attr.as_str().ok().map(str::to_string))
}

fn all_str<'a, 'b: 'a>(attrs: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>) -> Vec<String> {
    attrs
        .filter_map(|attr| attr.as_str().ok().map(str::to_string))
        .collect()
}

/// Outcome of classifying one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Unparsable bytes written to the artifact store
    Archived,
    Recorded { certificate_id: i64 },
    Matched { certificate_id: i64, match_id: i64 },
    /// Parsed, did not match, and the policy only keeps matches
    Skipped,
}

pub struct CertificateClassifier {
    datastore: Arc<dyn Datastore>,
    artifacts: ArtifactStore,
    search: SearchTerm,
    policy: RecordPolicy,
    stats: StatsCollector,
}

impl CertificateClassifier {
    pub fn new(
        datastore: Arc<dyn Datastore>,
        artifacts: ArtifactStore,
        search: SearchTerm,
        policy: RecordPolicy,
        stats: StatsCollector,
    ) -> Self {
        Self {
            datastore,
            artifacts,
            search,
            policy,
            stats,
        }
    }

    /// Classify one decoded entry.
    ///
    /// Parse failures are archived and reported as [`Classification::Archived`];
    /// only artifact and datastore failures are returned as errors.
    pub async fn classify(&self, index: u64, entry: &LeafEntry) -> Result<Classification, CtError> {
        let parsed = match &entry.payload {
            LeafPayload::X509 { certificate } => ParsedCertificate::from_der(certificate),
            LeafPayload::PreCert { tbs_certificate, .. } => {
                ParsedCertificate::from_tbs_der(tbs_certificate)
            }
        };

        let cert = match parsed {
            Ok(cert) => cert,
            Err(source) => {
                let soft = CtError::CertificateParse { index, source };
                warn!("{}; archiving raw bytes", soft);

                self.artifacts
                    .write_artifact(index, entry.certificate_bytes())
                    .await
                    .map_err(CtError::Storage)?;
                self.stats.increment_archived();
                return Ok(Classification::Archived);
            }
        };

        let matched = cert.matches(&self.search);
        if !matched && self.policy == RecordPolicy::MatchesOnly {
            return Ok(Classification::Skipped);
        }

        let certificate_id = self
            .datastore
            .record_certificate(entry.certificate_bytes())
            .await
            .map_err(CtError::Storage)?;
        self.stats.increment_recorded();

        if !matched {
            return Ok(Classification::Recorded { certificate_id });
        }

        let match_id = self
            .datastore
            .record_match(&cert, certificate_id)
            .await
            .map_err(CtError::Storage)?;
        self.stats.increment_matches();

        info!(
            "Entry {} matched {}: {}",
            index,
            self.search.as_str(),
            cert.subject_common_name
                .as_deref()
                .or_else(|| cert.dns_names.first().map(String::as_str))
                .unwrap_or("<unnamed>")
        );

        Ok(Classification::Matched {
            certificate_id,
            match_id,
        })
    }
}

#[async_trait]
impl EntrySink for CertificateClassifier {
    async fn accept(&mut self, index: u64, entry: LeafEntry) -> Result<(), CtError> {
        let outcome = self.classify(index, &entry).await?;
        self.stats.increment_processed();
        debug!(
            "Entry {} ({:?}, logged {:?}) classified as {:?}",
            index,
            entry.entry_type(),
            entry.time(),
            outcome
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::database::MemoryDatastore;
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
    use tempfile::TempDir;

    /// Self-signed certificate DER with the given CN and DNS SANs
    pub(crate) fn make_cert(common_name: &str, sans: &[&str]) -> Vec<u8> {
        let mut params =
            CertificateParams::new(sans.iter().map(|s| s.to_string()).collect::<Vec<_>>())
                .unwrap();
        params.distinguished_name = DistinguishedName::new();
        params
            .distinguished_name
            .push(DnType::CommonName, common_name);
        params
            .distinguished_name
            .push(DnType::OrganizationName, "Example Org");
        params.distinguished_name.push(DnType::CountryName, "US");

        let key = KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().der().to_vec()
    }

    fn x509_entry(certificate: Vec<u8>) -> LeafEntry {
        LeafEntry {
            timestamp: 1_700_000_000_000,
            payload: LeafPayload::X509 { certificate },
            extra_certs: Vec::new(),
        }
    }

    fn classifier(
        store: Arc<MemoryDatastore>,
        dir: &TempDir,
        policy: RecordPolicy,
    ) -> (CertificateClassifier, StatsCollector) {
        let stats = StatsCollector::new();
        let classifier = CertificateClassifier::new(
            store,
            ArtifactStore::new(dir.path()),
            SearchTerm::new(".com"),
            policy,
            stats.clone(),
        );
        (classifier, stats)
    }

    #[test]
    fn test_common_name_suffix_matches() {
        let cert = ParsedCertificate::from_der(&make_cert("www.example.com", &[])).unwrap();
        assert_eq!(cert.subject_common_name.as_deref(), Some("www.example.com"));
        assert!(cert.matches(&SearchTerm::new(".com")));
    }

    #[test]
    fn test_non_matching_name() {
        let cert =
            ParsedCertificate::from_der(&make_cert("example.org", &["example.org"])).unwrap();
        assert!(!cert.matches(&SearchTerm::new(".com")));
    }

    #[test]
    fn test_dns_san_matches() {
        let cert = ParsedCertificate::from_der(&make_cert(
            "example.org",
            &["example.org", "shop.example.com"],
        ))
        .unwrap();

        assert_eq!(cert.dns_names, vec!["example.org", "shop.example.com"]);
        assert!(cert.matches(&SearchTerm::new(".com")));
    }

    #[test]
    fn test_match_is_case_sensitive() {
        let cert = ParsedCertificate::from_der(&make_cert("WWW.EXAMPLE.COM", &[])).unwrap();
        assert!(!cert.matches(&SearchTerm::new(".com")));
    }

    #[test]
    fn test_subject_fields_extracted() {
        let der = make_cert("www.example.com", &[]);
        let cert = ParsedCertificate::from_der(&der).unwrap();

        assert_eq!(cert.organization, vec!["Example Org"]);
        assert_eq!(cert.country, vec!["US"]);
        // Self-signed, so the issuer CN is our own
        assert_eq!(cert.issuer, "www.example.com");
        assert_eq!(cert.fingerprint, hex::encode(Sha256::digest(&der)));
        assert!(cert.not_before < cert.not_after);
        assert!(!cert.is_precert);
    }

    #[test]
    fn test_strict_parse_rejects_trailing_bytes() {
        let mut der = make_cert("www.example.com", &[]);
        der.extend_from_slice(&[0, 0]);
        assert!(matches!(
            ParsedCertificate::from_der(&der),
            Err(CertificateParseError::TrailingBytes(2))
        ));
        assert!(matches!(
            ParsedCertificate::from_der(b"not a certificate"),
            Err(CertificateParseError::Der(_))
        ));
    }

    #[test]
    fn test_precert_tbs_parsed() {
        let der = make_cert("pre.example.com", &[]);
        let (_, cert) = X509Certificate::from_der(&der).unwrap();
        let tbs = cert.tbs_certificate.as_ref();

        let parsed = ParsedCertificate::from_tbs_der(tbs).unwrap();
        assert!(parsed.is_precert);
        assert!(parsed.matches(&SearchTerm::new(".com")));
    }

    #[tokio::test]
    async fn test_classify_records_and_matches() {
        let store = Arc::new(MemoryDatastore::new());
        let dir = TempDir::new().unwrap();
        let (classifier, stats) = classifier(store.clone(), &dir, RecordPolicy::All);

        let matched = classifier
            .classify(0, &x509_entry(make_cert("www.example.com", &[])))
            .await
            .unwrap();
        let recorded = classifier
            .classify(1, &x509_entry(make_cert("example.org", &[])))
            .await
            .unwrap();

        assert_eq!(
            matched,
            Classification::Matched {
                certificate_id: 1,
                match_id: 1
            }
        );
        assert_eq!(recorded, Classification::Recorded { certificate_id: 2 });
        assert_eq!(store.certificate_count().await, 2);
        assert_eq!(store.matches().await.len(), 1);
        assert_eq!(stats.snapshot().matches_found, 1);
    }

    #[tokio::test]
    async fn test_default_config_keeps_memory_store_flat() {
        let config = crate::config::Config::default();
        assert!(!config.database.enabled);

        let store = Arc::new(MemoryDatastore::with_match_capacity(10));
        let dir = TempDir::new().unwrap();
        let (classifier, _) = classifier(store.clone(), &dir, config.search.record_policy);

        let unmatched = x509_entry(make_cert("example.org", &["example.org"]));
        let matched = x509_entry(make_cert("www.example.com", &[]));
        for index in 0..500 {
            classifier.classify(index, &unmatched).await.unwrap();
        }
        for index in 500..550 {
            classifier.classify(index, &matched).await.unwrap();
        }

        assert_eq!(store.certificate_count().await, 550);
        assert_eq!(store.match_count().await, 50);
        let retained = store.matches().await;
        assert_eq!(retained.len(), 10);
        assert_eq!(retained[9].0, 550);
    }

    #[tokio::test]
    async fn test_matches_only_policy_skips_unmatched() {
        let store = Arc::new(MemoryDatastore::new());
        let dir = TempDir::new().unwrap();
        let (classifier, _) = classifier(store.clone(), &dir, RecordPolicy::MatchesOnly);

        let outcome = classifier
            .classify(0, &x509_entry(make_cert("example.org", &[])))
            .await
            .unwrap();

        assert_eq!(outcome, Classification::Skipped);
        assert_eq!(store.certificate_count().await, 0);
    }

    #[tokio::test]
    async fn test_unparsable_certificate_archived() {
        let store = Arc::new(MemoryDatastore::new());
        let dir = TempDir::new().unwrap();
        let (mut classifier, stats) = classifier(store.clone(), &dir, RecordPolicy::All);

        classifier
            .accept(17, x509_entry(b"garbage".to_vec()))
            .await
            .unwrap();

        assert!(dir.path().join("17.pem").exists());
        assert_eq!(store.certificate_count().await, 0);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.certificates_archived, 1);
        assert_eq!(snapshot.entries_processed, 1);
    }

    #[tokio::test]
    async fn test_artifact_failure_is_fatal() {
        let store = Arc::new(MemoryDatastore::new());
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"").unwrap();

        let classifier = CertificateClassifier::new(
            store,
            ArtifactStore::new(&blocker),
            SearchTerm::new(".com"),
            RecordPolicy::All,
            StatsCollector::new(),
        );

        let err = classifier
            .classify(3, &x509_entry(b"garbage".to_vec()))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
