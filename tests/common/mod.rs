// Shared helpers for integration tests
#![allow(dead_code)]

use base64::Engine;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::pkcs8::EncodePublicKey;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use sha2::{Digest, Sha256};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ROOT_HASH: [u8; 32] = [0x5a; 32];

pub fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn log_key() -> SigningKey {
    SigningKey::from_slice(&[0x42; 32]).unwrap()
}

/// Base64 SubjectPublicKeyInfo, as it appears in config files and log lists
pub fn public_key_b64(key: &SigningKey) -> String {
    let der = key.verifying_key().to_public_key_der().unwrap();
    b64(der.as_bytes())
}

/// get-sth JSON body signed by `key`
pub fn sth_json(key: &SigningKey, tree_size: u64, timestamp: u64) -> serde_json::Value {
    let mut input = vec![0u8, 1u8];
    input.extend_from_slice(&timestamp.to_be_bytes());
    input.extend_from_slice(&tree_size.to_be_bytes());
    input.extend_from_slice(&ROOT_HASH);

    let signature: Signature = key.sign(&input);
    let der = signature.to_der();

    let mut blob = vec![4u8, 3u8];
    blob.extend_from_slice(&(der.as_bytes().len() as u16).to_be_bytes());
    blob.extend_from_slice(der.as_bytes());

    serde_json::json!({
        "tree_size": tree_size,
        "timestamp": timestamp,
        "sha256_root_hash": b64(&ROOT_HASH),
        "tree_head_signature": b64(&blob),
    })
}

/// MerkleTreeLeaf bytes for an X509 entry
pub fn x509_leaf(timestamp: u64, cert: &[u8]) -> Vec<u8> {
    let mut leaf = vec![0u8, 0u8];
    leaf.extend_from_slice(&timestamp.to_be_bytes());
    leaf.extend_from_slice(&[0, 0]);
    leaf.extend_from_slice(&(cert.len() as u32).to_be_bytes()[1..]);
    leaf.extend_from_slice(cert);
    leaf
}

/// Self-signed certificate DER with the given CN and DNS SANs
pub fn make_cert(common_name: &str, sans: &[&str]) -> Vec<u8> {
    let mut params =
        CertificateParams::new(sans.iter().map(|s| s.to_string()).collect::<Vec<_>>()).unwrap();
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);

    let key = KeyPair::generate().unwrap();
    params.self_signed(&key).unwrap().der().to_vec()
}

pub fn fingerprint(der: &[u8]) -> String {
    hex::encode(Sha256::digest(der))
}

/// get-entries body for `certs`, numbered from `first_index`
pub fn entries_json(first_index: u64, certs: &[Vec<u8>]) -> serde_json::Value {
    let entries: Vec<_> = certs
        .iter()
        .enumerate()
        .map(|(i, cert)| {
            serde_json::json!({
                "leaf_input": b64(&x509_leaf(first_index + i as u64, cert)),
                "extra_data": "",
            })
        })
        .collect();
    serde_json::json!({ "entries": entries })
}

/// Serve a signed head for `certs.len()` entries and one page per
/// `page_size` chunk
pub async fn serve_log(key: &SigningKey, certs: &[Vec<u8>], page_size: usize) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ct/v1/get-sth"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(sth_json(
                key,
                certs.len() as u64,
                1_700_000_000_000,
            )),
        )
        .mount(&server)
        .await;

    for (page, chunk) in certs.chunks(page_size).enumerate() {
        let first = (page * page_size) as u64;
        Mock::given(method("GET"))
            .and(path("/ct/v1/get-entries"))
            .and(query_param("start", first.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(entries_json(first, chunk)))
            .mount(&server)
            .await;
    }

    server
}
