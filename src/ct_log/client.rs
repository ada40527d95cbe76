// src/ct_log/client.rs
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use super::fetcher::EntrySource;
use super::types::{GetEntriesResponse, RawEntry, SthResponse};
use crate::error::CtError;

/// Tree heads are tiny; anything bigger is a broken or hostile server
pub const DEFAULT_STH_BODY_LIMIT: usize = 1 << 16;

pub const DEFAULT_ENTRIES_BODY_LIMIT: usize = 256 << 20;

/// Transport settings for [`CtLogClient`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    pub sth_body_limit: usize,
    pub entries_body_limit: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            sth_body_limit: DEFAULT_STH_BODY_LIMIT,
            entries_body_limit: DEFAULT_ENTRIES_BODY_LIMIT,
        }
    }
}

/// HTTP client for Certificate Transparency log RFC 6962 API
pub struct CtLogClient {
    base_url: String,
    http_client: reqwest::Client,
    options: ClientOptions,
}

impl CtLogClient {
    /// Create a new CT log client
    pub fn new(base_url: &str, options: ClientOptions) -> Result<Self, CtError> {
        let base_url = base_url.trim_end_matches('/').to_string();

        let http_client = reqwest::Client::builder()
            .timeout(options.timeout)
            .gzip(true)
            .build()
            .map_err(|source| CtError::Network {
                url: base_url.clone(),
                source,
            })?;

        Ok(Self {
            base_url,
            http_client,
            options,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get Signed Tree Head (unverified)
    /// Endpoint: GET {base_url}/ct/v1/get-sth
    pub async fn get_sth(&self) -> Result<SthResponse, CtError> {
        let url = format!("{}/ct/v1/get-sth", self.base_url);

        debug!("Fetching STH from {}", url);

        let body = self.get_capped(&url, self.options.sth_body_limit).await?;
        let sth: SthResponse =
            serde_json::from_slice(&body).map_err(|source| CtError::Json { url, source })?;

        debug!(
            "STH received: tree_size={}, timestamp={}",
            sth.tree_size, sth.timestamp
        );

        Ok(sth)
    }

    /// Get entries from CT log, both bounds inclusive
    /// Endpoint: GET {base_url}/ct/v1/get-entries?start={start}&end={end}
    pub async fn get_entries(&self, start: u64, end: u64) -> Result<Vec<RawEntry>, CtError> {
        let url = format!(
            "{}/ct/v1/get-entries?start={}&end={}",
            self.base_url, start, end
        );

        debug!("Fetching entries {}-{} from {}", start, end, self.base_url);

        let body = self
            .get_capped(&url, self.options.entries_body_limit)
            .await?;
        let entries_response: GetEntriesResponse =
            serde_json::from_slice(&body).map_err(|source| CtError::Json { url, source })?;

        debug!(
            "Received {} entries from {}",
            entries_response.entries.len(),
            self.base_url
        );

        Ok(entries_response.entries)
    }

    /// GET `url` and read at most `limit` bytes of body
    async fn get_capped(&self, url: &str, limit: usize) -> Result<Vec<u8>, CtError> {
        let network = |source| CtError::Network {
            url: url.to_string(),
            source,
        };

        let mut response = self.http_client.get(url).send().await.map_err(network)?;

        let status = response.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                warn!("Rate limited by CT log: {}", self.base_url);
            }
            return Err(CtError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // Reject early when the server announces the size
        match response.content_length() {
            Some(0) => {
                return Err(CtError::EmptyBody {
                    url: url.to_string(),
                })
            }
            Some(len) if len > limit as u64 => {
                return Err(CtError::BodyTooLarge {
                    url: url.to_string(),
                    limit,
                })
            }
            _ => {}
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(network)? {
            if body.len() + chunk.len() > limit {
                return Err(CtError::BodyTooLarge {
                    url: url.to_string(),
                    limit,
                });
            }
            body.extend_from_slice(&chunk);
        }

        if body.is_empty() {
            return Err(CtError::EmptyBody {
                url: url.to_string(),
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl EntrySource for CtLogClient {
    async fn get_entries(&self, start: u64, end: u64) -> Result<Vec<RawEntry>, CtError> {
        CtLogClient::get_entries(self, start, end).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_entries_request_shape() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/ct/v1/get-entries"))
            .and(query_param("start", "10"))
            .and(query_param("end", "11"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "entries": [
                    {"leaf_input": "AAA=", "extra_data": ""},
                    {"leaf_input": "AAE=", "extra_data": "AAAA"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = CtLogClient::new(&format!("{}/", server.uri()), ClientOptions::default()).unwrap();
        let entries = client.get_entries(10, 11).await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].leaf_input, vec![0, 1]);
        assert_eq!(entries[1].extra_data, vec![0, 0, 0]);
    }

    #[tokio::test]
    async fn test_error_status_is_protocol_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/ct/v1/get-sth"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = CtLogClient::new(&server.uri(), ClientOptions::default()).unwrap();
        let err = client.get_sth().await.unwrap_err();

        assert!(matches!(err, CtError::UnexpectedStatus { status: 429, .. }));
        assert_eq!(err.class(), ErrorClass::Protocol);
    }

    #[tokio::test]
    async fn test_oversized_sth_body_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/ct/v1/get-sth"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(DEFAULT_STH_BODY_LIMIT + 1)))
            .mount(&server)
            .await;

        let client = CtLogClient::new(&server.uri(), ClientOptions::default()).unwrap();
        let err = client.get_sth().await.unwrap_err();

        assert!(matches!(err, CtError::BodyTooLarge { limit: DEFAULT_STH_BODY_LIMIT, .. }));
    }

    #[tokio::test]
    async fn test_empty_body_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/ct/v1/get-sth"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = CtLogClient::new(&server.uri(), ClientOptions::default()).unwrap();
        let err = client.get_sth().await.unwrap_err();

        assert!(matches!(err, CtError::EmptyBody { .. }));
    }

    #[tokio::test]
    async fn test_malformed_json_is_format_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/ct/v1/get-sth"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"tree_size\": \"many\"}"))
            .mount(&server)
            .await;

        let client = CtLogClient::new(&server.uri(), ClientOptions::default()).unwrap();
        let err = client.get_sth().await.unwrap_err();

        assert_eq!(err.class(), ErrorClass::Format);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Nothing listens on the tcpmux port
        let client = CtLogClient::new("http://127.0.0.1:1", ClientOptions::default()).unwrap();
        let err = client.get_sth().await.unwrap_err();

        assert_eq!(err.class(), ErrorClass::Network);
    }
}
