//! Prober (C3): executes one HTTP check against an endpoint.
//!
//! The HTTP transport sits behind `HttpClient` so production code drives
//! `IsahcHttpClient` while tests inject canned responses, mirroring the
//! `HttpClientTrait`/`IsahcHttpClient` split in the host project's own
//! network monitor.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::classifier::{classify, ClassifyInput};
use crate::crypto::{project_auth_header, SecretStore};
use crate::logging::CoreLogger;
use crate::model::{Credential, Endpoint, ResultKind};

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("request timed out")]
    Timeout,
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("tls failure: {0}")]
    Tls(String),
    #[error("invalid header map: {0}")]
    InvalidHeaderMap(String),
}

/// One executed HTTP response, as observed by the transport. `status=0`
/// never appears here — transport failures are represented by `Err` instead.
pub struct HttpResponse {
    pub status: u16,
}

/// HTTP transport abstraction for dependency injection and testing.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(
        &self,
        method: &str,
        url: &str,
        headers: HashMap<String, String>,
        body: Vec<u8>,
        timeout_ms: u64,
    ) -> Result<HttpResponse, String>;
}

/// Production HTTP client using isahc, sharing one connection pool across
/// every probe. Safe under concurrent invocation.
pub struct IsahcHttpClient {
    client: isahc::HttpClient,
}

impl IsahcHttpClient {
    pub fn new() -> Result<Self, isahc::Error> {
        Ok(Self {
            client: isahc::HttpClient::new()?,
        })
    }
}

#[async_trait]
impl HttpClient for IsahcHttpClient {
    async fn execute(
        &self,
        method: &str,
        url: &str,
        headers: HashMap<String, String>,
        body: Vec<u8>,
        timeout_ms: u64,
    ) -> Result<HttpResponse, String> {
        use isahc::http::Method;
        use isahc::Request;

        let method = Method::from_bytes(method.as_bytes()).map_err(|e| e.to_string())?;
        let mut builder = Request::builder()
            .method(method)
            .uri(url)
            .timeout(Duration::from_millis(timeout_ms));

        for (key, value) in &headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let request = builder.body(body).map_err(|e| e.to_string())?;

        let response = self
            .client
            .send_async(request)
            .await
            .map_err(|e| e.to_string())?;

        Ok(HttpResponse {
            status: response.status().as_u16(),
        })
    }
}

/// Executes one probe, total over every possible HTTP outcome: always
/// returns a `CheckResult`-shaped tuple, never propagates an error.
pub struct Prober {
    http_client: Box<dyn HttpClient>,
    secret_store: SecretStore,
    logger: std::sync::Arc<CoreLogger>,
}

pub struct ProbeOutput {
    pub status_code: u16,
    pub latency_ms: i64,
    pub kind: ResultKind,
    pub success: bool,
    pub error_message: Option<String>,
}

impl Prober {
    pub fn new(
        http_client: Box<dyn HttpClient>,
        secret_store: SecretStore,
        logger: std::sync::Arc<CoreLogger>,
    ) -> Self {
        Self {
            http_client,
            secret_store,
            logger,
        }
    }

    /// Run one check against `endpoint`, optionally authenticating with
    /// `credential`. Never panics, never propagates a transport error —
    /// every path becomes a classified `ProbeOutput`.
    pub async fn probe(&self, endpoint: &Endpoint, credential: Option<&Credential>) -> ProbeOutput {
        let t0 = Instant::now();
        let correlation_id = uuid::Uuid::new_v4().to_string();

        self.logger.debug(
            "Prober",
            "probe_start",
            &format!("probing endpoint {} ({})", endpoint.id, endpoint.url),
        );

        let mut headers = parse_header_map(&endpoint.headers, &self.logger);

        if let Some(cred) = credential {
            match self.project_credential_header(cred) {
                Ok(header) => {
                    headers.insert(header.name, header.value);
                }
                Err(e) => {
                    self.logger.error(
                        "Prober",
                        "credential_open_failed",
                        &format!("endpoint {}: {}", endpoint.id, e),
                    );
                    return ProbeOutput {
                        status_code: 0,
                        latency_ms: t0.elapsed().as_millis() as i64,
                        kind: ResultKind::UnknownError,
                        success: false,
                        error_message: Some("credential could not be decrypted".to_string()),
                    };
                }
            }
        }

        let body = if endpoint.method.has_body() {
            if let Some(b) = &endpoint.body {
                headers
                    .entry("Content-Type".to_string())
                    .or_insert_with(|| "application/json".to_string());
                b.clone().into_bytes()
            } else {
                Vec::new()
            }
        } else {
            Vec::new()
        };

        let result = self
            .http_client
            .execute(
                endpoint.method.as_str(),
                &endpoint.url,
                headers,
                body,
                endpoint.timeout_ms as u64,
            )
            .await;

        let latency_ms = t0.elapsed().as_millis() as i64;

        let (actual_status, transport_error) = match &result {
            Ok(resp) => (resp.status, None),
            Err(e) => (0u16, Some(e.as_str())),
        };

        let kind = classify(&ClassifyInput {
            expected_status: endpoint.expected_status,
            actual_status,
            latency_ms,
            max_latency_ms: endpoint.max_latency_ms,
            transport_error,
        });

        self.logger.debug(
            "Prober",
            "probe_end",
            &format!(
                "endpoint {} -> kind={:?} status={} latency_ms={} corr={}",
                endpoint.id, kind, actual_status, latency_ms, correlation_id
            ),
        );

        ProbeOutput {
            status_code: actual_status,
            latency_ms,
            kind,
            success: kind.is_success(),
            error_message: transport_error.map(|s| truncate(s, 1000)),
        }
    }

    fn project_credential_header(
        &self,
        credential: &Credential,
    ) -> Result<crate::crypto::AuthHeader, crate::crypto::CryptoError> {
        let value = self.secret_store.open(&credential.sealed_value)?;
        let username = match &credential.sealed_username {
            Some(sealed) => Some(self.secret_store.open(sealed)?),
            None => None,
        };
        Ok(project_auth_header(
            credential.kind,
            &value,
            username.as_deref(),
            credential.header_name.as_deref(),
        ))
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// Parse the endpoint's opaque JSON header map. Parse errors are logged and
/// silently ignored — the probe proceeds without custom headers.
fn parse_header_map(value: &serde_json::Value, logger: &CoreLogger) -> HashMap<String, String> {
    match value {
        serde_json::Value::Object(map) => map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
        serde_json::Value::Null => HashMap::new(),
        _ => {
            logger.debug("Prober", "header_parse_ignored", "header map was not a JSON object");
            HashMap::new()
        }
    }
}
