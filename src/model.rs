//! Core domain types shared by every component (C1-C7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type EndpointId = i64;
pub type CredentialId = i64;
pub type IncidentId = i64;
pub type AlertId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::HEAD => "HEAD",
        }
    }

    pub fn has_body(&self) -> bool {
        matches!(self, HttpMethod::POST | HttpMethod::PUT | HttpMethod::PATCH)
    }
}

/// Derived health status of an endpoint. `DEGRADED` is reserved: no transition
/// currently produces it (see design notes on the `DEGRADED` open question).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EndpointStatus {
    #[default]
    UNKNOWN,
    UP,
    DOWN,
    DEGRADED,
}

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub id: EndpointId,
    pub project_id: i64,
    pub name: String,
    pub url: String,
    pub method: HttpMethod,
    pub headers: serde_json::Value,
    pub body: Option<String>,
    pub expected_status: u16,
    pub interval_s: i64,
    pub timeout_ms: i64,
    pub max_latency_ms: Option<i64>,
    pub credential_id: Option<CredentialId>,
    pub enabled: bool,
    pub status: EndpointStatus,
    pub last_check_at: Option<DateTime<Utc>>,
    pub next_check_at: Option<DateTime<Utc>>,
    pub consecutive_failures: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialType {
    BearerToken,
    ApiKey,
    BasicAuth,
}

/// An encrypted secret plus binding metadata. `value`/`username` carry
/// base64 sealed blobs (IV || ciphertext || tag) produced by the Secret Store.
#[derive(Debug, Clone)]
pub struct Credential {
    pub id: CredentialId,
    pub project_id: i64,
    pub name: String,
    pub kind: CredentialType,
    pub sealed_value: String,
    pub sealed_username: Option<String>,
    pub header_name: Option<String>,
}

/// Closed taxonomy of probe outcomes, total over the Classifier's input domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultKind {
    Timeout,
    SslError,
    ConnectionError,
    UnknownError,
    AuthFailure,
    ServerError,
    StatusMismatch,
    LatencyBreach,
    Success,
}

impl ResultKind {
    pub fn is_success(&self) -> bool {
        matches!(self, ResultKind::Success)
    }
}

/// Append-only probe record. Never mutated after `append_check_result`.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub id: i64,
    pub endpoint_id: EndpointId,
    pub status_code: u16,
    pub latency_ms: i64,
    pub success: bool,
    pub kind: ResultKind,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentState {
    Open,
    Acknowledged,
    Resolved,
}

#[derive(Debug, Clone)]
pub struct Incident {
    pub id: IncidentId,
    pub endpoint_id: EndpointId,
    pub state: IncidentState,
    pub failure_kind: ResultKind,
    pub started_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub failed_check_count: i64,
    pub last_error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    EndpointDown,
    Timeout,
    SslError,
    ConnectionError,
    AuthFailure,
    ServerError,
    StatusMismatch,
    LatencyBreach,
    UnknownError,
    EndpointRecovered,
}

impl AlertKind {
    /// Derive the alert kind the Alert Engine should file for a given probe
    /// classification. `ENDPOINT_RECOVERED` is produced directly by the
    /// Incident Engine, never via this mapping.
    pub fn from_result_kind(kind: ResultKind) -> Self {
        match kind {
            ResultKind::Timeout => AlertKind::Timeout,
            ResultKind::SslError => AlertKind::SslError,
            ResultKind::ConnectionError => AlertKind::ConnectionError,
            ResultKind::UnknownError => AlertKind::UnknownError,
            ResultKind::AuthFailure => AlertKind::AuthFailure,
            ResultKind::ServerError => AlertKind::ServerError,
            ResultKind::StatusMismatch => AlertKind::StatusMismatch,
            ResultKind::LatencyBreach => AlertKind::LatencyBreach,
            ResultKind::Success => AlertKind::EndpointDown, // unreachable in practice
        }
    }

    pub fn action_label(&self) -> &'static str {
        match self {
            AlertKind::EndpointDown => "API Down",
            AlertKind::Timeout => "Request Timeout",
            AlertKind::SslError => "TLS Failure",
            AlertKind::ConnectionError => "Connection Refused",
            AlertKind::AuthFailure => "Authentication Failure",
            AlertKind::ServerError => "Server Error",
            AlertKind::StatusMismatch => "Unexpected Status",
            AlertKind::LatencyBreach => "Slow Response",
            AlertKind::UnknownError => "Unknown Error",
            AlertKind::EndpointRecovered => "Recovered",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Severity is derived by the Classifier's rule: INFO for recoveries,
    /// WARNING for latency breaches, CRITICAL for auth/TLS failures, ERROR otherwise.
    pub fn for_alert_kind(kind: AlertKind) -> Self {
        match kind {
            AlertKind::EndpointRecovered => Severity::Info,
            AlertKind::LatencyBreach => Severity::Warning,
            AlertKind::AuthFailure | AlertKind::SslError => Severity::Critical,
            _ => Severity::Error,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Info => "\u{2705}",     // ✅
            Severity::Warning => "\u{26a0}",  // ⚠
            Severity::Error => "\u{274c}",    // ❌
            Severity::Critical => "\u{1f6a8}", // 🚨
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    Email,
    Slack,
    Webhook,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub id: AlertId,
    pub endpoint_id: EndpointId,
    pub incident_id: Option<IncidentId>,
    pub kind: AlertKind,
    pub severity: Severity,
    pub channel: Channel,
    pub title: String,
    pub message: String,
    pub delivered: bool,
    pub delivery_error: Option<String>,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
