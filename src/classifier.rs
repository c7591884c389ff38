//! Pure classification of a probe outcome into a closed `ResultKind` (C2).
//!
//! Deliberately free of I/O: every code path is covered by the decision
//! table below, in order, and the function never panics.

use crate::model::ResultKind;

/// Inputs the Classifier needs, mirrored 1:1 from the Prober's observations.
#[derive(Debug, Clone)]
pub struct ClassifyInput<'a> {
    pub expected_status: u16,
    pub actual_status: u16,
    pub latency_ms: i64,
    pub max_latency_ms: Option<i64>,
    pub transport_error: Option<&'a str>,
}

/// Classify a probe outcome. Total over the input domain — decision order matters:
/// transport error > 401 > 5xx > status mismatch > latency breach > success.
///
/// Error-text matching in step 1 is a brittle fallback by design (structured
/// discrimination from the HTTP client should be preferred where available);
/// it only runs when `transport_error` is set.
pub fn classify(input: &ClassifyInput) -> ResultKind {
    if let Some(err) = input.transport_error {
        let lower = err.to_lowercase();
        return if lower.contains("timeout") {
            ResultKind::Timeout
        } else if lower.contains("ssl") || lower.contains("certificate") {
            ResultKind::SslError
        } else if lower.contains("connection") || lower.contains("refused") {
            ResultKind::ConnectionError
        } else {
            ResultKind::UnknownError
        };
    }

    if input.actual_status == 401 {
        return ResultKind::AuthFailure;
    }

    if input.actual_status >= 500 {
        return ResultKind::ServerError;
    }

    if input.actual_status != input.expected_status {
        return ResultKind::StatusMismatch;
    }

    if let Some(max) = input.max_latency_ms {
        if input.latency_ms > max {
            return ResultKind::LatencyBreach;
        }
    }

    ResultKind::Success
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ClassifyInput<'static> {
        ClassifyInput {
            expected_status: 200,
            actual_status: 200,
            latency_ms: 50,
            max_latency_ms: None,
            transport_error: None,
        }
    }

    #[test]
    fn success_is_default() {
        assert_eq!(classify(&base()), ResultKind::Success);
    }

    #[test]
    fn transport_error_timeout() {
        let mut i = base();
        i.transport_error = Some("operation timed out after 5000ms");
        assert_eq!(classify(&i), ResultKind::Timeout);
    }

    #[test]
    fn transport_error_ssl() {
        let mut i = base();
        i.transport_error = Some("certificate verification failed");
        assert_eq!(classify(&i), ResultKind::SslError);
    }

    #[test]
    fn transport_error_connection() {
        let mut i = base();
        i.transport_error = Some("connection refused");
        assert_eq!(classify(&i), ResultKind::ConnectionError);
    }

    #[test]
    fn transport_error_unknown() {
        let mut i = base();
        i.transport_error = Some("something weird happened");
        assert_eq!(classify(&i), ResultKind::UnknownError);
    }

    #[test]
    fn auth_failure_wins_over_status_mismatch() {
        // Scenario 3: 401 wins over STATUS_MISMATCH even with a latency breach armed.
        let i = ClassifyInput {
            expected_status: 200,
            actual_status: 401,
            latency_ms: 50,
            max_latency_ms: Some(100),
            transport_error: None,
        };
        assert_eq!(classify(&i), ResultKind::AuthFailure);
    }

    #[test]
    fn server_error_wins_over_status_mismatch() {
        let mut i = base();
        i.actual_status = 503;
        assert_eq!(classify(&i), ResultKind::ServerError);
    }

    #[test]
    fn status_mismatch() {
        let mut i = base();
        i.actual_status = 201;
        assert_eq!(classify(&i), ResultKind::StatusMismatch);
    }

    #[test]
    fn latency_breach_wins_over_success() {
        // Scenario 4.
        let i = ClassifyInput {
            expected_status: 200,
            actual_status: 200,
            latency_ms: 500,
            max_latency_ms: Some(400),
            transport_error: None,
        };
        assert_eq!(classify(&i), ResultKind::LatencyBreach);
    }

    #[test]
    fn latency_within_bound_is_success() {
        let i = ClassifyInput {
            expected_status: 200,
            actual_status: 200,
            latency_ms: 50,
            max_latency_ms: Some(400),
            transport_error: None,
        };
        assert_eq!(classify(&i), ResultKind::Success);
    }
}
