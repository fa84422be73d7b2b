//! Gateway error taxonomy
//!
//! Typed errors for the admission pipeline. Only routing and admission
//! decisions surface to the client as HTTP status codes; infrastructure
//! failures prefer availability and are logged where they occur.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors produced by the request pipeline and its subsystems
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Request matched a blocking WAF rule
    #[error("blocked by WAF rule {rule}")]
    BlockedByWaf { rule: String },

    /// Anomaly classifier crossed the block threshold
    #[error("blocked by anomaly detector: {label} ({score:.2})")]
    BlockedByAnomaly { label: String, score: f64 },

    /// Neither a domain nor a path route matched
    #[error("no route found")]
    NoRoute,

    /// The configured target URL could not be parsed
    #[error("invalid upstream target: {0}")]
    InvalidUpstream(String),

    /// The upstream request failed at the transport level
    #[error("upstream request failed: {0}")]
    UpstreamFailure(String),

    /// Challenge answer was wrong, expired, or for another client
    #[error("challenge verification failed")]
    ChallengeFailed,

    /// The classifier did not answer within the deadline
    #[error("classifier timeout")]
    ClassifierTimeout,

    /// The embedded store could not serve the query
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl GatewayError {
    /// HTTP status surfaced to the client for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BlockedByWaf { .. }
            | Self::BlockedByAnomaly { .. }
            | Self::ChallengeFailed => StatusCode::FORBIDDEN,
            Self::NoRoute => StatusCode::NOT_FOUND,
            Self::InvalidUpstream(_) | Self::StoreUnavailable(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            // Timeouts are treated as "no signal" by the pipeline; the status
            // only applies if one escapes to the client.
            Self::ClassifierTimeout => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayError::BlockedByWaf { rule: "x".into() }.status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(GatewayError::NoRoute.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            GatewayError::InvalidUpstream("::".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::UpstreamFailure("refused".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::ChallengeFailed.status(),
            StatusCode::FORBIDDEN
        );
    }
}
