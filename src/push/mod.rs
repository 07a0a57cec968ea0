//! Push notification payload shape, send-outcome taxonomy, and the transport
//! seam the dispatcher fans out through.

use serde::Serialize;

use crate::types::PushSubscription;

mod http;

pub use http::HttpPushTransport;

/// Fixed notification payload consumed by the client-side display agent.
///
/// `title` and `body` are rendered verbatim; the remaining fields are optional
/// display hints. The shape is closed on purpose: arbitrary extra fields are a
/// contract violation, not an extension point.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_interaction: Option<bool>,
}

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("push endpoint returned status {0}")]
    Status(u16),
    #[error("push transport failure: {0}")]
    Network(String),
}

/// Flat per-send outcome taxonomy. Each send maps to exactly one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendOutcome {
    Sent,
    Expired,
    NotFound,
    PayloadTooLarge,
    RateLimited,
    TransportError,
}

impl SendOutcome {
    pub fn classify(result: &Result<(), PushError>) -> Self {
        match result {
            Ok(()) => SendOutcome::Sent,
            Err(PushError::Status(410)) => SendOutcome::Expired,
            Err(PushError::Status(404)) => SendOutcome::NotFound,
            Err(PushError::Status(413)) => SendOutcome::PayloadTooLarge,
            Err(PushError::Status(429)) => SendOutcome::RateLimited,
            Err(_) => SendOutcome::TransportError,
        }
    }

    /// Outcomes that mark the endpoint as permanently gone. The dispatcher
    /// deletes the subscription so the registry heals itself.
    pub fn prunes_subscription(self) -> bool {
        matches!(self, SendOutcome::Expired | SendOutcome::NotFound)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SendOutcome::Sent => "sent",
            SendOutcome::Expired => "expired",
            SendOutcome::NotFound => "not_found",
            SendOutcome::PayloadTooLarge => "payload_too_large",
            SendOutcome::RateLimited => "rate_limited",
            SendOutcome::TransportError => "transport_error",
        }
    }
}

/// Opaque push delivery adapter.
///
/// Implementations must not panic on delivery failure; every failure surfaces
/// as a `PushError` so the dispatcher can classify it.
pub trait PushTransport: Send + Sync {
    fn send(
        &self,
        subscription: &PushSubscription,
        payload: &NotificationPayload,
    ) -> Result<(), PushError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_fixed_shape() {
        let payload = NotificationPayload {
            title: "Task Started: Stretch".to_string(),
            body: "Stretch at 13:00".to_string(),
            icon: None,
            badge: None,
            tag: Some("instance-1".to_string()),
            require_interaction: None,
        };

        let json = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(json["title"], "Task Started: Stretch");
        assert_eq!(json["tag"], "instance-1");
        assert!(json.get("icon").is_none());
        assert!(json.get("requireInteraction").is_none());
    }

    #[test]
    fn status_codes_classify_per_taxonomy() {
        let cases = [
            (410u16, SendOutcome::Expired),
            (404, SendOutcome::NotFound),
            (413, SendOutcome::PayloadTooLarge),
            (429, SendOutcome::RateLimited),
            (500, SendOutcome::TransportError),
            (400, SendOutcome::TransportError),
        ];
        for (status, expected) in cases {
            let outcome = SendOutcome::classify(&Err(PushError::Status(status)));
            assert_eq!(outcome, expected, "status {}", status);
        }
        assert_eq!(SendOutcome::classify(&Ok(())), SendOutcome::Sent);
        assert_eq!(
            SendOutcome::classify(&Err(PushError::Network("timeout".to_string()))),
            SendOutcome::TransportError
        );
    }

    #[test]
    fn only_gone_endpoints_prune() {
        assert!(SendOutcome::Expired.prunes_subscription());
        assert!(SendOutcome::NotFound.prunes_subscription());
        assert!(!SendOutcome::RateLimited.prunes_subscription());
        assert!(!SendOutcome::TransportError.prunes_subscription());
        assert!(!SendOutcome::PayloadTooLarge.prunes_subscription());
        assert!(!SendOutcome::Sent.prunes_subscription());
    }
}
