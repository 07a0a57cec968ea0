use std::time::Duration;

use super::{NotificationPayload, PushError, PushTransport};
use crate::types::PushSubscription;

const TTL_HEADER: &str = "TTL";
const P256DH_HEADER: &str = "X-Push-P256DH";
const AUTH_HEADER: &str = "X-Push-Auth";

// Reminders are pointless once stale; tell the push service to drop them
// after an hour.
const PUSH_TTL_SECS: u32 = 3600;

/// Blocking HTTP push transport.
///
/// Posts the payload JSON to the subscription's endpoint URL and forwards the
/// subscription keys as headers; payload encryption is delegated to the push
/// relay behind the endpoint. Every request carries a timeout so no send can
/// block a dispatch run indefinitely.
#[derive(Debug, Clone)]
pub struct HttpPushTransport {
    client: reqwest::blocking::Client,
}

impl HttpPushTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self { client }
    }
}

impl PushTransport for HttpPushTransport {
    fn send(
        &self,
        subscription: &PushSubscription,
        payload: &NotificationPayload,
    ) -> Result<(), PushError> {
        let response = self
            .client
            .post(&subscription.endpoint)
            .header(TTL_HEADER, PUSH_TTL_SECS)
            .header(P256DH_HEADER, &subscription.p256dh_key)
            .header(AUTH_HEADER, &subscription.auth_key)
            .json(payload)
            .send()
            .map_err(|err| PushError::Network(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(PushError::Status(status.as_u16()))
        }
    }
}
