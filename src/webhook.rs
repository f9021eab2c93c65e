//! Webhook signature verification (spec.md §6): `sha256=<hex>` header,
//! HMAC-SHA256 over the raw body, constant-time compare, with a capped
//! replay-protection set.

use std::collections::VecDeque;
use std::sync::Mutex;

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("signature header missing or malformed")]
    MalformedHeader,
    #[error("signature does not match")]
    SignatureMismatch,
    #[error("event id already processed")]
    Replay,
}

/// Verify a `sha256=<hex>` signature header against `body` using
/// constant-time comparison (spec.md §6).
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> Result<(), WebhookError> {
    let hex_sig = header
        .strip_prefix("sha256=")
        .ok_or(WebhookError::MalformedHeader)?;
    let expected = hex::decode(hex_sig).map_err(|_| WebhookError::MalformedHeader)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);

    mac.verify_slice(&expected).map_err(|_| WebhookError::SignatureMismatch)
}

/// spec.md §6: "Replay protection via a process-local set capped at 10,000
/// ids; 20% oldest evicted on overflow."
pub struct ReplayGuard {
    capacity: usize,
    seen: Mutex<(std::collections::HashSet<String>, VecDeque<String>)>,
}

impl ReplayGuard {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            seen: Mutex::new((std::collections::HashSet::new(), VecDeque::new())),
        }
    }

    /// Returns `Err(WebhookError::Replay)` if `event_id` was already seen;
    /// otherwise records it and returns `Ok(())`.
    pub fn check_and_record(&self, event_id: &str) -> Result<(), WebhookError> {
        let mut guard = self.seen.lock().expect("replay guard lock poisoned");
        let (set, order) = &mut *guard;

        if set.contains(event_id) {
            return Err(WebhookError::Replay);
        }

        if order.len() >= self.capacity {
            let evict_count = (self.capacity / 5).max(1);
            for _ in 0..evict_count {
                if let Some(oldest) = order.pop_front() {
                    set.remove(&oldest);
                }
            }
        }

        set.insert(event_id.to_string());
        order.push_back(event_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_signature_verifies() {
        let secret = "shh";
        let body = b"{\"event\":\"fulfillment_shipped_v2\"}";
        let header = sign(secret, body);
        assert!(verify_signature(secret, body, &header).is_ok());
    }

    #[test]
    fn tampered_body_fails_verification() {
        let secret = "shh";
        let header = sign(secret, b"original");
        assert!(matches!(
            verify_signature(secret, b"tampered", &header),
            Err(WebhookError::SignatureMismatch)
        ));
    }

    #[test]
    fn malformed_header_is_rejected() {
        assert!(matches!(
            verify_signature("shh", b"body", "not-a-signature"),
            Err(WebhookError::MalformedHeader)
        ));
    }

    #[test]
    fn replay_guard_rejects_duplicate_event_ids() {
        let guard = ReplayGuard::new(10_000);
        assert!(guard.check_and_record("evt_1").is_ok());
        assert!(matches!(guard.check_and_record("evt_1"), Err(WebhookError::Replay)));
    }

    #[test]
    fn replay_guard_evicts_oldest_twenty_percent_on_overflow() {
        let guard = ReplayGuard::new(10);
        for i in 0..10 {
            guard.check_and_record(&format!("evt_{i}")).unwrap();
        }
        // Capacity reached; next insert evicts the oldest 2 (20% of 10).
        guard.check_and_record("evt_10").unwrap();
        assert!(guard.check_and_record("evt_0").is_ok());
        assert!(matches!(guard.check_and_record("evt_2"), Err(WebhookError::Replay)));
    }
}
