//! Stripe webhook signature verification

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Events older than this are rejected as replays
const TOLERANCE_SECS: i64 = 300;

/// Verify a `Stripe-Signature` header (`t=...,v1=...`) against the raw body
pub fn verify_webhook_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
) -> Result<(), &'static str> {
    verify_at(payload, sig_header, secret, chrono::Utc::now().timestamp())
}

fn verify_at(payload: &[u8], sig_header: &str, secret: &str, now: i64) -> Result<(), &'static str> {
    let mut timestamp = "";
    let mut signature = "";
    for part in sig_header.split(',') {
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = t;
        } else if let Some(v) = part.strip_prefix("v1=") {
            signature = v;
        }
    }

    if timestamp.is_empty() || signature.is_empty() {
        return Err("Invalid Stripe-Signature header");
    }

    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    let sig_bytes = hex::decode(signature).map_err(|_| "Invalid signature hex")?;
    mac.verify_slice(&sig_bytes)
        .map_err(|_| "Webhook signature mismatch")?;

    let ts: i64 = timestamp.parse().map_err(|_| "Invalid timestamp")?;
    if (now - ts).abs() > TOLERANCE_SECS {
        return Err("Webhook timestamp too old");
    }

    Ok(())
}

#[cfg(test)]
pub(crate) fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_signature() {
        let header = sign(b"{}", "whsec", 1000);
        assert_eq!(verify_at(b"{}", &header, "whsec", 1100), Ok(()));
    }

    #[test]
    fn test_rejects_tampering_and_replay() {
        let header = sign(b"{}", "whsec", 1000);
        assert!(verify_at(b"{ }", &header, "whsec", 1000).is_err());
        assert!(verify_at(b"{}", &header, "other", 1000).is_err());
        assert_eq!(
            verify_at(b"{}", &header, "whsec", 1000 + TOLERANCE_SECS + 1),
            Err("Webhook timestamp too old")
        );
        assert!(verify_at(b"{}", "v1=abc", "whsec", 1000).is_err());
    }
}
