//! A pure, stateless gate that every
//! node-authenticated request passes through before it reaches the
//! registry, scheduler, lock manager, or chunk aggregator.

mod fingerprint;

pub use fingerprint::fingerprint;

use crate::error::CoordinatorError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

/// Timestamp-freshness window: ±5 minutes.
pub const SIGNATURE_FRESHNESS_MS: i64 = 5 * 60 * 1000;

/// A signed claim of identity presented by a node on every request.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureEnvelope {
    pub node_id: String,
    pub public_key: String,
    pub signature: String,
    pub timestamp: i64,
}

/// A request-local record of a node whose claim has been cryptographically
/// verified, handed down to the registry/scheduler/lock layer.
#[derive(Debug, Clone)]
pub struct VerifiedNode {
    pub node_id: String,
    pub public_key: String,
    pub timestamp: i64,
}

/// Validate a signature envelope against the canonical message
/// `"{nodeId}:{timestamp}"`.
pub fn verify(envelope: &SignatureEnvelope, now_ms: i64) -> Result<VerifiedNode, CoordinatorError> {
    if envelope.node_id.is_empty() || envelope.public_key.is_empty() || envelope.signature.is_empty()
    {
        return Err(CoordinatorError::BadRequest(
            "signature envelope missing required fields".into(),
        ));
    }

    if (now_ms - envelope.timestamp).abs() > SIGNATURE_FRESHNESS_MS {
        return Err(CoordinatorError::Unauthorized(
            "signature timestamp outside freshness window".into(),
        ));
    }

    let public_key_bytes = BASE64
        .decode(&envelope.public_key)
        .map_err(|_| CoordinatorError::Unauthorized("malformed public key encoding".into()))?;
    let public_key_bytes: [u8; 32] = public_key_bytes
        .try_into()
        .map_err(|_| CoordinatorError::Unauthorized("public key has wrong length".into()))?;
    let verifying_key = VerifyingKey::from_bytes(&public_key_bytes)
        .map_err(|_| CoordinatorError::Unauthorized("invalid public key".into()))?;

    let signature_bytes = BASE64
        .decode(&envelope.signature)
        .map_err(|_| CoordinatorError::Unauthorized("malformed signature encoding".into()))?;
    let signature_bytes: [u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| CoordinatorError::Unauthorized("signature has wrong length".into()))?;
    let signature = Signature::from_bytes(&signature_bytes);

    let message = format!("{}:{}", envelope.node_id, envelope.timestamp);
    verifying_key
        .verify(message.as_bytes(), &signature)
        .map_err(|_| CoordinatorError::Unauthorized("signature verification failed".into()))?;

    Ok(VerifiedNode {
        node_id: envelope.node_id.clone(),
        public_key: envelope.public_key.clone(),
        timestamp: envelope.timestamp,
    })
}

/// Convenience wrapper for call sites that just want "now" in epoch ms.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    fn signed_envelope(node_id: &str, timestamp: i64) -> (SigningKey, SignatureEnvelope) {
        let signing_key = SigningKey::generate(&mut OsRng);
        let message = format!("{node_id}:{timestamp}");
        let signature = signing_key.sign(message.as_bytes());
        let envelope = SignatureEnvelope {
            node_id: node_id.to_string(),
            public_key: BASE64.encode(signing_key.verifying_key().to_bytes()),
            signature: BASE64.encode(signature.to_bytes()),
            timestamp,
        };
        (signing_key, envelope)
    }

    #[test]
    fn accepts_a_fresh_valid_signature() {
        let now = now_ms();
        let (_key, envelope) = signed_envelope("abc123", now);
        assert!(verify(&envelope, now).is_ok());
    }

    #[test]
    fn rejects_a_stale_timestamp() {
        let now = now_ms();
        let (_key, envelope) = signed_envelope("abc123", now - 10 * 60 * 1000);
        let err = verify(&envelope, now).unwrap_err();
        assert!(matches!(err, CoordinatorError::Unauthorized(_)));
    }

    #[test]
    fn rejects_a_tampered_message() {
        let now = now_ms();
        let (_key, mut envelope) = signed_envelope("abc123", now);
        envelope.node_id = "different".to_string();
        assert!(verify(&envelope, now).is_err());
    }

    #[test]
    fn rejects_missing_fields() {
        let envelope = SignatureEnvelope {
            node_id: String::new(),
            public_key: "x".into(),
            signature: "y".into(),
            timestamp: now_ms(),
        };
        let err = verify(&envelope, now_ms()).unwrap_err();
        assert!(matches!(err, CoordinatorError::BadRequest(_)));
    }
}
