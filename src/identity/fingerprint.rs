use sha2::{Digest, Sha256};

/// First 6 hex characters of SHA-256(publicKeyBytes). 24 bits of identity
/// space; collisions are resolved by rejecting a different-user claim on
/// the same fingerprint rather than widening the hash (see `registry::claim`).
pub fn fingerprint(public_key_bytes: &[u8]) -> String {
    let digest = Sha256::digest(public_key_bytes);
    hex::encode(&digest[..3])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_six_hex_chars() {
        let fp = fingerprint(b"some-public-key-bytes");
        assert_eq!(fp.len(), 6);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn is_deterministic() {
        assert_eq!(fingerprint(b"same-key"), fingerprint(b"same-key"));
    }

    #[test]
    fn ten_thousand_random_keys_do_not_collide() {
        use rand::RngCore;
        let mut rng = rand::thread_rng();
        let mut seen = std::collections::HashSet::new();
        let mut collisions = 0;
        for _ in 0..10_000 {
            let mut key = [0u8; 32];
            rng.fill_bytes(&mut key);
            if !seen.insert(fingerprint(&key)) {
                collisions += 1;
            }
        }
        // 24 bits of space over 10^4 samples: collisions are possible but
        // should be rare. This is a smoke test against a badly broken hash,
        // not a strict birthday-bound assertion.
        assert!(collisions < 50, "unexpectedly high collision count: {collisions}");
    }
}
