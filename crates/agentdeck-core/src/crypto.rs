//! Token generation, API-key hashing, and constant-time comparison (§4.2.1).

use rand::RngCore;
use sha2::{Digest, Sha256};

/// 128-bit random session identifier, hex-encoded (32 hex chars).
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// >=192-bit random URL-safe session token, base64 (no padding) encoded.
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

/// SHA-256 of the UTF-8 bytes of an API key, lowercase hex.
pub fn hash_api_key(api_key: &str) -> String {
    let digest = Sha256::digest(api_key.as_bytes());
    hex::encode(digest)
}

/// Constant-time equality: always scans every byte of the shorter
/// comparison path, never short-circuits on the first mismatch, and treats a
/// length mismatch as "no match" without leaking *which* byte differed.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_32_hex_chars() {
        let id = generate_session_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn session_id_is_unique() {
        assert_ne!(generate_session_id(), generate_session_id());
    }

    #[test]
    fn session_token_is_url_safe_and_long_enough() {
        let token = generate_session_token();
        // 32 random bytes => ceil(32*8/6) = 43 base64 chars, no padding.
        assert!(token.len() >= 43);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn hash_api_key_is_deterministic_sha256_hex() {
        let hash = hash_api_key("sk-test-key");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_api_key("sk-test-key"));
        assert_ne!(hash, hash_api_key("sk-other-key"));
    }

    #[test]
    fn constant_time_eq_matches_semantics() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hell"));
        assert!(constant_time_eq(b"", b""));
    }
}
