use ring::hmac;

/// Signs a payload with HMAC-SHA256 and returns the tag as hex
pub fn sign(payload: &str, key: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hex::encode(hmac::sign(&key, payload.as_bytes()).as_ref())
}

/// Verifies a hex HMAC-SHA256 tag in constant time
pub fn verify(payload: &str, signature: &str, key: &[u8]) -> bool {
    let Ok(tag) = hex::decode(signature) else {
        return false;
    };
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::verify(&key, payload.as_bytes(), &tag).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let signature = sign("ticket-payload", b"key");

        assert_eq!(signature.len(), 64);
        assert!(verify("ticket-payload", &signature, b"key"));
        assert!(!verify("ticket-payload", &signature, b"other-key"));
        assert!(!verify("tampered-payload", &signature, b"key"));
        assert!(!verify("ticket-payload", "not-hex", b"key"));
    }
}
