use std::num::NonZeroU32;

use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

const ALGORITHM_TAG: &str = "pbkdf2-sha256";
const ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;
pub const MIN_PASSWORD_LEN: usize = 6;

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

#[derive(thiserror::Error, Debug)]
pub enum PasswordError {
    #[error("Password must be at least {0} characters")]
    TooShort(usize),

    #[error("Failed to generate salt")]
    RandomFailure,

    #[error("Stored password hash is malformed")]
    MalformedHash,
}

/// Hashes a password with PBKDF2-HMAC-SHA256 and a random salt.
///
/// Format: `pbkdf2-sha256$<iterations>$<salt hex>$<hash hex>`
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(PasswordError::TooShort(MIN_PASSWORD_LEN));
    }

    let rng = SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt)
        .map_err(|_| PasswordError::RandomFailure)?;

    let iterations = NonZeroU32::new(ITERATIONS).ok_or(PasswordError::MalformedHash)?;
    let mut hash = [0u8; HASH_LEN];
    pbkdf2::derive(PBKDF2_ALG, iterations, &salt, password.as_bytes(), &mut hash);

    Ok(format!(
        "{}${}${}${}",
        ALGORITHM_TAG,
        ITERATIONS,
        hex::encode(salt),
        hex::encode(hash)
    ))
}

/// Checks a password against a stored hash in constant time
pub fn verify_password(password: &str, stored: &str) -> Result<bool, PasswordError> {
    let mut parts = stored.split('$');
    let (Some(tag), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(PasswordError::MalformedHash);
    };

    if tag != ALGORITHM_TAG {
        return Err(PasswordError::MalformedHash);
    }

    let iterations = iterations
        .parse::<u32>()
        .ok()
        .and_then(NonZeroU32::new)
        .ok_or(PasswordError::MalformedHash)?;
    let salt = hex::decode(salt).map_err(|_| PasswordError::MalformedHash)?;
    let hash = hex::decode(hash).map_err(|_| PasswordError::MalformedHash)?;

    Ok(pbkdf2::verify(PBKDF2_ALG, iterations, &salt, password.as_bytes(), &hash).is_ok())
}

/// Well-formed hash no password matches, at the real iteration count
const DUMMY_HASH: &str = "pbkdf2-sha256$100000$5f3c9a1e7b2d4c6a8e0f1b3d5a7c9e2f$\
    0000000000000000000000000000000000000000000000000000000000000000";

/// Runs a full verification that always fails. Used when the account does
/// not exist so the response takes as long as a wrong password.
pub fn verify_dummy(password: &str) -> bool {
    verify_password(password, DUMMY_HASH).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let stored = hash_password("correct horse").unwrap();

        assert!(stored.starts_with("pbkdf2-sha256$100000$"));
        assert!(verify_password("correct horse", &stored).unwrap());
        assert!(!verify_password("wrong horse", &stored).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("same-password").unwrap();
        let b = hash_password("same-password").unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn test_short_password_rejected() {
        assert!(matches!(
            hash_password("12345"),
            Err(PasswordError::TooShort(6))
        ));
    }

    #[test]
    fn test_malformed_hash() {
        assert!(matches!(
            verify_password("secret1", "plaintext"),
            Err(PasswordError::MalformedHash)
        ));
        assert!(matches!(
            verify_password("secret1", "bcrypt$10$aa$bb"),
            Err(PasswordError::MalformedHash)
        ));
        assert!(matches!(
            verify_password("secret1", "pbkdf2-sha256$0$aa$bb"),
            Err(PasswordError::MalformedHash)
        ));
    }

    #[test]
    fn test_dummy_hash_costs_a_real_verification() {
        assert!(DUMMY_HASH.starts_with(&format!("{}${}$", ALGORITHM_TAG, ITERATIONS)));
        assert!(matches!(verify_password("anything", DUMMY_HASH), Ok(false)));
        assert!(!verify_dummy("correct horse"));
    }
}
