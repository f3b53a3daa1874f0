use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Default work factor, overridable through `PASSWORD_ITERATIONS`.
pub const PBKDF2_ITERATIONS: u32 = 600_000;
const HASH_LENGTH: usize = 32;
const SALT_LENGTH: usize = 32;
const SCHEME: &str = "pbkdf2-sha256";

/// Hash a password with `iterations` rounds of PBKDF2-HMAC-SHA256.
///
/// Output format: `pbkdf2-sha256$<iterations>$<salt>$<hash>` (base64, unpadded). The
/// count is stored in the output, so `verify_password` works whatever value was used.
pub fn hash_password(password: &str, iterations: u32) -> String {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);

    let mut hash = [0u8; HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut hash);

    format!(
        "{SCHEME}${iterations}${}${}",
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(hash)
    )
}

/// Check a password against a stored hash. Malformed hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(SCHEME), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };

    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    if iterations == 0 {
        return false;
    }
    let (Ok(salt), Ok(expected)) = (
        STANDARD_NO_PAD.decode(salt),
        STANDARD_NO_PAD.decode(expected),
    ) else {
        return false;
    };
    if expected.len() != HASH_LENGTH {
        return false;
    }

    let mut actual = [0u8; HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut actual);
    actual.as_slice().ct_eq(expected.as_slice()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Low iteration count keeps debug-build tests fast.
    const TEST_ITERATIONS: u32 = 1_000;

    #[test]
    fn correct_password_verifies() {
        let stored = hash_password("password123", TEST_ITERATIONS);
        assert!(verify_password("password123", &stored));
    }

    #[test]
    fn wrong_password_is_rejected() {
        let stored = hash_password("password123", TEST_ITERATIONS);
        assert!(!verify_password("password124", &stored));
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let a = hash_password("secret", TEST_ITERATIONS);
        let b = hash_password("secret", TEST_ITERATIONS);
        assert_ne!(a, b);
        assert!(verify_password("secret", &a));
        assert!(verify_password("secret", &b));
    }

    #[test]
    fn stored_format_records_scheme_and_iterations() {
        let stored = hash_password("secret", TEST_ITERATIONS);
        assert!(stored.starts_with("pbkdf2-sha256$1000$"));
        assert_eq!(stored.split('$').count(), 4);
    }

    #[test]
    fn malformed_hashes_never_verify() {
        assert!(!verify_password("x", ""));
        assert!(!verify_password("x", "plaintext"));
        assert!(!verify_password("x", "bcrypt$10$abc$def"));
        assert!(!verify_password("x", "pbkdf2-sha256$notanumber$abc$def"));
        assert!(!verify_password("x", "pbkdf2-sha256$0$abc$def"));
        assert!(!verify_password("x", "pbkdf2-sha256$1000$!!!$def"));
    }
}
