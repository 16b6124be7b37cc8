//! Password authentication data.
//!
//! Accounts store 64 bytes of authentication data: a 32-byte digest
//! followed by a 32-byte salt. The digest is `SHA256(SHA256(password) XOR
//! salt)`. All-zero authentication data is treated as unset and never
//! matches. Comparisons are constant-time.

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use tracing::error;

pub const AUTH_SIZE: usize = 64;
const DIGEST_SIZE: usize = 32;

fn password_digest(password: &str, salt: &[u8; DIGEST_SIZE]) -> [u8; DIGEST_SIZE] {
    let mut inner: [u8; DIGEST_SIZE] = Sha256::digest(password.as_bytes()).into();
    for (byte, salt_byte) in inner.iter_mut().zip(salt.iter()) {
        *byte ^= salt_byte;
    }
    Sha256::digest(inner).into()
}

/// Check a password against stored authentication data.
#[must_use]
pub fn verify_password(auth: &[u8], password: &str) -> bool {
    if auth.len() != AUTH_SIZE {
        error!(
            "expected {AUTH_SIZE} bytes of authentication data (got {})",
            auth.len()
        );
        return false;
    }

    // Constant-time check that the data is set at all.
    let mut any = 0u8;
    for byte in auth {
        any |= byte;
    }
    if any == 0 {
        error!("authentication data not set");
        return false;
    }

    let stored: &[u8; DIGEST_SIZE] = auth[..DIGEST_SIZE].try_into().unwrap_or(&[0; DIGEST_SIZE]);
    let salt: &[u8; DIGEST_SIZE] = auth[DIGEST_SIZE..].try_into().unwrap_or(&[0; DIGEST_SIZE]);
    let digest = password_digest(password, salt);

    // Constant-time comparison.
    let mut diff = 0u8;
    for (a, b) in digest.iter().zip(stored.iter()) {
        diff |= a ^ b;
    }
    diff == 0
}

/// Produce fresh authentication data for a new password.
///
/// # Errors
/// Returns an error string when the password is empty.
pub fn generate_auth(password: &str) -> Result<[u8; AUTH_SIZE], String> {
    if password.is_empty() {
        return Err("refusing to hash an empty password".to_string());
    }

    let mut salt = [0u8; DIGEST_SIZE];
    OsRng.fill_bytes(&mut salt);
    let digest = password_digest(password, &salt);

    let mut auth = [0u8; AUTH_SIZE];
    auth[..DIGEST_SIZE].copy_from_slice(&digest);
    auth[DIGEST_SIZE..].copy_from_slice(&salt);
    Ok(auth)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_auth_verifies() {
        let auth = generate_auth("correct-password").unwrap();
        assert!(verify_password(&auth, "correct-password"));
        assert!(!verify_password(&auth, "wrong"));
    }

    #[test]
    fn unset_auth_never_matches() {
        let auth = [0u8; AUTH_SIZE];
        assert!(!verify_password(&auth, ""));
        assert!(!verify_password(&auth, "anything"));
    }

    #[test]
    fn wrong_length_rejected() {
        assert!(!verify_password(&[1u8; 32], "password"));
    }

    #[test]
    fn empty_password_refused() {
        assert!(generate_auth("").is_err());
    }

    #[test]
    fn salts_differ_between_calls() {
        let a = generate_auth("same").unwrap();
        let b = generate_auth("same").unwrap();
        assert_ne!(a[32..], b[32..]);
        assert!(verify_password(&a, "same"));
        assert!(verify_password(&b, "same"));
    }
}
