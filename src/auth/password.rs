use std::sync::LazyLock;

use anyhow::anyhow;
use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

pub(crate) const MIN_PASSWORD_LEN: usize = 8;

// hash of a random secret nobody knows, with the same parameters as real ones
static DECOY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password(&hex::encode(rand::random::<[u8; 32]>())).ok());

pub(crate) fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::encode_b64(&rand::random::<[u8; 16]>())
        .map_err(|e| anyhow!("salt encoding failed: {e}"))?;

    Ok(
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("password hashing failed: {e}"))?
            .to_string()
    )
}

pub(crate) fn verify_password(password: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| anyhow!("stored hash is malformed: {e}"))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

/// Does the work of a real check for a login whose email matched no account.
pub(crate) fn verify_decoy(password: &str) {
    if let Some(stored) = DECOY_HASH.as_deref() {
        let _ = verify_password(password, stored);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_verify_only_their_password() {
        let stored = hash_password("correct horse").unwrap();
        assert!(stored.starts_with("$argon2"));
        assert!(verify_password("correct horse", &stored).unwrap());
        assert!(!verify_password("battery staple", &stored).unwrap());
    }

    #[test]
    fn salts_differ() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn decoy_hash_matches_real_parameters() {
        let decoy = DECOY_HASH.as_deref().unwrap();
        let real = hash_password("correct horse").unwrap();
        let params = |hash: &str| hash.split('$').take(4).collect::<Vec<_>>().join("$");
        assert_eq!(params(decoy), params(&real));
        assert!(!verify_password("correct horse", decoy).unwrap());
        verify_decoy("correct horse");
    }
}
