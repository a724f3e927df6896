use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use once_cell::sync::Lazy;

/// Newtype for a plaintext password. Debug output never shows the value.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for an Argon2 verifier string.
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Verifier used when the presented email matches no identity, so the
/// missing-identity path costs the same as a wrong password and does not
/// leak which emails exist.
static DUMMY_HASH: Lazy<PasswordHashString> = Lazy::new(|| {
    hash_password(&Password::new(uuid::Uuid::new_v4().to_string()))
        .expect("hashing a generated value cannot fail")
});

/// Hash a password with Argon2id and a fresh random salt.
pub fn hash_password(password: &Password) -> Result<PasswordHashString, anyhow::Error> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = argon2
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(PasswordHashString::new(password_hash))
}

/// Verify a password against a stored verifier.
pub fn verify_password(
    password: &Password,
    password_hash: &PasswordHashString,
) -> Result<(), anyhow::Error> {
    let parsed_hash = PasswordHash::new(password_hash.as_str())
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

    Argon2::default()
        .verify_password(password.as_str().as_bytes(), &parsed_hash)
        .map_err(|_| anyhow::anyhow!("Password verification failed"))
}

/// Burn a verification against the dummy verifier. Always fails; exists to
/// equalize response timing for unknown identities.
pub fn verify_against_dummy(password: &Password) {
    let _ = verify_password(password, &DUMMY_HASH);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_round_trip() {
        let password = Password::new("correct horse battery staple 9!".to_string());
        let hash = hash_password(&password).expect("hashing failed");

        assert!(hash.as_str().starts_with("$argon2"));
        assert!(verify_password(&password, &hash).is_ok());
    }

    #[test]
    fn test_wrong_password_fails() {
        let password = Password::new("correct horse battery staple 9!".to_string());
        let hash = hash_password(&password).expect("hashing failed");

        let wrong = Password::new("incorrect horse".to_string());
        assert!(verify_password(&wrong, &hash).is_err());
    }

    #[test]
    fn test_salts_differ_between_hashes() {
        let password = Password::new("correct horse battery staple 9!".to_string());
        let first = hash_password(&password).unwrap();
        let second = hash_password(&password).unwrap();

        assert_ne!(first.as_str(), second.as_str());
        assert!(verify_password(&password, &first).is_ok());
        assert!(verify_password(&password, &second).is_ok());
    }

    #[test]
    fn test_debug_output_redacts_password() {
        let password = Password::new("supersecret".to_string());
        let rendered = format!("{:?}", password);
        assert!(!rendered.contains("supersecret"));
    }

    #[test]
    fn test_dummy_verification_never_succeeds() {
        verify_against_dummy(&Password::new("anything".to_string()));
    }
}
