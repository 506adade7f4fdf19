//! # rr-auth-simple
//!
//! Argon2 + JWT implementation of `AuthProvider`.
//! Passwords are stored as argon2id PHC strings; sessions are stateless
//! HS256 tokens whose subject is the profile id.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm as Argon2Algorithm, Argon2, Params, Version,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rr_core::error::{AppError, Result};
use rr_core::models::ProfileId;
use rr_core::traits::AuthProvider;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// Profile id, as a decimal string
    sub: String,
    iat: i64,
    exp: i64,
}

pub struct SimpleAuthProvider {
    argon2: Argon2<'static>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    session_ttl_secs: i64,
}

impl SimpleAuthProvider {
    /// `secret` signs session tokens; rotating it logs everybody out.
    pub fn new(secret: &[u8], session_ttl_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            argon2: Argon2::default(),
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            session_ttl_secs: i64::try_from(session_ttl_secs).unwrap_or(i64::MAX),
        }
    }

    /// Overrides the argon2id cost (memory in KiB, iteration count).
    pub fn with_hash_cost(mut self, memory_kib: u32, iterations: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, 1, None).map_err(AppError::internal)?;
        self.argon2 = Argon2::new(Argon2Algorithm::Argon2id, Version::V0x13, params);
        Ok(self)
    }

    fn sign(&self, profile: ProfileId, issued_at: i64, expires_at: i64) -> Result<String> {
        let claims = Claims {
            sub: profile.to_string(),
            iat: issued_at,
            exp: expires_at,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(AppError::internal)
    }
}

impl AuthProvider for SimpleAuthProvider {
    fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(AppError::internal)
    }

    /// Verifies if a provided password matches a stored Argon2 hash.
    fn verify_password(&self, password: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "stored password hash is malformed");
                return false;
            }
        };
        self.argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }

    fn issue_session(&self, profile: ProfileId) -> Result<String> {
        let now = Utc::now().timestamp();
        self.sign(profile, now, now.saturating_add(self.session_ttl_secs))
    }

    fn verify_session(&self, token: &str) -> Option<ProfileId> {
        let data = match decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(error = %e, "rejected session token");
                return None;
            }
        };
        data.claims.sub.parse().ok().map(ProfileId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> SimpleAuthProvider {
        SimpleAuthProvider::new(b"0123456789abcdef0123456789abcdef", 3600)
            .with_hash_cost(1024, 1)
            .unwrap()
    }

    #[test]
    fn password_round_trip() {
        let auth = provider();
        let hash = auth.hash_password("password").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(auth.verify_password("password", &hash));
        assert!(!auth.verify_password("Password", &hash));
        assert!(!auth.verify_password("password", "not a phc string"));
    }

    #[test]
    fn salts_differ() {
        let auth = provider();
        assert_ne!(auth.hash_password("same").unwrap(), auth.hash_password("same").unwrap());
    }

    #[test]
    fn session_resolves_to_profile() {
        let auth = provider();
        let token = auth.issue_session(ProfileId(42)).unwrap();
        assert_eq!(auth.verify_session(&token), Some(ProfileId(42)));
    }

    #[test]
    fn expired_or_foreign_tokens_rejected() {
        let auth = provider();
        let now = Utc::now().timestamp();
        let expired = auth.sign(ProfileId(1), now - 120, now - 60).unwrap();
        assert_eq!(auth.verify_session(&expired), None);

        let other = SimpleAuthProvider::new(b"another-secret-another-secret!!!", 3600);
        let foreign = other.issue_session(ProfileId(1)).unwrap();
        assert_eq!(auth.verify_session(&foreign), None);

        assert_eq!(auth.verify_session("garbage"), None);
    }
}
