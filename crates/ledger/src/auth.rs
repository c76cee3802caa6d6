//! Password hashing and session tokens

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::types::AccountId;

/// Argon2 password hashing
#[derive(Clone, Default)]
pub struct CredentialService {
    argon2: Argon2<'static>,
}

impl CredentialService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash a password into a PHC string with a random salt
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| LedgerError::Internal(format!("password hashing failed: {}", e)))
    }

    /// Check a password against a stored hash
    ///
    /// A malformed stored hash counts as a mismatch.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        self.argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

/// JWT claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Account id
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
}

impl Claims {
    pub fn account_id(&self) -> Result<AccountId> {
        self.sub
            .parse::<i64>()
            .map(AccountId)
            .map_err(|_| LedgerError::Unauthorized)
    }
}

/// Ten years
const MAX_TTL_HOURS: u64 = 87_600;

/// HS256 token issuer and verifier
#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn from_config(auth: &config::AuthConfig) -> Self {
        let hours = auth.token_ttl_hours.min(MAX_TTL_HOURS) as i64;
        Self::new(&auth.jwt_secret, Duration::hours(hours))
    }

    /// Issue a token for the account
    pub fn issue(&self, account_id: AccountId) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: account_id.to_string(),
            iat: now.timestamp() as usize,
            exp: (now + self.ttl).timestamp() as usize,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| LedgerError::Internal(format!("token signing failed: {}", e)))
    }

    /// Verify signature and expiry
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| LedgerError::Unauthorized)
    }
}
