use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::domain::{Application, ApplicationNumber, PartnerCase, PartnerKind};

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Single-use password-set token. Only `hash` is ever persisted.
#[derive(Debug, Clone)]
pub struct ActivationToken {
    pub token: String,
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

pub fn issue_activation_token(now: DateTime<Utc>, ttl: Duration) -> ActivationToken {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..TOKEN_BYTES).map(|_| rng.random()).collect();
    let token = hex::encode(bytes);
    let hash = hash_token(&token);

    ActivationToken {
        token,
        hash,
        expires_at: now + ttl,
    }
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn activation_link(base_url: &str, user_id: &UserId, token: &str) -> String {
    format!(
        "{}?uid={}&token={}",
        base_url.trim_end_matches('/'),
        user_id,
        token
    )
}

/// Partner login account created when an application is approved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerUser {
    pub id: UserId,
    pub application_number: ApplicationNumber,
    pub full_name: String,
    pub email: String,
    pub partner_kind: PartnerKind,
    #[serde(skip_serializing)]
    pub password_token_hash: String,
    pub token_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PartnerUser {
    pub fn provision(
        application: &Application,
        token: &ActivationToken,
        now: DateTime<Utc>,
    ) -> Self {
        let applicant = &application.core().applicant;
        Self {
            id: UserId::generate(),
            application_number: application.application_number().clone(),
            full_name: applicant.full_name.clone(),
            email: applicant.email.clone(),
            partner_kind: application.kind(),
            password_token_hash: token.hash.clone(),
            token_expires_at: token.expires_at,
            created_at: now,
        }
    }

    /// Whether `token` matches the stored hash and is still inside its validity window.
    pub fn accepts_token(&self, token: &str, now: DateTime<Utc>) -> bool {
        now < self.token_expires_at && hash_token(token) == self.password_token_hash
    }
}
