/// Refresh token ledger.
///
/// One active refresh token per user. Tokens are:
/// - Cryptographically random 64-character opaque strings (not JWTs)
/// - Hashed with SHA-256 before storage (never stored in plaintext)
/// - Replaced atomically on every issuance: the upsert keyed on the
///   UNIQUE user_id column supersedes the previous row, so a concurrent
///   login and refresh can never leave two current tokens
/// - Rotated on every use: a superseded token's hash is gone from the
///   ledger, so presenting it again fails with `RefreshTokenNotFound`
///
/// Expired rows are rejected on verification but not deleted here;
/// cleanup is a separate housekeeping concern.

use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AuthError};

const REFRESH_TOKEN_LENGTH: usize = 64;

/// Generate a new opaque refresh token.
/// The plaintext is what the client stores; the server keeps only the hash.
pub fn generate_refresh_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFRESH_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Persist a refresh token for a user, replacing any existing one.
///
/// Issue-replaces-previous is the rotation invariant: after this call the
/// user's prior refresh token (if any) is no longer in the ledger.
///
/// # Errors
/// Returns error if the database operation fails
pub async fn save_refresh_token(
    pool: &PgPool,
    user_id: Uuid,
    token: &str,
    expiry_seconds: i64,
) -> Result<(), AppError> {
    let token_hash = hash_token(token);
    let now = Utc::now();
    let expires_at = now + Duration::seconds(expiry_seconds);

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_id) DO UPDATE
        SET token_hash = EXCLUDED.token_hash,
            expires_at = EXCLUDED.expires_at,
            created_at = EXCLUDED.created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(token_hash)
    .bind(expires_at)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Verify a presented refresh token and return its owning user's id.
///
/// # Errors
/// - `RefreshTokenNotFound` if no ledger row matches (including tokens
///   superseded by a later issuance)
/// - `RefreshTokenExpired` if the row exists but its expiry has passed
///   (the row is kept; expiry is the only deactivation mechanism besides
///   replacement)
pub async fn verify_refresh_token(pool: &PgPool, token: &str) -> Result<Uuid, AppError> {
    let token_hash = hash_token(token);

    let row = sqlx::query_as::<_, (Uuid, chrono::DateTime<Utc>)>(
        "SELECT user_id, expires_at FROM refresh_tokens WHERE token_hash = $1",
    )
    .bind(&token_hash)
    .fetch_optional(pool)
    .await?;

    match row {
        None => {
            tracing::warn!("Presented refresh token not in ledger");
            Err(AppError::Auth(AuthError::RefreshTokenNotFound))
        }
        Some((user_id, expires_at)) => {
            if expires_at < Utc::now() {
                tracing::info!(user_id = %user_id, "Refresh token expired");
                return Err(AppError::Auth(AuthError::RefreshTokenExpired));
            }

            Ok(user_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_refresh_token() {
        let token = generate_refresh_token();

        assert_eq!(token.len(), REFRESH_TOKEN_LENGTH);
        assert!(token.chars().all(|c| c.is_alphanumeric()));
    }

    #[test]
    fn test_tokens_are_unpredictable() {
        let token1 = generate_refresh_token();
        let token2 = generate_refresh_token();

        assert_ne!(token1, token2);
    }

    #[test]
    fn test_token_hashing() {
        let token = generate_refresh_token();
        let hash1 = hash_token(&token);
        let hash2 = hash_token(&token);

        // Deterministic, not the plaintext, SHA-256 hex length
        assert_eq!(hash1, hash2);
        assert_ne!(token, hash1);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_tokens_different_hashes() {
        let hash1 = hash_token(&generate_refresh_token());
        let hash2 = hash_token(&generate_refresh_token());

        assert_ne!(hash1, hash2);
    }
}
