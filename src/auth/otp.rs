/// One-time codes for the password-reset flow.
///
/// At most one live OTP per user: a new request overwrites the previous
/// row (upsert on the UNIQUE user_id column). A code is consumed - the
/// row deleted - on successful verification, so it cannot be replayed.

use chrono::{Duration, Utc};
use rand::{thread_rng, Rng};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AuthError};

/// OTPs are short-lived by design
const OTP_TTL_SECONDS: i64 = 600;

/// Generate a uniform six-digit code.
pub fn generate_otp() -> i32 {
    thread_rng().gen_range(100_000..=999_999)
}

/// Bind an OTP to a user, overwriting any previous one.
///
/// # Errors
/// Returns error if the database operation fails
pub async fn save_otp(pool: &PgPool, user_id: Uuid, otp: i32) -> Result<(), AppError> {
    let now = Utc::now();
    let expires_at = now + Duration::seconds(OTP_TTL_SECONDS);

    sqlx::query(
        r#"
        INSERT INTO password_reset_otps (id, user_id, otp, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_id) DO UPDATE
        SET otp = EXCLUDED.otp,
            expires_at = EXCLUDED.expires_at,
            created_at = EXCLUDED.created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(otp)
    .bind(expires_at)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Verify and consume a user's OTP.
///
/// # Errors
/// - `OtpMismatch` if the user has no live OTP carrying that code
/// - `OtpExpired` if the code matches but its expiry has passed
pub async fn verify_otp(pool: &PgPool, user_id: Uuid, otp: i32) -> Result<(), AppError> {
    let row = sqlx::query_as::<_, (Uuid, chrono::DateTime<Utc>)>(
        "SELECT id, expires_at FROM password_reset_otps WHERE user_id = $1 AND otp = $2",
    )
    .bind(user_id)
    .bind(otp)
    .fetch_optional(pool)
    .await?;

    let (otp_id, expires_at) = match row {
        None => {
            tracing::warn!(user_id = %user_id, "Password-reset code mismatch");
            return Err(AppError::Auth(AuthError::OtpMismatch));
        }
        Some(row) => row,
    };

    if expires_at < Utc::now() {
        tracing::info!(user_id = %user_id, "Password-reset code expired");
        return Err(AppError::Auth(AuthError::OtpExpired));
    }

    // Single use: consume the code
    sqlx::query("DELETE FROM password_reset_otps WHERE id = $1")
        .bind(otp_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_is_six_digits() {
        for _ in 0..100 {
            let otp = generate_otp();
            assert!((100_000..=999_999).contains(&otp));
        }
    }
}
