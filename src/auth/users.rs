/// Credential store.
///
/// Owns user identity records: creation, lookup by login key (email),
/// credential verification, and password replacement. Only the salted
/// bcrypt digest of a password is ever stored; the digest never leaves
/// this module except inside the returned `User`, which handlers must not
/// serialize.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::password::verify_password;
use crate::error::{AppError, AuthError};

/// Role attached to every user; carried into access-token claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "USER",
            UserRole::Admin => "ADMIN",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "USER" => Ok(UserRole::User),
            "ADMIN" => Ok(UserRole::Admin),
            other => Err(AppError::Internal(format!("Unknown role: {}", other))),
        }
    }
}

/// Identity record. Email is unique and immutable after creation; it is the
/// login key. The record is mutated only by the password-reset flow.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub role: UserRole,
}

/// Create a new identity record.
///
/// # Errors
/// - `DuplicateIdentity` if the email or username is already taken
pub async fn create_user(
    pool: &PgPool,
    name: &str,
    email: &str,
    username: &str,
    password_hash: &str,
    role: UserRole,
) -> Result<User, AppError> {
    let user_id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO users (id, name, email, username, password_hash, role, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(user_id)
    .bind(name)
    .bind(email)
    .bind(username)
    .bind(password_hash)
    .bind(role.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|e| match &e {
        // 23505: unique_violation on email or username
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            AppError::Auth(AuthError::DuplicateIdentity)
        }
        _ => AppError::from(e),
    })?;

    Ok(User {
        id: user_id,
        name: name.to_string(),
        email: email.to_string(),
        username: username.to_string(),
        password_hash: password_hash.to_string(),
        role,
    })
}

/// Look an identity up by its login key.
///
/// # Errors
/// - `UnknownUser` if no user has that email
pub async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<User, AppError> {
    let row = sqlx::query_as::<_, (Uuid, String, String, String, String, String)>(
        "SELECT id, name, email, username, password_hash, role FROM users WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::Auth(AuthError::UnknownUser))?;

    let (id, name, email, username, password_hash, role) = row;
    Ok(User {
        id,
        name,
        email,
        username,
        password_hash,
        role: UserRole::parse(&role)?,
    })
}

/// Look an identity up by id (used when resolving a refresh token's owner).
///
/// # Errors
/// - `UnknownUser` if the id resolves to nothing
pub async fn find_user_by_id(pool: &PgPool, user_id: Uuid) -> Result<User, AppError> {
    let row = sqlx::query_as::<_, (Uuid, String, String, String, String, String)>(
        "SELECT id, name, email, username, password_hash, role FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::Auth(AuthError::UnknownUser))?;

    let (id, name, email, username, password_hash, role) = row;
    Ok(User {
        id,
        name,
        email,
        username,
        password_hash,
        role: UserRole::parse(&role)?,
    })
}

/// Verify a login attempt.
///
/// # Errors
/// - `UnknownUser` if no user has that email
/// - `InvalidCredentials` if the bcrypt comparison fails (the comparison
///   itself runs in constant time inside the bcrypt primitive)
pub async fn verify_credentials(
    pool: &PgPool,
    email: &str,
    raw_password: &str,
) -> Result<User, AppError> {
    let user = find_user_by_email(pool, email).await?;

    let password_valid = verify_password(raw_password, &user.password_hash)?;
    if !password_valid {
        return Err(AppError::Auth(AuthError::InvalidCredentials));
    }

    Ok(user)
}

/// Overwrite a user's password hash (password-reset flow only).
///
/// # Errors
/// - `UnknownUser` if no row was updated
pub async fn update_password(
    pool: &PgPool,
    email: &str,
    new_password_hash: &str,
) -> Result<(), AppError> {
    let result = sqlx::query(
        "UPDATE users SET password_hash = $1, updated_at = $2 WHERE email = $3",
    )
    .bind(new_password_hash)
    .bind(Utc::now())
    .bind(email)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Auth(AuthError::UnknownUser));
    }

    Ok(())
}
