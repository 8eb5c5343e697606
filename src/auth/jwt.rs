/// Token signer.
///
/// Stateless issuance and validation of short-lived signed access tokens.
/// The HS256 secret lives in `JwtSettings`, loaded once at startup and
/// shared immutably, so concurrent calls need no locking. The signature
/// covers the full claim set; any alteration invalidates it.

use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::Claims;
use crate::auth::users::User;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

/// Issue a signed access token bound to the user's identity and role.
///
/// # Errors
/// Returns error if encoding fails (infrastructure fault, not a
/// credential fault)
pub fn generate_access_token(user: &User, config: &JwtSettings) -> Result<String, AppError> {
    let claims = Claims::new(
        user.id,
        user.email.clone(),
        user.role,
        config.access_token_expiry,
        config.issuer.clone(),
    );

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}

/// Validate an access token and return its claims.
///
/// This is the only legitimate way downstream authorization obtains
/// identity from a request.
///
/// # Errors
/// - `TokenExpired` if the embedded expiry has passed
/// - `TokenSignatureInvalid` if the signature check fails
/// - `TokenMalformed` for anything that cannot be parsed or whose other
///   registered claims (issuer) do not check out
pub fn validate_access_token(token: &str, config: &JwtSettings) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);
    // No leeway: a token is expired the second its exp passes
    validation.leeway = 0;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        let auth_error = match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidSignature => AuthError::TokenSignatureInvalid,
            _ => AuthError::TokenMalformed,
        };
        tracing::warn!(error = %e, "JWT validation failed");
        AppError::Auth(auth_error)
    })
}
