/// Authentication routes.
///
/// Composes the credential store, token signer and refresh-token ledger
/// into the register / login / refresh flows, plus the OTP-driven
/// password-reset flow and the authenticated profile endpoint.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::auth::{
    find_user_by_email, find_user_by_id, generate_access_token, generate_otp,
    generate_refresh_token, hash_password, save_otp, save_refresh_token, update_password,
    verify_credentials, verify_otp, verify_refresh_token, create_user, Claims, UserRole,
};
use crate::configuration::JwtSettings;
use crate::email_client::EmailClient;
use crate::error::{AppError, ErrorContext};
use crate::validators::{is_valid_email, is_valid_name, is_valid_username};

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub otp: i32,
    pub new_password: String,
}

/// Outward-facing payload for all successful auth flows
#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub name: String,
    pub email: String,
}

/// Authenticated user's profile
#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub username: String,
    pub role: String,
}

/// POST /auth/register
///
/// Create a user with the default USER role and issue the first token
/// pair.
///
/// # Errors
/// - 400: invalid name/email/username or weak password
/// - 409: email or username already registered
pub async fn register(
    form: web::Json<RegisterRequest>,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_registration");

    let name = is_valid_name(&form.name)?;
    let email = is_valid_email(&form.email)?;
    let username = is_valid_username(&form.username)?;
    let password_hash = hash_password(&form.password)?;

    let user = create_user(
        pool.get_ref(),
        &name,
        &email,
        &username,
        &password_hash,
        UserRole::User,
    )
    .await?;

    let access_token = generate_access_token(&user, jwt_config.get_ref())?;
    let refresh_token = generate_refresh_token();
    save_refresh_token(
        pool.get_ref(),
        user.id,
        &refresh_token,
        jwt_config.refresh_token_expiry,
    )
    .await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user.id,
        "User registered successfully"
    );

    Ok(HttpResponse::Created().json(AuthResponse {
        access_token,
        refresh_token,
        name: user.name,
        email: user.email,
    }))
}

/// POST /auth/login
///
/// Verify credentials and issue a new token pair. Issuing the refresh
/// token replaces the previous one for this user; earlier sessions can
/// no longer refresh.
///
/// # Errors
/// - 404: no user with that email
/// - 401: wrong password
pub async fn login(
    form: web::Json<LoginRequest>,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");

    let email = is_valid_email(&form.email)?;
    let user = verify_credentials(pool.get_ref(), &email, &form.password).await?;

    let access_token = generate_access_token(&user, jwt_config.get_ref())?;
    let refresh_token = generate_refresh_token();
    save_refresh_token(
        pool.get_ref(),
        user.id,
        &refresh_token,
        jwt_config.refresh_token_expiry,
    )
    .await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user.id,
        "User logged in successfully"
    );

    Ok(HttpResponse::Ok().json(AuthResponse {
        access_token,
        refresh_token,
        name: user.name,
        email: user.email,
    }))
}

/// POST /auth/refresh
///
/// Exchange a refresh token for a new access token. Rotate-on-use: the
/// presented refresh token is replaced, so it cannot be used twice and a
/// stolen copy dies as soon as the legitimate client refreshes.
///
/// # Errors
/// - 401: refresh token unknown, superseded, or expired
pub async fn refresh(
    form: web::Json<RefreshTokenRequest>,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    let user_id = verify_refresh_token(pool.get_ref(), &form.refresh_token).await?;
    let user = find_user_by_id(pool.get_ref(), user_id).await?;

    let access_token = generate_access_token(&user, jwt_config.get_ref())?;
    let refresh_token = generate_refresh_token();
    save_refresh_token(
        pool.get_ref(),
        user.id,
        &refresh_token,
        jwt_config.refresh_token_expiry,
    )
    .await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user.id,
        "Token refreshed successfully"
    );

    Ok(HttpResponse::Ok().json(AuthResponse {
        access_token,
        refresh_token,
        name: user.name,
        email: user.email,
    }))
}

/// POST /auth/forgot-password
///
/// Generate a one-time code, bind it to the user (overwriting any earlier
/// code) and email it. The code expires after a few minutes.
///
/// # Errors
/// - 404: no user with that email
/// - 503: mail API unavailable (the stored code remains usable)
pub async fn forgot_password(
    form: web::Json<ForgotPasswordRequest>,
    pool: web::Data<PgPool>,
    email_client: web::Data<EmailClient>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("forgot_password");

    let email = is_valid_email(&form.email)?;
    let user = find_user_by_email(pool.get_ref(), &email).await?;

    let otp = generate_otp();
    save_otp(pool.get_ref(), user.id, otp).await?;

    let html_content = format!(
        r#"
        <h1>Password reset requested</h1>
        <p>Hello {},</p>
        <p>Your one-time code is: <strong>{}</strong></p>
        <p>It expires in 10 minutes. If you did not request a reset, ignore this email.</p>
        "#,
        user.name, otp
    );

    email_client
        .send_email(&user.email, "Your password reset code", &html_content)
        .await
        .map_err(|e| {
            let error = AppError::Email(e);
            context.log_error(&error);
            error
        })?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user.id,
        "Password reset code sent"
    );

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "A one-time code has been sent to your email address"
    })))
}

/// POST /auth/reset-password
///
/// Verify the one-time code and overwrite the password. The code is
/// consumed on success and cannot be replayed.
///
/// # Errors
/// - 404: no user with that email
/// - 400: code mismatch, code expired, or weak new password
pub async fn reset_password(
    form: web::Json<ResetPasswordRequest>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("reset_password");

    let email = is_valid_email(&form.email)?;
    let user = find_user_by_email(pool.get_ref(), &email).await?;

    // Check the replacement password before consuming the single-use code
    let password_hash = hash_password(&form.new_password)?;

    verify_otp(pool.get_ref(), user.id, form.otp).await?;
    update_password(pool.get_ref(), &user.email, &password_hash).await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user.id,
        "Password reset successfully"
    );

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Password has been reset"
    })))
}

/// GET /api/me
///
/// Return the authenticated user's profile. Claims are injected by
/// `JwtMiddleware`; reaching this handler means the token checked out.
///
/// # Errors
/// - 401: missing or invalid token (handled by middleware)
/// - 404: identity from the token no longer resolves
pub async fn get_current_user(
    claims: web::ReqData<Claims>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    let user = find_user_by_id(pool.get_ref(), user_id).await?;

    Ok(HttpResponse::Ok().json(UserResponse {
        id: user.id.to_string(),
        name: user.name,
        email: user.email,
        username: user.username,
        role: user.role.as_str().to_string(),
    }))
}
