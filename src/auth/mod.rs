/// Authentication module
///
/// Credential storage and verification, JWT issuance/validation,
/// refresh-token lifecycle, and password-reset one-time codes.

mod claims;
mod jwt;
mod otp;
mod password;
mod refresh_token;
mod users;

pub use claims::Claims;
pub use jwt::generate_access_token;
pub use jwt::validate_access_token;
pub use otp::generate_otp;
pub use otp::save_otp;
pub use otp::verify_otp;
pub use password::hash_password;
pub use password::verify_password;
pub use refresh_token::generate_refresh_token;
pub use refresh_token::save_refresh_token;
pub use refresh_token::verify_refresh_token;
pub use users::create_user;
pub use users::find_user_by_email;
pub use users::find_user_by_id;
pub use users::update_password;
pub use users::verify_credentials;
pub use users::User;
pub use users::UserRole;
