mod auth;
mod health_check;

pub use auth::{
    forgot_password, get_current_user, login, refresh, register, reset_password,
};
pub use health_check::health_check;
