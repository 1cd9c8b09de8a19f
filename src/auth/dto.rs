use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    users::dto::{is_valid_email, normalize_email},
};

pub const MIN_LOGIN_PASSWORD_LEN: usize = 3;

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&mut self) -> Result<(), AppError> {
        self.email = normalize_email(&self.email);
        if !is_valid_email(&self.email) {
            return Err(AppError::validation("Invalid email"));
        }
        if self.password.chars().count() < MIN_LOGIN_PASSWORD_LEN {
            return Err(AppError::validation(format!(
                "password must be at least {MIN_LOGIN_PASSWORD_LEN} characters"
            )));
        }
        Ok(())
    }
}

/// Response returned after a successful login.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}
