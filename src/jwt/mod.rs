//! Session token signing and validation (HS256, 7-day expiry).
//!
//! The engine trusts the `(sub, role)` pair carried here without
//! re-validation; blocked users are rejected at the auth middleware.

use jwt_simple::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Role, User};

const SESSION_DAYS: u64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub username: String,
    pub role: Role,
}

pub fn sign_session(key: &HS256Key, user: &User) -> Result<String> {
    let claims = Claims::with_custom_claims(
        SessionClaims {
            sub: user.id.clone(),
            username: user.username.clone(),
            role: user.role,
        },
        Duration::from_days(SESSION_DAYS),
    );
    key.authenticate(claims)
        .map_err(|e| AppError::Internal(format!("Token signing failed: {}", e)))
}

pub fn verify_session(key: &HS256Key, token: &str) -> Result<SessionClaims> {
    let claims = key
        .verify_token::<SessionClaims>(token, None)
        .map_err(|_| AppError::Unauthorized)?;
    Ok(claims.custom)
}
