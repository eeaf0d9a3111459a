use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::jwt;
use crate::models::Role;
use crate::util::extract_bearer_token;

/// Authenticated caller context, inserted as a request extension.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
    pub role: Role,
}

impl AuthUser {
    /// Gate an operation on the caller's role.
    pub fn require(&self, roles: &[Role]) -> Result<()> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden("Insufficient permissions".into()))
        }
    }
}

/// Validate the session token, reject blocked accounts and attach
/// [`AuthUser`] to the request.
///
/// The role comes from the database rather than the token so a role change
/// or a block takes effect on the next request, not at token expiry.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> std::result::Result<Response, StatusCode> {
    let token = extract_bearer_token(request.headers()).ok_or(StatusCode::UNAUTHORIZED)?;

    let claims =
        jwt::verify_session(&state.jwt_key, token).map_err(|_| StatusCode::UNAUTHORIZED)?;

    let conn = state
        .db
        .get()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let user = queries::get_user_by_id(&conn, &claims.sub)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if user.blocked {
        return Err(StatusCode::FORBIDDEN);
    }

    request.extensions_mut().insert(AuthUser {
        id: user.id,
        username: user.username,
        role: user.role,
    });

    Ok(next.run(request).await)
}
