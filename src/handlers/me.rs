use axum::{Extension, Json, extract::State};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::models::{SubscriptionWithProduct, User};

pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<User>> {
    let conn = state.db.get()?;
    let user = queries::get_user_by_id(&conn, &auth.id)?.ok_or(AppError::Unauthorized)?;
    Ok(Json(user))
}

pub async fn my_subscriptions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<SubscriptionWithProduct>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_subscriptions_for_user(&conn, &auth.id)?))
}
