use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use murmur_db::Database;
use murmur_types::api::LoginRequest;

use crate::error::ApiError;
use crate::media::MediaStore;
use crate::{blocking, validate};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub media: MediaStore,
}

/// POST /session: log in by username, registering it on first use.
/// The returned user id doubles as the bearer token.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate::username(&req.username)?;

    let (user, created) = blocking(&state, move |db| db.login(&req.username)).await?;

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(user)))
}

/// GET /liveness
pub async fn liveness(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    blocking(&state, |db| db.with_conn(|conn| {
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }))
    .await?;
    Ok(StatusCode::OK)
}
