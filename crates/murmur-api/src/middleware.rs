use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

/// Identity of the authenticated caller, inserted as a request extension.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
}

/// Accept `Authorization: Bearer <user id>` when the id belongs to a known user.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Unauthorized)?
        .to_string();

    let id = token.clone();
    if !blocking(&state, move |db| db.user_exists(&id)).await? {
        return Err(ApiError::Unauthorized);
    }

    req.extensions_mut().insert(Caller { user_id: token });
    Ok(next.run(req).await)
}
