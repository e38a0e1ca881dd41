use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

use yaarfetch_types::models::User;

use crate::auth::{self, AppState};
use crate::error::ApiError;

/// The authenticated caller, inserted by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Resolve the bearer token to an existing user before the handler runs.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(ApiError::credentials)?;

    let user = auth::resolve(&state, bearer.token()).await?;

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}
