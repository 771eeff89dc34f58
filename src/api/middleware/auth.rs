use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};

use crate::error::AppError;

/// Header carrying the acting user's name
pub const ACTOR_HEADER: &str = "x-username";

/// The user performing a mutating request
#[derive(Debug, Clone)]
pub struct Actor {
    pub username: String,
}

/// Reads the acting user from the request headers
pub fn get_actor(headers: &HeaderMap) -> Result<Actor, AppError> {
    let username = headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or(AppError::Unauthorized)?;

    Ok(Actor {
        username: username.to_string(),
    })
}

/// Middleware that requires an acting user and exposes it as an extension
pub async fn require_actor(mut request: Request, next: Next) -> Result<Response, AppError> {
    let actor = get_actor(request.headers())?;
    request.extensions_mut().insert(actor);

    Ok(next.run(request).await)
}
