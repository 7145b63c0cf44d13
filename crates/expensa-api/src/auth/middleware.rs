use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use expensa_core::AppError;
use expensa_services::Actor;

use super::jwt::JwtVerifier;
use crate::error::HttpAppError;

/// Verifies `Authorization: Bearer <jwt>` and stores the caller in the request extensions.
pub async fn auth_middleware(
    State(verifier): State<Arc<JwtVerifier>>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match header {
        None => {
            return HttpAppError(AppError::Unauthorized(
                "Missing authorization header".to_string(),
            ))
            .into_response()
        }
        Some(h) => match h.strip_prefix("Bearer ") {
            Some(token) if !token.trim().is_empty() => token.trim(),
            _ => {
                return HttpAppError(AppError::Unauthorized(
                    "Invalid authorization header format".to_string(),
                ))
                .into_response()
            }
        },
    };

    let claims = match verifier.verify(token) {
        Ok(claims) => claims,
        Err(err) => return HttpAppError(err).into_response(),
    };

    request
        .extensions_mut()
        .insert(AuthUser(Actor::new(claims.sub, claims.email)));
    next.run(request).await
}

/// The authenticated caller. Only available behind [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct AuthUser(pub Actor);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = HttpAppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| HttpAppError(AppError::Unauthorized("Not authenticated".to_string())))
    }
}
