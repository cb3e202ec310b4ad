use axum::http::{header::AUTHORIZATION, request::Parts, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{extract::FromRequestParts, Json};
use serde_json::json;
use tracing::warn;

use crate::db::{user_for_api_token, user_for_session, DbPool};
use crate::error::AppError;
use crate::models::User;
use crate::AppState;

/// The user behind a request, authenticated by session cookie or API token.
pub struct Actor(pub User);

/// The user behind a request, authenticated by session cookie only.
pub struct SessionActor(pub User);

/// An authenticated administrator.
pub struct AdminActor(pub User);

impl FromRequestParts<AppState> for Actor {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = check_session(parts, &state.db)? {
            return Ok(Actor(user));
        }

        if let Some(user) = check_bearer_token(parts, &state.db)? {
            return Ok(Actor(user));
        }

        warn!(path = %parts.uri.path(), "Unauthorized API access attempt");
        Err(AuthError::Unauthorized)
    }
}

impl FromRequestParts<AppState> for SessionActor {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = check_session(parts, &state.db)? {
            return Ok(SessionActor(user));
        }

        Err(AuthError::Unauthorized)
    }
}

impl FromRequestParts<AppState> for AdminActor {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Actor(user) = Actor::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            warn!(user = %user.id, path = %parts.uri.path(), "Non-admin tried an admin route");
            return Err(AuthError::Forbidden);
        }
        Ok(AdminActor(user))
    }
}

fn check_session(parts: &Parts, db: &DbPool) -> Result<Option<User>, AppError> {
    let cookies = parts
        .headers
        .get_all("cookie")
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|s| s.split(';'))
        .filter_map(|s| {
            let mut parts = s.trim().splitn(2, '=');
            Some((parts.next()?, parts.next()?))
        });

    for (name, value) in cookies {
        if name == "session" {
            if let Some(user) = user_for_session(db, value)? {
                return Ok(Some(user));
            }
        }
    }
    Ok(None)
}

fn check_bearer_token(parts: &Parts, db: &DbPool) -> Result<Option<User>, AppError> {
    if let Some(auth_header) = parts.headers.get(AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return user_for_api_token(db, token.trim());
            }
        }
    }
    Ok(None)
}

pub enum AuthError {
    Unauthorized,
    Forbidden,
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AuthError::Forbidden => (
                StatusCode::FORBIDDEN,
                "forbidden: admin access required".to_string(),
            ),
            AuthError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<AppError> for AuthError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Unauthorized => AuthError::Unauthorized,
            AppError::Forbidden(_) => AuthError::Forbidden,
            AppError::Database(msg) | AppError::Validation(msg) => AuthError::Internal(msg),
            AppError::NotFound => AuthError::Internal("Not found".to_string()),
        }
    }
}
