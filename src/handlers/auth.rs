use axum::extract::{Path, State};
use axum::{http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::{
    cookie::{Cookie, SameSite},
    CookieJar,
};
use serde_json::json;
use tracing::{info, warn};

use crate::auth::{generate_session_id, generate_token, verify_password, SESSION_DAYS};
use crate::db::{
    create_api_token, create_session, delete_api_token, delete_session, get_or_create_user,
    list_api_tokens, unix_now,
};
use crate::error::AppError;
use crate::handlers::ApiJson;
use crate::middleware::{Actor, SessionActor};
use crate::models::{ApiToken, CreateApiToken, LoginRequest, Session, User};
use crate::AppState;

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<(CookieJar, impl IntoResponse), AppError> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::Validation("email cannot be empty".to_string()));
    }
    if !verify_password(&req.password, &state.password_hash) {
        warn!(email = %email, "Rejected login");
        return Err(AppError::Unauthorized);
    }

    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default())
        .to_string();
    let role = state.settings.role_for_email(&email);
    let (user, created) = get_or_create_user(&state.db, &email, &name, role)?;
    if created {
        info!(id = %user.id, role = user.role.as_str(), "Created user");
    }

    let now = unix_now();
    let session = Session {
        id: generate_session_id(),
        user_id: user.id.clone(),
        created_at: now,
        expires_at: now + SESSION_DAYS * 24 * 60 * 60,
    };
    create_session(&state.db, &session)?;
    info!(id = %user.id, "User logged in");

    let cookie = Cookie::build(("session", session.id))
        .path("/")
        .http_only(true)
        .secure(state.settings.session_secure)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::days(SESSION_DAYS));

    Ok((jar.add(cookie), Json(json!({ "success": true, "user": user }))))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, impl IntoResponse), AppError> {
    if let Some(session_cookie) = jar.get("session") {
        delete_session(&state.db, session_cookie.value())?;
    }
    info!("User logged out");

    let cookie = Cookie::build(("session", ""))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::seconds(0));

    Ok((jar.remove(cookie), Json(json!({ "success": true }))))
}

pub async fn me(Actor(user): Actor) -> Json<User> {
    Json(user)
}

pub async fn list_tokens(
    SessionActor(user): SessionActor,
    State(state): State<AppState>,
) -> Result<Json<Vec<ApiToken>>, AppError> {
    let tokens = list_api_tokens(&state.db, &user.id)?;
    Ok(Json(tokens))
}

pub async fn create_token(
    SessionActor(user): SessionActor,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateApiToken>,
) -> Result<(StatusCode, Json<ApiToken>), AppError> {
    let token_value = generate_token();
    let token = create_api_token(&state.db, &user.id, &token_value, req.name.as_deref())?;
    info!(user = %user.id, name = ?req.name, "Created API token");
    Ok((StatusCode::CREATED, Json(token)))
}

pub async fn revoke_token(
    SessionActor(user): SessionActor,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if delete_api_token(&state.db, &user.id, id)? {
        info!(user = %user.id, id, "Revoked API token");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}
