//! Admin routes: the user directory, the default-task catalog, and the
//! admins' view of each user's list.

use axum::extract::{Path, State};
use axum::{http::StatusCode, Json};
use serde_json::{json, Value};
use tracing::info;

use crate::db::list_users;
use crate::error::AppError;
use crate::handlers::ApiJson;
use crate::middleware::AdminActor;
use crate::models::{CreateDefaultTask, CreateUserTodo, ReorderTodos, Todo, UpdateTodo};
use crate::ordering::Scope;
use crate::store::{self, NewTodo};
use crate::AppState;

pub async fn users(
    AdminActor(admin): AdminActor,
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    let users = list_users(&state.db)?;
    info!(admin = %admin.id, count = users.len(), "Listed users");
    Ok(Json(json!({ "users": users })))
}

// Default-task catalog

pub async fn list_default_tasks(
    AdminActor(admin): AdminActor,
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    let todos = store::list_todos(&state.db, &admin, &Scope::Catalog, false)?;
    Ok(Json(json!({ "todos": todos })))
}

pub async fn create_default_task(
    AdminActor(admin): AdminActor,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateDefaultTask>,
) -> Result<(StatusCode, Json<Todo>), AppError> {
    let new = NewTodo {
        text: req.text,
        shared_with_admin: None,
        hidden_from_user: false,
    };
    let todo = store::create_todo(&state.db, &admin, &Scope::Catalog, new)?;
    Ok((StatusCode::CREATED, Json(todo)))
}

pub async fn get_default_task(
    AdminActor(admin): AdminActor,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Todo>, AppError> {
    let todo = store::get_todo(&state.db, &admin, &Scope::Catalog, &id)?;
    Ok(Json(todo))
}

pub async fn update_default_task(
    AdminActor(admin): AdminActor,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateTodo>,
) -> Result<Json<Todo>, AppError> {
    let todo = store::update_todo(&state.db, &admin, &Scope::Catalog, &id, &req)?;
    Ok(Json(todo))
}

pub async fn delete_default_task(
    AdminActor(admin): AdminActor,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    store::delete_todo(&state.db, &admin, &Scope::Catalog, &id)?;
    Ok(Json(json!({ "success": true })))
}

pub async fn reorder_default_tasks(
    AdminActor(admin): AdminActor,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ReorderTodos>,
) -> Result<Json<Value>, AppError> {
    store::reorder_todos(&state.db, &admin, &Scope::Catalog, &req.ids)?;
    Ok(Json(json!({ "success": true })))
}

// A user's list as admins see it

pub async fn list_user_todos(
    AdminActor(admin): AdminActor,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let todos = store::list_todos(&state.db, &admin, &Scope::AdminView(user_id), false)?;
    Ok(Json(json!({ "todos": todos })))
}

pub async fn create_user_todo(
    AdminActor(admin): AdminActor,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    ApiJson(req): ApiJson<CreateUserTodo>,
) -> Result<(StatusCode, Json<Todo>), AppError> {
    let new = NewTodo {
        text: req.text,
        shared_with_admin: req.shared_with_admin,
        hidden_from_user: req.hidden_from_user,
    };
    let todo = store::create_todo(&state.db, &admin, &Scope::AdminView(user_id), new)?;
    Ok((StatusCode::CREATED, Json(todo)))
}

pub async fn get_user_todo(
    AdminActor(admin): AdminActor,
    State(state): State<AppState>,
    Path((user_id, id)): Path<(String, String)>,
) -> Result<Json<Todo>, AppError> {
    let todo = store::get_todo(&state.db, &admin, &Scope::AdminView(user_id), &id)?;
    Ok(Json(todo))
}

pub async fn update_user_todo(
    AdminActor(admin): AdminActor,
    State(state): State<AppState>,
    Path((user_id, id)): Path<(String, String)>,
    ApiJson(req): ApiJson<UpdateTodo>,
) -> Result<Json<Todo>, AppError> {
    let todo = store::update_todo(&state.db, &admin, &Scope::AdminView(user_id), &id, &req)?;
    Ok(Json(todo))
}

pub async fn delete_user_todo(
    AdminActor(admin): AdminActor,
    State(state): State<AppState>,
    Path((user_id, id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    store::delete_todo(&state.db, &admin, &Scope::AdminView(user_id), &id)?;
    Ok(Json(json!({ "success": true })))
}

pub async fn reorder_user_todos(
    AdminActor(admin): AdminActor,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    ApiJson(req): ApiJson<ReorderTodos>,
) -> Result<Json<Value>, AppError> {
    store::reorder_todos(&state.db, &admin, &Scope::AdminView(user_id), &req.ids)?;
    Ok(Json(json!({ "success": true })))
}
