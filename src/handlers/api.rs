use axum::extract::{Path, State};
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use tracing::info;

use crate::error::AppError;
use crate::handlers::{ApiJson, ApiQuery};
use crate::middleware::Actor;
use crate::models::{CreateTodo, ListTodosQuery, ReorderTodos, Todo, TodoStatus, UpdateTodo};
use crate::ordering::Scope;
use crate::store::{self, NewTodo};
use crate::AppState;

fn own_scope(actor: &Actor) -> Scope {
    Scope::Owner(actor.0.id.clone())
}

pub async fn list_todos(
    actor: Actor,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListTodosQuery>,
) -> Result<Json<Value>, AppError> {
    let todos = store::list_todos(
        &state.db,
        &actor.0,
        &own_scope(&actor),
        query.exclude_admin_todos,
    )?;
    info!(user = %actor.0.id, count = todos.len(), "Listed todos");
    Ok(Json(json!({ "todos": todos })))
}

pub async fn create_todo(
    actor: Actor,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateTodo>,
) -> Result<(StatusCode, Json<Todo>), AppError> {
    let new = NewTodo {
        text: req.text,
        shared_with_admin: req.shared_with_admin,
        hidden_from_user: false,
    };
    let todo = store::create_todo(&state.db, &actor.0, &own_scope(&actor), new)?;
    Ok((StatusCode::CREATED, Json(todo)))
}

pub async fn get_todo(
    actor: Actor,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Todo>, AppError> {
    let todo = store::get_todo(&state.db, &actor.0, &own_scope(&actor), &id)?;
    Ok(Json(todo))
}

/// Patches a todo in the caller's list. Hiding a default task is one-way for
/// its owner: once hidden it is no longer addressable through the owner's
/// list, so only an admin can show it again.
pub async fn update_todo(
    actor: Actor,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateTodo>,
) -> Result<Json<Todo>, AppError> {
    let todo = store::update_todo(&state.db, &actor.0, &own_scope(&actor), &id, &req)?;
    Ok(Json(todo))
}

pub async fn delete_todo(
    actor: Actor,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    store::delete_todo(&state.db, &actor.0, &own_scope(&actor), &id)?;
    Ok(Json(json!({ "success": true })))
}

pub async fn reorder(
    actor: Actor,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ReorderTodos>,
) -> Result<Json<Value>, AppError> {
    store::reorder_todos(&state.db, &actor.0, &own_scope(&actor), &req.ids)?;
    Ok(Json(json!({ "success": true })))
}

/// Open todos of the caller's list, one per line.
pub async fn plain_text_todos(
    actor: Actor,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let todos = store::list_todos(&state.db, &actor.0, &own_scope(&actor), false)?;
    let text: String = todos
        .iter()
        .filter(|t| t.status != TodoStatus::Done)
        .map(|t| format!("{}\n", t.text))
        .collect();

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        text,
    ))
}
