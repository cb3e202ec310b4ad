//! The todo store: every read and write of todos goes through here, gated by
//! the visibility rules and kept consistent with the ordering index inside a
//! single transaction.

use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{get_user, lock, unix_now, DbPool};
use crate::error::AppError;
use crate::models::{validate_text, Role, Todo, TodoStatus, UpdateTodo, User};
use crate::ordering::{self, Scope};
use crate::propagation;
use crate::visibility::{
    can_address, can_delete, can_view, capacity, check_patch, project, record_kind, RecordKind,
};

/// A todo row joined with the override and position that apply to one scope.
#[derive(Debug, Clone)]
pub struct StoredTodo {
    pub id: String,
    pub text: String,
    pub status: TodoStatus,
    pub created_at: i64,
    pub user_id: Option<String>,
    pub created_by_user_id: Option<String>,
    pub is_default_task: bool,
    pub shared_with_admin: bool,
    pub hidden_from_user: bool,
    pub override_hidden: bool,
    pub override_status: Option<TodoStatus>,
}

#[derive(Debug, Clone)]
pub struct NewTodo {
    pub text: String,
    pub shared_with_admin: Option<bool>,
    pub hidden_from_user: bool,
}

const SELECT_SCOPED: &str = "
    SELECT t.id, t.text, t.status, t.created_at, t.user_id, t.created_by_user_id,
           t.is_default_task, t.shared_with_admin, t.hidden_from_user,
           COALESCE(o.hidden, 0), o.status, p.position
    FROM todos t
    LEFT JOIN todo_overrides o ON o.todo_id = t.id AND o.user_id = ?1
    LEFT JOIN todo_positions p
        ON p.todo_id = t.id AND p.scope_kind = ?2 AND p.scope_user_id = ?1
";

fn scoped_from_row(row: &Row<'_>) -> rusqlite::Result<(StoredTodo, Option<i64>)> {
    Ok((
        StoredTodo {
            id: row.get(0)?,
            text: row.get(1)?,
            status: row.get(2)?,
            created_at: row.get(3)?,
            user_id: row.get(4)?,
            created_by_user_id: row.get(5)?,
            is_default_task: row.get(6)?,
            shared_with_admin: row.get(7)?,
            hidden_from_user: row.get(8)?,
            override_hidden: row.get(9)?,
            override_status: row.get(10)?,
        },
        row.get(11)?,
    ))
}

fn load_scoped(
    conn: &Connection,
    scope: &Scope,
    id: &str,
) -> Result<Option<(StoredTodo, Option<i64>)>, AppError> {
    let query = format!("{SELECT_SCOPED} WHERE t.id = ?3");
    let row = conn
        .query_row(&query, (scope.user_id(), scope.kind(), id), scoped_from_row)
        .optional()?;
    Ok(row)
}

fn list_scoped(conn: &Connection, scope: &Scope) -> Result<Vec<(StoredTodo, Option<i64>)>, AppError> {
    let query = format!("{SELECT_SCOPED} WHERE t.user_id = ?1 OR t.is_default_task = 1");
    let mut stmt = conn.prepare(&query)?;
    let rows = stmt
        .query_map((scope.user_id(), scope.kind()), scoped_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Checks that `viewer` may act on `scope` at all.
fn authorize_scope(conn: &Connection, viewer: &User, scope: &Scope) -> Result<(), AppError> {
    match scope {
        Scope::Owner(owner) if *owner == viewer.id => Ok(()),
        Scope::Owner(_) => Err(AppError::NotFound),
        Scope::AdminView(_) | Scope::Catalog if !viewer.is_admin() => {
            Err(AppError::Forbidden("forbidden: admin access required"))
        }
        Scope::AdminView(owner) => match get_user(conn, owner)? {
            Some(user) if user.role == Role::User => Ok(()),
            _ => Err(AppError::NotFound),
        },
        Scope::Catalog => Ok(()),
    }
}

/// The role of the user whose list `scope` orders.
fn owner_role(viewer: &User, scope: &Scope) -> Role {
    match scope {
        Scope::Owner(_) => viewer.role,
        Scope::AdminView(_) | Scope::Catalog => Role::User,
    }
}

/// Puts a user-owned todo into exactly the scopes its flags allow.
fn sync_user_todo(
    conn: &Connection,
    id: &str,
    owner_id: &str,
    owner_role: Role,
    shared_with_admin: bool,
    hidden_from_user: bool,
) -> Result<(), AppError> {
    let own = Scope::Owner(owner_id.to_string());
    if hidden_from_user {
        ordering::remove(conn, &own, id)?;
    } else {
        ordering::append(conn, &own, id)?;
    }

    let admin = Scope::AdminView(owner_id.to_string());
    if owner_role == Role::User && shared_with_admin {
        ordering::append(conn, &admin, id)?;
    } else {
        ordering::remove(conn, &admin, id)?;
    }
    Ok(())
}

fn insert_user_todo(
    conn: &Connection,
    owner_id: &str,
    owner_role: Role,
    author_id: &str,
    new: &NewTodo,
    shared_with_admin: bool,
) -> Result<String, AppError> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO todos (id, text, status, created_at, user_id, created_by_user_id,
                            is_default_task, shared_with_admin, hidden_from_user)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8)",
        (
            &id,
            &new.text,
            TodoStatus::Pending,
            unix_now(),
            owner_id,
            author_id,
            shared_with_admin,
            new.hidden_from_user,
        ),
    )?;
    sync_user_todo(
        conn,
        &id,
        owner_id,
        owner_role,
        shared_with_admin,
        new.hidden_from_user,
    )?;
    Ok(id)
}

fn update_columns(conn: &Connection, id: &str, patch: &UpdateTodo) -> Result<(), AppError> {
    let mut updates = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(text) = &patch.text {
        updates.push("text = ?");
        params.push(Box::new(text.clone()));
    }
    if let Some(status) = patch.status {
        updates.push("status = ?");
        params.push(Box::new(status));
    }
    if let Some(shared) = patch.shared_with_admin {
        updates.push("shared_with_admin = ?");
        params.push(Box::new(shared));
    }
    if let Some(hidden) = patch.hidden_from_user {
        updates.push("hidden_from_user = ?");
        params.push(Box::new(hidden));
    }

    if updates.is_empty() {
        return Ok(());
    }

    params.push(Box::new(id.to_string()));
    let query = format!("UPDATE todos SET {} WHERE id = ?", updates.join(", "));
    let params_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    conn.execute(&query, params_refs.as_slice())?;
    Ok(())
}

/// The effective list of `scope` as seen by `viewer`, in position order.
///
/// Positions are those of the full list. With `exclude_default_tasks` the
/// output can therefore have gaps, and a reorder still takes the full list.
pub fn list_todos(
    pool: &DbPool,
    viewer: &User,
    scope: &Scope,
    exclude_default_tasks: bool,
) -> Result<Vec<Todo>, AppError> {
    let conn = lock(pool)?;
    authorize_scope(&conn, viewer, scope)?;

    let mut todos: Vec<Todo> = list_scoped(&conn, scope)?
        .into_iter()
        .filter(|(todo, _)| can_view(viewer, scope, todo))
        .filter(|(todo, _)| !(exclude_default_tasks && todo.is_default_task))
        .filter_map(|(todo, position)| match position {
            Some(position) => Some(project(scope, todo, Some(position))),
            None => {
                warn!(id = %todo.id, scope = scope.kind(), "Visible todo missing from ordering");
                None
            }
        })
        .collect();
    todos.sort_by_key(|todo| todo.position);
    Ok(todos)
}

pub fn get_todo(pool: &DbPool, viewer: &User, scope: &Scope, id: &str) -> Result<Todo, AppError> {
    let conn = lock(pool)?;
    authorize_scope(&conn, viewer, scope)?;

    match load_scoped(&conn, scope, id)? {
        Some((todo, position)) if can_view(viewer, scope, &todo) => {
            Ok(project(scope, todo, position))
        }
        _ => Err(AppError::NotFound),
    }
}

/// Creates a todo at the end of `scope`: a personal todo in the viewer's own
/// list, an assigned todo in a user's list, or a default task in the catalog.
pub fn create_todo(
    pool: &DbPool,
    viewer: &User,
    scope: &Scope,
    new: NewTodo,
) -> Result<Todo, AppError> {
    validate_text(&new.text).map_err(AppError::Validation)?;

    let mut conn = lock(pool)?;
    let tx = conn.transaction()?;
    authorize_scope(&tx, viewer, scope)?;

    let id = match scope {
        Scope::Catalog => propagation::create_default_task(&tx, viewer, &new.text)?,
        Scope::Owner(owner) => {
            if new.hidden_from_user {
                return Err(AppError::Forbidden(
                    "forbidden: cannot hide a todo from yourself",
                ));
            }
            let shared = new.shared_with_admin.unwrap_or(true);
            insert_user_todo(&tx, owner, viewer.role, &viewer.id, &new, shared)?
        }
        Scope::AdminView(owner) => {
            if new.shared_with_admin.is_some() {
                return Err(AppError::Forbidden(
                    "forbidden: sharing is controlled by the owner",
                ));
            }
            insert_user_todo(&tx, owner, Role::User, &viewer.id, &new, true)?
        }
    };

    let (todo, position) = load_scoped(&tx, scope, &id)?.ok_or(AppError::NotFound)?;
    tx.commit()?;

    info!(id = %todo.id, scope = scope.kind(), owner = scope.user_id(), "Created todo");
    Ok(project(scope, todo, position))
}

/// Applies a partial update. Every supplied field must be writable by the
/// viewer for this kind of record, otherwise nothing changes.
pub fn update_todo(
    pool: &DbPool,
    viewer: &User,
    scope: &Scope,
    id: &str,
    patch: &UpdateTodo,
) -> Result<Todo, AppError> {
    let mut conn = lock(pool)?;
    let tx = conn.transaction()?;
    authorize_scope(&tx, viewer, scope)?;

    let (todo, _) = load_scoped(&tx, scope, id)?
        .filter(|(todo, _)| can_address(viewer, scope, todo))
        .ok_or(AppError::NotFound)?;
    let kind = record_kind(scope, &todo);
    check_patch(capacity(scope), kind, patch)?;
    if let Some(text) = &patch.text {
        validate_text(text).map_err(AppError::Validation)?;
    }

    match kind {
        RecordKind::DefaultTemplate => {
            if let Some(text) = &patch.text {
                propagation::update_default_task(&tx, id, text)?;
            }
        }
        RecordKind::DefaultInstance => {
            let user_id = scope.user_id();
            if let Some(status) = patch.status {
                propagation::set_override_status(&tx, id, user_id, status)?;
            }
            if let Some(hidden) = patch.hidden_from_user {
                propagation::set_override_hidden(&tx, id, user_id, hidden)?;
            }
        }
        RecordKind::Authored | RecordKind::Assigned => {
            update_columns(&tx, id, patch)?;
            if patch.shared_with_admin.is_some() || patch.hidden_from_user.is_some() {
                let owner_id = todo
                    .user_id
                    .as_deref()
                    .ok_or_else(|| AppError::Database(format!("todo {id} has no owner")))?;
                sync_user_todo(
                    &tx,
                    id,
                    owner_id,
                    owner_role(viewer, scope),
                    patch.shared_with_admin.unwrap_or(todo.shared_with_admin),
                    patch.hidden_from_user.unwrap_or(todo.hidden_from_user),
                )?;
            }
        }
    }

    let (todo, position) = load_scoped(&tx, scope, id)?.ok_or(AppError::NotFound)?;
    tx.commit()?;

    info!(id, scope = scope.kind(), status = todo.status.as_str(), "Updated todo");
    Ok(project(scope, todo, position))
}

pub fn delete_todo(pool: &DbPool, viewer: &User, scope: &Scope, id: &str) -> Result<(), AppError> {
    let mut conn = lock(pool)?;
    let tx = conn.transaction()?;
    authorize_scope(&tx, viewer, scope)?;

    let (todo, _) = load_scoped(&tx, scope, id)?
        .filter(|(todo, _)| can_address(viewer, scope, todo))
        .ok_or(AppError::NotFound)?;
    let kind = record_kind(scope, &todo);
    if !can_delete(capacity(scope), kind) {
        return Err(AppError::Forbidden(match kind {
            RecordKind::DefaultInstance => {
                "forbidden: default tasks can only be deleted from the catalog"
            }
            RecordKind::Assigned => "forbidden: cannot delete admin-assigned task",
            _ => "forbidden: can only delete admin-created tasks",
        }));
    }

    if kind == RecordKind::DefaultTemplate {
        propagation::delete_default_task(&tx, id)?;
    } else {
        ordering::remove_everywhere(&tx, id)?;
        tx.execute("DELETE FROM todos WHERE id = ?1", [id])?;
    }
    tx.commit()?;

    info!(id, scope = scope.kind(), "Deleted todo");
    Ok(())
}

/// Replaces the order of `scope` with `ids`, which must list exactly its
/// current members.
pub fn reorder_todos(
    pool: &DbPool,
    viewer: &User,
    scope: &Scope,
    ids: &[String],
) -> Result<(), AppError> {
    let mut conn = lock(pool)?;
    let tx = conn.transaction()?;
    authorize_scope(&tx, viewer, scope)?;
    ordering::reorder(&tx, scope, ids)?;
    tx.commit()?;

    info!(scope = scope.kind(), count = ids.len(), "Reordered todos");
    Ok(())
}
