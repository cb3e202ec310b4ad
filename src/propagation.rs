//! Default tasks: one catalog record per task, shown in every regular user's
//! list, with hide and status kept per user in `todo_overrides`.

use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use crate::db::unix_now;
use crate::error::AppError;
use crate::models::{TodoStatus, User};
use crate::ordering::{self, Scope};

fn regular_user_ids(conn: &Connection) -> Result<Vec<String>, AppError> {
    let mut stmt = conn.prepare("SELECT id FROM users WHERE role = 'user' ORDER BY created_at, id")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

fn user_scopes(user_id: &str) -> [Scope; 2] {
    [
        Scope::Owner(user_id.to_string()),
        Scope::AdminView(user_id.to_string()),
    ]
}

/// Adds a task to the catalog and to the end of every regular user's lists.
pub fn create_default_task(conn: &Connection, admin: &User, text: &str) -> Result<String, AppError> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO todos (id, text, status, created_at, user_id, created_by_user_id,
                            is_default_task, shared_with_admin, hidden_from_user)
         VALUES (?1, ?2, ?3, ?4, NULL, ?5, 1, 0, 0)",
        (&id, text, TodoStatus::Pending, unix_now(), &admin.id),
    )?;
    ordering::append(conn, &Scope::Catalog, &id)?;

    let users = regular_user_ids(conn)?;
    for user_id in &users {
        for scope in user_scopes(user_id) {
            ordering::append(conn, &scope, &id)?;
        }
    }

    info!(id = %id, users = users.len(), "Created default task");
    Ok(id)
}

pub fn update_default_task(conn: &Connection, id: &str, text: &str) -> Result<(), AppError> {
    let rows = conn.execute(
        "UPDATE todos SET text = ?1 WHERE id = ?2 AND is_default_task = 1",
        (text, id),
    )?;
    if rows == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

/// Deletes a default task together with every override and position that
/// refers to it. Returns the number of overrides removed.
pub fn delete_default_task(conn: &Connection, id: &str) -> Result<usize, AppError> {
    let overrides = conn.execute("DELETE FROM todo_overrides WHERE todo_id = ?1", [id])?;
    let scopes = ordering::remove_everywhere(conn, id)?;
    let rows = conn.execute(
        "DELETE FROM todos WHERE id = ?1 AND is_default_task = 1",
        [id],
    )?;
    if rows == 0 {
        return Err(AppError::NotFound);
    }

    info!(id, overrides, scopes = scopes.len(), "Deleted default task");
    Ok(overrides)
}

/// Hides or shows a default task for one user. The user's own list and the
/// admins' view of it follow the flag; nobody else is affected.
pub fn set_override_hidden(
    conn: &Connection,
    todo_id: &str,
    user_id: &str,
    hidden: bool,
) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO todo_overrides (todo_id, user_id, hidden) VALUES (?1, ?2, ?3)
         ON CONFLICT (todo_id, user_id) DO UPDATE SET hidden = excluded.hidden",
        (todo_id, user_id, hidden),
    )?;

    for scope in user_scopes(user_id) {
        if hidden {
            ordering::remove(conn, &scope, todo_id)?;
        } else {
            ordering::append(conn, &scope, todo_id)?;
        }
    }
    Ok(())
}

pub fn set_override_status(
    conn: &Connection,
    todo_id: &str,
    user_id: &str,
    status: TodoStatus,
) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO todo_overrides (todo_id, user_id, status) VALUES (?1, ?2, ?3)
         ON CONFLICT (todo_id, user_id) DO UPDATE SET status = excluded.status",
        (todo_id, user_id, status),
    )?;
    Ok(())
}

/// Gives a new regular user every catalog task, in catalog order.
pub fn seed_user(conn: &Connection, user_id: &str) -> Result<(), AppError> {
    for id in ordering::members(conn, &Scope::Catalog)? {
        for scope in user_scopes(user_id) {
            ordering::append(conn, &scope, &id)?;
        }
    }
    Ok(())
}
