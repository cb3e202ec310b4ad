use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Result, Row};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ApiToken, Role, Session, TodoStatus, User};
use crate::propagation;

pub type DbPool = Arc<Mutex<Connection>>;

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        email TEXT UNIQUE NOT NULL,
        name TEXT NOT NULL DEFAULT '',
        avatar_url TEXT NOT NULL DEFAULT '',
        role TEXT NOT NULL,
        created_at INTEGER DEFAULT (strftime('%s', 'now'))
    );

    CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at INTEGER DEFAULT (strftime('%s', 'now')),
        expires_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS api_tokens (
        id INTEGER PRIMARY KEY,
        token TEXT UNIQUE NOT NULL,
        name TEXT,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at INTEGER DEFAULT (strftime('%s', 'now'))
    );

    CREATE TABLE IF NOT EXISTS todos (
        id TEXT PRIMARY KEY,
        text TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        created_at INTEGER NOT NULL,
        user_id TEXT REFERENCES users(id) ON DELETE CASCADE,
        created_by_user_id TEXT,
        is_default_task INTEGER NOT NULL DEFAULT 0,
        shared_with_admin INTEGER NOT NULL DEFAULT 0,
        hidden_from_user INTEGER NOT NULL DEFAULT 0,
        CHECK (is_default_task = 0 OR user_id IS NULL)
    );

    CREATE INDEX IF NOT EXISTS todos_user_id ON todos(user_id);

    CREATE TABLE IF NOT EXISTS todo_overrides (
        todo_id TEXT NOT NULL REFERENCES todos(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        hidden INTEGER NOT NULL DEFAULT 0,
        status TEXT,
        PRIMARY KEY (todo_id, user_id)
    );

    CREATE TABLE IF NOT EXISTS todo_positions (
        scope_kind TEXT NOT NULL,
        scope_user_id TEXT NOT NULL DEFAULT '',
        todo_id TEXT NOT NULL REFERENCES todos(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        PRIMARY KEY (scope_kind, scope_user_id, todo_id)
    );

    CREATE INDEX IF NOT EXISTS todo_positions_todo_id ON todo_positions(todo_id);
";

pub fn init_db(path: impl AsRef<Path>) -> Result<DbPool> {
    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

pub fn init_memory_db() -> Result<DbPool> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
}

pub fn lock(pool: &DbPool) -> Result<MutexGuard<'_, Connection>, AppError> {
    pool.lock()
        .map_err(|_| AppError::Database("database lock poisoned".to_string()))
}

pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        Role::parse(text).ok_or_else(|| FromSqlError::Other(format!("unknown role {text:?}").into()))
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TodoStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        TodoStatus::parse(text)
            .ok_or_else(|| FromSqlError::Other(format!("unknown status {text:?}").into()))
    }
}

impl ToSql for TodoStatus {
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

// Session operations
pub fn create_session(pool: &DbPool, session: &Session) -> Result<(), AppError> {
    let conn = lock(pool)?;
    conn.execute(
        "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        (&session.id, &session.user_id, session.created_at, session.expires_at),
    )?;
    Ok(())
}

pub fn delete_session(pool: &DbPool, id: &str) -> Result<(), AppError> {
    let conn = lock(pool)?;
    conn.execute("DELETE FROM sessions WHERE id = ?1", [id])?;
    Ok(())
}

pub fn cleanup_expired_sessions(pool: &DbPool) -> Result<usize, AppError> {
    let conn = lock(pool)?;
    let removed = conn.execute("DELETE FROM sessions WHERE expires_at < ?1", [unix_now()])?;
    Ok(removed)
}

/// Resolves a session id to its user, ignoring expired sessions.
pub fn user_for_session(pool: &DbPool, id: &str) -> Result<Option<User>, AppError> {
    let conn = lock(pool)?;
    let user = conn
        .query_row(
            "SELECT u.id, u.email, u.name, u.avatar_url, u.role, u.created_at
             FROM sessions s JOIN users u ON u.id = s.user_id
             WHERE s.id = ?1 AND s.expires_at > ?2",
            (id, unix_now()),
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

// API Token operations
pub fn create_api_token(
    pool: &DbPool,
    user_id: &str,
    token: &str,
    name: Option<&str>,
) -> Result<ApiToken, AppError> {
    let conn = lock(pool)?;
    conn.execute(
        "INSERT INTO api_tokens (token, name, user_id) VALUES (?1, ?2, ?3)",
        (token, name, user_id),
    )?;
    let id = conn.last_insert_rowid();

    let token = conn.query_row(
        "SELECT id, token, name, user_id, created_at FROM api_tokens WHERE id = ?1",
        [id],
        token_from_row,
    )?;
    Ok(token)
}

pub fn user_for_api_token(pool: &DbPool, token: &str) -> Result<Option<User>, AppError> {
    let conn = lock(pool)?;
    let user = conn
        .query_row(
            "SELECT u.id, u.email, u.name, u.avatar_url, u.role, u.created_at
             FROM api_tokens t JOIN users u ON u.id = t.user_id
             WHERE t.token = ?1",
            [token],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn list_api_tokens(pool: &DbPool, user_id: &str) -> Result<Vec<ApiToken>, AppError> {
    let conn = lock(pool)?;
    let mut stmt = conn.prepare(
        "SELECT id, token, name, user_id, created_at FROM api_tokens
         WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
    )?;
    let tokens = stmt
        .query_map([user_id], token_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tokens)
}

pub fn delete_api_token(pool: &DbPool, user_id: &str, id: i64) -> Result<bool, AppError> {
    let conn = lock(pool)?;
    let rows = conn.execute(
        "DELETE FROM api_tokens WHERE id = ?1 AND user_id = ?2",
        (id, user_id),
    )?;
    Ok(rows > 0)
}

// User operations
pub fn get_user(conn: &Connection, id: &str) -> Result<Option<User>, AppError> {
    let user = conn
        .query_row(
            "SELECT id, email, name, avatar_url, role, created_at FROM users WHERE id = ?1",
            [id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

/// Lists every account with the `user` role, newest first.
pub fn list_users(pool: &DbPool) -> Result<Vec<User>, AppError> {
    let conn = lock(pool)?;
    let mut stmt = conn.prepare(
        "SELECT id, email, name, avatar_url, role, created_at FROM users
         WHERE role = 'user' ORDER BY created_at DESC, email ASC",
    )?;
    let users = stmt
        .query_map([], user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

/// Looks a user up by email, creating the account on first sight. The role is
/// only assigned at creation; existing accounts keep theirs.
pub fn get_or_create_user(
    pool: &DbPool,
    email: &str,
    name: &str,
    role: Role,
) -> Result<(User, bool), AppError> {
    let mut conn = lock(pool)?;
    let tx = conn.transaction()?;

    let existing = tx
        .query_row(
            "SELECT id, email, name, avatar_url, role, created_at FROM users WHERE email = ?1",
            [email],
            user_from_row,
        )
        .optional()?;
    if let Some(user) = existing {
        return Ok((user, false));
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        email: email.to_string(),
        name: name.to_string(),
        avatar_url: String::new(),
        role,
        created_at: unix_now(),
    };
    tx.execute(
        "INSERT INTO users (id, email, name, avatar_url, role, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        (
            &user.id,
            &user.email,
            &user.name,
            &user.avatar_url,
            user.role,
            user.created_at,
        ),
    )?;
    if user.role == Role::User {
        propagation::seed_user(&tx, &user.id)?;
    }
    tx.commit()?;

    Ok((user, true))
}

fn user_from_row(row: &Row<'_>) -> Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        avatar_url: row.get(3)?,
        role: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn token_from_row(row: &Row<'_>) -> Result<ApiToken> {
    Ok(ApiToken {
        id: row.get(0)?,
        token: row.get(1)?,
        name: row.get(2)?,
        user_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}
