//! Dense per-scope ordering of todos.
//!
//! Every scope owns an independent `0..n-1` sequence stored in
//! `todo_positions`. All functions take a connection so callers can run them
//! inside the transaction of the write that changes set membership.

use std::collections::HashSet;

use rusqlite::{Connection, OptionalExtension};

use crate::error::AppError;

/// One independent ordering and visibility context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// A user's own list.
    Owner(String),
    /// The administrators' view of a user's list.
    AdminView(String),
    /// The default-task catalog.
    Catalog,
}

impl Scope {
    pub fn kind(&self) -> &'static str {
        match self {
            Scope::Owner(_) => "owner",
            Scope::AdminView(_) => "admin",
            Scope::Catalog => "catalog",
        }
    }

    /// The user whose list this scope orders, or `""` for the catalog.
    pub fn user_id(&self) -> &str {
        match self {
            Scope::Owner(id) | Scope::AdminView(id) => id,
            Scope::Catalog => "",
        }
    }

    fn from_parts(kind: &str, user_id: String) -> Option<Self> {
        match kind {
            "owner" => Some(Scope::Owner(user_id)),
            "admin" => Some(Scope::AdminView(user_id)),
            "catalog" => Some(Scope::Catalog),
            _ => None,
        }
    }
}

pub fn count(conn: &Connection, scope: &Scope) -> Result<i64, AppError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM todo_positions WHERE scope_kind = ?1 AND scope_user_id = ?2",
        (scope.kind(), scope.user_id()),
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn position(conn: &Connection, scope: &Scope, todo_id: &str) -> Result<Option<i64>, AppError> {
    let position = conn
        .query_row(
            "SELECT position FROM todo_positions
             WHERE scope_kind = ?1 AND scope_user_id = ?2 AND todo_id = ?3",
            (scope.kind(), scope.user_id(), todo_id),
            |row| row.get(0),
        )
        .optional()?;
    Ok(position)
}

/// Ids in `scope`, in position order.
pub fn members(conn: &Connection, scope: &Scope) -> Result<Vec<String>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT todo_id FROM todo_positions
         WHERE scope_kind = ?1 AND scope_user_id = ?2
         ORDER BY position ASC",
    )?;
    let ids = stmt
        .query_map((scope.kind(), scope.user_id()), |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

/// Places `todo_id` at the end of `scope`. Appending an id that is already
/// present leaves it where it is.
pub fn append(conn: &Connection, scope: &Scope, todo_id: &str) -> Result<i64, AppError> {
    if let Some(existing) = position(conn, scope, todo_id)? {
        return Ok(existing);
    }

    let next = count(conn, scope)?;
    conn.execute(
        "INSERT INTO todo_positions (scope_kind, scope_user_id, todo_id, position)
         VALUES (?1, ?2, ?3, ?4)",
        (scope.kind(), scope.user_id(), todo_id, next),
    )?;
    Ok(next)
}

/// Removes `todo_id` from `scope` and closes the gap it leaves.
pub fn remove(conn: &Connection, scope: &Scope, todo_id: &str) -> Result<bool, AppError> {
    let Some(removed) = position(conn, scope, todo_id)? else {
        return Ok(false);
    };

    conn.execute(
        "DELETE FROM todo_positions
         WHERE scope_kind = ?1 AND scope_user_id = ?2 AND todo_id = ?3",
        (scope.kind(), scope.user_id(), todo_id),
    )?;
    conn.execute(
        "UPDATE todo_positions SET position = position - 1
         WHERE scope_kind = ?1 AND scope_user_id = ?2 AND position > ?3",
        (scope.kind(), scope.user_id(), removed),
    )?;
    Ok(true)
}

/// Removes `todo_id` from every scope that lists it. Returns the scopes touched.
pub fn remove_everywhere(conn: &Connection, todo_id: &str) -> Result<Vec<Scope>, AppError> {
    let mut stmt =
        conn.prepare("SELECT scope_kind, scope_user_id FROM todo_positions WHERE todo_id = ?1")?;
    let parts = stmt
        .query_map([todo_id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut scopes = Vec::with_capacity(parts.len());
    for (kind, user_id) in parts {
        let scope = Scope::from_parts(&kind, user_id)
            .ok_or_else(|| AppError::Database(format!("unknown scope kind {kind:?}")))?;
        remove(conn, &scope, todo_id)?;
        scopes.push(scope);
    }
    Ok(scopes)
}

/// Rewrites the order of `scope`. `ids` must be exactly the current members;
/// otherwise nothing is written.
pub fn reorder(conn: &Connection, scope: &Scope, ids: &[String]) -> Result<(), AppError> {
    let current = members(conn, scope)?;
    let requested: HashSet<&str> = ids.iter().map(String::as_str).collect();

    if requested.len() != ids.len() {
        return Err(AppError::Validation(
            "reorder ids must not contain duplicates".to_string(),
        ));
    }
    if ids.len() != current.len() || current.iter().any(|id| !requested.contains(id.as_str())) {
        return Err(AppError::Validation(
            "reorder ids must match the current list exactly".to_string(),
        ));
    }

    let mut stmt = conn.prepare(
        "UPDATE todo_positions SET position = ?1
         WHERE scope_kind = ?2 AND scope_user_id = ?3 AND todo_id = ?4",
    )?;
    for (position, id) in ids.iter().enumerate() {
        stmt.execute((position as i64, scope.kind(), scope.user_id(), id))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(ids: &[&str]) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        for id in ids {
            conn.execute(
                "INSERT INTO todos (id, text, created_at, is_default_task) VALUES (?1, ?1, 0, 1)",
                [id],
            )
            .unwrap();
        }
        conn
    }

    fn positions(conn: &Connection, scope: &Scope) -> Vec<(String, i64)> {
        members(conn, scope)
            .unwrap()
            .into_iter()
            .map(|id| {
                let pos = position(conn, scope, &id).unwrap().unwrap();
                (id, pos)
            })
            .collect()
    }

    fn assert_dense(conn: &Connection, scope: &Scope) {
        let found: Vec<i64> = positions(conn, scope).into_iter().map(|(_, p)| p).collect();
        let expected: Vec<i64> = (0..found.len() as i64).collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn append_assigns_count_and_is_idempotent() {
        let conn = setup(&["a", "b"]);
        assert_eq!(append(&conn, &Scope::Catalog, "a").unwrap(), 0);
        assert_eq!(append(&conn, &Scope::Catalog, "b").unwrap(), 1);
        assert_eq!(append(&conn, &Scope::Catalog, "a").unwrap(), 0);
        assert_eq!(count(&conn, &Scope::Catalog).unwrap(), 2);
    }

    #[test]
    fn remove_densifies() {
        let conn = setup(&["a", "b", "c", "d"]);
        let scope = Scope::Owner("u".to_string());
        for id in ["a", "b", "c", "d"] {
            append(&conn, &scope, id).unwrap();
        }

        assert!(remove(&conn, &scope, "b").unwrap());
        assert!(!remove(&conn, &scope, "b").unwrap());
        assert_eq!(members(&conn, &scope).unwrap(), vec!["a", "c", "d"]);
        assert_dense(&conn, &scope);

        assert!(remove(&conn, &scope, "d").unwrap());
        assert!(remove(&conn, &scope, "a").unwrap());
        assert_eq!(positions(&conn, &scope), vec![("c".to_string(), 0)]);
    }

    #[test]
    fn scopes_are_independent() {
        let conn = setup(&["a", "b"]);
        let mine = Scope::Owner("u".to_string());
        let theirs = Scope::AdminView("u".to_string());
        for scope in [&mine, &theirs] {
            append(&conn, scope, "a").unwrap();
            append(&conn, scope, "b").unwrap();
        }

        reorder(&conn, &mine, &["b".to_string(), "a".to_string()]).unwrap();
        assert_eq!(members(&conn, &mine).unwrap(), vec!["b", "a"]);
        assert_eq!(members(&conn, &theirs).unwrap(), vec!["a", "b"]);

        remove(&conn, &theirs, "a").unwrap();
        assert_eq!(members(&conn, &mine).unwrap(), vec!["b", "a"]);
        assert_dense(&conn, &mine);
        assert_dense(&conn, &theirs);
    }

    #[test]
    fn reorder_rejects_anything_but_a_permutation() {
        let conn = setup(&["a", "b", "c"]);
        let scope = Scope::Owner("u".to_string());
        for id in ["a", "b", "c"] {
            append(&conn, &scope, id).unwrap();
        }
        let ids = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        for bad in [
            ids(&["a", "b"]),
            ids(&["a", "b", "c", "d"]),
            ids(&["a", "b", "b"]),
            ids(&["a", "b", "x"]),
            ids(&[]),
        ] {
            let err = reorder(&conn, &scope, &bad).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{bad:?}");
            assert_eq!(members(&conn, &scope).unwrap(), vec!["a", "b", "c"]);
        }

        reorder(&conn, &scope, &ids(&["c", "a", "b"])).unwrap();
        assert_eq!(members(&conn, &scope).unwrap(), vec!["c", "a", "b"]);
        assert_dense(&conn, &scope);
    }

    #[test]
    fn reorder_of_an_empty_scope_accepts_an_empty_list() {
        let conn = setup(&[]);
        reorder(&conn, &Scope::Catalog, &[]).unwrap();
    }

    #[test]
    fn remove_everywhere_touches_each_scope() {
        let conn = setup(&["a", "b"]);
        let scopes = [
            Scope::Catalog,
            Scope::Owner("u".to_string()),
            Scope::AdminView("u".to_string()),
        ];
        for scope in &scopes {
            append(&conn, scope, "a").unwrap();
            append(&conn, scope, "b").unwrap();
        }

        let touched = remove_everywhere(&conn, "a").unwrap();
        assert_eq!(touched.len(), 3);
        for scope in &scopes {
            assert_eq!(positions(&conn, scope), vec![("b".to_string(), 0)]);
        }
    }
}
