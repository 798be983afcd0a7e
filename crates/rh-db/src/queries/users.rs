//! User operations.

use chrono::Utc;
use rh_core::{Error, Result, UserId};
use rusqlite::Connection;

use crate::models::User;

const COLS: &str = "id, username, password_hash, is_admin, created_at";

/// Create a new user and return it.
pub fn create_user(
    conn: &Connection,
    username: &str,
    password_hash: &str,
    is_admin: bool,
) -> Result<User> {
    let id = UserId::new();
    let created_at = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO users (id, username, password_hash, is_admin, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![id.to_string(), username, password_hash, is_admin as i32, created_at],
    )
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint failed") {
            Error::Conflict(format!("Username '{username}' already exists"))
        } else {
            Error::database(e.to_string())
        }
    })?;

    Ok(User {
        id,
        username: username.to_string(),
        password_hash: password_hash.to_string(),
        is_admin,
        created_at,
    })
}

/// Get a user by primary key.
pub fn get_user_by_id(conn: &Connection, id: UserId) -> Result<Option<User>> {
    let q = format!("SELECT {COLS} FROM users WHERE id = ?1");
    let result = conn.query_row(&q, [id.to_string()], User::from_row);
    match result {
        Ok(u) => Ok(Some(u)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Delete a user; devices, tokens, and progress rows cascade.
pub fn delete_user(conn: &Connection, id: UserId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM users WHERE id = ?1", [id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;

    #[test]
    fn create_and_get() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        let user = create_user(&conn, "alice", "hash", true).unwrap();
        let found = get_user_by_id(&conn, user.id).unwrap().unwrap();
        assert_eq!(found.username, "alice");
        assert!(found.is_admin);
    }

    #[test]
    fn duplicate_username_conflicts() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        create_user(&conn, "bob", "hash", false).unwrap();
        let err = create_user(&conn, "bob", "other", false).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn delete_missing_returns_false() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        assert!(!delete_user(&conn, UserId::new()).unwrap());
    }
}
