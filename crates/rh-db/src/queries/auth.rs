//! Authentication token operations.
//!
//! Tokens are issued elsewhere; the server only needs to resolve a bearer
//! value to its user and device.

use rh_core::{DeviceId, Error, Result, SessionId, UserId};
use rusqlite::Connection;

use crate::models::AuthToken;

const COLS: &str = "id, user_id, device_id, token, expires_at";

/// Create a new auth token.
pub fn create_token(
    conn: &Connection,
    user_id: UserId,
    device_id: Option<DeviceId>,
    token: &str,
    expires_at: &str,
) -> Result<AuthToken> {
    let id = SessionId::new();

    conn.execute(
        "INSERT INTO auth_tokens (id, user_id, device_id, token, expires_at) VALUES (?1,?2,?3,?4,?5)",
        rusqlite::params![
            id.to_string(),
            user_id.to_string(),
            device_id.map(|d| d.to_string()),
            token,
            expires_at
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(AuthToken {
        id,
        user_id,
        device_id,
        token: token.to_string(),
        expires_at: expires_at.to_string(),
    })
}

/// Look up a token by its value.
pub fn get_token(conn: &Connection, token: &str) -> Result<Option<AuthToken>> {
    let q = format!("SELECT {COLS} FROM auth_tokens WHERE token = ?1");
    let result = conn.query_row(&q, [token], AuthToken::from_row);
    match result {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Delete a specific token by value.
pub fn delete_token(conn: &Connection, token: &str) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM auth_tokens WHERE token = ?1", [token])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}
