//! User device operations.

use chrono::Utc;
use rh_core::{DeviceId, Error, Result, UserId};
use rusqlite::Connection;

use crate::models::Device;

const COLS: &str = "id, user_id, name, created_at";

/// Register a device for a user.
pub fn create_device(conn: &Connection, user_id: UserId, name: &str) -> Result<Device> {
    let id = DeviceId::new();
    let created_at = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO user_devices (id, user_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![id.to_string(), user_id.to_string(), name, created_at],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(Device {
        id,
        user_id,
        name: name.to_string(),
        created_at,
    })
}

/// Get a device by ID.
pub fn get_device(conn: &Connection, id: DeviceId) -> Result<Option<Device>> {
    let q = format!("SELECT {COLS} FROM user_devices WHERE id = ?1");
    match conn.query_row(&q, [id.to_string()], Device::from_row) {
        Ok(d) => Ok(Some(d)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}
