use chrono::{DateTime, Utc};
use rusqlite::{params, ErrorCode};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{NewUser, User, UserId};

const USER_COLUMNS: &str = "id, email, full_name, profile_pic, password_hash, created_at";

impl Database {
    pub fn insert_user(&self, new_user: &NewUser) -> Result<User> {
        let user = User {
            id: UserId::new(),
            email: new_user.email.trim().to_lowercase(),
            full_name: new_user.full_name.clone(),
            profile_pic: new_user.profile_pic.clone(),
            password_hash: new_user.password_hash.clone(),
            created_at: Utc::now(),
        };

        self.conn()
            .execute(
                "INSERT INTO users (id, email, full_name, profile_pic, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    user.id.to_string(),
                    user.email,
                    user.full_name,
                    user.profile_pic,
                    user.password_hash,
                    user.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    StoreError::Duplicate(format!("email {}", user.email))
                }
                other => StoreError::Sqlite(other),
            })?;

        tracing::debug!(user = %user.id, "inserted user");
        Ok(user)
    }

    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn user_exists(&self, id: UserId) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM users WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Every user except `exclude`, in registration order.
    pub fn list_users_except(&self, exclude: UserId) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id != ?1 ORDER BY rowid ASC"
        ))?;

        let rows = stmt.query_map(params![exclude.to_string()], row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let ts_str: String = row.get(5)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(User {
        id: UserId(id),
        email: row.get(1)?,
        full_name: row.get(2)?,
        profile_pic: row.get(3)?,
        password_hash: row.get(4)?,
        created_at,
    })
}
