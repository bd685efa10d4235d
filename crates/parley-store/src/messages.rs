use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Message, MessageId, UserId};

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, text, image, created_at";

impl Database {
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages (id, sender_id, receiver_id, text, image, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id.to_string(),
                message.sender_id.to_string(),
                message.receiver_id.to_string(),
                message.text,
                message.image,
                message.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Both directions of the `a`/`b` conversation, oldest insert first.
    ///
    /// Unpaginated: a long conversation is returned in full.
    pub fn get_conversation(&self, a: UserId, b: UserId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)
             ORDER BY rowid ASC"
        ))?;

        let rows = stmt.query_map(params![a.to_string(), b.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn get_message_by_id(&self, id: MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn delete_message(&self, id: MessageId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM messages WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Delete every message sent by `sender` to `receiver`. The reverse
    /// direction is untouched. Returns the number of rows removed.
    pub fn delete_messages_from(&self, sender: UserId, receiver: UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM messages WHERE sender_id = ?1 AND receiver_id = ?2",
            params![sender.to_string(), receiver.to_string()],
        )?;
        Ok(affected)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let sender_str: String = row.get(1)?;
    let receiver_str: String = row.get(2)?;
    let ts_str: String = row.get(5)?;

    let parse_uuid = |idx: usize, value: &str| {
        Uuid::parse_str(value).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    };

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Message {
        id: MessageId(parse_uuid(0, &id_str)?),
        sender_id: UserId(parse_uuid(1, &sender_str)?),
        receiver_id: UserId(parse_uuid(2, &receiver_str)?),
        text: row.get(3)?,
        image: row.get(4)?,
        created_at,
    })
}
