//! v001 -- Initial schema creation.
//!
//! Creates the two collections: `users` and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (written by the account service, read by chat)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    email         TEXT NOT NULL UNIQUE,
    full_name     TEXT NOT NULL,
    profile_pic   TEXT,                        -- blob reference or URL
    password_hash TEXT NOT NULL,               -- never leaves the server
    created_at    TEXT NOT NULL                -- RFC-3339
);

-- ----------------------------------------------------------------
-- Direct messages
--
-- Reads order by rowid, i.e. insertion order.
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id          TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    sender_id   TEXT NOT NULL,                 -- FK -> users(id)
    receiver_id TEXT NOT NULL,                 -- FK -> users(id)
    text        TEXT,                          -- client-encrypted, base64
    image       TEXT,                          -- blob reference
    created_at  TEXT NOT NULL,

    FOREIGN KEY (sender_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (receiver_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_pair
    ON messages(sender_id, receiver_id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
