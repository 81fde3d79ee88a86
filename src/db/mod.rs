//! SQLite store for users, auth tokens, conversations and messages.
//!
//! One connection behind a mutex. Message timestamps and conversation
//! `updated_at` values are assigned while holding it, which is what makes
//! them strictly increasing per conversation.

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use std::path::Path;

use crate::models::{Conversation, Message, NewUser, Role, User};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();
        // journal_mode returns a row, so it cannot go through execute_batch
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password_hash TEXT NOT NULL,
                first_name TEXT NOT NULL DEFAULT '',
                last_name TEXT NOT NULL DEFAULT '',
                date_joined TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS auth_tokens (
                key TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id INTEGER NOT NULL,
                content TEXT NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
                timestamp TEXT NOT NULL,
                FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_conversations_user
                ON conversations(user_id, updated_at);
            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id, timestamp);
            ",
        )?;
        Ok(())
    }

    // ── Users ──

    pub fn create_user(&self, user: &NewUser) -> Result<User> {
        let conn = self.conn.lock();
        let now = now();
        conn.execute(
            "INSERT INTO users (username, email, password_hash, first_name, last_name, date_joined)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.username,
                user.email,
                user.password_hash,
                user.first_name,
                user.last_name,
                format_ts(now)
            ],
        )?;
        Ok(User {
            id: conn.last_insert_rowid(),
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            date_joined: now,
        })
    }

    pub fn username_taken(&self, username: &str) -> Result<bool> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
            params![username],
            |row| row.get(0),
        )
    }

    pub fn email_taken(&self, email: &str) -> Result<bool> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
            params![email],
            |row| row.get(0),
        )
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("{USER_COLUMNS} WHERE username = ?1"),
            params![username],
            user_from_row,
        )
        .optional()
    }

    pub fn find_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("{USER_COLUMNS} WHERE id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()
    }

    // ── Tokens ──

    /// The user's token, creating one if they have none.
    pub fn get_or_create_token(&self, user_id: i64) -> Result<String> {
        let conn = self.conn.lock();
        let existing: Option<String> = conn
            .query_row(
                "SELECT key FROM auth_tokens WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(key) = existing {
            return Ok(key);
        }

        let key = crate::auth::generate_token_key();
        conn.execute(
            "INSERT INTO auth_tokens (key, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![key, user_id, format_ts(now())],
        )?;
        Ok(key)
    }

    pub fn user_for_token(&self, key: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT u.id, u.username, u.email, u.password_hash, u.first_name, u.last_name, u.date_joined
             FROM auth_tokens t JOIN users u ON u.id = t.user_id
             WHERE t.key = ?1",
            params![key],
            user_from_row,
        )
        .optional()
    }

    /// Revoke a token. Returns whether it existed.
    pub fn delete_token(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let n = conn.execute("DELETE FROM auth_tokens WHERE key = ?1", params![key])?;
        Ok(n > 0)
    }

    // ── Conversations ──

    pub fn create_conversation(&self, user_id: i64) -> Result<Conversation> {
        let conn = self.conn.lock();
        let now = now();
        let ts = format_ts(now);
        conn.execute(
            "INSERT INTO conversations (user_id, created_at, updated_at) VALUES (?1, ?2, ?2)",
            params![user_id, ts],
        )?;
        Ok(Conversation {
            id: conn.last_insert_rowid(),
            user_id,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        })
    }

    /// A conversation with its messages, only if `user_id` owns it.
    pub fn find_conversation(&self, id: i64, user_id: i64) -> Result<Option<Conversation>> {
        let conn = self.conn.lock();
        let conv = conn
            .query_row(
                "SELECT id, user_id, created_at, updated_at FROM conversations
                 WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                conversation_from_row,
            )
            .optional()?;

        match conv {
            Some(mut conv) => {
                conv.messages = load_messages(&conn, conv.id)?;
                Ok(Some(conv))
            }
            None => Ok(None),
        }
    }

    /// The user's conversations, most recently updated first.
    pub fn list_conversations(&self, user_id: i64) -> Result<Vec<Conversation>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, created_at, updated_at FROM conversations
             WHERE user_id = ?1 ORDER BY updated_at DESC, id DESC",
        )?;
        let mut convs = stmt
            .query_map(params![user_id], conversation_from_row)?
            .collect::<Result<Vec<_>>>()?;

        for conv in convs.iter_mut() {
            conv.messages = load_messages(&conn, conv.id)?;
        }
        Ok(convs)
    }

    /// Bump `updated_at` to now, or just past its previous value if the
    /// clock has not moved.
    pub fn touch_conversation(&self, id: i64) -> Result<DateTime<Utc>> {
        let conn = self.conn.lock();
        let prev_str: String = conn.query_row(
            "SELECT updated_at FROM conversations WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        let prev = parse_ts(&prev_str, 0)?;
        let next = now().max(prev + Duration::microseconds(1));
        conn.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![format_ts(next), id],
        )?;
        Ok(next)
    }

    /// Delete a conversation and its messages if `user_id` owns it.
    pub fn delete_conversation(&self, id: i64, user_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "DELETE FROM conversations WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(n > 0)
    }

    // ── Messages ──

    /// Append a message. Its timestamp is strictly later than every other
    /// message in the conversation. Does not change `updated_at`.
    pub fn append_message(&self, conversation_id: i64, role: Role, content: &str) -> Result<Message> {
        let conn = self.conn.lock();
        let last: Option<String> = conn.query_row(
            "SELECT MAX(timestamp) FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )?;

        let mut timestamp = now();
        if let Some(last) = last {
            timestamp = timestamp.max(parse_ts(&last, 0)? + Duration::microseconds(1));
        }

        conn.execute(
            "INSERT INTO messages (conversation_id, content, role, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![conversation_id, content, role.as_str(), format_ts(timestamp)],
        )?;

        Ok(Message {
            id: conn.last_insert_rowid(),
            conversation_id,
            content: content.to_string(),
            role,
            timestamp,
        })
    }

    pub fn messages(&self, conversation_id: i64) -> Result<Vec<Message>> {
        let conn = self.conn.lock();
        load_messages(&conn, conversation_id)
    }

    pub fn delete_message(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let n = conn.execute("DELETE FROM messages WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }
}

const USER_COLUMNS: &str =
    "SELECT id, username, email, password_hash, first_name, last_name, date_joined FROM users";

fn load_messages(conn: &Connection, conversation_id: i64) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, content, role, timestamp FROM messages
         WHERE conversation_id = ?1 ORDER BY timestamp ASC, id ASC",
    )?;
    let rows = stmt.query_map(params![conversation_id], |row| {
        let role: String = row.get(3)?;
        let role = role.parse::<Role>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into())
        })?;
        Ok(Message {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            content: row.get(2)?,
            role,
            timestamp: get_ts(row, 4)?,
        })
    })?;
    rows.collect()
}

fn user_from_row(row: &Row) -> Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        date_joined: get_ts(row, 6)?,
    })
}

fn conversation_from_row(row: &Row) -> Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        created_at: get_ts(row, 2)?,
        updated_at: get_ts(row, 3)?,
        messages: Vec::new(),
    })
}

/// Current time at the precision that is stored.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339, so text order is time order.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str, idx: usize) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn get_ts(row: &Row, idx: usize) -> Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_ts(&s, idx)
}
