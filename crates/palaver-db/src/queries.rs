use std::collections::HashSet;

use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::models::{ChatRow, MessageRow, UserRow};
use crate::{Store, StoreError};

/// Every registered user is made a member of this chat. It is looked up by
/// name and created lazily on first registration.
pub const DEFAULT_CHAT_NAME: &str = "Group Chat";

impl Store {
    // -- Users --

    /// Insert a new user and ensure membership in the default chat.
    /// Fails with `Conflict` if the keyword is already taken.
    pub fn register(
        &self,
        keyword: &str,
        nickname: &str,
        password: &str,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;

            let taken: Option<String> = tx
                .query_row(
                    "SELECT keyword FROM users WHERE keyword = ?1",
                    [keyword],
                    |row| row.get(0),
                )
                .optional()?;
            if taken.is_some() {
                return Err(StoreError::Conflict);
            }

            tx.execute(
                "INSERT INTO users (keyword, nickname, password) VALUES (?1, ?2, ?3)",
                (keyword, nickname, password),
            )?;

            // The lookup-or-create runs under the connection lock and inside
            // this transaction, so concurrent first registrations cannot
            // produce duplicate default chats.
            let default_id = ensure_default_chat(&tx)?;
            tx.execute(
                "INSERT OR IGNORE INTO chat_members (chat_id, keyword) VALUES (?1, ?2)",
                (default_id.as_str(), keyword),
            )?;

            tx.commit()?;
            Ok(())
        })
    }

    /// Verbatim credential check. `Unauthorized` for an unknown keyword and
    /// for a password mismatch alike.
    pub fn authenticate(&self, keyword: &str, password: &str) -> Result<UserRow, StoreError> {
        self.with_conn(|conn| {
            let user = query_user(conn, keyword)?.ok_or(StoreError::Unauthorized)?;
            if user.password != password {
                return Err(StoreError::Unauthorized);
            }
            Ok(user)
        })
    }

    // -- Chats --

    /// Create a chat and all its memberships in one transaction. If any
    /// listed keyword is unknown, nothing is written and the offending
    /// keywords are reported.
    pub fn create_chat(&self, name: &str, members: &[String]) -> Result<String, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;

            let unknown = unknown_keywords(&tx, members)?;
            if !unknown.is_empty() {
                return Err(StoreError::InvalidMember(unknown));
            }

            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO chats (id, name) VALUES (?1, ?2)",
                (id.as_str(), name),
            )?;
            for member in members {
                tx.execute(
                    "INSERT OR IGNORE INTO chat_members (chat_id, keyword) VALUES (?1, ?2)",
                    (id.as_str(), member.as_str()),
                )?;
            }

            tx.commit()?;
            Ok(id)
        })
    }

    /// Idempotent: adding an already-present member is a no-op. Unknown
    /// keywords reject the whole call with nothing written.
    pub fn add_members(&self, chat_id: &str, members: &[String]) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;

            let unknown = unknown_keywords(&tx, members)?;
            if !unknown.is_empty() {
                return Err(StoreError::InvalidMember(unknown));
            }

            for member in members {
                tx.execute(
                    "INSERT OR IGNORE INTO chat_members (chat_id, keyword) VALUES (?1, ?2)",
                    (chat_id, member.as_str()),
                )?;
            }

            tx.commit()?;
            Ok(())
        })
    }

    pub fn remove_member(&self, chat_id: &str, keyword: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM chat_members WHERE chat_id = ?1 AND keyword = ?2",
                (chat_id, keyword),
            )?;
            Ok(())
        })
    }

    /// Delete a chat and cascade to its memberships and messages.
    pub fn delete_chat(&self, chat_id: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM chats WHERE id = ?1", [chat_id])?;
            tx.execute("DELETE FROM chat_members WHERE chat_id = ?1", [chat_id])?;
            tx.execute("DELETE FROM messages WHERE chat_id = ?1", [chat_id])?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn members_of(&self, chat_id: &str) -> Result<HashSet<String>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT keyword FROM chat_members WHERE chat_id = ?1")?;
            let rows = stmt
                .query_map([chat_id], |row| row.get(0))?
                .collect::<Result<HashSet<String>, _>>()?;
            Ok(rows)
        })
    }

    /// Chats the user belongs to, in chat creation order.
    pub fn chats_of(&self, keyword: &str) -> Result<Vec<ChatRow>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.name
                 FROM chats c
                 JOIN chat_members cm ON c.id = cm.chat_id
                 WHERE cm.keyword = ?1
                 ORDER BY c.rowid",
            )?;
            let rows = stmt
                .query_map([keyword], |row| {
                    Ok(ChatRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Append a message; the id is assigned by the store and is monotonically
    /// increasing, which fixes the in-chat ordering.
    pub fn append_message(
        &self,
        chat_id: &str,
        sender: &str,
        content: &str,
    ) -> Result<i64, StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (chat_id, sender, content) VALUES (?1, ?2, ?3)",
                (chat_id, sender, content),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn messages_of(&self, chat_id: &str) -> Result<Vec<MessageRow>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT sender, content FROM messages WHERE chat_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map([chat_id], |row| {
                    Ok(MessageRow {
                        sender: row.get(0)?,
                        content: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, keyword: &str) -> Result<Option<UserRow>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT keyword, nickname, password FROM users WHERE keyword = ?1")?;

    let row = stmt
        .query_row([keyword], |row| {
            Ok(UserRow {
                keyword: row.get(0)?,
                nickname: row.get(1)?,
                password: row.get(2)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn ensure_default_chat(conn: &Connection) -> Result<String, StoreError> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM chats WHERE name = ?1 LIMIT 1",
            [DEFAULT_CHAT_NAME],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO chats (id, name) VALUES (?1, ?2)",
        (id.as_str(), DEFAULT_CHAT_NAME),
    )?;
    Ok(id)
}

fn unknown_keywords(conn: &Connection, keywords: &[String]) -> Result<Vec<String>, StoreError> {
    let mut unknown = Vec::new();
    for keyword in keywords {
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM users WHERE keyword = ?1",
                [keyword.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            unknown.push(keyword.clone());
        }
    }
    Ok(unknown)
}
