//! Conversations, their participants and direct messages.

use rusqlite::{params, OptionalExtension};

use agora_shared::{Conversation, ConversationId, DirectMessage, DirectMessageId, Profile, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::messages::row_to_reaction;
use crate::profiles::{row_to_profile, PROFILE_COLUMNS};
use crate::rows::{fmt_ts, get_author, get_id, get_opt_ts, get_ts, now};

const DIRECT_MESSAGE_SELECT: &str = "SELECT d.id, d.content, d.conversation_id, d.sender_id, d.created_at, d.updated_at,
            p.id, p.username, p.avatar_url
     FROM direct_messages d
     LEFT JOIN profiles p ON p.id = d.sender_id";

/// Order-independent key for a two-party conversation.
fn pair_key(a: UserId, b: UserId) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}:{hi}")
}

impl Database {
    // ------------------------------------------------------------------
    // Conversations
    // ------------------------------------------------------------------

    /// Create the conversation between `a` and `b` together with both
    /// participant rows, or return the existing one.
    ///
    /// The unique pair key turns a second, concurrent request for the same
    /// pair into a lookup instead of a duplicate conversation.
    pub fn create_direct_conversation(&self, a: UserId, b: UserId) -> Result<ConversationId> {
        let key = pair_key(a, b);
        let tx = self.conn().unchecked_transaction()?;

        tx.execute(
            "INSERT INTO conversations (id, created_at, pair_key)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (pair_key) DO NOTHING",
            params![ConversationId::new().to_string(), fmt_ts(&now()), key],
        )?;
        let id: ConversationId = tx.query_row(
            "SELECT id FROM conversations WHERE pair_key = ?1",
            params![key],
            |row| get_id(row, 0),
        )?;
        for user in [a, b] {
            tx.execute(
                "INSERT OR IGNORE INTO conversation_participants (conversation_id, user_id)
                 VALUES (?1, ?2)",
                params![id.to_string(), user.to_string()],
            )?;
        }

        tx.commit()?;
        Ok(id)
    }

    /// Fetch one conversation with participants and its latest message.
    pub fn get_conversation(&self, id: ConversationId) -> Result<Conversation> {
        let created_at = self
            .conn()
            .query_row(
                "SELECT created_at FROM conversations WHERE id = ?1",
                params![id.to_string()],
                |row| get_ts(row, 0),
            )
            .map_err(|e| StoreError::or_not_found(e, "conversation"))?;

        Ok(Conversation {
            id,
            created_at,
            participants: self.conversation_participants(id)?,
            last_message: self.last_direct_message(id)?,
        })
    }

    /// Conversations `user` takes part in, newest first.
    pub fn list_conversations(&self, user: UserId) -> Result<Vec<Conversation>> {
        let ids = self.conversation_ids(
            "SELECT c.id FROM conversations c
             JOIN conversation_participants cp ON cp.conversation_id = c.id
             WHERE cp.user_id = ?1
             ORDER BY c.created_at DESC, c.rowid DESC",
            params![user.to_string()],
        )?;
        ids.into_iter().map(|id| self.get_conversation(id)).collect()
    }

    /// Conversations that include both `a` and `b`, oldest first.
    pub fn find_conversations_between(&self, a: UserId, b: UserId) -> Result<Vec<Conversation>> {
        let ids = self.conversation_ids(
            "SELECT c.id FROM conversations c
             WHERE EXISTS (SELECT 1 FROM conversation_participants
                           WHERE conversation_id = c.id AND user_id = ?1)
               AND EXISTS (SELECT 1 FROM conversation_participants
                           WHERE conversation_id = c.id AND user_id = ?2)
             ORDER BY c.created_at ASC, c.rowid ASC",
            params![a.to_string(), b.to_string()],
        )?;
        ids.into_iter().map(|id| self.get_conversation(id)).collect()
    }

    pub fn conversation_participant_ids(&self, id: ConversationId) -> Result<Vec<UserId>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id FROM conversation_participants
             WHERE conversation_id = ?1
             ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map(params![id.to_string()], |row| get_id(row, 0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    fn conversation_participants(&self, id: ConversationId) -> Result<Vec<Profile>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {PROFILE_COLUMNS}
             FROM conversation_participants cp
             JOIN profiles p ON p.id = cp.user_id
             WHERE cp.conversation_id = ?1
             ORDER BY cp.rowid ASC"
        ))?;
        let rows = stmt.query_map(params![id.to_string()], |row| row_to_profile(row, 0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    fn conversation_ids(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<ConversationId>> {
        let mut stmt = self.conn().prepare(sql)?;
        let rows = stmt.query_map(params, |row| get_id(row, 0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    // ------------------------------------------------------------------
    // Direct messages
    // ------------------------------------------------------------------

    pub fn insert_direct_message(
        &self,
        conversation: ConversationId,
        sender: UserId,
        content: &str,
    ) -> Result<DirectMessage> {
        let id = DirectMessageId::new();
        self.conn().execute(
            "INSERT INTO direct_messages (id, content, conversation_id, sender_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.to_string(),
                content,
                conversation.to_string(),
                sender.to_string(),
                fmt_ts(&now()),
            ],
        )?;
        self.conn()
            .query_row(
                &format!("{DIRECT_MESSAGE_SELECT} WHERE d.id = ?1"),
                params![id.to_string()],
                row_to_direct_message,
            )
            .map_err(|e| StoreError::or_not_found(e, "direct message"))
    }

    /// Direct messages of a conversation in ascending creation order.
    pub fn list_direct_messages(&self, conversation: ConversationId) -> Result<Vec<DirectMessage>> {
        let mut stmt = self.conn().prepare(&format!(
            "{DIRECT_MESSAGE_SELECT}
             WHERE d.conversation_id = ?1
             ORDER BY d.created_at ASC, d.rowid ASC"
        ))?;
        let rows = stmt.query_map(params![conversation.to_string()], row_to_direct_message)?;

        let mut messages = Vec::new();
        for row in rows {
            let mut message = row?;
            message.reactions = self.reactions_for_direct_message(message.id)?;
            messages.push(message);
        }
        Ok(messages)
    }

    fn last_direct_message(&self, conversation: ConversationId) -> Result<Option<DirectMessage>> {
        let message = self
            .conn()
            .query_row(
                &format!(
                    "{DIRECT_MESSAGE_SELECT}
                     WHERE d.conversation_id = ?1
                     ORDER BY d.created_at DESC, d.rowid DESC
                     LIMIT 1"
                ),
                params![conversation.to_string()],
                row_to_direct_message,
            )
            .optional()?;
        Ok(message)
    }

    fn reactions_for_direct_message(&self, id: DirectMessageId) -> Result<Vec<agora_shared::Reaction>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, emoji, message_id, direct_message_id, user_id, created_at
             FROM reactions WHERE direct_message_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![id.to_string()], row_to_reaction)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

fn row_to_direct_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<DirectMessage> {
    Ok(DirectMessage {
        id: get_id(row, 0)?,
        content: row.get(1)?,
        conversation_id: get_id(row, 2)?,
        sender_id: get_id(row, 3)?,
        created_at: get_ts(row, 4)?,
        updated_at: get_opt_ts(row, 5)?,
        sender: get_author(row, 6)?,
        reactions: Vec::new(),
    })
}
