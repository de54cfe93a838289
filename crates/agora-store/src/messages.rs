//! Channel messages and reactions.

use std::collections::HashMap;

use rusqlite::params;

use agora_shared::{ChannelId, Message, MessageId, Reaction, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::rows::{fmt_ts, get_author, get_id, get_opt_id, get_opt_ts, get_ts, now};

const MESSAGE_SELECT: &str = "SELECT m.id, m.content, m.channel_id, m.user_id, m.created_at, m.updated_at,
            p.id, p.username, p.avatar_url
     FROM messages m
     LEFT JOIN profiles p ON p.id = m.user_id";

impl Database {
    /// Insert a message and return it with its author summary attached.
    pub fn insert_message(&self, channel: ChannelId, author: UserId, content: &str) -> Result<Message> {
        let id = MessageId::new();
        self.conn().execute(
            "INSERT INTO messages (id, content, channel_id, user_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.to_string(),
                content,
                channel.to_string(),
                author.to_string(),
                fmt_ts(&now()),
            ],
        )?;
        self.get_message(id)
    }

    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        let mut message = self
            .conn()
            .query_row(
                &format!("{MESSAGE_SELECT} WHERE m.id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| StoreError::or_not_found(e, "message"))?;
        message.reactions = self.reactions_for_message(id)?;
        Ok(message)
    }

    /// Messages of a channel in ascending creation order, with authors and
    /// reactions attached.
    pub fn list_messages(&self, channel: ChannelId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "{MESSAGE_SELECT}
             WHERE m.channel_id = ?1
             ORDER BY m.created_at ASC, m.rowid ASC"
        ))?;
        let rows = stmt.query_map(params![channel.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }

        let mut reactions = self.reactions_for_channel(channel)?;
        for message in &mut messages {
            message.reactions = reactions.remove(&message.id).unwrap_or_default();
        }
        Ok(messages)
    }

    fn reactions_for_message(&self, message: MessageId) -> Result<Vec<Reaction>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, emoji, message_id, direct_message_id, user_id, created_at
             FROM reactions WHERE message_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![message.to_string()], row_to_reaction)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// All reactions on a channel's messages, grouped by message.
    fn reactions_for_channel(&self, channel: ChannelId) -> Result<HashMap<MessageId, Vec<Reaction>>> {
        let mut stmt = self.conn().prepare(
            "SELECT r.id, r.emoji, r.message_id, r.direct_message_id, r.user_id, r.created_at
             FROM reactions r
             JOIN messages m ON m.id = r.message_id
             WHERE m.channel_id = ?1
             ORDER BY r.created_at ASC, r.rowid ASC",
        )?;
        let rows = stmt.query_map(params![channel.to_string()], row_to_reaction)?;

        let mut map: HashMap<MessageId, Vec<Reaction>> = HashMap::new();
        for row in rows {
            let reaction = row?;
            if let Some(message_id) = reaction.message_id {
                map.entry(message_id).or_default().push(reaction);
            }
        }
        Ok(map)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: get_id(row, 0)?,
        content: row.get(1)?,
        channel_id: get_id(row, 2)?,
        user_id: get_id(row, 3)?,
        created_at: get_ts(row, 4)?,
        updated_at: get_opt_ts(row, 5)?,
        author: get_author(row, 6)?,
        reactions: Vec::new(),
    })
}

pub(crate) fn row_to_reaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reaction> {
    Ok(Reaction {
        id: get_id(row, 0)?,
        emoji: row.get(1)?,
        message_id: get_opt_id(row, 2)?,
        direct_message_id: get_opt_id(row, 3)?,
        user_id: get_id(row, 4)?,
        created_at: get_ts(row, 5)?,
    })
}
