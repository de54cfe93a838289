//! CRUD operations for [`Channel`] records.

use rusqlite::params;

use agora_shared::{Channel, ChannelId, CommunityId, NewChannel, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::rows::{fmt_ts, get_id, get_ts, now};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new channel created by `owner`.
    pub fn create_channel(&self, owner: UserId, channel: &NewChannel) -> Result<Channel> {
        let created = Channel {
            id: ChannelId::new(),
            name: channel.name.clone(),
            description: channel.description.clone(),
            community_id: channel.community_id,
            created_by: owner,
            created_at: now(),
        };

        self.conn().execute(
            "INSERT INTO channels (id, name, description, community_id, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                created.id.to_string(),
                created.name,
                created.description,
                created.community_id.to_string(),
                created.created_by.to_string(),
                fmt_ts(&created.created_at),
            ],
        )?;
        Ok(created)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single channel by id.
    pub fn get_channel(&self, id: ChannelId) -> Result<Channel> {
        self.conn()
            .query_row(
                "SELECT id, name, description, community_id, created_by, created_at
                 FROM channels
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_channel,
            )
            .map_err(|e| StoreError::or_not_found(e, "channel"))
    }

    /// List channels belonging to a community, oldest first.
    pub fn list_channels(&self, community: CommunityId) -> Result<Vec<Channel>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, description, community_id, created_by, created_at
             FROM channels
             WHERE community_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;

        let rows = stmt.query_map(params![community.to_string()], row_to_channel)?;

        let mut channels = Vec::new();
        for row in rows {
            channels.push(row?);
        }
        Ok(channels)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_to_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: get_id(row, 0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        community_id: get_id(row, 3)?,
        created_by: get_id(row, 4)?,
        created_at: get_ts(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_shared::NewCommunity;

    #[test]
    fn channels_are_scoped_to_their_community() {
        let db = Database::open_in_memory().unwrap();
        let owner = UserId::new();
        let new_community = NewCommunity {
            name: "Rust".into(),
            description: "Crabs".into(),
            image_url: None,
        };
        let a = db.create_community(owner, &new_community).unwrap();
        let b = db.create_community(owner, &new_community).unwrap();

        let general = db
            .create_channel(
                owner,
                &NewChannel {
                    name: "general".into(),
                    description: None,
                    community_id: a.id,
                },
            )
            .unwrap();
        db.create_channel(
            owner,
            &NewChannel {
                name: "other".into(),
                description: None,
                community_id: b.id,
            },
        )
        .unwrap();

        assert_eq!(db.list_channels(a.id).unwrap(), vec![general.clone()]);
        assert_eq!(db.get_channel(general.id).unwrap(), general);
    }

    #[test]
    fn channel_needs_existing_community() {
        let db = Database::open_in_memory().unwrap();
        let result = db.create_channel(
            UserId::new(),
            &NewChannel {
                name: "orphan".into(),
                description: None,
                community_id: CommunityId::new(),
            },
        );
        assert!(result.is_err());
    }
}
