//! Communities, their memberships and the member counter.

use rusqlite::{params, OptionalExtension};

use agora_shared::constants::INITIAL_MEMBER_COUNT;
use agora_shared::{Community, CommunityId, MemberRole, Membership, NewCommunity, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::profiles::{row_to_profile, PROFILE_COLUMNS};
use crate::rows::{fmt_ts, get_id, get_tag, get_ts, now};

const COMMUNITY_COLUMNS: &str =
    "id, name, description, image_url, created_by, member_count, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Communities
    // ------------------------------------------------------------------

    /// Insert a community owned by `owner`. The creator counts as the
    /// first member.
    pub fn create_community(&self, owner: UserId, community: &NewCommunity) -> Result<Community> {
        let created = Community {
            id: CommunityId::new(),
            name: community.name.clone(),
            description: community.description.clone(),
            image_url: community.image_url.clone(),
            created_by: owner,
            member_count: INITIAL_MEMBER_COUNT,
            created_at: now(),
        };

        self.conn().execute(
            "INSERT INTO communities (id, name, description, image_url, created_by, member_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                created.id.to_string(),
                created.name,
                created.description,
                created.image_url,
                created.created_by.to_string(),
                created.member_count,
                fmt_ts(&created.created_at),
            ],
        )?;
        Ok(created)
    }

    pub fn get_community(&self, id: CommunityId) -> Result<Community> {
        self.conn()
            .query_row(
                &format!("SELECT {COMMUNITY_COLUMNS} FROM communities WHERE id = ?1"),
                params![id.to_string()],
                row_to_community,
            )
            .map_err(|e| StoreError::or_not_found(e, "community"))
    }

    /// List all communities, oldest first.
    pub fn list_communities(&self) -> Result<Vec<Community>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {COMMUNITY_COLUMNS} FROM communities ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map([], row_to_community)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Counter RPC: `member_count + 1`.
    pub fn increment_member_count(&self, id: CommunityId) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE communities SET member_count = member_count + 1 WHERE id = ?1",
            params![id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound("community"));
        }
        Ok(())
    }

    /// Counter RPC: `member_count - 1`, never below zero.
    pub fn decrement_member_count(&self, id: CommunityId) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE communities SET member_count = MAX(member_count - 1, 0) WHERE id = ?1",
            params![id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound("community"));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Memberships
    // ------------------------------------------------------------------

    pub fn find_membership(&self, community: CommunityId, user: UserId) -> Result<Option<Membership>> {
        let membership = self
            .conn()
            .query_row(
                "SELECT community_id, user_id, role, joined_at
                 FROM community_members
                 WHERE community_id = ?1 AND user_id = ?2",
                params![community.to_string(), user.to_string()],
                |row| row_to_membership(row, None),
            )
            .optional()?;
        Ok(membership)
    }

    /// Insert a membership unless one already exists for the pair.
    ///
    /// Returns `true` when a row was created. The `(community_id, user_id)`
    /// primary key makes concurrent identical joins collapse into one row.
    pub fn add_membership(&self, community: CommunityId, user: UserId, role: MemberRole) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT INTO community_members (community_id, user_id, role, joined_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (community_id, user_id) DO NOTHING",
            params![
                community.to_string(),
                user.to_string(),
                role.as_str(),
                fmt_ts(&now()),
            ],
        )?;
        Ok(affected > 0)
    }

    /// Returns `true` when a row was deleted.
    pub fn remove_membership(&self, community: CommunityId, user: UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM community_members WHERE community_id = ?1 AND user_id = ?2",
            params![community.to_string(), user.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Members of a community with their profiles, in join order.
    pub fn list_members(&self, community: CommunityId) -> Result<Vec<Membership>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT m.community_id, m.user_id, m.role, m.joined_at, {PROFILE_COLUMNS}
             FROM community_members m
             LEFT JOIN profiles p ON p.id = m.user_id
             WHERE m.community_id = ?1
             ORDER BY m.joined_at ASC, m.rowid ASC"
        ))?;
        let rows = stmt.query_map(params![community.to_string()], |row| {
            row_to_membership(row, Some(4))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

fn row_to_community(row: &rusqlite::Row<'_>) -> rusqlite::Result<Community> {
    Ok(Community {
        id: get_id(row, 0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        image_url: row.get(3)?,
        created_by: get_id(row, 4)?,
        member_count: row.get(5)?,
        created_at: get_ts(row, 6)?,
    })
}

/// `profile_at` is the column index of a joined profile, if the query
/// selected one.
fn row_to_membership(row: &rusqlite::Row<'_>, profile_at: Option<usize>) -> rusqlite::Result<Membership> {
    let user = match profile_at {
        Some(base) => {
            let joined: Option<String> = row.get(base)?;
            joined.map(|_| row_to_profile(row, base)).transpose()?
        }
        None => None,
    };

    Ok(Membership {
        community_id: get_id(row, 0)?,
        user_id: get_id(row, 1)?,
        role: get_tag(row, 2)?,
        joined_at: get_ts(row, 3)?,
        user,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_shared::NewProfile;

    fn setup() -> (Database, UserId, Community) {
        let db = Database::open_in_memory().unwrap();
        let owner = UserId::new();
        db.insert_profile(&NewProfile {
            id: owner,
            email: "owner@example.com".into(),
            username: "owner".into(),
            full_name: None,
        })
        .unwrap();
        let community = db
            .create_community(
                owner,
                &NewCommunity {
                    name: "Tech Talk".into(),
                    description: "Discuss tech".into(),
                    image_url: None,
                },
            )
            .unwrap();
        (db, owner, community)
    }

    #[test]
    fn create_starts_with_one_member() {
        let (db, _, community) = setup();
        let stored = db.get_community(community.id).unwrap();
        assert_eq!(stored.member_count, 1);
        assert_eq!(stored, community);
    }

    #[test]
    fn duplicate_membership_is_ignored() {
        let (db, owner, community) = setup();
        assert!(db.add_membership(community.id, owner, MemberRole::Admin).unwrap());
        assert!(!db.add_membership(community.id, owner, MemberRole::Member).unwrap());

        let members = db.list_members(community.id).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].role, MemberRole::Admin);
        assert_eq!(members[0].user.as_ref().unwrap().username, "owner");
    }

    #[test]
    fn counter_never_goes_negative() {
        let (db, _, community) = setup();
        db.decrement_member_count(community.id).unwrap();
        db.decrement_member_count(community.id).unwrap();
        assert_eq!(db.get_community(community.id).unwrap().member_count, 0);

        db.increment_member_count(community.id).unwrap();
        assert_eq!(db.get_community(community.id).unwrap().member_count, 1);
    }

    #[test]
    fn remove_reports_whether_a_row_existed() {
        let (db, owner, community) = setup();
        db.add_membership(community.id, owner, MemberRole::Admin).unwrap();
        assert!(db.remove_membership(community.id, owner).unwrap());
        assert!(!db.remove_membership(community.id, owner).unwrap());
        assert!(db.find_membership(community.id, owner).unwrap().is_none());
    }
}
