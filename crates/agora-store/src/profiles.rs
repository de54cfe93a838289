//! CRUD operations for [`Profile`] records.

use rusqlite::{params, params_from_iter};

use agora_shared::{NewProfile, Profile, ProfilePatch, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::rows::{fmt_ts, get_id, get_opt_ts, get_ts, now, patch_row, placeholders, text_columns};

pub(crate) const PROFILE_COLUMNS: &str =
    "p.id, p.email, p.username, p.full_name, p.avatar_url, p.bio, p.website, p.created_at, p.last_seen";

impl Database {
    pub fn insert_profile(&self, profile: &NewProfile) -> Result<Profile> {
        let created = Profile {
            id: profile.id,
            email: profile.email.clone(),
            username: profile.username.clone(),
            full_name: profile.full_name.clone(),
            avatar_url: None,
            bio: None,
            website: None,
            created_at: now(),
            last_seen: None,
        };

        self.conn().execute(
            "INSERT INTO profiles (id, email, username, full_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                created.id.to_string(),
                created.email,
                created.username,
                created.full_name,
                fmt_ts(&created.created_at),
            ],
        )?;
        Ok(created)
    }

    pub fn get_profile(&self, id: UserId) -> Result<Profile> {
        self.conn()
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles p WHERE p.id = ?1"),
                params![id.to_string()],
                |row| row_to_profile(row, 0),
            )
            .map_err(|e| StoreError::or_not_found(e, "profile"))
    }

    /// Fetch several profiles at once; unknown ids are skipped.
    pub fn get_profiles(&self, ids: &[UserId]) -> Result<Vec<Profile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles p
             WHERE p.id IN ({})
             ORDER BY p.username ASC",
            placeholders(ids.len())
        ))?;
        let rows = stmt.query_map(
            params_from_iter(ids.iter().map(|id| id.to_string())),
            |row| row_to_profile(row, 0),
        )?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn find_profiles_by_username(&self, username: &str) -> Result<Vec<Profile>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles p WHERE p.username = ?1"
        ))?;
        let rows = stmt.query_map(params![username], |row| row_to_profile(row, 0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Apply the fields present in `patch`.
    pub fn update_profile(&self, id: UserId, patch: &ProfilePatch) -> Result<()> {
        let columns = text_columns(&[
            ("username", patch.username.as_ref()),
            ("full_name", patch.full_name.as_ref()),
            ("avatar_url", patch.avatar_url.as_ref()),
            ("bio", patch.bio.as_ref()),
            ("website", patch.website.as_ref()),
        ]);
        if columns.is_empty() {
            // Nothing to write, but still report unknown ids.
            return self.get_profile(id).map(|_| ());
        }

        if patch_row(self.conn(), "profiles", &id.to_string(), columns)? == 0 {
            return Err(StoreError::NotFound("profile"));
        }
        Ok(())
    }
}

/// Map the nine [`PROFILE_COLUMNS`] starting at `base` to a [`Profile`].
pub(crate) fn row_to_profile(row: &rusqlite::Row<'_>, base: usize) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: get_id(row, base)?,
        email: row.get(base + 1)?,
        username: row.get(base + 2)?,
        full_name: row.get(base + 3)?,
        avatar_url: row.get(base + 4)?,
        bio: row.get(base + 5)?,
        website: row.get(base + 6)?,
        created_at: get_ts(row, base + 7)?,
        last_seen: get_opt_ts(row, base + 8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(db: &Database, username: &str) -> Profile {
        db.insert_profile(&NewProfile {
            id: UserId::new(),
            email: format!("{username}@example.com"),
            username: username.into(),
            full_name: None,
        })
        .unwrap()
    }

    #[test]
    fn insert_then_get() {
        let db = Database::open_in_memory().unwrap();
        let ada = profile(&db, "ada");
        assert_eq!(db.get_profile(ada.id).unwrap(), ada);
        assert!(matches!(
            db.get_profile(UserId::new()),
            Err(StoreError::NotFound("profile"))
        ));
    }

    #[test]
    fn username_is_unique() {
        let db = Database::open_in_memory().unwrap();
        profile(&db, "ada");
        let err = db
            .insert_profile(&NewProfile {
                id: UserId::new(),
                email: "other@example.com".into(),
                username: "ada".into(),
                full_name: None,
            })
            .unwrap_err();
        assert!(matches!(
            agora_shared::GatewayError::from(err),
            agora_shared::GatewayError::Constraint(_)
        ));
    }

    #[test]
    fn patch_updates_present_fields_only() {
        let db = Database::open_in_memory().unwrap();
        let ada = profile(&db, "ada");
        db.update_profile(
            ada.id,
            &ProfilePatch {
                bio: Some("Analytical engines".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let stored = db.get_profile(ada.id).unwrap();
        assert_eq!(stored.bio.as_deref(), Some("Analytical engines"));
        assert_eq!(stored.username, "ada");
    }

    #[test]
    fn get_many_skips_unknown() {
        let db = Database::open_in_memory().unwrap();
        let ada = profile(&db, "ada");
        let bob = profile(&db, "bob");
        let found = db.get_profiles(&[bob.id, UserId::new(), ada.id]).unwrap();
        assert_eq!(found, vec![ada, bob]);
    }
}
