//! Shared learning resources.

use rusqlite::params;
use rusqlite::types::Value;

use agora_shared::{NewResource, Resource, ResourceId, ResourcePatch, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::rows::{fmt_ts, get_author, get_id, get_tag, get_ts, now, patch_row, text_columns};

const RESOURCE_SELECT: &str = "SELECT r.id, r.title, r.description, r.url, r.type, r.user_id, r.created_at,
            p.id, p.username, p.avatar_url
     FROM resources r
     LEFT JOIN profiles p ON p.id = r.user_id";

impl Database {
    pub fn create_resource(&self, owner: UserId, resource: &NewResource) -> Result<Resource> {
        let id = ResourceId::new();
        self.conn().execute(
            "INSERT INTO resources (id, title, description, url, type, user_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id.to_string(),
                resource.title,
                resource.description,
                resource.url,
                resource.kind.as_str(),
                owner.to_string(),
                fmt_ts(&now()),
            ],
        )?;
        self.get_resource(id)
    }

    pub fn get_resource(&self, id: ResourceId) -> Result<Resource> {
        self.conn()
            .query_row(
                &format!("{RESOURCE_SELECT} WHERE r.id = ?1"),
                params![id.to_string()],
                row_to_resource,
            )
            .map_err(|e| StoreError::or_not_found(e, "resource"))
    }

    /// All resources, newest first.
    pub fn list_resources(&self) -> Result<Vec<Resource>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("{RESOURCE_SELECT} ORDER BY r.created_at DESC, r.rowid DESC"))?;
        let rows = stmt.query_map([], row_to_resource)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn update_resource(&self, id: ResourceId, patch: &ResourcePatch) -> Result<Resource> {
        let mut columns = text_columns(&[
            ("title", patch.title.as_ref()),
            ("description", patch.description.as_ref()),
            ("url", patch.url.as_ref()),
        ]);
        if let Some(kind) = patch.kind {
            columns.push(("type", Value::Text(kind.as_str().to_string())));
        }

        if !columns.is_empty() && patch_row(self.conn(), "resources", &id.to_string(), columns)? == 0 {
            return Err(StoreError::NotFound("resource"));
        }
        self.get_resource(id)
    }

    /// Returns `false` when no such resource existed.
    pub fn delete_resource(&self, id: ResourceId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM resources WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

fn row_to_resource(row: &rusqlite::Row<'_>) -> rusqlite::Result<Resource> {
    Ok(Resource {
        id: get_id(row, 0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        url: row.get(3)?,
        kind: get_tag(row, 4)?,
        user_id: get_id(row, 5)?,
        created_at: get_ts(row, 6)?,
        author: get_author(row, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_shared::ResourceKind;

    fn new_resource(title: &str) -> NewResource {
        NewResource {
            title: title.into(),
            description: "Worth a read".into(),
            url: "https://doc.rust-lang.org/book/".into(),
            kind: ResourceKind::Article,
        }
    }

    #[test]
    fn missing_author_profile_leaves_author_empty() {
        let db = Database::open_in_memory().unwrap();
        let resource = db.create_resource(UserId::new(), &new_resource("book")).unwrap();
        assert!(resource.author.is_none());
        assert_eq!(db.get_resource(resource.id).unwrap(), resource);
    }

    #[test]
    fn update_changes_kind() {
        let db = Database::open_in_memory().unwrap();
        let resource = db.create_resource(UserId::new(), &new_resource("talk")).unwrap();
        let updated = db
            .update_resource(
                resource.id,
                &ResourcePatch {
                    kind: Some(ResourceKind::Video),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.kind, ResourceKind::Video);
        assert_eq!(updated.title, "talk");
    }

    #[test]
    fn list_and_delete() {
        let db = Database::open_in_memory().unwrap();
        let owner = UserId::new();
        let first = db.create_resource(owner, &new_resource("first")).unwrap();
        let second = db.create_resource(owner, &new_resource("second")).unwrap();
        assert_eq!(db.list_resources().unwrap(), vec![second.clone(), first]);

        assert!(db.delete_resource(second.id).unwrap());
        assert!(!db.delete_resource(second.id).unwrap());
        assert_eq!(db.list_resources().unwrap().len(), 1);
    }
}
