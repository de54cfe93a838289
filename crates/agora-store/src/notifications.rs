//! Per-user notifications.

use rusqlite::params;

use agora_shared::{
    NewNotification, Notification, NotificationId, NotificationRef, ReferenceKind, UserId,
};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::rows::{fmt_ts, get_id, get_opt_id, get_tag, get_ts, now};

impl Database {
    pub fn insert_notification(&self, notification: &NewNotification) -> Result<Notification> {
        let created = Notification {
            id: NotificationId::new(),
            user_id: notification.user_id,
            kind: notification.kind,
            content: notification.content.clone(),
            reference: notification.reference,
            is_read: false,
            created_at: now(),
        };

        self.conn().execute(
            "INSERT INTO notifications
                (id, user_id, type, content, reference_id, reference_type, is_read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
            params![
                created.id.to_string(),
                created.user_id.to_string(),
                created.kind.as_str(),
                created.content,
                created.reference.map(|r| r.id.to_string()),
                created.reference.map(|r| r.kind.as_str()),
                fmt_ts(&created.created_at),
            ],
        )?;
        Ok(created)
    }

    /// Notifications owned by `user`, newest first.
    pub fn list_notifications(&self, user: UserId) -> Result<Vec<Notification>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, user_id, type, content, reference_id, reference_type, is_read, created_at
             FROM notifications
             WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map(params![user.to_string()], row_to_notification)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn mark_notification_read(&self, id: NotificationId) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1",
            params![id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound("notification"));
        }
        Ok(())
    }

    /// Returns how many unread notifications were flipped.
    pub fn mark_all_notifications_read(&self, user: UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
            params![user.to_string()],
        )?;
        Ok(affected)
    }
}

fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    let reference_id: Option<uuid::Uuid> = get_opt_id(row, 4)?;
    let reference_type: Option<String> = row.get(5)?;
    let reference = match (reference_id, reference_type) {
        (Some(id), Some(_)) => Some(NotificationRef {
            kind: get_tag::<ReferenceKind>(row, 5)?,
            id,
        }),
        _ => None,
    };

    Ok(Notification {
        id: get_id(row, 0)?,
        user_id: get_id(row, 1)?,
        kind: get_tag(row, 2)?,
        content: row.get(3)?,
        reference,
        is_read: row.get(6)?,
        created_at: get_ts(row, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_shared::NotificationKind;

    fn notify(db: &Database, user: UserId, content: &str) -> Notification {
        db.insert_notification(&NewNotification {
            user_id: user,
            kind: NotificationKind::Mention,
            content: content.into(),
            reference: Some(NotificationRef {
                kind: ReferenceKind::Community,
                id: uuid::Uuid::new_v4(),
            }),
        })
        .unwrap()
    }

    #[test]
    fn listed_newest_first_with_reference() {
        let db = Database::open_in_memory().unwrap();
        let user = UserId::new();
        let older = notify(&db, user, "older");
        let newer = notify(&db, user, "newer");
        notify(&db, UserId::new(), "someone else");

        let listed = db.list_notifications(user).unwrap();
        assert_eq!(listed, vec![newer, older]);
    }

    #[test]
    fn mark_all_only_counts_unread() {
        let db = Database::open_in_memory().unwrap();
        let user = UserId::new();
        let first = notify(&db, user, "a");
        notify(&db, user, "b");

        db.mark_notification_read(first.id).unwrap();
        assert_eq!(db.mark_all_notifications_read(user).unwrap(), 1);
        assert!(db.list_notifications(user).unwrap().iter().all(|n| n.is_read));
        assert!(matches!(
            db.mark_notification_read(NotificationId::new()),
            Err(StoreError::NotFound(_))
        ));
    }
}
