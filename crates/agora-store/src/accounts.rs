//! Accounts, password verification and the persisted active session.
//!
//! Credentials here only guard the embedded single-user database: a password
//! hash is one salted BLAKE3 `derive_key` pass, not a slow KDF, so this
//! scheme must not back an account store reachable from the network.

use rand::RngCore;
use rusqlite::{params, OptionalExtension};
use subtle::ConstantTimeEq;

use agora_shared::constants::KDF_CONTEXT_PASSWORD;
use agora_shared::{Session, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::rows::{fmt_ts, get_id, get_ts, now};

fn hash_password(salt: &[u8], password: &str) -> [u8; 32] {
    let mut material = Vec::with_capacity(salt.len() + password.len());
    material.extend_from_slice(salt);
    material.extend_from_slice(password.as_bytes());
    blake3::derive_key(KDF_CONTEXT_PASSWORD, &material)
}

impl Database {
    /// Register a new account. Fails with [`StoreError::Duplicate`] when the
    /// email is already registered.
    pub fn create_account(&self, email: &str, password: &str) -> Result<UserId> {
        let exists: bool = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM accounts WHERE email = ?1)",
            params![email],
            |row| row.get(0),
        )?;
        if exists {
            return Err(StoreError::Duplicate("User already registered".into()));
        }

        let id = UserId::new();
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);

        self.conn().execute(
            "INSERT INTO accounts (id, email, password_hash, salt, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.to_string(),
                email,
                hex::encode(hash_password(&salt, password)),
                hex::encode(salt),
                fmt_ts(&now()),
            ],
        )?;

        tracing::info!(user = %id.short(), "account created");
        Ok(id)
    }

    /// Check an email/password pair and return the account id.
    pub fn verify_credentials(&self, email: &str, password: &str) -> Result<UserId> {
        let row: Option<(UserId, String, String)> = self
            .conn()
            .query_row(
                "SELECT id, password_hash, salt FROM accounts WHERE email = ?1",
                params![email],
                |row| Ok((get_id(row, 0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let (id, expected, salt_hex) = row.ok_or(StoreError::InvalidCredentials)?;
        let salt = hex::decode(salt_hex).map_err(|_| StoreError::InvalidCredentials)?;
        let expected = hex::decode(expected).map_err(|_| StoreError::InvalidCredentials)?;
        let actual = hash_password(&salt, password);
        if expected.len() != actual.len() || actual[..].ct_eq(&expected[..]).unwrap_u8() != 1 {
            return Err(StoreError::InvalidCredentials);
        }
        Ok(id)
    }

    /// Issue a fresh session for `user` and persist it as the active one.
    pub fn start_session(&self, user_id: UserId, email: &str) -> Result<Session> {
        let mut token = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut token);

        let session = Session {
            access_token: hex::encode(token),
            user_id,
            email: email.to_string(),
            created_at: now(),
        };

        self.conn().execute(
            "INSERT OR REPLACE INTO active_session (id, access_token, user_id, email, created_at)
             VALUES (1, ?1, ?2, ?3, ?4)",
            params![
                session.access_token,
                session.user_id.to_string(),
                session.email,
                fmt_ts(&session.created_at),
            ],
        )?;
        Ok(session)
    }

    pub fn active_session(&self) -> Result<Option<Session>> {
        let session = self
            .conn()
            .query_row(
                "SELECT access_token, user_id, email, created_at FROM active_session WHERE id = 1",
                [],
                |row| {
                    Ok(Session {
                        access_token: row.get(0)?,
                        user_id: get_id(row, 1)?,
                        email: row.get(2)?,
                        created_at: get_ts(row, 3)?,
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    pub fn end_session(&self) -> Result<()> {
        self.conn().execute("DELETE FROM active_session", [])?;
        Ok(())
    }
}
