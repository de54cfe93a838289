//! # agora-store
//!
//! SQLite storage behind the embedded Agora backend.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every
//! collection the platform knows about: accounts and profiles, communities
//! with their memberships and channels, channel messages, conversations with
//! direct messages, notifications, job posts and resources. Rows that carry
//! a denormalized author are returned with that join already attached.

pub mod accounts;
pub mod channels;
pub mod communities;
pub mod conversations;
pub mod database;
pub mod jobs;
pub mod messages;
pub mod migrations;
pub mod notifications;
pub mod profiles;
pub mod resources;

mod error;
mod rows;

pub use database::Database;
pub use error::{Result, StoreError};
