//! v001 -- Initial schema creation.

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Auth
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS accounts (
    id            TEXT PRIMARY KEY NOT NULL,   -- UUID v4, shared with profiles(id)
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,               -- hex BLAKE3 derived key
    salt          TEXT NOT NULL,               -- hex, 16 bytes
    created_at    TEXT NOT NULL                -- RFC-3339
);

-- At most one signed-in session per local database.
CREATE TABLE IF NOT EXISTS active_session (
    id           INTEGER PRIMARY KEY CHECK (id = 1),
    access_token TEXT NOT NULL,
    user_id      TEXT NOT NULL,
    email        TEXT NOT NULL,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS profiles (
    id         TEXT PRIMARY KEY NOT NULL,
    email      TEXT NOT NULL,
    username   TEXT NOT NULL UNIQUE,
    full_name  TEXT,
    avatar_url TEXT,
    bio        TEXT,
    website    TEXT,
    created_at TEXT NOT NULL,
    last_seen  TEXT
);

-- ----------------------------------------------------------------
-- Communities
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS communities (
    id           TEXT PRIMARY KEY NOT NULL,
    name         TEXT NOT NULL,
    description  TEXT NOT NULL,
    image_url    TEXT,
    created_by   TEXT NOT NULL,
    member_count INTEGER NOT NULL DEFAULT 0,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS community_members (
    community_id TEXT NOT NULL,
    user_id      TEXT NOT NULL,
    role         TEXT NOT NULL,                -- member | moderator | admin
    joined_at    TEXT NOT NULL,

    PRIMARY KEY (community_id, user_id),
    FOREIGN KEY (community_id) REFERENCES communities(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS channels (
    id           TEXT PRIMARY KEY NOT NULL,
    name         TEXT NOT NULL,
    description  TEXT,
    community_id TEXT NOT NULL,
    created_by   TEXT NOT NULL,
    created_at   TEXT NOT NULL,

    FOREIGN KEY (community_id) REFERENCES communities(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_channels_community ON channels(community_id);

CREATE TABLE IF NOT EXISTS messages (
    id         TEXT PRIMARY KEY NOT NULL,
    content    TEXT NOT NULL,
    channel_id TEXT NOT NULL,
    user_id    TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT,

    FOREIGN KEY (channel_id) REFERENCES channels(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_channel_ts ON messages(channel_id, created_at);

-- ----------------------------------------------------------------
-- Direct messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id         TEXT PRIMARY KEY NOT NULL,
    created_at TEXT NOT NULL,
    pair_key   TEXT UNIQUE                      -- sorted "a:b" participant ids
);

CREATE TABLE IF NOT EXISTS conversation_participants (
    conversation_id TEXT NOT NULL,
    user_id         TEXT NOT NULL,

    PRIMARY KEY (conversation_id, user_id),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_participants_user ON conversation_participants(user_id);

CREATE TABLE IF NOT EXISTS direct_messages (
    id              TEXT PRIMARY KEY NOT NULL,
    content         TEXT NOT NULL,
    conversation_id TEXT NOT NULL,
    sender_id       TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_direct_messages_conv_ts
    ON direct_messages(conversation_id, created_at);

CREATE TABLE IF NOT EXISTS reactions (
    id                TEXT PRIMARY KEY NOT NULL,
    emoji             TEXT NOT NULL,
    message_id        TEXT,
    direct_message_id TEXT,
    user_id           TEXT NOT NULL,
    created_at        TEXT NOT NULL,

    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE,
    FOREIGN KEY (direct_message_id) REFERENCES direct_messages(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_reactions_message ON reactions(message_id);
CREATE INDEX IF NOT EXISTS idx_reactions_direct_message ON reactions(direct_message_id);

-- ----------------------------------------------------------------
-- Notifications
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS notifications (
    id             TEXT PRIMARY KEY NOT NULL,
    user_id        TEXT NOT NULL,
    type           TEXT NOT NULL,
    content        TEXT NOT NULL,
    reference_id   TEXT,
    reference_type TEXT,
    is_read        INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    created_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, created_at);

-- ----------------------------------------------------------------
-- Jobs and resources
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS job_posts (
    id              TEXT PRIMARY KEY NOT NULL,
    title           TEXT NOT NULL,
    company         TEXT NOT NULL,
    location        TEXT NOT NULL,
    description     TEXT NOT NULL,
    requirements    TEXT,
    salary_range    TEXT,
    application_url TEXT,
    user_id         TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    expires_at      TEXT
);

CREATE TABLE IF NOT EXISTS resources (
    id          TEXT PRIMARY KEY NOT NULL,
    title       TEXT NOT NULL,
    description TEXT NOT NULL,
    url         TEXT NOT NULL,
    type        TEXT NOT NULL,                  -- article | video | tool | other
    user_id     TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
