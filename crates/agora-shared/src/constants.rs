/// Application name
pub const APP_NAME: &str = "Agora";

/// Name of the channel created together with every new community
pub const DEFAULT_CHANNEL_NAME: &str = "general";

/// Description of the auto-created channel
pub const DEFAULT_CHANNEL_DESCRIPTION: &str = "General discussion";

/// Member count a community starts with (its creator)
pub const INITIAL_MEMBER_COUNT: i64 = 1;

/// Per-subscription change-feed buffer (events)
pub const DEFAULT_FEED_BUFFER: usize = 256;

/// Collection names, as used in change-feed topics
pub const COLLECTION_MESSAGES: &str = "messages";
pub const COLLECTION_DIRECT_MESSAGES: &str = "direct_messages";
pub const COLLECTION_NOTIFICATIONS: &str = "notifications";

/// Key derivation context for account password hashes (BLAKE3)
pub const KDF_CONTEXT_PASSWORD: &str = "agora-password-v1";

/// Error message surfaced when a write needs a signed-in identity
pub const NOT_AUTHENTICATED: &str = "User not authenticated";

/// Error message surfaced when sign-up hits an existing username
pub const USERNAME_TAKEN: &str = "Username is already taken";
