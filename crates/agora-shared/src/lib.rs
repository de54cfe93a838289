//! # agora-shared
//!
//! Types shared by every Agora crate: strongly typed identifiers, the domain
//! models handed to the view layer, the gateway error taxonomy, and the
//! change-feed protocol.

pub mod constants;
pub mod error;
pub mod models;
pub mod protocol;
pub mod types;

pub use error::{GatewayError, GatewayResult};
pub use models::*;
pub use protocol::{ChangeEvent, Topic};
pub use types::*;
