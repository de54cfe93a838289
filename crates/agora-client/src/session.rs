//! Session and identity container.
//!
//! The only writer of the signed-in identity. Every other container reads
//! it through an [`IdentityReader`] to decide whether a write may proceed.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use agora_shared::constants::USERNAME_TAKEN;
use agora_shared::{GatewayError, NewProfile, Profile, ProfilePatch, Session, UserId};

use crate::gateway::Gateway;
use crate::state::{impl_has_status, Observable, Status};

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub session: Option<Session>,
    pub user: Option<Profile>,
    /// Set once [`SessionStore::initialize`] has finished, whatever the
    /// outcome.
    pub initialized: bool,
    pub status: Status,
}
impl_has_status!(SessionState);

/// Read-only view of the signed-in identity.
#[derive(Clone)]
pub struct IdentityReader {
    rx: watch::Receiver<SessionState>,
}

impl IdentityReader {
    pub fn user_id(&self) -> Option<UserId> {
        self.rx.borrow().user.as_ref().map(|user| user.id)
    }

    pub fn user(&self) -> Option<Profile> {
        self.rx.borrow().user.clone()
    }
}

pub struct SessionStore {
    gateway: Arc<dyn Gateway>,
    state: Observable<SessionState>,
}

impl SessionStore {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway,
            state: Observable::new(),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn identity(&self) -> IdentityReader {
        IdentityReader {
            rx: self.state.subscribe(),
        }
    }

    /// Restore an existing session, if the backend still has one.
    pub async fn initialize(&self) {
        self.state.begin();
        let result = async {
            match self.gateway.get_session().await? {
                Some(session) => {
                    let profile = self.gateway.get_profile(session.user_id).await?;
                    Ok::<_, GatewayError>(Some((session, profile)))
                }
                None => Ok(None),
            }
        }
        .await;

        let restored = self.state.complete("initialize", result, |state, restored| {
            if let Some((session, profile)) = restored {
                state.session = Some(session.clone());
                state.user = Some(profile.clone());
            }
        });
        if let Some(Some((_, profile))) = &restored {
            info!(user = %profile.id.short(), "session restored");
        }
        self.state.update(|state| state.initialized = true);
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Option<Profile> {
        self.state.begin();
        let result = async {
            let session = self.gateway.sign_in(email, password).await?;
            let profile = self.gateway.get_profile(session.user_id).await?;
            Ok::<_, GatewayError>((session, profile))
        }
        .await;

        let (_, profile) = self.state.complete("sign_in", result, |state, (session, profile)| {
            state.session = Some(session.clone());
            state.user = Some(profile.clone());
        })?;
        info!(user = %profile.id.short(), "signed in");
        Some(profile)
    }

    /// Register an account and its profile row. The username is checked
    /// before the account is created.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
        full_name: &str,
    ) -> Option<Profile> {
        self.state.begin();
        let result = async {
            if !self.gateway.find_profiles_by_username(username).await?.is_empty() {
                return Err(GatewayError::Constraint(USERNAME_TAKEN.to_string()));
            }
            let session = self.gateway.sign_up(email, password).await?;
            let profile = self
                .gateway
                .insert_profile(&NewProfile {
                    id: session.user_id,
                    email: email.to_string(),
                    username: username.to_string(),
                    full_name: Some(full_name.to_string()),
                })
                .await?;
            Ok((session, profile))
        }
        .await;

        let (_, profile) = self.state.complete("sign_up", result, |state, (session, profile)| {
            state.session = Some(session.clone());
            state.user = Some(profile.clone());
        })?;
        info!(user = %profile.id.short(), username = %profile.username, "signed up");
        Some(profile)
    }

    pub async fn sign_out(&self) {
        self.state.begin();
        let result = self.gateway.sign_out().await;
        if self
            .state
            .complete("sign_out", result, |state, _| {
                state.session = None;
                state.user = None;
            })
            .is_some()
        {
            info!("signed out");
        }
    }

    /// Patch the signed-in profile remotely, then merge the same patch into
    /// the local copy.
    pub async fn update_profile(&self, patch: &ProfilePatch) -> bool {
        let Some(id) = self.state.read(|state| state.user.as_ref().map(|user| user.id)) else {
            self.state.fail("update_profile", GatewayError::not_authenticated());
            return false;
        };

        self.state.begin();
        let result = self.gateway.update_profile(id, patch).await;
        self.state
            .complete("update_profile", result, |state, _| {
                if let Some(user) = state.user.as_mut() {
                    user.apply(patch);
                }
            })
            .is_some()
    }

    /// Re-read the signed-in profile. Does nothing when signed out.
    pub async fn refresh_user(&self) {
        let Some(id) = self.state.read(|state| state.user.as_ref().map(|user| user.id)) else {
            return;
        };

        let result = self.gateway.get_profile(id).await;
        if self
            .state
            .complete("refresh_user", result, |state, profile| {
                state.user = Some(profile.clone());
            })
            .is_some()
        {
            debug!(user = %id.short(), "profile refreshed");
        }
    }
}
