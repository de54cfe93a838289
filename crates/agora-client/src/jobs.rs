//! Job board container.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use agora_shared::{GatewayError, JobId, JobPatch, JobPost, NewJob};

use crate::gateway::Gateway;
use crate::session::IdentityReader;
use crate::state::{clear_if_current, impl_has_status, prepend_unique, replace_by_id, Observable, Status};

#[derive(Debug, Clone, Default)]
pub struct JobState {
    /// Newest first.
    pub jobs: Vec<JobPost>,
    pub current_job: Option<JobPost>,
    pub status: Status,
}
impl_has_status!(JobState);

pub struct JobStore {
    gateway: Arc<dyn Gateway>,
    identity: IdentityReader,
    state: Observable<JobState>,
}

impl JobStore {
    pub fn new(gateway: Arc<dyn Gateway>, identity: IdentityReader) -> Self {
        Self {
            gateway,
            identity,
            state: Observable::new(),
        }
    }

    pub fn snapshot(&self) -> JobState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state.subscribe()
    }

    pub async fn fetch_jobs(&self) {
        self.state.begin();
        let result = self.gateway.list_jobs().await;
        self.state.complete("fetch_jobs", result, |state, rows| {
            state.jobs = rows.clone();
        });
    }

    pub async fn fetch_job(&self, id: JobId) -> Option<JobPost> {
        self.state.begin();
        let result = self.gateway.get_job(id).await;
        self.state.complete("fetch_job", result, |state, job| {
            replace_by_id(&mut state.jobs, job);
            state.current_job = Some(job.clone());
        })
    }

    pub async fn create_job(&self, job: &NewJob) -> Option<JobPost> {
        let Some(owner) = self.identity.user_id() else {
            self.state.fail("create_job", GatewayError::not_authenticated());
            return None;
        };

        self.state.begin();
        let result = self.gateway.insert_job(owner, job).await;
        let created = self.state.complete("create_job", result, |state, job| {
            prepend_unique(&mut state.jobs, job);
        })?;
        info!(job = %created.id.short(), title = %created.title, "job posted");
        Some(created)
    }

    pub async fn update_job(&self, id: JobId, patch: &JobPatch) -> bool {
        self.state.begin();
        let result = self.gateway.update_job(id, patch).await;
        self.state
            .complete("update_job", result, |state, _| {
                for job in state.jobs.iter_mut().filter(|j| j.id == id) {
                    job.apply(patch);
                }
                if let Some(job) = state.current_job.as_mut().filter(|j| j.id == id) {
                    job.apply(patch);
                }
            })
            .is_some()
    }

    pub async fn delete_job(&self, id: JobId) -> bool {
        self.state.begin();
        let result = self.gateway.delete_job(id).await;
        let deleted = self
            .state
            .complete("delete_job", result, |state, _| {
                state.jobs.retain(|j| j.id != id);
                clear_if_current(&mut state.current_job, id);
            })
            .is_some();
        if deleted {
            info!(job = %id.short(), "job deleted");
        }
        deleted
    }

    pub fn set_current_job(&self, job: Option<JobPost>) {
        self.state.update(|state| state.current_job = job);
    }
}
