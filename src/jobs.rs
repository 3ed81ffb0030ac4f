//! In-memory registry of merge jobs.
//!
//! All mutation goes through [`JobStore`] methods. The orchestrator of a job
//! is its only writer; pollers read snapshots and the reaper sweeps stale
//! entries, all behind one reader/writer lock.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::types::*;

pub const JOB_RETENTION: Duration = Duration::from_secs(60 * 60);
pub const REAP_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Clone)]
pub struct JobStore {
    inner: Arc<Inner>,
}

struct Inner {
    jobs: RwLock<HashMap<String, MergeJob>>,
    retention: Duration,
    shutdown: CancellationToken,
}

impl JobStore {
    /// Creates a store with the default retention and starts its reaper.
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        Self::with_retention(JOB_RETENTION, REAP_INTERVAL)
    }

    pub fn with_retention(retention: Duration, reap_interval: Duration) -> Self {
        let inner = Arc::new(Inner {
            jobs: RwLock::new(HashMap::new()),
            retention,
            shutdown: CancellationToken::new(),
        });
        tokio::spawn(reap_loop(
            Arc::downgrade(&inner),
            inner.shutdown.clone(),
            reap_interval,
        ));
        Self { inner }
    }

    /// Stops the reaper. Jobs already running are unaffected.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    pub fn create_job(&self, request: MergeRecipeRequest) -> MergeJob {
        let now = chrono::Utc::now().timestamp();
        let job = MergeJob {
            id: generate_job_id(),
            status: JobStatus::Pending,
            progress: Vec::new(),
            result: None,
            error: None,
            request,
            created_at: now,
            updated_at: now,
            duration_seconds: None,
            touched: Instant::now(),
        };
        self.write().insert(job.id.clone(), job.clone());
        job
    }

    /// Snapshot of a job, or `None` if it never existed or was reaped.
    pub fn get_job(&self, job_id: &str) -> Option<MergeJob> {
        self.read().get(job_id).cloned()
    }

    pub fn update_status(
        &self,
        job_id: &str,
        stage: JobStatus,
        message: impl Into<String>,
        data: Option<ProgressPayload>,
    ) {
        let mut event = ProgressEvent::new(stage, message);
        event.data = data;
        self.record(job_id, event);
    }

    pub fn complete_job(&self, job_id: &str, result: MergeRecipeResponse) {
        self.record(job_id, ProgressEvent::complete(result));
    }

    pub fn fail_job(&self, job_id: &str, error: impl std::fmt::Display) {
        self.record(job_id, ProgressEvent::failed(error.to_string()));
    }

    /// Appends a progress event and moves the job to the event's stage.
    ///
    /// Unknown jobs are ignored. Events that would move a job backwards,
    /// skip a stage, or follow a terminal state are dropped. A `Complete`
    /// event must carry the result payload.
    pub fn record(&self, job_id: &str, event: ProgressEvent) {
        let mut jobs = self.write();
        let Some(job) = jobs.get_mut(job_id) else {
            debug!("Ignoring progress for unknown job {}", job_id);
            return;
        };

        if !job.status.can_advance_to(event.stage) {
            warn!(
                "Job {}: rejected transition {} -> {}",
                job_id,
                job.status.as_str(),
                event.stage.as_str()
            );
            return;
        }

        match (event.stage, &event.data) {
            (JobStatus::Complete, Some(ProgressPayload::Complete(result))) => {
                job.result = Some(result.as_ref().clone());
            }
            (JobStatus::Complete, _) => {
                warn!("Job {}: complete event without a result, ignoring", job_id);
                return;
            }
            (JobStatus::Failed, Some(ProgressPayload::Failure { error })) => {
                job.error = Some(error.clone());
            }
            (JobStatus::Failed, _) => {
                job.error = Some(event.message.clone());
            }
            _ => {}
        }

        job.status = event.stage;
        job.updated_at = chrono::Utc::now().timestamp();
        job.touched = Instant::now();
        if job.status.is_terminal() {
            job.duration_seconds = Some(job.updated_at - job.created_at);
        }
        job.progress.push(event);
    }

    /// Deletes every job untouched for longer than the retention window.
    pub fn reap_stale(&self) -> usize {
        self.inner.reap()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, MergeJob>> {
        self.inner.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, MergeJob>> {
        self.inner.write()
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, MergeJob>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn reap(&self) -> usize {
        let mut jobs = self.write();
        let before = jobs.len();
        jobs.retain(|_, job| job.touched.elapsed() <= self.retention);
        before - jobs.len()
    }
}

async fn reap_loop(store: Weak<Inner>, shutdown: CancellationToken, every: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Job reaper stopped");
                return;
            }
            _ = ticker.tick() => {
                // The store was dropped; nothing left to sweep.
                let Some(inner) = store.upgrade() else { return };
                let removed = inner.reap();
                if removed > 0 {
                    info!("Reaped {} stale merge jobs", removed);
                }
            }
        }
    }
}

/// 128 random bits, hex encoded.
fn generate_job_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
