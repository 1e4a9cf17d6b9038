//! Notification scheduler: one-shot tokio tasks per scheduled job.
//!
//! Jobs are armed only after the registration that owns them is committed.
//! An armed job sleeps until its fire time, re-reads the registration, user,
//! and event, renders the message, dispatches it, and records the outcome.
//! Fired jobs drop out of the in-memory table. Pending rows are re-armed on
//! startup.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channels::Dispatchers;
use crate::content::ContentGenerator;
use crate::error::{DatabaseError, Error, RegistrationError};
use crate::events::model::Event;
use crate::store::Database;
use crate::workflow::model::{JobStatus, Registration, ScheduledJob};
use crate::workflow::plan::plan_touchpoints;

/// Tracked job handle.
#[derive(Debug)]
struct TrackedJob {
    handle: JoinHandle<()>,
    fire_at: DateTime<Utc>,
}

/// Everything a fired job needs; cloned into each task.
#[derive(Clone)]
struct JobRunner {
    db: Arc<dyn Database>,
    generator: Arc<ContentGenerator>,
    dispatchers: Dispatchers,
}

impl JobRunner {
    /// Fire one job and record its outcome.
    async fn fire(&self, job_id: Uuid) {
        match self.deliver(job_id).await {
            Ok(false) => debug!(job_id = %job_id, "Job no longer pending; skipped"),
            Ok(true) => {
                if let Err(e) = self.db.complete_job(job_id, JobStatus::Sent, None).await {
                    warn!(job_id = %job_id, error = %e, "Failed to record sent job");
                }
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Notification failed; not retrying");
                let reason = e.to_string();
                if let Err(e) = self
                    .db
                    .complete_job(job_id, JobStatus::Failed, Some(&reason))
                    .await
                {
                    warn!(job_id = %job_id, error = %e, "Failed to record failed job");
                }
            }
        }
    }

    /// Returns `Ok(false)` when the job is gone or already completed.
    async fn deliver(&self, job_id: Uuid) -> Result<bool, Error> {
        let Some(job) = self.db.get_scheduled_job(job_id).await? else {
            return Ok(false);
        };
        if job.status != JobStatus::Pending {
            return Ok(false);
        }

        let registration = self
            .db
            .get_registration(job.registration_id)
            .await?
            .ok_or_else(|| not_found("registration", job.registration_id))?;
        let user = self
            .db
            .get_user(registration.user_id)
            .await?
            .ok_or_else(|| not_found("user", registration.user_id))?;
        let event = self
            .db
            .get_event(registration.event_id)
            .await?
            .ok_or_else(|| not_found("event", registration.event_id))?;

        let message = self.generator.render(job.touchpoint, &user, &event).await;
        self.dispatchers.deliver(&user, &message).await?;

        info!(
            job_id = %job_id,
            touchpoint = %job.touchpoint,
            user_id = %user.id,
            channel = %user.preferred_channel,
            "Notification sent"
        );
        Ok(true)
    }
}

fn not_found(entity: &str, id: Uuid) -> Error {
    Error::Registration(RegistrationError::NotFound {
        entity: entity.to_string(),
        id: id.to_string(),
    })
}

/// Arms, tracks, and recovers notification jobs.
pub struct NotificationScheduler {
    runner: JobRunner,
    follow_up_delay: chrono::Duration,
    /// Armed jobs (for status queries and shutdown).
    jobs: Arc<RwLock<HashMap<Uuid, TrackedJob>>>,
}

impl NotificationScheduler {
    pub fn new(
        db: Arc<dyn Database>,
        generator: Arc<ContentGenerator>,
        dispatchers: Dispatchers,
        follow_up_delay: chrono::Duration,
    ) -> Self {
        Self {
            runner: JobRunner {
                db,
                generator,
                dispatchers,
            },
            follow_up_delay,
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The four touchpoint jobs for a registration. Nothing is stored or
    /// armed here; the caller persists them with the registration first.
    pub fn plan(&self, registration: &Registration, event: &Event) -> Vec<ScheduledJob> {
        plan_touchpoints(
            registration.registered_at,
            event.starts_at,
            event.ends_at,
            self.follow_up_delay,
            Utc::now(),
        )
        .into_iter()
        .map(|(touchpoint, fire_at)| ScheduledJob::new(registration.id, touchpoint, fire_at))
        .collect()
    }

    /// Arm jobs that are already committed to the store.
    pub async fn arm_all(&self, jobs: &[ScheduledJob]) {
        for job in jobs {
            self.arm(job).await;
        }
        if let Some(first) = jobs.first() {
            info!(
                registration_id = %first.registration_id,
                "Scheduled {} notifications",
                jobs.len()
            );
        }
    }

    /// Re-arm every job still pending in the store. Returns how many were armed.
    pub async fn recover_pending(&self) -> Result<usize, DatabaseError> {
        let pending = self.runner.db.list_pending_jobs().await?;
        for job in &pending {
            self.arm(job).await;
        }
        if !pending.is_empty() {
            info!(count = pending.len(), "Re-armed pending notifications");
        }
        Ok(pending.len())
    }

    /// Spawn the task for one job. Overdue jobs fire immediately.
    async fn arm(&self, job: &ScheduledJob) {
        // Held across spawn so a job that fires at once cannot remove itself
        // before it has been inserted.
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return;
        }

        let delay = (job.fire_at - Utc::now()).to_std().unwrap_or_default();
        let runner = self.runner.clone();
        let table = Arc::clone(&self.jobs);
        let job_id = job.id;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            runner.fire(job_id).await;
            table.write().await.remove(&job_id);
        });

        debug!(job_id = %job.id, touchpoint = %job.touchpoint, fire_at = %job.fire_at, "Job armed");
        jobs.insert(
            job.id,
            TrackedJob {
                handle,
                fire_at: job.fire_at,
            },
        );
    }

    /// Check if a job is armed and has not fired yet.
    pub async fn is_armed(&self, job_id: Uuid) -> bool {
        self.jobs.read().await.contains_key(&job_id)
    }

    /// Get count of armed jobs.
    pub async fn armed_count(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Earliest fire time among armed jobs.
    pub async fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        self.jobs.read().await.values().map(|j| j.fire_at).min()
    }

    /// Abort all armed jobs. Their rows stay pending and are recovered on next start.
    pub async fn shutdown(&self) {
        let mut jobs = self.jobs.write().await;
        let count = jobs.len();
        for (_, tracked) in jobs.drain() {
            tracked.handle.abort();
        }
        info!(count, "Scheduler stopped");
    }
}
