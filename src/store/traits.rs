//! Unified `Database` trait: single async interface for all persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::events::model::Event;
use crate::users::model::{ContactChannel, InterestProfile, NewUser, User, UserRole};
use crate::workflow::model::{JobStatus, Registration, ScheduledJob};

/// Backend-agnostic database trait covering users, events, registrations, and jobs.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    /// Insert a user. The role is decided atomically from the current user
    /// count: the first user is an admin, everyone else is regular.
    ///
    /// Fails with `Constraint` when the email is already taken.
    async fn create_user(&self, user: &NewUser) -> Result<User, DatabaseError>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError>;

    async fn count_users(&self) -> Result<i64, DatabaseError>;

    /// Change a user's role. `NotFound` if the user does not exist.
    async fn set_user_role(&self, id: Uuid, role: UserRole) -> Result<(), DatabaseError>;

    async fn update_user_contact(
        &self,
        id: Uuid,
        channel: ContactChannel,
        chat_id: Option<&str>,
    ) -> Result<(), DatabaseError>;

    // ── Events ──────────────────────────────────────────────────────

    async fn insert_event(&self, event: &Event) -> Result<(), DatabaseError>;

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>, DatabaseError>;

    /// Persist an edited event. `NotFound` if the event does not exist.
    async fn update_event(&self, event: &Event) -> Result<(), DatabaseError>;

    /// All events ordered by start time.
    async fn list_events(&self) -> Result<Vec<Event>, DatabaseError>;

    /// Case-insensitive exact name lookup; earliest start wins on duplicates.
    async fn find_event_by_name(&self, name: &str) -> Result<Option<Event>, DatabaseError>;

    async fn count_events(&self) -> Result<i64, DatabaseError>;

    // ── Registrations ───────────────────────────────────────────────

    /// Write a registration, its scheduled jobs, and the registrant's
    /// refreshed interest profile in one transaction. Nothing is kept if any
    /// statement fails.
    ///
    /// Fails with `Constraint` when the user is already registered for the
    /// event or two jobs share a touchpoint.
    async fn insert_registration_with_jobs(
        &self,
        registration: &Registration,
        jobs: &[ScheduledJob],
        interests: &InterestProfile,
    ) -> Result<(), DatabaseError>;

    async fn get_registration(&self, id: Uuid) -> Result<Option<Registration>, DatabaseError>;

    async fn find_registration(
        &self,
        user_id: Uuid,
        event_id: Uuid,
    ) -> Result<Option<Registration>, DatabaseError>;

    /// A user's registrations, oldest first.
    async fn list_registrations_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Registration>, DatabaseError>;

    // ── Scheduled jobs ──────────────────────────────────────────────

    async fn get_scheduled_job(&self, id: Uuid) -> Result<Option<ScheduledJob>, DatabaseError>;

    /// Jobs derived from a registration, in fire order.
    async fn list_jobs_for_registration(
        &self,
        registration_id: Uuid,
    ) -> Result<Vec<ScheduledJob>, DatabaseError>;

    /// Every job still waiting to fire, in fire order.
    async fn list_pending_jobs(&self) -> Result<Vec<ScheduledJob>, DatabaseError>;

    /// Record the outcome of a fired job.
    async fn complete_job(
        &self,
        id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), DatabaseError>;
}
