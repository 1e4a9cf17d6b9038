//! Registration: binds a user to an event and schedules its touchpoints.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::{DatabaseError, RegistrationError};
use crate::events::model::Event;
use crate::store::Database;
use crate::users::interests;
use crate::workflow::model::{Registration, ScheduledJob};
use crate::workflow::scheduler::NotificationScheduler;

/// What a successful registration produced.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationOutcome {
    pub registration: Registration,
    pub event: Event,
    pub jobs: Vec<ScheduledJob>,
    /// Tags merged into the user's interest profile.
    pub interests_added: BTreeSet<String>,
}

pub struct RegistrationService {
    db: Arc<dyn Database>,
    scheduler: Arc<NotificationScheduler>,
}

impl RegistrationService {
    pub fn new(db: Arc<dyn Database>, scheduler: Arc<NotificationScheduler>) -> Self {
        Self { db, scheduler }
    }

    /// Register `user_id` for `event_id`.
    ///
    /// The registration, its four jobs, and the refreshed interest profile
    /// are committed together; jobs are armed only after the commit, so the
    /// welcome message already sees the new interests. The profile merge is
    /// read/modify/write: two concurrent registrations by the same user can
    /// lose one merge.
    pub async fn register(
        &self,
        user_id: Uuid,
        event_id: Uuid,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        let mut user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or_else(|| RegistrationError::NotFound {
                entity: "user".into(),
                id: user_id.to_string(),
            })?;
        let event = self
            .db
            .get_event(event_id)
            .await?
            .ok_or_else(|| RegistrationError::NotFound {
                entity: "event".into(),
                id: event_id.to_string(),
            })?;

        let registration = Registration::new(user_id, event_id);
        let jobs = self.scheduler.plan(&registration, &event);
        let tags = interests::extract_tags(&event.text());
        interests::merge(&mut user.interests, &tags);

        match self
            .db
            .insert_registration_with_jobs(&registration, &jobs, &user.interests)
            .await
        {
            Ok(()) => {}
            // A job constraint also lands here; only an existing row means a duplicate.
            Err(DatabaseError::Constraint(reason)) => {
                if self.db.find_registration(user_id, event_id).await?.is_some() {
                    return Err(RegistrationError::AlreadyRegistered {
                        user_id: user_id.to_string(),
                        event_id: event_id.to_string(),
                    });
                }
                return Err(DatabaseError::Constraint(reason).into());
            }
            Err(e) => return Err(e.into()),
        }

        self.scheduler.arm_all(&jobs).await;

        info!(
            user_id = %user_id,
            event_id = %event_id,
            tags = ?tags,
            "User registered for event"
        );

        Ok(RegistrationOutcome {
            registration,
            event,
            jobs,
            interests_added: tags,
        })
    }
}
