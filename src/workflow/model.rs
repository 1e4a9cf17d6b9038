//! Registration, touchpoint, and scheduled-job types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One notification type in the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Touchpoint {
    Welcome,
    #[serde(rename = "reminder_24h")]
    Reminder24h,
    #[serde(rename = "reminder_1h")]
    Reminder1h,
    FollowUp,
}

impl Touchpoint {
    /// Every touchpoint, in firing order.
    pub const ALL: [Touchpoint; 4] = [
        Touchpoint::Welcome,
        Touchpoint::Reminder24h,
        Touchpoint::Reminder1h,
        Touchpoint::FollowUp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::Reminder24h => "reminder_24h",
            Self::Reminder1h => "reminder_1h",
            Self::FollowUp => "follow_up",
        }
    }
}

impl std::fmt::Display for Touchpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Touchpoint {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "welcome" => Ok(Self::Welcome),
            "reminder_24h" => Ok(Self::Reminder24h),
            "reminder_1h" => Ok(Self::Reminder1h),
            "follow_up" => Ok(Self::FollowUp),
            _ => Err(format!("Unknown touchpoint: {}", s)),
        }
    }
}

/// A user's registration for an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub registered_at: DateTime<Utc>,
}

impl Registration {
    pub fn new(user_id: Uuid, event_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            event_id,
            registered_at: Utc::now(),
        }
    }
}

/// Lifecycle of a scheduled notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Armed, waiting for its fire time.
    Pending,
    /// Delivered by the provider.
    Sent,
    /// Rendering or dispatch failed; never retried.
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Sent => write!(f, "sent"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// A persisted one-shot notification job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: Uuid,
    pub registration_id: Uuid,
    pub touchpoint: Touchpoint,
    pub fire_at: DateTime<Utc>,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledJob {
    pub fn new(registration_id: Uuid, touchpoint: Touchpoint, fire_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            registration_id,
            touchpoint,
            fire_at,
            status: JobStatus::Pending,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touchpoint_str_roundtrip() {
        for tp in Touchpoint::ALL {
            assert_eq!(tp.as_str().parse::<Touchpoint>().unwrap(), tp);
        }
        assert!("reminder_2h".parse::<Touchpoint>().is_err());
    }

    #[test]
    fn touchpoint_serde_matches_db_tag() {
        let json = serde_json::to_string(&Touchpoint::Reminder24h).unwrap();
        assert_eq!(json, "\"reminder_24h\"");
    }

    #[test]
    fn new_job_starts_pending() {
        let job = ScheduledJob::new(Uuid::new_v4(), Touchpoint::Welcome, Utc::now());
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.last_error.is_none());
    }
}
