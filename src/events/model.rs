//! Event data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where an event record came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventSource {
    Manual,
    Imported { url: String },
}

impl EventSource {
    /// The string tag stored in the DB `source` column.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Imported { .. } => "imported",
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Manual => None,
            Self::Imported { url } => Some(url),
        }
    }

    /// Rebuild from the DB columns.
    pub fn from_db(tag: &str, url: Option<String>) -> Self {
        match (tag, url) {
            ("imported", Some(url)) => Self::Imported { url },
            _ => Self::Manual,
        }
    }
}

/// A persisted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub source: EventSource,
    /// Admin who created the event.
    pub owner_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Name and description joined, for keyword extraction.
    pub fn text(&self) -> String {
        format!("{}\n{}", self.name, self.description)
    }
}

/// Fields needed to create an event.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub name: String,
    pub description: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub source: EventSource,
    pub owner_id: Uuid,
    pub recording_url: Option<String>,
}

impl NewEvent {
    /// Check field-level invariants before insert.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("event name must not be empty".to_string());
        }
        if self.ends_at < self.starts_at {
            return Err("event end time must not precede its start time".to_string());
        }
        Ok(())
    }

    pub fn into_event(self) -> Event {
        Event {
            id: Uuid::new_v4(),
            name: self.name,
            description: self.description,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            source: self.source,
            owner_id: self.owner_id,
            recording_url: self.recording_url,
            created_at: Utc::now(),
        }
    }
}

/// Partial update applied by an admin edit. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub recording_url: Option<String>,
}

impl EventUpdate {
    /// Apply onto an existing event, returning the edited copy.
    pub fn apply(self, mut event: Event) -> Result<Event, String> {
        if let Some(name) = self.name {
            if name.trim().is_empty() {
                return Err("event name must not be empty".to_string());
            }
            event.name = name;
        }
        if let Some(description) = self.description {
            event.description = description;
        }
        if let Some(starts_at) = self.starts_at {
            event.starts_at = starts_at;
        }
        if let Some(ends_at) = self.ends_at {
            event.ends_at = ends_at;
        }
        if let Some(url) = self.recording_url {
            event.recording_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if event.ends_at < event.starts_at {
            return Err("event end time must not precede its start time".to_string());
        }
        Ok(event)
    }
}
