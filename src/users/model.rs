//! User data model and the interest profile.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Access level. The first user ever created is an admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Regular,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Regular => write!(f, "regular"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "regular" => Ok(Self::Regular),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// Which channel notifications go out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContactChannel {
    #[default]
    Email,
    Chat,
}

impl std::fmt::Display for ContactChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Email => write!(f, "email"),
            Self::Chat => write!(f, "chat"),
        }
    }
}

impl std::str::FromStr for ContactChannel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "chat" => Ok(Self::Chat),
            _ => Err(format!("Unknown contact channel: {}", s)),
        }
    }
}

/// Per-user mapping of keyword tag to accumulated count.
///
/// Grows for the lifetime of the user; nothing decays or is evicted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterestProfile(BTreeMap<String, u32>);

impl InterestProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter of every tag by one. Unrelated tags are untouched.
    pub fn merge<'a, I>(&mut self, tags: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        for tag in tags {
            *self.0.entry(tag.clone()).or_insert(0) += 1;
        }
    }

    pub fn count(&self, tag: &str) -> u32 {
        self.0.get(tag).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The `n` heaviest tags, heaviest first, ties alphabetical.
    pub fn top(&self, n: usize) -> Vec<&str> {
        let mut entries: Vec<(&String, &u32)> = self.0.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        entries.into_iter().take(n).map(|(t, _)| t.as_str()).collect()
    }
}

/// A persisted user.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub job_title: Option<String>,
    pub role: UserRole,
    pub interests: InterestProfile,
    pub preferred_channel: ContactChannel,
    /// Destination on the chat channel (Telegram chat id).
    pub chat_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Fields needed to create a user. The role is decided by the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub job_title: Option<String>,
}
