//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::events::model::{Event, EventSource};
use crate::store::migrations;
use crate::store::traits::Database;
use crate::users::model::{ContactChannel, InterestProfile, NewUser, User, UserRole};
use crate::workflow::model::{JobStatus, Registration, ScheduledJob, Touchpoint};

/// libSQL database backend.
///
/// One connection serves every operation. Single statements share it
/// through a read lock; a multi-statement transaction takes the write lock
/// so no other statement can land inside it.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: RwLock<Connection>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn: RwLock::new(conn),
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn: RwLock::new(conn),
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Shared access to the connection for a single statement.
    async fn conn(&self) -> RwLockReadGuard<'_, Connection> {
        self.conn.read().await
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Map a write error, surfacing unique-constraint failures as `Constraint`.
fn write_error(op: &str, e: libsql::Error) -> DatabaseError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint(format!("{op}: {msg}"))
    } else {
        DatabaseError::Query(format!("{op}: {msg}"))
    }
}

const USER_COLUMNS: &str =
    "id, email, name, password_hash, job_title, role, interests, preferred_channel, chat_id, created_at";

const EVENT_COLUMNS: &str = "id, name, description, starts_at, ends_at, source, source_url, owner_id, recording_url, created_at";

const REGISTRATION_COLUMNS: &str = "id, user_id, event_id, registered_at";

const JOB_COLUMNS: &str =
    "id, registration_id, touchpoint, fire_at, status, last_error, created_at, updated_at";

/// Map a libsql Row to a User. Column order matches USER_COLUMNS.
fn row_to_user(row: &libsql::Row) -> Result<User, libsql::Error> {
    let id_str: String = row.get(0)?;
    let role_str: String = row.get(5)?;
    let interests_str: String = row.get::<String>(6).unwrap_or_else(|_| "{}".into());
    let channel_str: String = row.get(7)?;
    let created_str: String = row.get(9)?;

    Ok(User {
        id: parse_uuid(&id_str),
        email: row.get(1)?,
        name: row.get(2)?,
        password_hash: row.get(3)?,
        job_title: row.get::<String>(4).ok(),
        role: role_str.parse().unwrap_or(UserRole::Regular),
        interests: serde_json::from_str(&interests_str).unwrap_or_default(),
        preferred_channel: channel_str.parse().unwrap_or_default(),
        chat_id: row.get::<String>(8).ok(),
        created_at: parse_datetime(&created_str),
    })
}

/// Map a libsql Row to an Event. Column order matches EVENT_COLUMNS.
fn row_to_event(row: &libsql::Row) -> Result<Event, libsql::Error> {
    let id_str: String = row.get(0)?;
    let starts_str: String = row.get(3)?;
    let ends_str: String = row.get(4)?;
    let source_str: String = row.get(5)?;
    let owner_str: String = row.get(7)?;
    let created_str: String = row.get(9)?;

    Ok(Event {
        id: parse_uuid(&id_str),
        name: row.get(1)?,
        description: row.get::<String>(2).unwrap_or_default(),
        starts_at: parse_datetime(&starts_str),
        ends_at: parse_datetime(&ends_str),
        source: EventSource::from_db(&source_str, row.get::<String>(6).ok()),
        owner_id: parse_uuid(&owner_str),
        recording_url: row.get::<String>(8).ok(),
        created_at: parse_datetime(&created_str),
    })
}

fn row_to_registration(row: &libsql::Row) -> Result<Registration, libsql::Error> {
    let id_str: String = row.get(0)?;
    let user_str: String = row.get(1)?;
    let event_str: String = row.get(2)?;
    let registered_str: String = row.get(3)?;

    Ok(Registration {
        id: parse_uuid(&id_str),
        user_id: parse_uuid(&user_str),
        event_id: parse_uuid(&event_str),
        registered_at: parse_datetime(&registered_str),
    })
}

/// Map a libsql Row to a ScheduledJob. Column order matches JOB_COLUMNS.
fn row_to_job(row: &libsql::Row) -> Result<ScheduledJob, libsql::Error> {
    let id_str: String = row.get(0)?;
    let registration_str: String = row.get(1)?;
    let touchpoint_str: String = row.get(2)?;
    let fire_str: String = row.get(3)?;
    let status_str: String = row.get(4)?;
    let created_str: String = row.get(6)?;
    let updated_str: String = row.get(7)?;

    Ok(ScheduledJob {
        id: parse_uuid(&id_str),
        registration_id: parse_uuid(&registration_str),
        touchpoint: touchpoint_str.parse().unwrap_or(Touchpoint::Welcome),
        fire_at: parse_datetime(&fire_str),
        status: status_str.parse().unwrap_or(JobStatus::Failed),
        last_error: row.get::<String>(5).ok(),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// The statements behind `insert_registration_with_jobs`; the caller owns the transaction.
async fn write_registration(
    conn: &Connection,
    registration: &Registration,
    jobs: &[ScheduledJob],
    interests_json: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO registrations (id, user_id, event_id, registered_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            registration.id.to_string(),
            registration.user_id.to_string(),
            registration.event_id.to_string(),
            registration.registered_at.to_rfc3339(),
        ],
    )
    .await
    .map_err(|e| write_error("insert_registration", e))?;

    for job in jobs {
        conn.execute(
            "INSERT INTO scheduled_jobs (id, registration_id, touchpoint, fire_at, status, last_error, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                job.id.to_string(),
                job.registration_id.to_string(),
                job.touchpoint.as_str(),
                job.fire_at.to_rfc3339(),
                job.status.to_string(),
                opt_text(job.last_error.as_deref()),
                job.created_at.to_rfc3339(),
                job.updated_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| write_error("insert_scheduled_job", e))?;
    }

    let affected = conn
        .execute(
            "UPDATE users SET interests = ?1 WHERE id = ?2",
            params![interests_json, registration.user_id.to_string()],
        )
        .await
        .map_err(|e| write_error("update_user_interests", e))?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity: "user".into(),
            id: registration.user_id.to_string(),
        });
    }
    Ok(())
}

// ── Trait implementation ────────────────────────────────────────────

impl LibSqlBackend {
    async fn query_one<T>(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
        map: fn(&libsql::Row) -> Result<T, libsql::Error>,
    ) -> Result<Option<T>, DatabaseError> {
        let mut rows = self
            .conn()
            .await
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value =
                    map(&row).map_err(|e| DatabaseError::Query(format!("{op} row parse: {e}")))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
        }
    }

    async fn query_all<T>(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
        map: fn(&libsql::Row) -> Result<T, libsql::Error>,
    ) -> Result<Vec<T>, DatabaseError> {
        let mut rows = self
            .conn()
            .await
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut out = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match map(&row) {
                Ok(value) => out.push(value),
                Err(e) => tracing::warn!("{op}: skipping row: {e}"),
            }
        }
        Ok(out)
    }

    async fn count(&self, op: &str, sql: &str) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .await
            .query(sql, ())
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;
        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map_err(|e| DatabaseError::Query(format!("{op}: {e}"))),
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
        }
    }
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(&*self.conn().await).await
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn create_user(&self, user: &NewUser) -> Result<User, DatabaseError> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();

        // Role comes from the row count inside the same statement, so the
        // first-user check survives restarts and needs no in-memory flag.
        self.conn()
            .await
            .execute(
                "INSERT INTO users (id, email, name, password_hash, job_title, role, interests, preferred_channel, chat_id, created_at)
                 SELECT ?1, ?2, ?3, ?4, ?5,
                        CASE WHEN COUNT(*) = 0 THEN 'admin' ELSE 'regular' END,
                        '{}', 'email', NULL, ?6
                 FROM users",
                params![
                    id.to_string(),
                    user.email.clone(),
                    user.name.clone(),
                    user.password_hash.clone(),
                    opt_text(user.job_title.as_deref()),
                    now,
                ],
            )
            .await
            .map_err(|e| write_error("create_user", e))?;

        let created = self.get_user(id).await?.ok_or_else(|| DatabaseError::NotFound {
            entity: "user".into(),
            id: id.to_string(),
        })?;
        debug!(user_id = %id, role = %created.role, "User inserted into DB");
        Ok(created)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        self.query_one(
            "get_user",
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id.to_string()],
            row_to_user,
        )
        .await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        self.query_one(
            "get_user_by_email",
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            params![email],
            row_to_user,
        )
        .await
    }

    async fn count_users(&self) -> Result<i64, DatabaseError> {
        self.count("count_users", "SELECT COUNT(*) FROM users").await
    }

    async fn set_user_role(&self, id: Uuid, role: UserRole) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .await
            .execute(
                "UPDATE users SET role = ?1 WHERE id = ?2",
                params![role.to_string(), id.to_string()],
            )
            .await
            .map_err(|e| write_error("set_user_role", e))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "user".into(),
                id: id.to_string(),
            });
        }
        debug!(user_id = %id, role = %role, "User role updated");
        Ok(())
    }

    async fn update_user_contact(
        &self,
        id: Uuid,
        channel: ContactChannel,
        chat_id: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .await
            .execute(
                "UPDATE users SET preferred_channel = ?1, chat_id = ?2 WHERE id = ?3",
                params![channel.to_string(), opt_text(chat_id), id.to_string()],
            )
            .await
            .map_err(|e| write_error("update_user_contact", e))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "user".into(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // ── Events ──────────────────────────────────────────────────────

    async fn insert_event(&self, event: &Event) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .await
            .execute(
                "INSERT INTO events (id, name, description, starts_at, ends_at, source, source_url, owner_id, recording_url, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    event.id.to_string(),
                    event.name.clone(),
                    event.description.clone(),
                    event.starts_at.to_rfc3339(),
                    event.ends_at.to_rfc3339(),
                    event.source.type_tag(),
                    opt_text(event.source.url()),
                    event.owner_id.to_string(),
                    opt_text(event.recording_url.as_deref()),
                    event.created_at.to_rfc3339(),
                    now,
                ],
            )
            .await
            .map_err(|e| write_error("insert_event", e))?;

        debug!(event_id = %event.id, source = event.source.type_tag(), "Event inserted into DB");
        Ok(())
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>, DatabaseError> {
        self.query_one(
            "get_event",
            &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
            params![id.to_string()],
            row_to_event,
        )
        .await
    }

    async fn update_event(&self, event: &Event) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn()
            .await
            .execute(
                "UPDATE events SET name = ?1, description = ?2, starts_at = ?3, ends_at = ?4, recording_url = ?5, updated_at = ?6 WHERE id = ?7",
                params![
                    event.name.clone(),
                    event.description.clone(),
                    event.starts_at.to_rfc3339(),
                    event.ends_at.to_rfc3339(),
                    opt_text(event.recording_url.as_deref()),
                    now,
                    event.id.to_string(),
                ],
            )
            .await
            .map_err(|e| write_error("update_event", e))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "event".into(),
                id: event.id.to_string(),
            });
        }
        debug!(event_id = %event.id, "Event updated in DB");
        Ok(())
    }

    async fn list_events(&self) -> Result<Vec<Event>, DatabaseError> {
        self.query_all(
            "list_events",
            &format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY starts_at ASC"),
            (),
            row_to_event,
        )
        .await
    }

    async fn find_event_by_name(&self, name: &str) -> Result<Option<Event>, DatabaseError> {
        self.query_one(
            "find_event_by_name",
            &format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE LOWER(name) = LOWER(?1) ORDER BY starts_at ASC LIMIT 1"
            ),
            params![name.trim()],
            row_to_event,
        )
        .await
    }

    async fn count_events(&self) -> Result<i64, DatabaseError> {
        self.count("count_events", "SELECT COUNT(*) FROM events").await
    }

    // ── Registrations ───────────────────────────────────────────────

    async fn insert_registration_with_jobs(
        &self,
        registration: &Registration,
        jobs: &[ScheduledJob],
        interests: &InterestProfile,
    ) -> Result<(), DatabaseError> {
        let interests_json = serde_json::to_string(interests)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        let conn = self.conn.write().await;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("begin registration: {e}")))?;

        let written = write_registration(&tx, registration, jobs, &interests_json).await;
        match written {
            Ok(()) => tx
                .commit()
                .await
                .map_err(|e| write_error("commit registration", e))?,
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(registration_id = %registration.id, error = %rollback, "Rollback failed");
                }
                return Err(e);
            }
        }

        debug!(
            registration_id = %registration.id,
            user_id = %registration.user_id,
            event_id = %registration.event_id,
            jobs = jobs.len(),
            "Registration committed"
        );
        Ok(())
    }

    async fn get_registration(&self, id: Uuid) -> Result<Option<Registration>, DatabaseError> {
        self.query_one(
            "get_registration",
            &format!("SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE id = ?1"),
            params![id.to_string()],
            row_to_registration,
        )
        .await
    }

    async fn find_registration(
        &self,
        user_id: Uuid,
        event_id: Uuid,
    ) -> Result<Option<Registration>, DatabaseError> {
        self.query_one(
            "find_registration",
            &format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE user_id = ?1 AND event_id = ?2"
            ),
            params![user_id.to_string(), event_id.to_string()],
            row_to_registration,
        )
        .await
    }

    async fn list_registrations_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Registration>, DatabaseError> {
        self.query_all(
            "list_registrations_for_user",
            &format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE user_id = ?1 ORDER BY registered_at ASC"
            ),
            params![user_id.to_string()],
            row_to_registration,
        )
        .await
    }

    // ── Scheduled jobs ──────────────────────────────────────────────

    async fn get_scheduled_job(&self, id: Uuid) -> Result<Option<ScheduledJob>, DatabaseError> {
        self.query_one(
            "get_scheduled_job",
            &format!("SELECT {JOB_COLUMNS} FROM scheduled_jobs WHERE id = ?1"),
            params![id.to_string()],
            row_to_job,
        )
        .await
    }

    async fn list_jobs_for_registration(
        &self,
        registration_id: Uuid,
    ) -> Result<Vec<ScheduledJob>, DatabaseError> {
        self.query_all(
            "list_jobs_for_registration",
            &format!(
                "SELECT {JOB_COLUMNS} FROM scheduled_jobs WHERE registration_id = ?1 ORDER BY fire_at ASC, created_at ASC"
            ),
            params![registration_id.to_string()],
            row_to_job,
        )
        .await
    }

    async fn list_pending_jobs(&self) -> Result<Vec<ScheduledJob>, DatabaseError> {
        self.query_all(
            "list_pending_jobs",
            &format!(
                "SELECT {JOB_COLUMNS} FROM scheduled_jobs WHERE status = 'pending' ORDER BY fire_at ASC"
            ),
            (),
            row_to_job,
        )
        .await
    }

    async fn complete_job(
        &self,
        id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn()
            .await
            .execute(
                "UPDATE scheduled_jobs SET status = ?1, last_error = ?2, updated_at = ?3 WHERE id = ?4",
                params![status.to_string(), opt_text(error), now, id.to_string()],
            )
            .await
            .map_err(|e| write_error("complete_job", e))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "scheduled_job".into(),
                id: id.to_string(),
            });
        }
        debug!(job_id = %id, status = %status, "Job outcome recorded");
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
