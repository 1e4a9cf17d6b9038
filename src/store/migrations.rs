//! Schema migrations for the libSQL backend.
//!
//! Each step runs inside its own transaction together with the row that
//! records it in `schema_version`, so a crash mid-upgrade leaves the store
//! at the previous version.

use libsql::Connection;

use crate::error::DatabaseError;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Append only; never edit a released step.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                job_title TEXT,
                role TEXT NOT NULL DEFAULT 'regular',
                interests TEXT NOT NULL DEFAULT '{}',
                preferred_channel TEXT NOT NULL DEFAULT 'email',
                chat_id TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);

            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                starts_at TEXT NOT NULL,
                ends_at TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT 'manual',
                source_url TEXT,
                owner_id TEXT NOT NULL REFERENCES users(id),
                recording_url TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_starts_at ON events(starts_at);
            CREATE INDEX IF NOT EXISTS idx_events_name ON events(name);

            CREATE TABLE IF NOT EXISTS registrations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                event_id TEXT NOT NULL REFERENCES events(id),
                registered_at TEXT NOT NULL,
                UNIQUE (user_id, event_id)
            );
            CREATE INDEX IF NOT EXISTS idx_registrations_user ON registrations(user_id);
            CREATE INDEX IF NOT EXISTS idx_registrations_event ON registrations(event_id);
        "#,
    },
    Migration {
        version: 2,
        name: "scheduled_jobs",
        sql: r#"
            CREATE TABLE IF NOT EXISTS scheduled_jobs (
                id TEXT PRIMARY KEY,
                registration_id TEXT NOT NULL REFERENCES registrations(id) ON DELETE CASCADE,
                touchpoint TEXT NOT NULL,
                fire_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                last_error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (registration_id, touchpoint)
            );
            CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_registration
                ON scheduled_jobs(registration_id);
            CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_status ON scheduled_jobs(status);
        "#,
    },
];

/// Bring the schema up to the latest version.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("cannot create schema_version: {e}")))?;

    let applied = applied_version(conn).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > applied).collect();
    if pending.is_empty() {
        tracing::debug!(version = applied, "Schema up to date");
        return Ok(());
    }

    for step in pending {
        tracing::info!(version = step.version, name = step.name, "Applying migration");
        let batch = format!(
            "BEGIN;\n{sql}\nINSERT INTO schema_version (version, name) VALUES ({version}, '{name}');\nCOMMIT;",
            sql = step.sql,
            version = step.version,
            name = step.name,
        );
        if let Err(e) = conn.execute_batch(&batch).await {
            let _ = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::Migration(format!(
                "V{} {} failed: {e}",
                step.version, step.name
            )));
        }
    }

    Ok(())
}

/// Highest recorded version; 0 for a fresh store.
async fn applied_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;
    let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?
    else {
        return Ok(0);
    };
    row.get::<i64>(0)
        .map_err(|e| DatabaseError::Migration(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_conn() -> Connection {
        libsql::Builder::new_local(":memory:")
            .build()
            .await
            .unwrap()
            .connect()
            .unwrap()
    }

    async fn table_exists(conn: &Connection, table: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                libsql::params![table],
            )
            .await
            .unwrap();
        rows.next().await.unwrap().is_some()
    }

    #[tokio::test]
    async fn fresh_store_reaches_latest_version() {
        let conn = memory_conn().await;
        run_migrations(&conn).await.unwrap();

        for table in ["users", "events", "registrations", "scheduled_jobs"] {
            assert!(table_exists(&conn, table).await, "missing table {table}");
        }
        let latest = MIGRATIONS.last().map(|m| m.version).unwrap();
        assert_eq!(applied_version(&conn).await.unwrap(), latest);
    }

    #[tokio::test]
    async fn rerun_is_a_no_op() {
        let conn = memory_conn().await;
        run_migrations(&conn).await.unwrap();
        run_migrations(&conn).await.unwrap();

        let mut rows = conn
            .query("SELECT COUNT(*) FROM schema_version", ())
            .await
            .unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count as usize, MIGRATIONS.len());
    }

    #[tokio::test]
    async fn upgrades_from_first_version() {
        let conn = memory_conn().await;
        conn.execute(
            "CREATE TABLE schema_version (version INTEGER PRIMARY KEY, name TEXT NOT NULL, \
             applied_at TEXT NOT NULL DEFAULT (datetime('now')))",
            (),
        )
        .await
        .unwrap();
        conn.execute_batch(MIGRATIONS[0].sql).await.unwrap();
        conn.execute(
            "INSERT INTO schema_version (version, name) VALUES (1, 'initial_schema')",
            (),
        )
        .await
        .unwrap();
        assert!(!table_exists(&conn, "scheduled_jobs").await);

        run_migrations(&conn).await.unwrap();
        assert!(table_exists(&conn, "scheduled_jobs").await);
        assert_eq!(applied_version(&conn).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn pair_uniqueness_is_enforced() {
        let conn = memory_conn().await;
        run_migrations(&conn).await.unwrap();
        conn.execute_batch(
            "INSERT INTO users (id, email, name, password_hash, created_at) \
                 VALUES ('u1', 'a@example.com', 'A', 'x', '2030-01-01T00:00:00Z');
             INSERT INTO events (id, name, starts_at, ends_at, owner_id, created_at, updated_at) \
                 VALUES ('e1', 'E', '2030-01-02T00:00:00Z', '2030-01-02T01:00:00Z', 'u1', \
                 '2030-01-01T00:00:00Z', '2030-01-01T00:00:00Z');
             INSERT INTO registrations (id, user_id, event_id, registered_at) \
                 VALUES ('r1', 'u1', 'e1', '2030-01-01T00:00:00Z');",
        )
        .await
        .unwrap();

        let dup = conn
            .execute(
                "INSERT INTO registrations (id, user_id, event_id, registered_at) \
                 VALUES ('r2', 'u1', 'e1', '2030-01-01T00:00:00Z')",
                (),
            )
            .await;
        assert!(dup.is_err());
    }
}
