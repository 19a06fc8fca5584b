use anyhow::{Context, Result};
use rusqlite::Connection;

struct Migration {
    version: &'static str,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "001",
        name: "initial",
        sql: include_str!("migrations/001_initial.sql"),
    },
    Migration {
        version: "002",
        name: "progress_views",
        sql: include_str!("migrations/002_progress_views.sql"),
    },
];

/// Apply every migration not yet recorded in `schema_migrations`, in version
/// order. Each migration and its bookkeeping row commit together.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )
    .context("Failed to create schema_migrations table")?;

    let applied = get_applied_migrations(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|m| !applied.iter().any(|v| v == m.version))
        .collect();

    if pending.is_empty() {
        tracing::debug!("Schema is up to date");
    }
    for migration in pending {
        apply_migration(conn, migration)?;
    }

    Ok(())
}

fn get_applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(versions)
}

fn apply_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    let context = || format!("Failed to apply migration {}_{}", migration.version, migration.name);
    tracing::info!("Applying migration {}_{}", migration.version, migration.name);

    let tx = conn.unchecked_transaction().with_context(context)?;
    tx.execute_batch(migration.sql).with_context(context)?;
    tx.execute(
        "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)",
        (
            migration.version,
            migration.name,
            chrono::Utc::now().to_rfc3339(),
        ),
    )
    .with_context(context)?;
    tx.commit().with_context(context)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_objects(conn: &Connection, kind: &str) -> i32 {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = ? AND name IN
             ('epics', 'stories', 'tasks', 'subtasks', 'epic_progress', 'overall_progress', 'current_work')",
            [kind],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        assert_eq!(count_objects(&conn, "table"), 4);
        assert_eq!(count_objects(&conn, "view"), 3);

        let versions = get_applied_migrations(&conn).unwrap();
        assert_eq!(versions, vec!["001", "002"]);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let versions = get_applied_migrations(&conn).unwrap();
        assert_eq!(versions, vec!["001", "002"]);
    }

    #[test]
    fn test_check_constraints_reject_unknown_status() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO epics (id, title, status, created_at) VALUES ('E1', 'Setup', 'STARTED', '')",
            [],
        );
        assert!(result.is_err());
    }
}
