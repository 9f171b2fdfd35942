//! Embedded schema migrations, tracked in `schema_version`.
//!
//! Pending migrations are applied together in one immediate transaction, so
//! two processes opening a fresh file race on the write lock rather than on
//! half-created tables. A populated file is copied aside before it changes.

use rusqlite::{Connection, DatabaseName, Transaction, TransactionBehavior};

use crate::db::DbError;

struct Migration {
    version: i32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("migrations/001_baseline.sql"),
}];

const SCHEMA_VERSION_DDL: &str = "CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);";

fn current_version(conn: &Connection) -> Result<i32, DbError> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?)
}

/// Copy a populated database to `<path>.v<current>.bak`. In-memory databases
/// and fresh files have nothing worth keeping.
fn backup_before_migration(conn: &Connection, current: i32) -> Result<(), DbError> {
    if current == 0 {
        return Ok(());
    }
    let Some(path) = conn.path().filter(|p| !p.is_empty()) else {
        return Ok(());
    };
    let backup_path = format!("{}.v{}.bak", path, current);
    conn.backup(DatabaseName::Main, &backup_path, None)?;
    log::info!("Schema v{} backed up to {}", current, backup_path);
    Ok(())
}

/// Apply every migration newer than the database. Returns how many ran.
pub fn run_migrations(conn: &Connection) -> Result<usize, DbError> {
    apply(conn, MIGRATIONS)
}

fn apply(conn: &Connection, migrations: &[Migration]) -> Result<usize, DbError> {
    conn.execute_batch(SCHEMA_VERSION_DDL)?;
    let latest = migrations.last().map_or(0, |m| m.version);

    let seen = current_version(conn)?;
    if seen >= latest {
        if seen > latest {
            return Err(DbError::Migration(format!(
                "database is at schema v{} but learnloop only knows v{}",
                seen, latest
            )));
        }
        return Ok(0);
    }
    backup_before_migration(conn, seen)?;

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    // Another opener may have migrated while we waited for the lock
    let current = current_version(&tx)?;
    let mut applied = 0;
    for migration in migrations.iter().filter(|m| m.version > current) {
        tx.execute_batch(migration.sql).map_err(|e| {
            DbError::Migration(format!("v{} failed: {}", migration.version, e))
        })?;
        tx.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [migration.version],
        )?;
        applied += 1;
    }
    tx.commit()?;

    if applied > 0 {
        log::info!("Schema migrated from v{} to v{}", current, latest);
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db_path;

    fn mem_db() -> Connection {
        Connection::open_in_memory().expect("in-memory db")
    }

    #[test]
    fn test_fresh_db_applies_baseline() {
        let conn = mem_db();
        assert_eq!(run_migrations(&conn).unwrap(), 1);
        assert_eq!(current_version(&conn).unwrap(), 1);

        for table in [
            "answer_events",
            "submissions",
            "resources",
            "resource_concepts",
            "adaptive_rules",
            "recommendations",
            "learning_logs",
            "bandit_params",
        ] {
            let count: i32 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                .unwrap_or_else(|e| panic!("{} table should exist: {}", table, e));
            assert_eq!(count, 0);
        }
    }

    #[test]
    fn test_rerun_is_noop() {
        let conn = mem_db();
        run_migrations(&conn).unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), 0);
    }

    #[test]
    fn test_future_version_refused() {
        let conn = mem_db();
        run_migrations(&conn).unwrap();
        conn.execute("INSERT INTO schema_version (version) VALUES (99)", [])
            .unwrap();
        assert!(matches!(run_migrations(&conn), Err(DbError::Migration(_))));
    }

    #[test]
    fn test_failed_migration_applies_nothing() {
        let conn = mem_db();
        let broken = [
            Migration {
                version: 1,
                sql: "CREATE TABLE kept_out (id INTEGER);",
            },
            Migration {
                version: 2,
                sql: "CREATE TABLE oops (",
            },
        ];
        assert!(matches!(apply(&conn, &broken), Err(DbError::Migration(_))));
        assert_eq!(current_version(&conn).unwrap(), 0);
        let tables: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'kept_out'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 0);
    }

    #[test]
    fn test_populated_file_is_backed_up_before_upgrade() {
        let path = test_db_path();
        let conn = Connection::open(&path).unwrap();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO resources (id, title, url, created_at) VALUES (1, 't', 'u', '2025-01-01')",
            [],
        )
        .unwrap();

        let next = [
            Migration {
                version: 1,
                sql: MIGRATIONS[0].sql,
            },
            Migration {
                version: 2,
                sql: "ALTER TABLE resources ADD COLUMN author TEXT;",
            },
        ];
        assert_eq!(apply(&conn, &next).unwrap(), 1);

        let backup = Connection::open(format!("{}.v1.bak", path.display())).unwrap();
        let (version, rows): (i32, i32) = backup
            .query_row(
                "SELECT (SELECT MAX(version) FROM schema_version), (SELECT COUNT(*) FROM resources)",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!((version, rows), (1, 1));
    }

    #[test]
    fn test_active_recommendation_unique_index() {
        let conn = mem_db();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO resources (id, title, url, created_at) VALUES (1, 't', 'u', '2025-01-01')",
            [],
        )
        .unwrap();
        let insert = "INSERT INTO recommendations
            (student_id, concept, reason, priority, resource_id, selected_by, status, created_at, updated_at)
            VALUES (1, 'Loops', 'r', 'high', 1, 'bandit', ?1, '2025-01-01', '2025-01-01')";
        conn.execute(insert, ["active"]).unwrap();
        assert!(conn.execute(insert, ["active"]).is_err());
        // Completed rows do not collide with the active one
        conn.execute(insert, ["completed"]).unwrap();
    }
}
