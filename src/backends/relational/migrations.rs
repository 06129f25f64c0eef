//! Migration script runner for the relational backend.
//!
//! Scripts are plain `.sql` files applied in file-name order; lexicographic
//! naming (`0001_initial.sql`, `0002_add_index.sql`) is the ordering
//! contract. Applied script names are recorded in the `_migrations` table so
//! reruns are no-ops.

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{BackendError, RepositoryResult};

const BOOKKEEPING_TABLE: &str = "_migrations";

/// Applies every pending `.sql` script from `directory`.
pub(crate) fn apply(connection: &Connection, directory: &Path) -> RepositoryResult<()> {
    connection.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\"name\" TEXT PRIMARY KEY, \"applied_at\" TEXT NOT NULL)",
            BOOKKEEPING_TABLE
        ),
        [],
    )?;

    let mut applied = 0usize;
    for name in script_names(directory)? {
        if is_applied(connection, &name)? {
            debug!(script = %name, "migration already applied");
            continue;
        }
        let contents =
            std::fs::read_to_string(directory.join(&name)).map_err(|source| BackendError::Io {
                backend: "relational",
                source,
            })?;
        connection
            .execute_batch(&contents)
            .map_err(|e| BackendError::Migration {
                name: name.clone(),
                message: e.to_string(),
            })?;
        connection.execute(
            &format!(
                "INSERT INTO \"{}\" (\"name\", \"applied_at\") VALUES (?1, ?2)",
                BOOKKEEPING_TABLE
            ),
            rusqlite::params![
                name,
                Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
            ],
        )?;
        info!(script = %name, "applied migration");
        applied += 1;
    }
    debug!(directory = %directory.display(), applied, "migrations up to date");
    Ok(())
}

fn script_names(directory: &Path) -> RepositoryResult<Vec<String>> {
    let entries = std::fs::read_dir(directory).map_err(|source| BackendError::Io {
        backend: "relational",
        source,
    })?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| BackendError::Io {
            backend: "relational",
            source,
        })?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".sql") {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

fn is_applied(connection: &Connection, name: &str) -> RepositoryResult<bool> {
    let count: i64 = connection.query_row(
        &format!(
            "SELECT COUNT(*) FROM \"{}\" WHERE \"name\" = ?1",
            BOOKKEEPING_TABLE
        ),
        rusqlite::params![name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
