//! Opening the embedded store and keeping its schema current.

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::info;
use std::path::Path;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Columns introduced after the baseline migrations shipped.
///
/// Each entry is applied only when `PRAGMA table_info` does not list it, so the
/// step can run on every start-up.
const ADDITIVE_COLUMNS: &[(&str, &str, &str)] = &[
    (
        "daily_metrics",
        "labor_cost_is_estimated",
        "BOOLEAN NOT NULL DEFAULT 0",
    ),
    ("sync_log", "warnings", "TEXT NOT NULL DEFAULT '[]'"),
];

#[derive(QueryableByName)]
struct ColumnInfo {
    #[diesel(sql_type = Text)]
    name: String,
}

/// Open (creating if needed) the SQLite database and bring the schema up to date.
pub fn open(database_url: &str) -> Result<SqliteConnection, String> {
    if database_url != ":memory:"
        && let Some(parent) = Path::new(database_url).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("creating database directory {} failed: {}", parent.display(), e))?;
    }

    let mut conn =
        SqliteConnection::establish(database_url).map_err(|e| format!("DB connection failed: {}", e))?;
    conn.batch_execute("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;")
        .map_err(|e| format!("configuring database failed: {}", e))?;
    info!("Connected to database {}", database_url);

    prepare_schema(&mut conn)?;
    Ok(conn)
}

pub fn prepare_schema(conn: &mut SqliteConnection) -> Result<(), String> {
    apply_database_migrations(conn)?;
    evolve_schema(conn).map_err(|e| format!("schema evolution failed: {}", e))?;
    Ok(())
}

fn apply_database_migrations(conn: &mut SqliteConnection) -> Result<(), String> {
    match conn.run_pending_migrations(MIGRATIONS) {
        Ok(applied) => {
            if applied.is_empty() {
                info!("Database schema is up to date; no migrations were applied");
            } else {
                let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                info!("Applied {} database migration(s): {}", applied.len(), names);
            }
            Ok(())
        }
        Err(e) => Err(format!("Applying database migrations failed: {}", e)),
    }
}

/// Add any column from [`ADDITIVE_COLUMNS`] that the live table lacks.
///
/// Returns the `table.column` names that were added.
pub fn evolve_schema(conn: &mut SqliteConnection) -> QueryResult<Vec<String>> {
    let mut added = Vec::new();
    for (table, column, ddl) in ADDITIVE_COLUMNS {
        if has_column(conn, table, column)? {
            continue;
        }
        diesel::sql_query(format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, ddl)).execute(conn)?;
        info!("Added column {}.{}", table, column);
        added.push(format!("{}.{}", table, column));
    }
    Ok(added)
}

fn has_column(conn: &mut SqliteConnection, table: &str, column: &str) -> QueryResult<bool> {
    let columns: Vec<ColumnInfo> = diesel::sql_query(format!("PRAGMA table_info({})", table)).load(conn)?;
    Ok(columns.iter().any(|c| c.name == column))
}

/// Fresh in-memory database with the full schema, for tests.
#[cfg(test)]
pub fn test_connection() -> SqliteConnection {
    let mut conn = SqliteConnection::establish(":memory:").expect("in-memory sqlite");
    prepare_schema(&mut conn).expect("schema");
    conn
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_gains_evolved_columns_once() {
        let mut conn = SqliteConnection::establish(":memory:").expect("in-memory sqlite");
        apply_database_migrations(&mut conn).expect("migrations");
        assert!(!has_column(&mut conn, "daily_metrics", "labor_cost_is_estimated").expect("pragma"));

        let first = evolve_schema(&mut conn).expect("evolve");
        assert_eq!(
            first,
            vec![
                "daily_metrics.labor_cost_is_estimated".to_string(),
                "sync_log.warnings".to_string()
            ]
        );
        assert!(has_column(&mut conn, "sync_log", "warnings").expect("pragma"));

        let second = evolve_schema(&mut conn).expect("evolve again");
        assert!(second.is_empty());
    }

    #[test]
    fn prepared_schema_is_queryable_through_models() {
        use crate::db::models::DailyMetric;
        use crate::schema::daily_metrics::dsl as DM;

        let mut conn = test_connection();
        let rows: Vec<DailyMetric> = DM::daily_metrics
            .select(DailyMetric::as_select())
            .load(&mut conn)
            .expect("select");
        assert!(rows.is_empty());
    }
}
