use diesel::pg::Pg;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

#[cfg(any(test, feature = "sqlite-tests"))]
use diesel_migrations::FileBasedMigrations;

/// Postgres schema, compiled into the binary.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[cfg(any(test, feature = "sqlite-tests"))]
const SQLITE_TEST_MIGRATIONS_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/sqlite_migrations");

/// Runs all pending Postgres migrations and returns the versions applied.
pub fn run_postgres_migrations(
    conn: &mut impl MigrationHarness<Pg>,
) -> Result<Vec<String>, Box<dyn std::error::Error + Send + Sync>> {
    let applied = conn.run_pending_migrations(MIGRATIONS)?;
    Ok(applied.iter().map(ToString::to_string).collect())
}

/// Loads the SQLite parity migrations used by DB-backed tests.
///
/// Mirrors the Postgres schema except for the regexp list, which SQLite stores as JSON text.
#[cfg(any(test, feature = "sqlite-tests"))]
pub fn sqlite_test_migrations() -> FileBasedMigrations {
    FileBasedMigrations::from_path(SQLITE_TEST_MIGRATIONS_DIR)
        .expect("failed to load sqlite test migrations")
}
