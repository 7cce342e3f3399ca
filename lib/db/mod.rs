pub mod migrations;

use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::{Connection, ConnectionError};
use log::debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error(transparent)]
    Connect(#[from] ConnectionError),

    #[error("failed to configure session: {0}")]
    Session(#[from] diesel::result::Error),
}

/// Opens one Postgres connection for export operations.
///
/// `lock_timeout_ms` bounds how long a state transition waits for another transaction's
/// row lock on the same branch; `None` keeps the server default.
pub fn establish_pg_connection(
    db_url: &str,
    lock_timeout_ms: Option<u64>,
) -> Result<PgConnection, DbError> {
    let mut conn = PgConnection::establish(db_url)?;
    if let Some(timeout) = lock_timeout_ms {
        conn.batch_execute(&format!("SET lock_timeout = {timeout}"))?;
        debug!("lock_timeout set to {timeout}ms");
    }
    Ok(conn)
}
