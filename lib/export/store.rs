use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use diesel::sql_query;
use diesel::sql_types::{Array, BigInt, Bool, Nullable, Text};
use diesel::sqlite::SqliteConnection;

use super::types::{ExportConfiguration, ExportConfigurationForBranch, ExportState, ExportStatus};

#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct BranchIdRow {
    #[diesel(sql_type = BigInt)]
    pub id: i64,
}

#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct StateRow {
    #[diesel(sql_type = Text)]
    pub current_ref: String,
    #[diesel(sql_type = Text)]
    pub state: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub error_message: Option<String>,
}

#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PgConfigurationRow {
    #[diesel(sql_type = Text)]
    pub repository: String,
    #[diesel(sql_type = Text)]
    pub branch: String,
    #[diesel(sql_type = Text)]
    pub export_path: String,
    #[diesel(sql_type = Text)]
    pub export_status_path: String,
    #[diesel(sql_type = Array<Text>)]
    pub last_keys_in_prefix_regexp: Vec<String>,
    #[diesel(sql_type = Bool)]
    pub continuous: bool,
}

#[doc(hidden)]
#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SqliteConfigurationRow {
    #[diesel(sql_type = Text)]
    pub repository: String,
    #[diesel(sql_type = Text)]
    pub branch: String,
    #[diesel(sql_type = Text)]
    pub export_path: String,
    #[diesel(sql_type = Text)]
    pub export_status_path: String,
    /// JSON array of pattern strings.
    #[diesel(sql_type = Text)]
    pub last_keys_in_prefix_regexp: String,
    #[diesel(sql_type = Bool)]
    pub continuous: bool,
}

/// Storage backend for export configuration and state rows.
///
/// Implemented for Postgres (production, row-level locks) and SQLite (tests and embedded
/// use, database-wide write lock). Callers never build SQL themselves; every statement
/// lives in the backend impls below.
pub trait ExportDb: Sized {
    fn lookup_branch_id(&mut self, repository: &str, branch: &str)
        -> QueryResult<Option<i64>>;

    fn load_configuration(&mut self, branch_id: i64) -> QueryResult<Option<ExportConfiguration>>;

    fn load_configurations(&mut self) -> QueryResult<Vec<ExportConfigurationForBranch>>;

    /// Inserts or wholly replaces the configuration row keyed by `branch_id`.
    fn upsert_configuration(
        &mut self,
        branch_id: i64,
        config: &ExportConfiguration,
    ) -> QueryResult<usize>;

    fn load_state(&mut self, branch_id: i64) -> QueryResult<Option<ExportState>>;

    /// Reads the state row and holds an exclusive lock on the branch's state until the
    /// surrounding transaction ends, also when no state row exists yet. Only meaningful
    /// inside [`ExportDb::transact_exclusive`].
    fn load_state_for_update(&mut self, branch_id: i64) -> QueryResult<Option<ExportState>>;

    fn insert_state(&mut self, branch_id: i64, state: &ExportState) -> QueryResult<usize>;

    fn update_state(&mut self, branch_id: i64, state: &ExportState) -> QueryResult<usize>;

    /// Runs `f` in a transaction: commit on `Ok`, rollback on `Err`.
    fn transact<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<DieselError>;

    /// Like [`ExportDb::transact`], for transactions that take write locks up front.
    fn transact_exclusive<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<DieselError>;
}

fn map_state_row(row: StateRow) -> ExportState {
    ExportState {
        current_ref: row.current_ref,
        state: ExportStatus::from_db_str(&row.state),
        error_message: row.error_message,
    }
}

impl From<PgConfigurationRow> for ExportConfigurationForBranch {
    fn from(row: PgConfigurationRow) -> Self {
        Self {
            repository: row.repository,
            branch: row.branch,
            configuration: ExportConfiguration {
                path: row.export_path,
                status_path: row.export_status_path,
                last_keys_in_prefix_regexp: row.last_keys_in_prefix_regexp,
                is_continuous: row.continuous,
            },
        }
    }
}

impl TryFrom<SqliteConfigurationRow> for ExportConfigurationForBranch {
    type Error = DieselError;

    fn try_from(row: SqliteConfigurationRow) -> Result<Self, Self::Error> {
        let last_keys_in_prefix_regexp: Vec<String> =
            serde_json::from_str(&row.last_keys_in_prefix_regexp)
                .map_err(|err| DieselError::DeserializationError(Box::new(err)))?;
        Ok(Self {
            repository: row.repository,
            branch: row.branch,
            configuration: ExportConfiguration {
                path: row.export_path,
                status_path: row.export_status_path,
                last_keys_in_prefix_regexp,
                is_continuous: row.continuous,
            },
        })
    }
}

const CONFIGURATION_SELECT: &str = "\
    SELECT r.name AS repository, b.name AS branch, \
           e.export_path, e.export_status_path, e.last_keys_in_prefix_regexp, e.continuous \
    FROM catalog_branches_export e \
    JOIN catalog_branches b ON e.branch_id = b.id \
    JOIN catalog_repositories r ON b.repository_id = r.id";

impl ExportDb for PgConnection {
    fn lookup_branch_id(
        &mut self,
        repository: &str,
        branch: &str,
    ) -> QueryResult<Option<i64>> {
        sql_query(
            "SELECT b.id FROM catalog_branches b \
             JOIN catalog_repositories r ON b.repository_id = r.id \
             WHERE r.name = $1 AND b.name = $2",
        )
        .bind::<Text, _>(repository)
        .bind::<Text, _>(branch)
        .get_result::<BranchIdRow>(self)
        .optional()
        .map(|row| row.map(|row| row.id))
    }

    fn load_configuration(&mut self, branch_id: i64) -> QueryResult<Option<ExportConfiguration>> {
        sql_query(format!("{CONFIGURATION_SELECT} WHERE e.branch_id = $1"))
            .bind::<BigInt, _>(branch_id)
            .get_result::<PgConfigurationRow>(self)
            .optional()
            .map(|row| row.map(|row| ExportConfigurationForBranch::from(row).configuration))
    }

    fn load_configurations(&mut self) -> QueryResult<Vec<ExportConfigurationForBranch>> {
        let rows = sql_query(CONFIGURATION_SELECT).load::<PgConfigurationRow>(self)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    fn upsert_configuration(
        &mut self,
        branch_id: i64,
        config: &ExportConfiguration,
    ) -> QueryResult<usize> {
        sql_query(
            "INSERT INTO catalog_branches_export \
             (branch_id, export_path, export_status_path, last_keys_in_prefix_regexp, continuous) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (branch_id) DO UPDATE \
             SET export_path = EXCLUDED.export_path, \
                 export_status_path = EXCLUDED.export_status_path, \
                 last_keys_in_prefix_regexp = EXCLUDED.last_keys_in_prefix_regexp, \
                 continuous = EXCLUDED.continuous",
        )
        .bind::<BigInt, _>(branch_id)
        .bind::<Text, _>(config.path.as_str())
        .bind::<Text, _>(config.status_path.as_str())
        .bind::<Array<Text>, _>(&config.last_keys_in_prefix_regexp)
        .bind::<Bool, _>(config.is_continuous)
        .execute(self)
    }

    fn load_state(&mut self, branch_id: i64) -> QueryResult<Option<ExportState>> {
        sql_query(
            "SELECT current_ref, state, error_message \
             FROM catalog_branches_export_state WHERE branch_id = $1",
        )
        .bind::<BigInt, _>(branch_id)
        .get_result::<StateRow>(self)
        .optional()
        .map(|row| row.map(map_state_row))
    }

    fn load_state_for_update(&mut self, branch_id: i64) -> QueryResult<Option<ExportState>> {
        // The branch row is locked first so a branch with no state row yet still
        // serializes its first insert. NO KEY UPDATE leaves FK checks from inserts that
        // reference the branch unblocked.
        sql_query("SELECT id FROM catalog_branches WHERE id = $1 FOR NO KEY UPDATE")
            .bind::<BigInt, _>(branch_id)
            .get_result::<BranchIdRow>(self)
            .optional()?;

        sql_query(
            "SELECT current_ref, state, error_message \
             FROM catalog_branches_export_state WHERE branch_id = $1 \
             FOR NO KEY UPDATE",
        )
        .bind::<BigInt, _>(branch_id)
        .get_result::<StateRow>(self)
        .optional()
        .map(|row| row.map(map_state_row))
    }

    fn insert_state(&mut self, branch_id: i64, state: &ExportState) -> QueryResult<usize> {
        sql_query(
            "INSERT INTO catalog_branches_export_state \
             (branch_id, current_ref, state, error_message) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind::<BigInt, _>(branch_id)
        .bind::<Text, _>(state.current_ref.as_str())
        .bind::<Text, _>(state.state.as_db_str())
        .bind::<Nullable<Text>, _>(state.error_message.as_deref())
        .execute(self)
    }

    fn update_state(&mut self, branch_id: i64, state: &ExportState) -> QueryResult<usize> {
        sql_query(
            "UPDATE catalog_branches_export_state \
             SET current_ref = $2, state = $3, error_message = $4 \
             WHERE branch_id = $1",
        )
        .bind::<BigInt, _>(branch_id)
        .bind::<Text, _>(state.current_ref.as_str())
        .bind::<Text, _>(state.state.as_db_str())
        .bind::<Nullable<Text>, _>(state.error_message.as_deref())
        .execute(self)
    }

    fn transact<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<DieselError>,
    {
        self.transaction(f)
    }

    fn transact_exclusive<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<DieselError>,
    {
        // Row locks come from `FOR NO KEY UPDATE`; the transaction only has to be
        // read-write.
        self.build_transaction().read_write().run(f)
    }
}

impl ExportDb for SqliteConnection {
    fn lookup_branch_id(
        &mut self,
        repository: &str,
        branch: &str,
    ) -> QueryResult<Option<i64>> {
        sql_query(
            "SELECT b.id FROM catalog_branches b \
             JOIN catalog_repositories r ON b.repository_id = r.id \
             WHERE r.name = ? AND b.name = ?",
        )
        .bind::<Text, _>(repository)
        .bind::<Text, _>(branch)
        .get_result::<BranchIdRow>(self)
        .optional()
        .map(|row| row.map(|row| row.id))
    }

    fn load_configuration(&mut self, branch_id: i64) -> QueryResult<Option<ExportConfiguration>> {
        let row = sql_query(format!("{CONFIGURATION_SELECT} WHERE e.branch_id = ?"))
            .bind::<BigInt, _>(branch_id)
            .get_result::<SqliteConfigurationRow>(self)
            .optional()?;
        row.map(|row| ExportConfigurationForBranch::try_from(row).map(|row| row.configuration))
            .transpose()
    }

    fn load_configurations(&mut self) -> QueryResult<Vec<ExportConfigurationForBranch>> {
        sql_query(CONFIGURATION_SELECT)
            .load::<SqliteConfigurationRow>(self)?
            .into_iter()
            .map(ExportConfigurationForBranch::try_from)
            .collect()
    }

    fn upsert_configuration(
        &mut self,
        branch_id: i64,
        config: &ExportConfiguration,
    ) -> QueryResult<usize> {
        let patterns = serde_json::to_string(&config.last_keys_in_prefix_regexp)
            .map_err(|err| DieselError::SerializationError(Box::new(err)))?;

        sql_query(
            "INSERT INTO catalog_branches_export \
             (branch_id, export_path, export_status_path, last_keys_in_prefix_regexp, continuous) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (branch_id) DO UPDATE \
             SET export_path = excluded.export_path, \
                 export_status_path = excluded.export_status_path, \
                 last_keys_in_prefix_regexp = excluded.last_keys_in_prefix_regexp, \
                 continuous = excluded.continuous",
        )
        .bind::<BigInt, _>(branch_id)
        .bind::<Text, _>(config.path.as_str())
        .bind::<Text, _>(config.status_path.as_str())
        .bind::<Text, _>(patterns.as_str())
        .bind::<Bool, _>(config.is_continuous)
        .execute(self)
    }

    fn load_state(&mut self, branch_id: i64) -> QueryResult<Option<ExportState>> {
        sql_query(
            "SELECT current_ref, state, error_message \
             FROM catalog_branches_export_state WHERE branch_id = ?",
        )
        .bind::<BigInt, _>(branch_id)
        .get_result::<StateRow>(self)
        .optional()
        .map(|row| row.map(map_state_row))
    }

    fn load_state_for_update(&mut self, branch_id: i64) -> QueryResult<Option<ExportState>> {
        // SQLite has no row locks; the IMMEDIATE transaction already holds the write lock.
        self.load_state(branch_id)
    }

    fn insert_state(&mut self, branch_id: i64, state: &ExportState) -> QueryResult<usize> {
        sql_query(
            "INSERT INTO catalog_branches_export_state \
             (branch_id, current_ref, state, error_message) \
             VALUES (?, ?, ?, ?)",
        )
        .bind::<BigInt, _>(branch_id)
        .bind::<Text, _>(state.current_ref.as_str())
        .bind::<Text, _>(state.state.as_db_str())
        .bind::<Nullable<Text>, _>(state.error_message.as_deref())
        .execute(self)
    }

    fn update_state(&mut self, branch_id: i64, state: &ExportState) -> QueryResult<usize> {
        sql_query(
            "UPDATE catalog_branches_export_state \
             SET current_ref = ?, state = ?, error_message = ? \
             WHERE branch_id = ?",
        )
        .bind::<Text, _>(state.current_ref.as_str())
        .bind::<Text, _>(state.state.as_db_str())
        .bind::<Nullable<Text>, _>(state.error_message.as_deref())
        .bind::<BigInt, _>(branch_id)
        .execute(self)
    }

    fn transact<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<DieselError>,
    {
        self.transaction(f)
    }

    fn transact_exclusive<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<DieselError>,
    {
        self.immediate_transaction(f)
    }
}
