use tracing::info;

use super::error::{ExportError, TransitionError};
use super::resolver::BranchResolver;
use super::store::ExportDb;
use super::types::{ExportState, ExportStatus};
use super::ExportCatalog;

impl<R: BranchResolver> ExportCatalog<R> {
    /// Reads the export state of one branch.
    ///
    /// Returns [`ExportError::StateNotFound`] when no export ever ran for the branch.
    pub fn get_export_state<C: ExportDb>(
        &self,
        conn: &mut C,
        repository: &str,
        branch: &str,
    ) -> Result<ExportState, ExportError> {
        conn.transact(|conn| {
            let branch_id = self.resolver.resolve_branch_id(conn, repository, branch)?;
            conn.load_state(branch_id)?
                .ok_or_else(|| ExportError::StateNotFound {
                    repository: repository.to_string(),
                    branch: branch.to_string(),
                })
        })
        .map_err(|err| err.with_context("get export state", repository, branch))
    }

    /// Atomically moves the export state of one branch to whatever `transition` decides.
    ///
    /// `transition` is called exactly once with the current ref and status, read under an
    /// exclusive lock that is held until the new state is committed. A branch with no state
    /// row yet is presented as `("", None)`; an existing row with an unrecognized status as
    /// `Some(ExportStatus::Unknown)`.
    ///
    /// An error from `transition` rolls the transaction back and is returned unchanged as
    /// [`ExportError::Transition`]. A write that does not touch exactly one row fails with
    /// [`ExportError::EntryNotFound`]. Nothing is retried here.
    pub fn export_state_set<C, F>(
        &self,
        conn: &mut C,
        repository: &str,
        branch: &str,
        transition: F,
    ) -> Result<(), ExportError>
    where
        C: ExportDb,
        F: FnOnce(&str, Option<ExportStatus>) -> Result<ExportState, TransitionError>,
    {
        conn.transact_exclusive(|conn| {
            let branch_id = self.resolver.resolve_branch_id(conn, repository, branch)?;

            let previous = conn.load_state_for_update(branch_id)?;
            let missing = previous.is_none();
            let (old_ref, old_status) = match &previous {
                Some(state) => (state.current_ref.as_str(), Some(state.state)),
                None => ("", None),
            };

            let next = transition(old_ref, old_status).map_err(ExportError::Transition)?;

            let rows_affected = if missing {
                info!(
                    event = "export_state_insert",
                    repository,
                    branch,
                    branch_id,
                    old_ref,
                    new_ref = %next.current_ref,
                    new_status = %next.state,
                    "insert on DB"
                );
                conn.insert_state(branch_id, &next)?
            } else {
                info!(
                    event = "export_state_update",
                    repository,
                    branch,
                    branch_id,
                    old_ref,
                    old_status = old_status.map(ExportStatus::as_db_str),
                    new_ref = %next.current_ref,
                    new_status = %next.state,
                    "update on DB"
                );
                conn.update_state(branch_id, &next)?
            };

            if rows_affected != 1 {
                return Err(ExportError::EntryNotFound {
                    repository: repository.to_string(),
                    branch: branch.to_string(),
                    rows_affected,
                });
            }
            Ok(())
        })
        .map_err(|err| err.with_context("set export state", repository, branch))
    }
}
