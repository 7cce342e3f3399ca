use super::error::ExportError;
use super::store::ExportDb;

/// Maps a `(repository, branch)` name pair to the internal branch id that keys both export
/// tables.
///
/// Resolution runs on the caller's connection, inside the operation's transaction.
pub trait BranchResolver {
    fn resolve_branch_id<C: ExportDb>(
        &self,
        conn: &mut C,
        repository: &str,
        branch: &str,
    ) -> Result<i64, ExportError>;
}

/// Looks branch ids up directly in `catalog_branches` / `catalog_repositories`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogBranchResolver;

impl BranchResolver for CatalogBranchResolver {
    fn resolve_branch_id<C: ExportDb>(
        &self,
        conn: &mut C,
        repository: &str,
        branch: &str,
    ) -> Result<i64, ExportError> {
        conn.lookup_branch_id(repository, branch)?
            .ok_or_else(|| ExportError::BranchNotFound {
                repository: repository.to_string(),
                branch: branch.to_string(),
            })
    }
}
