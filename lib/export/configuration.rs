use tracing::{debug, info};

use super::error::ExportError;
use super::resolver::BranchResolver;
use super::store::ExportDb;
use super::types::{ExportConfiguration, ExportConfigurationForBranch};
use super::ExportCatalog;

impl<R: BranchResolver> ExportCatalog<R> {
    /// Reads the export configuration of one branch.
    ///
    /// Returns [`ExportError::ConfigurationNotFound`] when the branch exists but export was
    /// never configured, and [`ExportError::BranchNotFound`] when the branch is unknown.
    pub fn get_export_configuration_for_branch<C: ExportDb>(
        &self,
        conn: &mut C,
        repository: &str,
        branch: &str,
    ) -> Result<ExportConfiguration, ExportError> {
        conn.transact(|conn| {
            let branch_id = self.resolver.resolve_branch_id(conn, repository, branch)?;
            conn.load_configuration(branch_id)?
                .ok_or_else(|| ExportError::ConfigurationNotFound {
                    repository: repository.to_string(),
                    branch: branch.to_string(),
                })
        })
        .map_err(|err| err.with_context("get export configuration", repository, branch))
    }

    /// Lists every configured branch with its repository and branch names, in storage order.
    pub fn get_export_configurations<C: ExportDb>(
        &self,
        conn: &mut C,
    ) -> Result<Vec<ExportConfigurationForBranch>, ExportError> {
        let configurations = conn
            .load_configurations()
            .map_err(|source| ExportError::CatalogDatabase {
                operation: "list export configurations",
                source,
            })?;
        debug!(
            event = "export_configurations_listed",
            count = configurations.len(),
            "listed export configurations"
        );
        Ok(configurations)
    }

    /// Validates and stores the export configuration of one branch, replacing any previous
    /// configuration entirely.
    ///
    /// Every pattern in `last_keys_in_prefix_regexp` is compiled before anything is written;
    /// the first invalid one aborts the call with [`ExportError::InvalidRegexp`].
    pub fn put_export_configuration<C: ExportDb>(
        &self,
        conn: &mut C,
        repository: &str,
        branch: &str,
        config: &ExportConfiguration,
    ) -> Result<(), ExportError> {
        config.validate()?;

        conn.transact(|conn| {
            let branch_id = self.resolver.resolve_branch_id(conn, repository, branch)?;
            conn.upsert_configuration(branch_id, config)?;
            info!(
                event = "export_configuration_stored",
                repository,
                branch,
                branch_id,
                export_path = %config.path,
                continuous = config.is_continuous,
                "stored export configuration"
            );
            Ok::<(), ExportError>(())
        })
        .map_err(|err| err.with_context("put export configuration", repository, branch))
    }
}
