//! Per-branch export configuration and export state.
//!
//! Two tables keyed by branch id:
//! - `catalog_branches_export`: where and how a branch is exported. Written only by whole-row
//!   upsert, last write wins.
//! - `catalog_branches_export_state`: the export state machine. Written only through
//!   [`ExportCatalog::export_state_set`], which reads the row under an exclusive lock, asks a
//!   caller-supplied transition for the next state and writes it, all in one transaction.
//!
//! Operations are synchronous and borrow the caller's connection. Async callers should run
//! them in `tokio::task::spawn_blocking`.

mod configuration;
mod error;
mod resolver;
mod state;
mod store;
pub mod transitions;
mod types;

pub use error::{ExportError, TransitionError};
pub use resolver::{BranchResolver, CatalogBranchResolver};
pub use store::ExportDb;
pub use types::{ExportConfiguration, ExportConfigurationForBranch, ExportState, ExportStatus};

/// Entry point for export configuration and state operations.
#[derive(Debug, Clone, Default)]
pub struct ExportCatalog<R = CatalogBranchResolver> {
    resolver: R,
}

impl ExportCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: BranchResolver> ExportCatalog<R> {
    pub fn with_resolver(resolver: R) -> Self {
        Self { resolver }
    }
}
