use diesel::result::Error as DieselError;
use thiserror::Error;

/// Error returned by a transition callback to veto a state write.
pub type TransitionError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("repository {repository} branch {branch}: branch not found")]
    BranchNotFound { repository: String, branch: String },

    #[error("repository {repository} branch {branch}: export is not configured")]
    ConfigurationNotFound { repository: String, branch: String },

    #[error("repository {repository} branch {branch}: no export state recorded")]
    StateNotFound { repository: String, branch: String },

    #[error("invalid regexp /{pattern}/ at position {position} in last_keys_in_prefix_regexp: {source}")]
    InvalidRegexp {
        pattern: String,
        position: usize,
        #[source]
        source: regex::Error,
    },

    /// The transition callback refused the write. Display and source are the callback's own.
    #[error(transparent)]
    Transition(TransitionError),

    #[error(
        "repository {repository} branch {branch}: could not update single export state row \
         ({rows_affected} rows affected): entry not found"
    )]
    EntryNotFound {
        repository: String,
        branch: String,
        rows_affected: usize,
    },

    #[error("{operation} for repository {repository} branch {branch}: {source}")]
    Database {
        operation: &'static str,
        repository: String,
        branch: String,
        #[source]
        source: DieselError,
    },

    /// Storage error from an operation that spans every branch.
    #[error("{operation}: {source}")]
    CatalogDatabase {
        operation: &'static str,
        #[source]
        source: DieselError,
    },

    #[error(transparent)]
    Storage(#[from] DieselError),
}

impl ExportError {
    /// True for the expected "nothing there" conditions: unknown branch, no configuration,
    /// or no recorded state.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ExportError::BranchNotFound { .. }
                | ExportError::ConfigurationNotFound { .. }
                | ExportError::StateNotFound { .. }
        )
    }

    /// The callback's error when this is a vetoed transition.
    pub fn transition_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            ExportError::Transition(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    /// Attaches operation and branch context to a bare storage error.
    pub(crate) fn with_context(self, operation: &'static str, repository: &str, branch: &str) -> Self {
        match self {
            ExportError::Storage(source) => ExportError::Database {
                operation,
                repository: repository.to_string(),
                branch: branch.to_string(),
                source,
            },
            other => other,
        }
    }
}
