//! Transition functions an export worker hands to [`ExportCatalog::export_state_set`].
//!
//! [`ExportCatalog::export_state_set`]: super::ExportCatalog::export_state_set

use thiserror::Error;

use super::error::TransitionError;
use super::types::{ExportState, ExportStatus};

/// Why a transition refused to write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionRejected {
    #[error("export of ref {current_ref} is already in progress")]
    InProgress { current_ref: String },
    #[error("previous export of ref {current_ref} failed; mark it repaired before exporting again")]
    RepairNeeded { current_ref: String },
    #[error("export is in progress on ref {found}, not on ref {expected}")]
    RefMismatch { expected: String, found: String },
    #[error("no export in progress (status {status})")]
    NotInProgress { status: String },
    #[error("only a failed export can be marked repaired (status {status})")]
    NotFailed { status: String },
}

/// Result of one export run, reported by [`mark_end`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Succeeded,
    Failed(String),
}

fn describe(status: Option<ExportStatus>) -> String {
    status.map_or_else(|| "none".to_string(), |status| status.to_string())
}

/// Starts exporting `new_ref`.
///
/// Refused while another export is in progress, or while the previous export is failed and
/// not yet repaired.
pub fn mark_start(
    new_ref: &str,
) -> impl FnOnce(&str, Option<ExportStatus>) -> Result<ExportState, TransitionError> + '_ {
    move |old_ref: &str, old_status: Option<ExportStatus>| match old_status {
        Some(ExportStatus::InProgress) => Err(TransitionRejected::InProgress {
            current_ref: old_ref.to_string(),
        }
        .into()),
        Some(ExportStatus::Failed) => Err(TransitionRejected::RepairNeeded {
            current_ref: old_ref.to_string(),
        }
        .into()),
        _ => Ok(ExportState::new(new_ref, ExportStatus::InProgress)),
    }
}

/// Finishes the in-progress export of `export_ref` with `outcome`.
pub fn mark_end(
    export_ref: &str,
    outcome: ExportOutcome,
) -> impl FnOnce(&str, Option<ExportStatus>) -> Result<ExportState, TransitionError> + '_ {
    move |old_ref: &str, old_status: Option<ExportStatus>| {
        if old_status != Some(ExportStatus::InProgress) {
            return Err(TransitionRejected::NotInProgress {
                status: describe(old_status),
            }
            .into());
        }
        if old_ref != export_ref {
            return Err(TransitionRejected::RefMismatch {
                expected: export_ref.to_string(),
                found: old_ref.to_string(),
            }
            .into());
        }
        Ok(match outcome {
            ExportOutcome::Succeeded => ExportState::new(export_ref, ExportStatus::Success),
            ExportOutcome::Failed(message) => ExportState::failed(export_ref, message),
        })
    }
}

/// Clears a failed export so the next [`mark_start`] may proceed.
pub fn mark_repaired() -> impl FnOnce(&str, Option<ExportStatus>) -> Result<ExportState, TransitionError>
{
    |old_ref: &str, old_status: Option<ExportStatus>| match old_status {
        Some(ExportStatus::Failed) => Ok(ExportState::new(old_ref, ExportStatus::Repaired)),
        other => Err(TransitionRejected::NotFailed {
            status: describe(other),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite_test::{seed_branch, setup_in_memory_sqlite};
    use crate::export::{ExportCatalog, ExportError};

    fn rejection(err: &ExportError) -> Option<&TransitionRejected> {
        err.transition_error()
            .and_then(|inner| inner.downcast_ref::<TransitionRejected>())
    }

    #[test]
    fn start_is_refused_while_in_progress() {
        let err = mark_start("v2")("v1", Some(ExportStatus::InProgress))
            .expect_err("expected concurrent start to be refused");
        assert_eq!(
            err.downcast_ref::<TransitionRejected>(),
            Some(&TransitionRejected::InProgress {
                current_ref: "v1".to_string()
            })
        );
    }

    #[test]
    fn start_requires_repair_after_failure() {
        let err = mark_start("v2")("v1", Some(ExportStatus::Failed))
            .expect_err("expected start after failure to be refused");
        assert!(matches!(
            err.downcast_ref::<TransitionRejected>(),
            Some(TransitionRejected::RepairNeeded { .. })
        ));
    }

    #[test]
    fn start_from_nothing_or_unknown_is_allowed() {
        for old_status in [None, Some(ExportStatus::Success), Some(ExportStatus::Unknown)] {
            let next = mark_start("v2")("v1", old_status).expect("expected start to proceed");
            assert_eq!(next, ExportState::new("v2", ExportStatus::InProgress));
        }
    }

    #[test]
    fn end_checks_the_exported_ref() {
        let err = mark_end("v2", ExportOutcome::Succeeded)("v1", Some(ExportStatus::InProgress))
            .expect_err("expected ref mismatch");
        assert_eq!(
            err.downcast_ref::<TransitionRejected>(),
            Some(&TransitionRejected::RefMismatch {
                expected: "v2".to_string(),
                found: "v1".to_string(),
            })
        );

        let err = mark_end("v1", ExportOutcome::Succeeded)("v1", None)
            .expect_err("expected end without start to be refused");
        assert_eq!(err.to_string(), "no export in progress (status none)");
    }

    #[test]
    fn full_cycle_through_failure_and_repair() {
        let mut conn = setup_in_memory_sqlite();
        seed_branch(&mut conn, "repo1", "main");
        let catalog = ExportCatalog::new();

        catalog
            .export_state_set(&mut conn, "repo1", "main", mark_start("v1"))
            .expect("failed to start first export");
        catalog
            .export_state_set(
                &mut conn,
                "repo1",
                "main",
                mark_end("v1", ExportOutcome::Failed("bucket unreachable".to_string())),
            )
            .expect("failed to record failure");

        let err = catalog
            .export_state_set(&mut conn, "repo1", "main", mark_start("v2"))
            .expect_err("expected start to require repair");
        assert!(matches!(
            rejection(&err),
            Some(TransitionRejected::RepairNeeded { .. })
        ));

        catalog
            .export_state_set(&mut conn, "repo1", "main", mark_repaired())
            .expect("failed to mark repaired");
        let repaired = catalog
            .get_export_state(&mut conn, "repo1", "main")
            .expect("failed to read repaired state");
        // export-repaired is outside the set this reader decodes.
        assert_eq!(repaired.state, ExportStatus::Unknown);
        assert_eq!(repaired.error_message, None);

        catalog
            .export_state_set(&mut conn, "repo1", "main", mark_start("v2"))
            .expect("failed to start after repair");
        catalog
            .export_state_set(
                &mut conn,
                "repo1",
                "main",
                mark_end("v2", ExportOutcome::Succeeded),
            )
            .expect("failed to record success");

        let done = catalog
            .get_export_state(&mut conn, "repo1", "main")
            .expect("failed to read final state");
        assert_eq!(done, ExportState::new("v2", ExportStatus::Success));
    }

    #[test]
    fn repair_is_refused_unless_failed() {
        let err = mark_repaired()("v1", Some(ExportStatus::Success))
            .expect_err("expected repair of a successful export to be refused");
        assert_eq!(
            err.to_string(),
            "only a failed export can be marked repaired (status exported-successfully)"
        );
    }
}
