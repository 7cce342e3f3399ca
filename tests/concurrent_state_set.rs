#![cfg(feature = "sqlite-tests")]

//! Several writers racing on one branch through a shared file-backed SQLite database.

use std::sync::{Arc, Barrier};
use std::thread;

use branch_export_lib::db::sqlite_test::{open_sqlite, seed_branch, setup_sqlite};
use branch_export_lib::export::{ExportCatalog, ExportState, ExportStatus};

const WRITERS: usize = 4;
const TRANSITIONS_PER_WRITER: usize = 10;

fn database_url(dir: &tempfile::TempDir) -> String {
    dir.path()
        .join("export.sqlite")
        .to_str()
        .expect("temp path must be utf-8")
        .to_string()
}

#[test]
fn concurrent_transitions_on_one_branch_are_serialized() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let url = database_url(&dir);

    let mut setup = setup_sqlite(&url);
    seed_branch(&mut setup, "repo1", "main");
    drop(setup);

    let barrier = Arc::new(Barrier::new(WRITERS));
    let handles: Vec<_> = (0..WRITERS)
        .map(|_| {
            let url = url.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut conn = open_sqlite(&url);
                let catalog = ExportCatalog::new();
                barrier.wait();
                for _ in 0..TRANSITIONS_PER_WRITER {
                    // Each transition bumps the counter held in current_ref; a lost update
                    // would leave the final count short.
                    catalog
                        .export_state_set(&mut conn, "repo1", "main", |old_ref, _| {
                            let seen: usize = if old_ref.is_empty() {
                                0
                            } else {
                                old_ref.parse()?
                            };
                            Ok(ExportState::new((seen + 1).to_string(), ExportStatus::InProgress))
                        })
                        .expect("transition failed under contention");
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("writer thread panicked");
    }

    let mut conn = open_sqlite(&url);
    let state = ExportCatalog::new()
        .get_export_state(&mut conn, "repo1", "main")
        .expect("failed to read final state");
    assert_eq!(
        state.current_ref,
        (WRITERS * TRANSITIONS_PER_WRITER).to_string()
    );
}

#[test]
fn vetoes_under_contention_never_leak_partial_writes() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let url = database_url(&dir);

    let mut setup = setup_sqlite(&url);
    seed_branch(&mut setup, "repo1", "main");
    drop(setup);

    // Everyone races to be the first to start; exactly one insert may win.
    let barrier = Arc::new(Barrier::new(WRITERS));
    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let url = url.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut conn = open_sqlite(&url);
                barrier.wait();
                ExportCatalog::new()
                    .export_state_set(&mut conn, "repo1", "main", |_, old_status| {
                        if old_status.is_some() {
                            return Err("another writer already started".into());
                        }
                        Ok(ExportState::new(format!("v{writer}"), ExportStatus::InProgress))
                    })
                    .is_ok()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|handle| handle.join().expect("writer thread panicked"))
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);

    let mut conn = open_sqlite(&url);
    let state = ExportCatalog::new()
        .get_export_state(&mut conn, "repo1", "main")
        .expect("failed to read final state");
    assert_eq!(state.state, ExportStatus::InProgress);
    assert!(state.current_ref.starts_with('v'));
}
