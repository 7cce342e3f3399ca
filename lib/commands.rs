use crate::{
    cli::{BranchArgs, Cli, Command, ConfigCommand, StateCommand},
    config::{Config, ConfigError},
    db::{establish_pg_connection, migrations::run_postgres_migrations, DbError},
    export::{
        transitions::{mark_end, mark_repaired, mark_start, ExportOutcome},
        ExportCatalog, ExportConfiguration, ExportDb, ExportError,
    },
};
use serde::Serialize;
use std::io::Write;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("migration failed: {0}")]
    Migration(Box<dyn std::error::Error + Send + Sync>),

    #[error("failed to write output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CommandError {
    /// Process exit code: 2 for an expected "not found", 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            CommandError::Export(err) if err.is_not_found() => 2,
            _ => 1,
        }
    }
}

fn resolve_config(cli: &Cli) -> Result<Config, ConfigError> {
    match &cli.database_url {
        Some(db_url) => Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some(db_url.clone()),
            _ => std::env::var(key).ok(),
        }),
        None => Config::from_env(),
    }
}

/// Runs one parsed CLI invocation against Postgres, writing JSON results to stdout.
pub fn run(cli: Cli) -> Result<(), CommandError> {
    let config = resolve_config(&cli)?;
    let mut conn = establish_pg_connection(&config.db_url, config.lock_timeout_ms)?;

    if let Command::Migrate = cli.command {
        let applied = run_postgres_migrations(&mut conn).map_err(CommandError::Migration)?;
        info!(event = "migrations_applied", count = applied.len(), "applied migrations");
        return print_json(&mut std::io::stdout(), &applied);
    }

    execute(&mut conn, &ExportCatalog::new(), cli.command, &mut std::io::stdout())
}

/// Executes an export command on any backend, writing its JSON result to `out`.
pub fn execute<C: ExportDb>(
    conn: &mut C,
    catalog: &ExportCatalog,
    command: Command,
    out: &mut impl Write,
) -> Result<(), CommandError> {
    match command {
        Command::Migrate => Ok(()),
        Command::Config(ConfigCommand::Get(BranchArgs { repository, branch })) => {
            let config = catalog.get_export_configuration_for_branch(conn, &repository, &branch)?;
            print_json(out, &config)
        }
        Command::Config(ConfigCommand::Put {
            target,
            path,
            status_path,
            last_keys_in_prefix_regexp,
            continuous,
        }) => {
            let config = ExportConfiguration {
                path,
                status_path,
                last_keys_in_prefix_regexp,
                is_continuous: continuous,
            };
            catalog.put_export_configuration(conn, &target.repository, &target.branch, &config)?;
            print_json(out, &config)
        }
        Command::Config(ConfigCommand::List) => {
            print_json(out, &catalog.get_export_configurations(conn)?)
        }
        Command::State(StateCommand::Get(BranchArgs { repository, branch })) => {
            let state = catalog.get_export_state(conn, &repository, &branch)?;
            print_json(out, &state)
        }
        Command::State(StateCommand::Start { target, export_ref }) => {
            catalog.export_state_set(
                conn,
                &target.repository,
                &target.branch,
                mark_start(&export_ref),
            )?;
            print_state(conn, catalog, &target, out)
        }
        Command::State(StateCommand::Finish {
            target,
            export_ref,
            error,
        }) => {
            let outcome = match error {
                Some(message) => ExportOutcome::Failed(message),
                None => ExportOutcome::Succeeded,
            };
            catalog.export_state_set(
                conn,
                &target.repository,
                &target.branch,
                mark_end(&export_ref, outcome),
            )?;
            print_state(conn, catalog, &target, out)
        }
        Command::State(StateCommand::Repair(target)) => {
            catalog.export_state_set(conn, &target.repository, &target.branch, mark_repaired())?;
            print_state(conn, catalog, &target, out)
        }
    }
}

fn print_state<C: ExportDb>(
    conn: &mut C,
    catalog: &ExportCatalog,
    target: &BranchArgs,
    out: &mut impl Write,
) -> Result<(), CommandError> {
    let state = catalog.get_export_state(conn, &target.repository, &target.branch)?;
    print_json(out, &state)
}

fn print_json<T: Serialize + ?Sized>(out: &mut impl Write, value: &T) -> Result<(), CommandError> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out).map_err(serde_json::Error::io)?;
    Ok(())
}
