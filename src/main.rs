use branch_export_lib::{
    cli::parse_args,
    commands::run,
    logging::{format_error_report, init_logging},
};
use dotenv::dotenv;
use tracing::error;

fn main() {
    dotenv().ok();
    let args = parse_args();
    init_logging("branch-export", &args.log_level);

    if let Err(err) = run(args) {
        error!(event = "command_failed", error = %err, "command failed");
        eprintln!("{}", format_error_report(&err));
        std::process::exit(err.exit_code());
    }
}
