use sbq_cli::{initialize_logging, run_cli, CliError, USAGE};
use tracing::error;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    initialize_logging();

    if let Err(e) = run_cli(std::env::args_os()).await {
        match &e {
            CliError::Usage => println!("{}", USAGE),
            other => error!(transient = other.is_transient(), "{}", other),
        }

        std::process::exit(e.exit_code());
    }
}
