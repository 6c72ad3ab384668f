//! iqlengine CLI entry point
//!
//! Parses arguments, dispatches to the CLI module and exits non-zero on
//! failure. The tokio runtime is built by the command that needs it.

use iqlengine::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}: {}", e.code(), e);
        std::process::exit(1);
    }
}
