//! SIMCHAIN tester: run a contract test module against disposable chains.
//!
//! Exit code 0 when the guest runs to completion (or calls `exit(0)`);
//! 1 on any uncaught failure, printed to stderr with a category prefix.

mod telemetry;

use clap::Parser;
use simchain_host::{classify, run_module};
use std::path::PathBuf;
use std::process::ExitCode;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "simchain-tester")]
#[command(about = "Run a contract test wasm module against simulated chains")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to the guest wasm module
    module: PathBuf,

    /// Arguments forwarded verbatim to the guest
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(err) = telemetry::init(args.verbose) {
        eprintln!("host fault: failed to initialize logging: {err}");
        return ExitCode::FAILURE;
    }

    // The guest sees its own module path as argv[0], shell-style.
    let mut guest_args = vec![args.module.display().to_string()];
    guest_args.extend(args.args);

    match run_module(&args.module, guest_args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let (category, message) = classify(&err);
            eprintln!("{category}: {message}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_args() {
        let args = Args::parse_from([
            "simchain-tester",
            "-v",
            "suite.wasm",
            "--guest-flag",
            "value",
        ]);
        assert!(args.verbose);
        assert_eq!(args.module, PathBuf::from("suite.wasm"));
        assert_eq!(args.args, vec!["--guest-flag", "value"]);
    }

    #[test]
    fn test_cli_defaults() {
        let args = Args::parse_from(["simchain-tester", "suite.wasm"]);
        assert!(!args.verbose);
        assert!(args.args.is_empty());
    }
}
