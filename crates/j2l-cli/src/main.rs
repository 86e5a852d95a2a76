//! `j2lab` entry point

use j2l_cli::{cli, logging, run, LogFlags};
use std::io::Write;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();

    let flags = LogFlags::from_matches(&matches);
    if let Err(err) = logging::init_logging(flags.verbosity, flags.quiet, flags.json) {
        eprintln!("warning: logging disabled: {err:#}");
    }

    match run(&matches).await {
        Ok(outcome) => {
            let mut stdout = std::io::stdout().lock();
            if let Err(err) = stdout.write_all(outcome.output.as_bytes()) {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
            if outcome.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "command failed");
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}
