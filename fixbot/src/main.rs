//! Fix-and-propose bot.
//!
//! Reads `REPOSITORY`, `OWNER` and `GITHUB_TOKEN`, runs the configured fix
//! tool against a shallow clone of the default branch head, and opens one
//! proposal per revision when the tool changed something.

use std::panic;
use std::path::PathBuf;
use std::thread;

use clap::{Parser, Subcommand};
use tracing::{debug, error};

use fixbot::error::PipelineError;
use fixbot::io::fix_tool::ExternalFixTool;
use fixbot::io::github::GitHubClient;
use fixbot::pipeline::{self, Settings};
use fixbot::{exit_codes, logging};

#[derive(Parser)]
#[command(
    name = "fixbot",
    version,
    about = "Apply an auto-fix tool to a repository's head revision and propose the result"
)]
struct Cli {
    /// TOML config file. Defaults apply when absent.
    #[arg(long, global = true, env = "FIXBOT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Clone, fix, and open a proposal if anything changed.
    Run,
    /// Print the target branch and any existing proposal without changing anything.
    Plan,
}

fn main() {
    logging::init();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version go to stdout and succeed.
            let code = if err.use_stderr() {
                exit_codes::USAGE
            } else {
                exit_codes::OK
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    let result = panic::catch_unwind(move || run(cli));
    std::process::exit(report(result));
}

/// Print the summary or the error and pick the exit code.
fn report(result: thread::Result<Result<String, PipelineError>>) -> i32 {
    match result {
        Ok(Ok(summary)) => {
            println!("{summary}");
            exit_codes::OK
        }
        Ok(Err(err)) => {
            debug!(category = err.category(), exit_code = err.exit_code(), "run failed");
            eprintln!("fixbot: {err}");
            err.exit_code()
        }
        Err(_) => {
            error!("run panicked");
            eprintln!("fixbot: internal error");
            exit_codes::INTERNAL
        }
    }
}

fn run(cli: Cli) -> Result<String, PipelineError> {
    let settings = Settings::load(cli.config.as_deref())?;
    let host = GitHubClient::new(
        &settings.config.api_base_url,
        &settings.env.token,
        settings.config.http_timeout(),
    )
    .map_err(PipelineError::Configuration)?;

    match cli.command {
        Command::Run => {
            let fix_tool = ExternalFixTool::from_config(&settings.config.fix_tool);
            pipeline::run(&settings, &host, &fix_tool).map(|outcome| outcome.to_string())
        }
        Command::Plan => pipeline::plan(&settings, &host).map(|report| report.to_string()),
    }
}
