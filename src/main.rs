use clap::Parser;
use std::io::{Read, Write};
use std::process::ExitCode;
use tracing::{debug, error};

use cni_sbr::cni::plugin::{report_error, CniCommand, Invocation, SbrPlugin};
use cni_sbr::config::cli::{print_default_config, CliArgs};
use cni_sbr::config::AppConfig;
use cni_sbr::error::AppError;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    if cli.print_default_config {
        print_default_config();
        return ExitCode::SUCCESS;
    }

    let mut stdout = std::io::stdout();
    let config = match AppConfig::load(&cli) {
        Ok(config) => config,
        Err(e) => return fail(&[], &AppError::from(e), &mut stdout),
    };

    // stdout carries the CNI result, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(config.log_level.as_str())
        .with_writer(std::io::stderr)
        .init();

    let invocation = match Invocation::from_args(&cli) {
        Ok(invocation) => invocation,
        Err(e) => return fail(&[], &AppError::from(e), &mut stdout),
    };

    let mut stdin = Vec::new();
    if invocation.command != CniCommand::Version {
        if let Err(e) = std::io::stdin().read_to_end(&mut stdin) {
            return fail(&[], &AppError::from(e), &mut stdout);
        }
    }

    debug!("Running {:?} for container {:?}", invocation.command, cli.container_id);

    let plugin = SbrPlugin::new(config);
    match plugin.run(&invocation, &stdin, &mut stdout).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&stdin, &e, &mut stdout),
    }
}

fn fail<W: Write>(stdin: &[u8], err: &AppError, out: &mut W) -> ExitCode {
    error!("{}", err);
    if let Err(e) = report_error(stdin, err, out) {
        eprintln!("failed to report error: {}", e);
    }
    ExitCode::FAILURE
}
