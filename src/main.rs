//! kplay - real-time WAV playback controller
//!
//! Command-line entry point.

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use env_logger::Env;

use kplay::cli::{commands, Cli};

fn main() -> ExitCode {
    // Warnings only by default so log lines do not overwrite the status line
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    if std::env::args_os().len() <= 1 {
        return match Cli::command().print_help() {
            Ok(()) => ExitCode::SUCCESS,
            Err(_) => ExitCode::FAILURE,
        };
    }

    let cli = Cli::parse();
    match commands::run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("kplay: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
