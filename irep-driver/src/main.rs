// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT
use std::io::Write;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

use args::{DriverArgs, DriverSubcommand};

mod args;
mod commands;
mod session;
mod util;

/// The main function for the `irep-driver`.
fn main() -> ExitCode {
    let args = DriverArgs::parse();
    args::check_is_valid(&args);

    if let Err(error) = session::init_logger(&args.log).and_then(|_| run(args.command)) {
        // Debug format keeps the whole chain of contexts.
        debug!(?error, "main_failure");
        util::error(&format!("{error:#}"));
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run(command: DriverSubcommand) -> Result<()> {
    debug!(?command, "run");
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match command {
        DriverSubcommand::Stats { input } => commands::run_stats(&input, &mut out)?,
        DriverSubcommand::Dump { input, root } => commands::run_dump(&input, root, &mut out)?,
        DriverSubcommand::Convert { input, output } => commands::run_convert(&input, &output)?,
        DriverSubcommand::Check { input } => commands::run_check(&input)?,
    }
    out.flush()?;
    Ok(())
}
