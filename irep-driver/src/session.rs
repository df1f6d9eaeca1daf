// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Global state of one driver run, which for now is only the logger.

use crate::args::{LOG_ENV_VAR, LogArgs};
use anyhow::Result;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Registry, fmt};

/// Initialize the logger using the `IREP_LOG` environment variable and the `--log-level` argument.
/// Logs always go to stderr so they never mix with the command output.
pub fn init_logger(args: &LogArgs) -> Result<()> {
    let filter = EnvFilter::from_env(LOG_ENV_VAR);
    let filter = if let Some(directive) = &args.log_level {
        filter.add_directive(directive.clone())
    } else {
        filter
    };

    if args.json_logs { json_logs(filter) } else { fmt_logs(filter) }
}

/// Configure global logger to use a json logger.
fn json_logs(filter: EnvFilter) -> Result<()> {
    let subscriber =
        Registry::default().with(filter).with(fmt::layer().json().with_writer(std::io::stderr));
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Configure global logger to print one human readable line per event.
fn fmt_logs(filter: EnvFilter) -> Result<()> {
    let use_colors = console::colors_enabled_stderr();
    let subscriber = Registry::default().with(filter).with(
        fmt::layer().with_writer(std::io::stderr).with_ansi(use_colors).with_target(true),
    );
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
