// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Command line arguments of `irep-driver`.
use clap::error::{Error, ErrorKind};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::filter::Directive;

/// Environment variable used to control this driver's logging.
pub const LOG_ENV_VAR: &str = "IREP_LOG";

pub trait ValidateArgs {
    /// Perform post-parsing validation but do not abort.
    fn validate(&self) -> Result<(), Error>;
}

/// Validate a set of arguments and ensure they are in a valid state.
/// This method will abort execution with a user friendly error message if the state is invalid.
pub fn check_is_valid<T>(command: &T)
where
    T: clap::Parser + ValidateArgs,
{
    command
        .validate()
        .or_else(|e| -> Result<(), ()> { e.format(&mut T::command()).exit() })
        .unwrap()
}

/// Inspect, convert and check irep binary files.
#[derive(Debug, Parser)]
#[command(version, name = "irep-driver")]
pub struct DriverArgs {
    #[command(flatten)]
    pub log: LogArgs,

    #[command(subcommand)]
    pub command: DriverSubcommand,
}

#[derive(Debug, clap::Args)]
pub struct LogArgs {
    /// Extra tracing directive, added to the ones found in `IREP_LOG`. E.g.: `debug`
    #[arg(long, value_name = "DIRECTIVE", value_parser = parse_directive)]
    pub log_level: Option<Directive>,

    /// Print logs as JSON objects
    #[arg(long)]
    pub json_logs: bool,
}

#[derive(Debug, Subcommand)]
pub enum DriverSubcommand {
    /// Print node, string and root counts, and how much the roots share
    Stats {
        /// Native or ESBMC irep file
        input: PathBuf,
    },

    /// Print the ireps as JSON
    Dump {
        /// Native or ESBMC irep file
        input: PathBuf,

        /// Only print the root at this position
        #[arg(long, value_name = "N")]
        root: Option<usize>,
    },

    /// Convert an ESBMC irep stream to the native format
    Convert {
        /// ESBMC irep file
        input: PathBuf,

        /// Where to write the native file
        #[arg(long, short)]
        output: PathBuf,
    },

    /// Read a file, write it back and make sure the result reads the same
    Check {
        /// Native or ESBMC irep file
        input: PathBuf,
    },
}

fn parse_directive(value: &str) -> Result<Directive, String> {
    Directive::from_str(value).map_err(|e| e.to_string())
}

impl ValidateArgs for DriverArgs {
    fn validate(&self) -> Result<(), Error> {
        match &self.command {
            DriverSubcommand::Convert { input, output } if input == output => Err(Error::raw(
                ErrorKind::ArgumentConflict,
                "The output file must be different from the input file.",
            )),
            _ => Ok(()),
        }
    }
}
