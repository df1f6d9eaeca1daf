// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Module that provides functions which are convenient for different purposes.
//!
//! The `error` and `info_operation` functions must be used for diagnostic
//! output. They write to stderr, since stdout carries the command's results.

use irep_bindings::irep::binary_serde::MAGIC;
use irep_bindings::irep::esbmc_binary::ESBMC_HEADER;

/// The formats the driver can read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputFormat {
    Native,
    Esbmc,
}

impl InputFormat {
    /// Guess the format from the first bytes of a file.
    pub fn detect(bytes: &[u8]) -> Option<InputFormat> {
        if bytes.starts_with(&MAGIC) {
            Some(InputFormat::Native)
        } else if bytes.starts_with(&ESBMC_HEADER) {
            Some(InputFormat::Esbmc)
        } else {
            None
        }
    }
}

/// Print an error message. This will add an "error:" tag before the message and style accordingly.
pub fn error(msg: &str) {
    let error = console::style("error:").bold().red();
    let msg_fmt = console::style(msg).bold();
    eprintln!("{error} {msg_fmt}")
}

/// Print an info message. This will print the stage in bold green and the rest in regular style.
pub fn info_operation(op: &str, msg: &str) {
    let op_fmt = console::style(op).bold().green();
    let msg_fmt = console::style(msg);
    eprintln!("{op_fmt} {msg_fmt}")
}
