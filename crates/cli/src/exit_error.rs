// SPDX-License-Identifier: MIT

//! Custom error type that carries a process exit code.
//!
//! `main()` maps an `ExitError` straight to `std::process::exit(code)`
//! instead of every fallible step choosing its own exit code inline.

use std::fmt;

#[derive(Debug)]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExitError {}
