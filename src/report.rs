// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Operator-facing status lines.
//!
//! Everything the lab tells the operator goes to stdout with a one-glyph
//! prefix; diagnostics go through `tracing` to stderr instead.

use std::fmt;

/// Prefix class of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    /// `[*]` progress
    Step,
    /// `[+]` something worked
    Good,
    /// `[-]` something failed
    Bad,
    /// `[!]` degraded but continuing
    Warn,
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::Step => write!(f, "[*]"),
            Mark::Good => write!(f, "[+]"),
            Mark::Bad => write!(f, "[-]"),
            Mark::Warn => write!(f, "[!]"),
        }
    }
}

pub fn line(mark: Mark, msg: &str) -> String {
    format!("{} {}", mark, msg)
}

pub fn step(msg: &str) {
    println!("{}", line(Mark::Step, msg));
}

pub fn good(msg: &str) {
    println!("{}", line(Mark::Good, msg));
}

pub fn bad(msg: &str) {
    println!("{}", line(Mark::Bad, msg));
}

pub fn warn(msg: &str) {
    println!("{}", line(Mark::Warn, msg));
}

/// Title plus a rule of `=` the width of the lab banners.
pub fn banner(title: &str, width: usize) {
    println!("{}", title);
    println!("{}", "=".repeat(width));
}
