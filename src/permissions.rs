// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Permission check on the account and credential databases.
//!
//! Nothing here reads or modifies file contents; the check is `access(W_OK)`
//! locally and `test -w` inside a pod.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::abort::Abort;
use crate::config::FilesConfig;
use crate::report;
use crate::target::Target;

/// Writable subset of the target file pair, in passwd, shadow order.
pub fn writable_targets(target: &dyn Target, files: &FilesConfig) -> Vec<PathBuf> {
    report::step("Checking file permissions...");
    let mut writable = Vec::new();
    for path in [&files.passwd, &files.shadow] {
        if target.is_writable(path) {
            report::good(&format!("{} is writable", path.display()));
            writable.push(path.clone());
        } else {
            report::bad(&format!("{} is not writable", path.display()));
        }
    }
    writable
}

/// Gate for every later step: at least one file must be writable.
pub fn require_writable(writable: &[PathBuf]) -> Result<(), Abort> {
    if writable.is_empty() {
        Err(Abort::NoWritableFiles)
    } else {
        Ok(())
    }
}

/// Print `ls -la` for each file; informational only.
pub fn describe_permissions(target: &dyn Target, files: &FilesConfig) {
    for path in [&files.passwd, &files.shadow] {
        let shown = path.to_string_lossy();
        match target.exec(&["ls", "-la", shown.as_ref()], Duration::from_secs(10)) {
            Ok(out) => report::step(&format!("{} permissions: {}", shown, out.out())),
            Err(e) => tracing::debug!("ls -la {} failed: {}", shown, e),
        }
    }
}

/// Octal mode from `stat -c %a`, or `None` when it cannot be determined.
pub fn file_mode(target: &dyn Target, path: &Path) -> Option<u32> {
    let shown = path.to_string_lossy();
    let out = target
        .exec(&["stat", "-c", "%a", shown.as_ref()], Duration::from_secs(10))
        .ok()?;
    if !out.success() {
        return None;
    }
    u32::from_str_radix(out.out(), 8).ok()
}

pub fn is_world_writable(mode: u32) -> bool {
    mode & 0o002 != 0
}
