// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! The "run a command + mutate a file" capability every stage is written against.
//!
//! [`LocalHost`] performs the operations directly on this machine; the remote
//! driver provides a pod-backed implementation so the same probe, injection and
//! verification code runs unchanged inside a container reached over `kubectl`.

use std::ffi::CString;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::runner::{run_cmd_timeout, CmdOutput};

/// Timeout for `which` lookups.
pub const LOCATE_TIMEOUT: Duration = Duration::from_secs(10);

pub trait Target {
    /// Short human label ("localhost", "pod passwd-lab/vuln-passwd-pod").
    fn describe(&self) -> String;

    /// Run `argv[0]` with the remaining arguments.
    fn exec(&self, argv: &[&str], timeout: Duration) -> Result<CmdOutput>;

    /// Run a shell snippet with `sh -c`.
    fn exec_shell(&self, script: &str, timeout: Duration) -> Result<CmdOutput> {
        self.exec(&["sh", "-c", script], timeout)
    }

    /// Non-destructive write-access test for the calling identity.
    fn is_writable(&self, path: &Path) -> bool;

    fn exists(&self, path: &Path) -> bool;

    /// Open `path` for append and write `line` as-is.
    fn append_line(&self, path: &Path, line: &str) -> Result<()>;

    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Write `contents` to `path` and mark it 0755.
    fn write_executable(&self, path: &Path, contents: &str) -> Result<()>;

    /// Whether `tool` resolves on the target's PATH. Never fails.
    fn locate(&self, tool: &str) -> bool {
        match self.exec(&["which", tool], LOCATE_TIMEOUT) {
            Ok(out) => out.success() && !out.out().is_empty(),
            Err(e) => {
                tracing::debug!("which {} failed: {}", tool, e);
                false
            }
        }
    }

    /// True when commands run on this machine with an inheritable terminal.
    fn is_local(&self) -> bool {
        false
    }
}

/// The machine this process runs on.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalHost;

impl Target for LocalHost {
    fn describe(&self) -> String {
        "localhost".to_string()
    }

    fn exec(&self, argv: &[&str], timeout: Duration) -> Result<CmdOutput> {
        let (cmd, args) = argv
            .split_first()
            .context("Empty command line")?;
        run_cmd_timeout(cmd, args, timeout)
    }

    fn is_writable(&self, path: &Path) -> bool {
        let c_path = match CString::new(path.as_os_str().as_bytes()) {
            Ok(p) => p,
            Err(_) => return false,
        };
        unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn append_line(&self, path: &Path, line: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open {} for append", path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    fn write_executable(&self, path: &Path, contents: &str) -> Result<()> {
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("Failed to chmod {}", path.display()))?;
        Ok(())
    }

    fn is_local(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("passwd");
        std::fs::write(&path, "root:x:0:0:root:/root:/bin/bash\n").unwrap();
        LocalHost.append_line(&path, "lab:x:0:0:root:/root:/bin/sh\n").unwrap();
        assert_eq!(
            LocalHost.read_to_string(&path).unwrap(),
            "root:x:0:0:root:/root:/bin/bash\nlab:x:0:0:root:/root:/bin/sh\n"
        );
    }

    #[test]
    fn test_append_to_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LocalHost.append_line(&dir.path().join("absent"), "x\n").is_err());
    }

    #[test]
    fn test_writable_scratch_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shadow");
        std::fs::write(&path, "").unwrap();
        assert!(LocalHost.is_writable(&path));
        assert!(!LocalHost.is_writable(&dir.path().join("missing")));
    }

    #[test]
    fn test_write_executable_sets_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.sh");
        LocalHost.write_executable(&path, "#!/bin/sh\necho hi\n").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_exec_empty_argv_is_error() {
        assert!(LocalHost.exec(&[], LOCATE_TIMEOUT).is_err());
    }

    #[test]
    fn test_locate() {
        assert!(LocalHost.locate("sh"));
        assert!(!LocalHost.locate("definitely-not-a-real-binary-4821"));
    }
}
