// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Account injector: append the forged lines to both databases.
//!
//! The passwd line goes first and the shadow line is only attempted if that
//! succeeded. Nothing is rolled back, so a shadow failure leaves an account
//! entry with no credential entry behind.

use std::fmt;

use crate::account::ForgedAccount;
use crate::config::FilesConfig;
use crate::report;
use crate::target::Target;

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Appended,
    Failed(String),
    /// Not attempted because an earlier file failed
    Skipped,
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOutcome::Appended => write!(f, "appended"),
            FileOutcome::Failed(why) => write!(f, "failed: {}", why),
            FileOutcome::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionReport {
    pub passwd: FileOutcome,
    pub shadow: FileOutcome,
}

impl InjectionReport {
    pub fn success(&self) -> bool {
        self.passwd == FileOutcome::Appended && self.shadow == FileOutcome::Appended
    }

    /// Account entry written without its credential entry.
    pub fn is_mixed(&self) -> bool {
        self.passwd == FileOutcome::Appended && self.shadow != FileOutcome::Appended
    }

    /// First failure reason, for the abort message.
    pub fn failure(&self) -> Option<String> {
        match (&self.passwd, &self.shadow) {
            (FileOutcome::Failed(why), _) => Some(format!("passwd {}", why)),
            (_, FileOutcome::Failed(why)) => Some(format!("shadow {}", why)),
            _ => None,
        }
    }
}

fn append(target: &dyn Target, path: &std::path::Path, line: &str) -> FileOutcome {
    match target.append_line(path, line) {
        Ok(()) => {
            report::good(&format!("Added entry to {}", path.display()));
            FileOutcome::Appended
        }
        Err(e) => {
            report::bad(&format!("Failed to write to {}: {:#}", path.display(), e));
            FileOutcome::Failed(format!("{:#}", e))
        }
    }
}

pub fn inject(
    target: &dyn Target,
    files: &FilesConfig,
    account: &ForgedAccount,
    hash: &str,
) -> InjectionReport {
    report::step(&format!(
        "Adding fake user '{}' with UID {}...",
        account.username, account.uid
    ));

    let passwd = append(target, &files.passwd, &account.passwd_line());
    let shadow = if passwd == FileOutcome::Appended {
        append(target, &files.shadow, &account.shadow_line(hash))
    } else {
        FileOutcome::Skipped
    };

    let report = InjectionReport { passwd, shadow };
    if report.is_mixed() {
        tracing::warn!(
            "{} now lists '{}' without a matching {} entry",
            files.passwd.display(),
            account.username,
            files.shadow.display()
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccountConfig;
    use crate::profile::Profile;
    use crate::target::LocalHost;

    fn account() -> ForgedAccount {
        ForgedAccount::from_config(&AccountConfig::default(), Profile::Debian)
    }

    fn scratch(dir: &std::path::Path) -> FilesConfig {
        let files = FilesConfig {
            passwd: dir.join("passwd"),
            shadow: dir.join("shadow"),
        };
        std::fs::write(&files.passwd, "root:x:0:0:root:/root:/bin/bash\n").unwrap();
        std::fs::write(&files.shadow, "root:*:19485:0:99999:7:::\n").unwrap();
        files
    }

    #[test]
    fn test_end_to_end_scratch_passwd() {
        let dir = tempfile::tempdir().unwrap();
        let files = scratch(dir.path());
        let report = inject(&LocalHost, &files, &account(), "$6$abc$def");
        assert!(report.success());
        assert_eq!(
            std::fs::read_to_string(&files.passwd).unwrap(),
            "root:x:0:0:root:/root:/bin/bash\nhacked:x:0:0:root:/root:/bin/bash\n"
        );
    }

    #[test]
    fn test_exactly_one_new_line_each() {
        let dir = tempfile::tempdir().unwrap();
        let files = scratch(dir.path());
        inject(&LocalHost, &files, &account(), "$6$abc$def");

        let passwd = std::fs::read_to_string(&files.passwd).unwrap();
        let forged: Vec<&str> = passwd.lines().filter(|l| l.starts_with("hacked:")).collect();
        assert_eq!(forged, vec!["hacked:x:0:0:root:/root:/bin/bash"]);

        let shadow = std::fs::read_to_string(&files.shadow).unwrap();
        let forged: Vec<&str> = shadow.lines().filter(|l| l.starts_with("hacked:")).collect();
        assert_eq!(forged.len(), 1);
        assert!(forged[0].starts_with("hacked:$6$abc$def:"));
    }

    #[test]
    fn test_missing_shadow_leaves_mixed_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = scratch(dir.path());
        files.shadow = dir.path().join("absent");
        let report = inject(&LocalHost, &files, &account(), "$6$abc$def");
        assert!(!report.success());
        assert!(report.is_mixed());
        assert!(report.failure().unwrap().starts_with("shadow"));
        assert!(std::fs::read_to_string(&files.passwd).unwrap().contains("hacked:x:0:0"));
    }

    #[test]
    fn test_missing_passwd_skips_shadow() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = scratch(dir.path());
        files.passwd = dir.path().join("absent");
        let report = inject(&LocalHost, &files, &account(), "$6$abc$def");
        assert_eq!(report.shadow, FileOutcome::Skipped);
        assert!(!report.is_mixed());
        assert!(report.failure().unwrap().starts_with("passwd"));
        assert!(!std::fs::read_to_string(&files.shadow).unwrap().contains("hacked"));
    }
}
