// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Environmental precondition failures that end a run with exit status 1.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Abort {
    /// Neither the account nor the credential database is writable
    NoWritableFiles,
    /// Every hash strategy failed or produced nothing
    HashUnavailable,
    /// Appending the forged lines failed on at least one file
    InjectionFailed(String),
    /// The remote workload is not in the `Running` phase
    TargetNotRunning { namespace: String, pod: String, phase: String },
}

impl fmt::Display for Abort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Abort::NoWritableFiles => {
                write!(f, "No writable files found. Privilege escalation not possible.")
            }
            Abort::HashUnavailable => write!(f, "Failed to generate password hash"),
            Abort::InjectionFailed(why) => write!(f, "Failed to add fake user: {}", why),
            Abort::TargetNotRunning { namespace, pod, phase } => write!(
                f,
                "Pod {} is not running in namespace {} (phase: {})",
                pod, namespace, phase
            ),
        }
    }
}

impl std::error::Error for Abort {}

/// Process exit code for an aborted run.
pub const EXIT_ABORT: u8 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let a = Abort::TargetNotRunning {
            namespace: "passwd-lab".into(),
            pod: "vuln-passwd-pod".into(),
            phase: "Pending".into(),
        };
        assert_eq!(
            a.to_string(),
            "Pod vuln-passwd-pod is not running in namespace passwd-lab (phase: Pending)"
        );
        assert!(Abort::NoWritableFiles.to_string().contains("No writable files"));
    }

    #[test]
    fn test_downcasts_through_anyhow() {
        let err: anyhow::Error = Abort::HashUnavailable.into();
        assert_eq!(err.downcast_ref::<Abort>(), Some(&Abort::HashUnavailable));
    }
}
