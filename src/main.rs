// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! passwd-lab: world-writable /etc/passwd + /etc/shadow escalation lab.
//!
//! Entry point. Parses the subcommand, loads config and dispatches to one of
//! three drivers:
//!
//! - **local**: probe, check, hash, inject and verify on this machine
//! - **remote**: the same flow inside a pod, through `kubectl exec`
//! - **batch**: fixed scenarios across the lab pods with a pass/fail summary
//!
//! Exit status is 0 whenever a run completes, whether or not escalation was
//! confirmed; environmental preconditions (no writable file, pod not running)
//! exit 1.

mod abort;
mod account;
mod batch;
mod config;
mod exploit;
mod hash;
mod inject;
mod permissions;
mod probe;
mod profile;
mod remote;
mod report;
mod runner;
mod target;
mod verify;

use std::process::ExitCode;

use abort::{Abort, EXIT_ABORT};
use config::Config;
use profile::Profile;
use target::{LocalHost, Target};
use tracing_subscriber::EnvFilter;

const EXIT_OK: u8 = 0;

fn print_help() {
    eprintln!(r#"🔓 passwd-lab: world-writable /etc/passwd privilege escalation lab

USAGE:
    passwd-lab [COMMAND] [ARGS]

COMMANDS:
    local [PROFILE]           Run the exploit on this machine (default)
                              PROFILE: debian | alpine | busybox | auto (default)
    remote [NAMESPACE [POD]]  Run the exploit inside a pod via kubectl
    batch [NAMESPACE]         Run every lab scenario and print a summary
    init-config [PATH]        Write the default config (to PATH or the config path)
    help                      Show this help message
    version                   Show version info

CONFIG:
    Default config path: /etc/passwd-lab/config.toml
    Override with:       PASSWD_LAB_CONFIG=/path/to/config.toml
    Log level:           RUST_LOG=debug
"#);
}

fn print_version() {
    eprintln!("passwd-lab v{}", env!("CARGO_PKG_VERSION"));
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn abort_exit(abort: &Abort) -> ExitCode {
    report::bad(&abort.to_string());
    ExitCode::from(EXIT_ABORT)
}

fn resolve_profile(name: Option<&str>, target: &dyn Target) -> Result<Profile, String> {
    match name {
        None | Some("auto") => Ok(Profile::detect(target)),
        Some(n) => Profile::from_name(n).ok_or_else(|| format!("Unknown profile '{}'", n)),
    }
}

fn run_local(config: &Config, profile_name: Option<&str>) -> ExitCode {
    let target = LocalHost;
    let profile = match resolve_profile(profile_name, &target) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(EXIT_ABORT);
        }
    };

    report::banner(profile.title(), 60);
    let outcome = match exploit::run(&target, config, profile) {
        Ok(o) => o,
        Err(abort) => return abort_exit(&abort),
    };
    exploit::print_outcome(&outcome);

    if config.verify.interactive_su && target.is_local() {
        report::step(&format!("Trying to switch to {} user...", outcome.account.username));
        if let Err(e) = std::process::Command::new("su")
            .arg(&outcome.account.username)
            .status()
        {
            report::bad(&format!("Could not start su: {}", e));
        }
    }

    println!("\n[*] Test completed");
    ExitCode::from(EXIT_OK)
}

fn run_remote(config: &Config, namespace: Option<&str>, pod: Option<&str>) -> ExitCode {
    let namespace = namespace.unwrap_or(&config.remote.namespace);
    let pod = pod.unwrap_or(&config.remote.pod);
    let kubectl = remote::Kubectl::from_config(config);

    report::banner("🔓 Kubernetes /etc/passwd Privilege Escalation Test", 60);
    match remote::drive(&kubectl, config, namespace, pod, None) {
        Ok(outcome) => exploit::print_outcome(&outcome),
        Err(abort) => return abort_exit(&abort),
    }
    println!("\n[*] Test completed");
    ExitCode::from(EXIT_OK)
}

fn run_batch(config: &Config, namespace: Option<&str>) -> ExitCode {
    let namespace = namespace.unwrap_or(&config.batch.namespace);
    let kubectl = remote::Kubectl::from_config(config);
    let tester = batch::BatchTester::new(&kubectl, config, namespace);
    let log = tester.run_all();
    batch::print_summary(&log);

    if let Some(path) = &config.batch.report_path {
        match batch::write_report(&log, tester.namespace(), path) {
            Ok(()) => report::good(&format!("Report written to {}", path.display())),
            Err(e) => report::bad(&format!("{:#}", e)),
        }
    }
    ExitCode::from(EXIT_OK)
}

fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let subcommand = args.get(1).map(|s| s.as_str()).unwrap_or("local");
    let arg = |i: usize| args.get(i).map(|s| s.as_str());

    match subcommand {
        "help" | "--help" | "-h" => {
            print_help();
            return ExitCode::from(EXIT_OK);
        }
        "version" | "--version" | "-V" => {
            print_version();
            return ExitCode::from(EXIT_OK);
        }
        _ => {}
    }

    let path = config::config_path();
    if subcommand == "init-config" {
        let dest = arg(2).map(std::path::PathBuf::from).unwrap_or(path);
        return match Config::default().save(&dest) {
            Ok(()) => {
                report::good(&format!("Default config written to {}", dest.display()));
                ExitCode::from(EXIT_OK)
            }
            Err(e) => {
                eprintln!("{:#}", e);
                ExitCode::from(EXIT_ABORT)
            }
        };
    }

    let config = match Config::load_or_default(&path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::from(EXIT_ABORT);
        }
    };

    match subcommand {
        "local" => run_local(&config, arg(2)),
        "remote" => run_remote(&config, arg(2), arg(3)),
        "batch" => run_batch(&config, arg(2)),
        other => {
            eprintln!("Unknown command '{}'\n", other);
            print_help();
            ExitCode::from(EXIT_ABORT)
        }
    }
}
