// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Batch tester: drive the lab pods through fixed scenarios and tally results.
//!
//! Each scenario records one [`TestRecord`] per assertion into an
//! append-only [`TestLog`]. A scenario that errors out is recorded as a
//! failure and the batch moves on to the next one.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use regex::Regex;
use serde::Serialize;

use crate::config::Config;
use crate::exploit;
use crate::permissions::{file_mode, is_world_writable};
use crate::profile::Profile;
use crate::remote::{Cluster, PodTarget, RUNNING_PHASE};
use crate::report;
use crate::target::Target;

pub const PASS_LABEL: &str = "✅ PASS";
pub const FAIL_LABEL: &str = "❌ FAIL";

const EXEC_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a single assertion.
#[derive(Debug, Clone, Serialize)]
pub struct TestRecord {
    /// Scenario that produced this record
    pub scenario: String,
    /// Assertion name (e.g., "Pod Existence", "File Permissions")
    pub name: String,
    pub passed: bool,
    /// Human-readable description of what was observed
    pub details: String,
    pub timestamp: DateTime<Local>,
}

impl TestRecord {
    pub fn status(&self) -> &'static str {
        if self.passed {
            PASS_LABEL
        } else {
            FAIL_LABEL
        }
    }
}

/// Append-only, ordered record list.
#[derive(Debug, Default, Clone, Serialize)]
pub struct TestLog {
    records: Vec<TestRecord>,
}

impl TestLog {
    pub fn record(&mut self, scenario: &str, name: &str, passed: bool, details: &str) {
        let record = TestRecord {
            scenario: scenario.to_string(),
            name: name.to_string(),
            passed,
            details: details.to_string(),
            timestamp: Local::now(),
        };
        println!("{} {}: {}", record.status(), record.name, record.details);
        self.records.push(record);
    }

    pub fn records(&self) -> &[TestRecord] {
        &self.records
    }

    pub fn summary(&self) -> Summary {
        let total = self.records.len();
        let passed = self.records.iter().filter(|r| r.passed).count();
        Summary {
            total,
            passed,
            failed: total - passed,
            success_rate: success_rate(passed, total),
        }
    }
}

/// Aggregate pass/fail counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Percentage rounded to one decimal place
    pub success_rate: f64,
}

/// `passed / total * 100` rounded to one decimal; 0.0 for an empty batch.
pub fn success_rate(passed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    ((passed as f64 / total as f64) * 1000.0).round() / 10.0
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    namespace: &'a str,
    summary: Summary,
    records: &'a [TestRecord],
}

/// Fixed scenario list, run in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    VulnerablePod,
    NoCapabilities,
    AlpineContainer,
    Conditional,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::VulnerablePod,
        Scenario::NoCapabilities,
        Scenario::AlpineContainer,
        Scenario::Conditional,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Scenario::VulnerablePod => "vulnerable_pod",
            Scenario::NoCapabilities => "no_capabilities",
            Scenario::AlpineContainer => "alpine_container",
            Scenario::Conditional => "conditional_scenarios",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Scenario::VulnerablePod => "Test Case 1: Standard Vulnerable Pod",
            Scenario::NoCapabilities => "Test Case 2: No Capabilities Pod",
            Scenario::AlpineContainer => "Test Case 3: Alpine Container",
            Scenario::Conditional => "Test Case 4: Conditional Scenarios",
        }
    }
}

/// Effective UID from `id` output.
pub fn parse_uid(id_output: &str) -> Option<u32> {
    let re = Regex::new(r"uid=(\d+)").ok()?;
    re.captures(id_output)?.get(1)?.as_str().parse().ok()
}

/// Effective capability mask from `/proc/<pid>/status` text.
pub fn parse_cap_eff(status: &str) -> Option<u64> {
    let re = Regex::new(r"CapEff:\s*([0-9a-fA-F]+)").ok()?;
    u64::from_str_radix(re.captures(status)?.get(1)?.as_str(), 16).ok()
}

pub struct BatchTester<'a> {
    cluster: &'a dyn Cluster,
    config: &'a Config,
    namespace: String,
}

impl<'a> BatchTester<'a> {
    pub fn new(cluster: &'a dyn Cluster, config: &'a Config, namespace: &str) -> Self {
        Self {
            cluster,
            config,
            namespace: namespace.to_string(),
        }
    }

    fn pod(&self, name: &str) -> PodTarget<'a> {
        PodTarget::new(self.cluster, &self.namespace, name)
    }

    fn pod_running(&self, name: &str) -> bool {
        matches!(self.cluster.phase(&self.namespace, name), Ok(p) if p == RUNNING_PHASE)
    }

    /// Trimmed (stdout, stderr); spawn errors propagate and fail the scenario.
    fn exec_in_pod(&self, name: &str, script: &str) -> Result<(String, String)> {
        let out = self
            .cluster
            .exec(&self.namespace, name, script, EXEC_TIMEOUT)
            .with_context(|| format!("exec in pod {}", name))?;
        Ok((out.stdout.trim().to_string(), out.stderr.trim().to_string()))
    }

    fn passwd_path(&self) -> &Path {
        &self.config.files.passwd
    }

    fn check_existence(&self, log: &mut TestLog, scenario: Scenario, pod: &str) -> bool {
        if self.pod_running(pod) {
            log.record(scenario.key(), "Pod Existence", true, &format!("Pod {} is running", pod));
            true
        } else {
            log.record(scenario.key(), "Pod Existence", false, &format!("Pod {} not found", pod));
            false
        }
    }

    fn check_world_writable(&self, log: &mut TestLog, scenario: Scenario, pod: &str) -> bool {
        let target = self.pod(pod);
        let shown = self.passwd_path().display();
        match file_mode(&target, self.passwd_path()) {
            Some(mode) if is_world_writable(mode) => {
                log.record(
                    scenario.key(),
                    "File Permissions",
                    true,
                    &format!("{} is world writable ({:o})", shown, mode),
                );
                true
            }
            _ => {
                log.record(
                    scenario.key(),
                    "File Permissions",
                    false,
                    &format!("{} is not world writable", shown),
                );
                false
            }
        }
    }

    /// Run the exploit flow in the pod; `Err` carries the abort reason.
    fn escalate(&self, pod: &str, profile: Option<Profile>) -> Result<exploit::Outcome, String> {
        let target = self.pod(pod);
        let profile = profile.unwrap_or_else(|| Profile::detect(&target));
        exploit::run(&target, self.config, profile).map_err(|e| e.to_string())
    }

    fn scenario_vulnerable_pod(&self, log: &mut TestLog) -> Result<()> {
        let s = Scenario::VulnerablePod;
        let pod = &self.config.batch.vulnerable_pod;
        if !self.check_existence(log, s, pod) || !self.check_world_writable(log, s, pod) {
            return Ok(());
        }
        match self.escalate(pod, Some(Profile::Debian)) {
            Ok(outcome) => log.record(
                s.key(),
                "Privilege Escalation",
                true,
                &format!("Successfully exploited /etc/passwd ({})", outcome.verdict),
            ),
            Err(why) => log.record(
                s.key(),
                "Privilege Escalation",
                false,
                &format!("Failed to exploit /etc/passwd: {}", why),
            ),
        }
        Ok(())
    }

    fn scenario_no_capabilities(&self, log: &mut TestLog) -> Result<()> {
        let s = Scenario::NoCapabilities;
        let pod = &self.config.batch.no_caps_pod;
        if !self.check_existence(log, s, pod) {
            return Ok(());
        }

        let (status, _) = self.exec_in_pod(pod, "grep CapEff /proc/1/status")?;
        match parse_cap_eff(&status) {
            Some(0) => log.record(s.key(), "Capabilities Check", true, "All capabilities dropped"),
            Some(mask) => log.record(
                s.key(),
                "Capabilities Check",
                false,
                &format!("Capabilities not fully dropped (CapEff={:016x})", mask),
            ),
            None => log.record(s.key(), "Capabilities Check", false, "CapEff not readable"),
        }

        if !self.check_world_writable(log, s, pod) {
            return Ok(());
        }
        match self.escalate(pod, Some(Profile::Debian)) {
            Ok(_) => log.record(
                s.key(),
                "Privilege Escalation",
                true,
                "WARNING: Privilege escalation still possible despite no capabilities",
            ),
            Err(_) => log.record(
                s.key(),
                "Privilege Escalation",
                false,
                "Privilege escalation blocked (expected behavior)",
            ),
        }
        Ok(())
    }

    fn scenario_alpine(&self, log: &mut TestLog) -> Result<()> {
        let s = Scenario::AlpineContainer;
        let pod = &self.config.batch.alpine_pod;
        if !self.check_existence(log, s, pod) {
            return Ok(());
        }

        let target = self.pod(pod);
        for (tool, name, found, missing) in [
            ("openssl", "OpenSSL Available", "OpenSSL found in container", "OpenSSL not available (expected)"),
            ("su", "SU Available", "SU command found", "SU command not available"),
            ("busybox", "Busybox Available", "Busybox found", "Busybox not available"),
        ] {
            let present = target.locate(tool);
            log.record(s.key(), name, present, if present { found } else { missing });
        }

        if !self.check_world_writable(log, s, pod) {
            return Ok(());
        }
        match self.escalate(pod, None) {
            Ok(outcome) => log.record(
                s.key(),
                "Privilege Escalation",
                true,
                &format!(
                    "Successfully exploited /etc/passwd in {} container ({})",
                    outcome.profile, outcome.verdict
                ),
            ),
            Err(why) => log.record(
                s.key(),
                "Privilege Escalation",
                false,
                &format!("Failed to exploit /etc/passwd in alpine container: {}", why),
            ),
        }
        Ok(())
    }

    fn file_writable(&self, pod: &str) -> Result<bool> {
        let script = format!(
            "test -w {} && echo 'writable'",
            crate::remote::quote(&self.passwd_path().to_string_lossy())
        );
        let (out, _) = self.exec_in_pod(pod, &script)?;
        Ok(out.contains("writable"))
    }

    fn writable_as_uid_1000(&self) -> Result<bool> {
        let pod = &self.config.batch.vulnerable_pod;
        if !self.pod_running(pod) {
            return Ok(false);
        }
        let (id, _) = self.exec_in_pod(pod, "id")?;
        if parse_uid(&id) != Some(1000) {
            return Ok(false);
        }
        self.file_writable(pod)
    }

    fn writable_as_uid_0(&self) -> Result<bool> {
        let pod = &self.config.batch.vulnerable_pod;
        if !self.pod_running(pod) {
            return Ok(false);
        }
        let (out, _) = self.exec_in_pod(pod, "sudo -n id 2>/dev/null || echo 'no sudo'")?;
        if out.contains("no sudo") {
            return Ok(false);
        }
        self.file_writable(pod)
    }

    /// True when a `chmod` on the passwd file is refused.
    fn chmod_refused(&self) -> Result<bool> {
        let pod = &self.config.batch.vulnerable_pod;
        if !self.pod_running(pod) {
            return Ok(false);
        }
        let script = format!(
            "chmod 644 {} 2>&1",
            crate::remote::quote(&self.passwd_path().to_string_lossy())
        );
        let (out, err) = self.exec_in_pod(pod, &script)?;
        let combined = format!("{}\n{}", out, err);
        Ok(combined.contains("Permission denied") || combined.contains("Operation not permitted"))
    }

    fn scenario_conditional(&self, log: &mut TestLog) -> Result<()> {
        let s = Scenario::Conditional;
        let conditions: [(&str, fn(&Self) -> Result<bool>, bool); 3] = [
            ("File Writable + User 1000", Self::writable_as_uid_1000, true),
            ("File Writable + User 0", Self::writable_as_uid_0, true),
            ("File Not Writable + Any User", Self::chmod_refused, false),
        ];
        for (name, condition, expected) in conditions {
            let got = condition(self)?;
            log.record(
                s.key(),
                name,
                got == expected,
                &format!("Expected: {}, Got: {}", expected, got),
            );
        }
        Ok(())
    }

    fn run_scenario(&self, scenario: Scenario, log: &mut TestLog) -> Result<()> {
        match scenario {
            Scenario::VulnerablePod => self.scenario_vulnerable_pod(log),
            Scenario::NoCapabilities => self.scenario_no_capabilities(log),
            Scenario::AlpineContainer => self.scenario_alpine(log),
            Scenario::Conditional => self.scenario_conditional(log),
        }
    }

    /// Run every scenario; errors become failed records.
    pub fn run_all(&self) -> TestLog {
        report::banner("🚀 Starting Comprehensive Privilege Escalation Tests", 70);
        let mut log = TestLog::default();
        for scenario in Scenario::ALL {
            println!();
            report::banner(&format!("🔍 {}", scenario.title()), 50);
            if let Err(e) = self.run_scenario(scenario, &mut log) {
                tracing::warn!("scenario {} errored: {:#}", scenario.key(), e);
                log.record(
                    scenario.key(),
                    scenario.key(),
                    false,
                    &format!("Test failed with error: {:#}", e),
                );
            }
        }
        log
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

pub fn print_summary(log: &TestLog) {
    let summary = log.summary();
    println!("\n{}", "=".repeat(70));
    println!("📊 TEST SUMMARY");
    println!("{}", "=".repeat(70));
    println!("Total Tests: {}", summary.total);
    println!("Passed: {}", summary.passed);
    println!("Failed: {}", summary.failed);
    println!("Success Rate: {:.1}%", summary.success_rate);

    println!("\nDetailed Results:");
    for record in log.records() {
        println!("  {} {}", record.status(), record.name);
        if !record.details.is_empty() {
            println!("    Details: {}", record.details);
        }
    }
}

/// Write the summary and every record as pretty JSON.
pub fn write_report(log: &TestLog, namespace: &str, path: &Path) -> Result<()> {
    let report = Report {
        namespace,
        summary: log.summary(),
        records: log.records(),
    };
    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilesConfig;
    use crate::remote::tests::FakeCluster;
    use crate::runner::CmdOutput;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_success_rate_rounding() {
        assert_eq!(success_rate(0, 0), 0.0);
        assert_eq!(success_rate(1, 3), 33.3);
        assert_eq!(success_rate(2, 3), 66.7);
        assert_eq!(success_rate(5, 5), 100.0);
        assert_eq!(format!("{:.1}", success_rate(1, 6)), "16.7");
    }

    #[test]
    fn test_summary_never_exceeds_total() {
        let mut log = TestLog::default();
        for i in 0..7 {
            log.record("s", &format!("t{}", i), i % 3 == 0, "");
        }
        let s = log.summary();
        assert_eq!(s.total, 7);
        assert_eq!(s.passed, 3);
        assert_eq!(s.failed, 4);
        assert!(s.passed <= s.total);
        assert_eq!(s.success_rate, success_rate(3, 7));
    }

    #[test]
    fn test_log_keeps_duplicate_names_in_order() {
        let mut log = TestLog::default();
        log.record("a", "Pod Existence", true, "one");
        log.record("b", "Pod Existence", false, "two");
        let details: Vec<&str> = log.records().iter().map(|r| r.details.as_str()).collect();
        assert_eq!(details, vec!["one", "two"]);
        assert_eq!(log.records()[1].status(), FAIL_LABEL);
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_uid("uid=1000(app) gid=1000(app) groups=1000(app)"), Some(1000));
        assert_eq!(parse_uid("uid=0(root) gid=0(root)"), Some(0));
        assert_eq!(parse_uid("no sudo"), None);
        assert_eq!(parse_cap_eff("CapEff:\t0000000000000000"), Some(0));
        assert_eq!(parse_cap_eff("CapEff:\t00000000a80425fb"), Some(0xa80425fb));
        assert_eq!(parse_cap_eff(""), None);
    }

    #[test]
    fn test_no_running_pods() {
        let cluster = FakeCluster {
            phase: "Pending".to_string(),
        };
        let config = Config::default();
        let log = BatchTester::new(&cluster, &config, "passwd-lab").run_all();
        let names: Vec<&str> = log.records().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Pod Existence",
                "Pod Existence",
                "Pod Existence",
                "File Writable + User 1000",
                "File Writable + User 0",
                "File Not Writable + Any User",
            ]
        );
        let s = log.summary();
        assert_eq!((s.total, s.passed), (6, 1));
        assert_eq!(s.success_rate, 16.7);
    }

    struct BrokenExec;

    impl Cluster for BrokenExec {
        fn phase(&self, _namespace: &str, _pod: &str) -> Result<String> {
            Ok(RUNNING_PHASE.to_string())
        }
        fn exec(&self, _: &str, _: &str, _: &str, _: Duration) -> Result<CmdOutput> {
            anyhow::bail!("kubectl: connection refused")
        }
    }

    #[test]
    fn test_scenario_errors_do_not_abort_batch() {
        let config = Config::default();
        let log = BatchTester::new(&BrokenExec, &config, "passwd-lab").run_all();
        let errored: Vec<&TestRecord> = log
            .records()
            .iter()
            .filter(|r| r.details.starts_with("Test failed with error"))
            .collect();
        let scenarios: Vec<&str> = errored.iter().map(|r| r.scenario.as_str()).collect();
        assert_eq!(scenarios, vec!["no_capabilities", "conditional_scenarios"]);
        // Every scenario still produced at least one record.
        for s in Scenario::ALL {
            assert!(log.records().iter().any(|r| r.scenario == s.key()));
        }
    }

    #[test]
    fn test_vulnerable_pod_scenario_on_scratch_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.files = FilesConfig {
            passwd: dir.path().join("passwd"),
            shadow: dir.path().join("shadow"),
        };
        config.account.username = "lab-nonexistent-user".to_string();
        config.verify.script_path = dir.path().join("probe.sh");
        config.hash.strategies = vec!["library".to_string()];
        std::fs::write(&config.files.passwd, "root:x:0:0:root:/root:/bin/bash\n").unwrap();
        std::fs::write(&config.files.shadow, "").unwrap();
        std::fs::set_permissions(&config.files.passwd, std::fs::Permissions::from_mode(0o666))
            .unwrap();

        let cluster = FakeCluster::running();
        let tester = BatchTester::new(&cluster, &config, "passwd-lab");
        let mut log = TestLog::default();
        tester.scenario_vulnerable_pod(&mut log).unwrap();

        let results: Vec<(&str, bool)> =
            log.records().iter().map(|r| (r.name.as_str(), r.passed)).collect();
        assert_eq!(
            results,
            vec![
                ("Pod Existence", true),
                ("File Permissions", true),
                ("Privilege Escalation", true),
            ]
        );
        assert!(std::fs::read_to_string(&config.files.passwd)
            .unwrap()
            .contains("lab-nonexistent-user:x:0:0:root"));
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let mut log = TestLog::default();
        log.record("vulnerable_pod", "Pod Existence", true, "Pod vuln-passwd-pod is running");
        write_report(&log, "passwd-lab", &path).unwrap();
        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["namespace"], "passwd-lab");
        assert_eq!(v["summary"]["total"], 1);
        assert_eq!(v["records"][0]["name"], "Pod Existence");
    }
}
