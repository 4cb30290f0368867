// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Container base images the lab knows how to drive.
//!
//! The three images differ only in login shell, which helper binaries are
//! worth probing for, and which `su` flavour to try first.

use std::fmt;
use std::path::Path;

use crate::target::Target;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// glibc userland with bash, shadow-utils `su`, usually `openssl`
    Debian,
    /// musl + busybox applets, `apk` package manager
    Alpine,
    /// Bare busybox image
    Busybox,
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::Debian => write!(f, "debian"),
            Profile::Alpine => write!(f, "alpine"),
            Profile::Busybox => write!(f, "busybox"),
        }
    }
}

/// One way of running a command as the forged account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuMethod {
    /// shadow-utils / util-linux `su <user> -c id`
    Su,
    /// `busybox su <user> -c id`
    BusyboxSu,
}

impl Profile {
    /// Parse a CLI profile name. `None` for unknown names; "auto" is handled by the caller.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "debian" | "glibc" | "ubuntu" => Some(Profile::Debian),
            "alpine" => Some(Profile::Alpine),
            "busybox" => Some(Profile::Busybox),
            _ => None,
        }
    }

    /// Guess the image from marker files and available binaries.
    pub fn detect(target: &dyn Target) -> Self {
        if target.exists(Path::new("/etc/alpine-release")) {
            Profile::Alpine
        } else if !target.exists(Path::new("/bin/bash")) && target.locate("busybox") {
            Profile::Busybox
        } else {
            Profile::Debian
        }
    }

    pub fn login_shell(&self) -> &'static str {
        match self {
            Profile::Debian => "/bin/bash",
            Profile::Alpine | Profile::Busybox => "/bin/sh",
        }
    }

    /// Tools reported by the capability probe.
    pub fn probe_candidates(&self) -> &'static [&'static str] {
        match self {
            Profile::Debian => &["openssl", "su", "python3", "apt"],
            Profile::Alpine => &["openssl", "su", "python3", "apk"],
            Profile::Busybox => &["openssl", "su", "python3", "busybox"],
        }
    }

    pub fn su_methods(&self) -> &'static [SuMethod] {
        match self {
            Profile::Debian => &[SuMethod::Su, SuMethod::BusyboxSu],
            Profile::Alpine => &[SuMethod::Su],
            Profile::Busybox => &[SuMethod::BusyboxSu, SuMethod::Su],
        }
    }

    /// Interpreters tried, in order, for the generated probe script.
    /// An empty prefix means "execute the script directly".
    pub fn script_runners(&self) -> &'static [&'static [&'static str]] {
        match self {
            Profile::Debian | Profile::Alpine => &[&["sh"], &[]],
            Profile::Busybox => &[&["busybox", "sh"], &["sh"], &[]],
        }
    }

    /// Banner title for a local run.
    pub fn title(&self) -> &'static str {
        match self {
            Profile::Debian => "🔓 /etc/passwd Privilege Escalation Test",
            Profile::Alpine => "🔓 Alpine /etc/passwd Privilege Escalation Test",
            Profile::Busybox => "🔓 Busybox /etc/passwd Privilege Escalation Test",
        }
    }
}
