// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Configuration loading and serialization.
//!
//! Defines the TOML configuration schema for passwd-lab. The root [`Config`]
//! struct contains one section per stage of the lab (forged account, target
//! files, hash strategies, verification, remote driver, batch tester).
//!
//! All sections implement `Default` and `serde::Deserialize` with
//! `#[serde(default)]` so missing fields fall back to the lab defaults. Config
//! is loaded from `/etc/passwd-lab/config.toml` unless `PASSWD_LAB_CONFIG`
//! points elsewhere; a missing file is not an error.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config location inside a lab container.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/passwd-lab/config.toml";

/// Root configuration struct, deserialized from TOML.
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub account: AccountConfig,
    pub files: FilesConfig,
    pub hash: HashConfig,
    pub verify: VerifyConfig,
    pub remote: RemoteConfig,
    pub batch: BatchConfig,
}

/// The forged account appended to the account and credential databases.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AccountConfig {
    pub username: String,
    pub password: String,
    pub uid: u32,
    pub gid: u32,
    pub gecos: String,
    pub home: String,
    /// Login shell; empty means "use the profile's shell"
    pub shell: String,
    /// Days since epoch of the last password change (shadow field 3)
    pub last_change: u32,
    pub min_days: u32,
    pub max_days: u32,
    pub warn_days: u32,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            username: "hacked".to_string(),
            password: "password123".to_string(),
            uid: 0,
            gid: 0,
            gecos: "root".to_string(),
            home: "/root".to_string(),
            shell: String::new(),
            last_change: 19485,
            min_days: 0,
            max_days: 99999,
            warn_days: 7,
        }
    }
}

/// Paths of the account database and credential database.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct FilesConfig {
    pub passwd: PathBuf,
    pub shadow: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            passwd: PathBuf::from("/etc/passwd"),
            shadow: PathBuf::from("/etc/shadow"),
        }
    }
}

/// Hash generation: strategy order and the salt used by the weak fallback.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct HashConfig {
    /// Strategy names tried in order: native, openssl, busybox, library, digest
    pub strategies: Vec<String>,
    pub fallback_salt: String,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            strategies: ["native", "openssl", "busybox", "library", "digest"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            fallback_salt: "salt123".to_string(),
        }
    }
}

/// Post-injection verification settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct VerifyConfig {
    /// Timeout for each execution attempt, in seconds
    pub timeout_secs: u64,
    /// Where the throwaway shell script is written
    pub script_path: PathBuf,
    /// Hand the terminal to `su <user>` once a local run finishes
    pub interactive_su: bool,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            script_path: PathBuf::from("/tmp/test_shell.sh"),
            interactive_su: false,
        }
    }
}

/// Remote driver: how to reach a pod through the cluster CLI.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RemoteConfig {
    pub kubectl: String,
    pub namespace: String,
    pub pod: String,
    /// Shell used for `kubectl exec ... -- <shell> -c <script>`
    pub shell: String,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            kubectl: "kubectl".to_string(),
            namespace: "passwd-lab".to_string(),
            pod: "vuln-passwd-pod".to_string(),
            shell: "sh".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Batch tester: namespace and the pods each scenario targets.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    pub namespace: String,
    pub vulnerable_pod: String,
    pub no_caps_pod: String,
    pub alpine_pod: String,
    /// Write the summary as JSON here when set
    pub report_path: Option<PathBuf>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            namespace: "passwd-lab".to_string(),
            vulnerable_pod: "vuln-passwd-pod".to_string(),
            no_caps_pod: "vuln-passwd-pod-no-caps".to_string(),
            alpine_pod: "vuln-passwd-pod-alpine".to_string(),
            report_path: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| "Failed to parse config")?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise return the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }
}

/// Resolve the config path from `PASSWD_LAB_CONFIG`, falling back to the default.
pub fn config_path() -> PathBuf {
    std::env::var("PASSWD_LAB_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}
