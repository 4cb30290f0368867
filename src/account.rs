// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! The forged account and the two database lines that describe it.

use crate::config::AccountConfig;
use crate::profile::Profile;

/// Shadow aging fields written after the hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aging {
    pub last_change: u32,
    pub min_days: u32,
    pub max_days: u32,
    pub warn_days: u32,
}

/// Synthetic UID/GID 0 account. Built once per run, appended once, never removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForgedAccount {
    pub username: String,
    pub uid: u32,
    pub gid: u32,
    pub gecos: String,
    pub home: String,
    pub shell: String,
    pub aging: Aging,
}

impl ForgedAccount {
    /// From config; an empty configured shell takes the profile's login shell.
    pub fn from_config(config: &AccountConfig, profile: Profile) -> Self {
        let shell = if config.shell.is_empty() {
            profile.login_shell().to_string()
        } else {
            config.shell.clone()
        };
        Self {
            username: config.username.clone(),
            uid: config.uid,
            gid: config.gid,
            gecos: config.gecos.clone(),
            home: config.home.clone(),
            shell,
            aging: Aging {
                last_change: config.last_change,
                min_days: config.min_days,
                max_days: config.max_days,
                warn_days: config.warn_days,
            },
        }
    }

    /// `name:x:uid:gid:gecos:home:shell\n`
    pub fn passwd_line(&self) -> String {
        format!(
            "{}:x:{}:{}:{}:{}:{}\n",
            self.username, self.uid, self.gid, self.gecos, self.home, self.shell
        )
    }

    /// `name:hash:last:min:max:warn:::\n` (inactive and expire left empty)
    pub fn shadow_line(&self, hash: &str) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}:::\n",
            self.username,
            hash,
            self.aging.last_change,
            self.aging.min_days,
            self.aging.max_days,
            self.aging.warn_days
        )
    }

    /// Leading passwd fields the verifier searches for.
    pub fn presence_marker(&self) -> String {
        format!("{}:x:{}:{}:{}", self.username, self.uid, self.gid, self.gecos)
    }
}

/// One parsed line of the account database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswdEntry {
    pub name: String,
    pub password: String,
    pub uid: u32,
    pub gid: u32,
    pub gecos: String,
    pub home: String,
    pub shell: String,
}

impl PasswdEntry {
    /// Parse a 7-field line; `None` for comments, blanks or malformed records.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches('\n');
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() != 7 {
            return None;
        }
        Some(Self {
            name: fields[0].to_string(),
            password: fields[1].to_string(),
            uid: fields[2].parse().ok()?,
            gid: fields[3].parse().ok()?,
            gecos: fields[4].to_string(),
            home: fields[5].to_string(),
            shell: fields[6].to_string(),
        })
    }

    pub fn is_root_equivalent(&self) -> bool {
        self.uid == 0
    }
}

/// Every UID 0 account listed in `content`.
pub fn root_equivalents(content: &str) -> Vec<PasswdEntry> {
    content
        .lines()
        .filter_map(PasswdEntry::parse)
        .filter(PasswdEntry::is_root_equivalent)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lab_account(profile: Profile) -> ForgedAccount {
        ForgedAccount::from_config(&AccountConfig::default(), profile)
    }

    #[test]
    fn test_passwd_line_per_profile() {
        assert_eq!(
            lab_account(Profile::Debian).passwd_line(),
            "hacked:x:0:0:root:/root:/bin/bash\n"
        );
        assert_eq!(
            lab_account(Profile::Alpine).passwd_line(),
            "hacked:x:0:0:root:/root:/bin/sh\n"
        );
    }

    #[test]
    fn test_configured_shell_wins() {
        let config = AccountConfig {
            shell: "/bin/zsh".to_string(),
            ..AccountConfig::default()
        };
        let acct = ForgedAccount::from_config(&config, Profile::Busybox);
        assert!(acct.passwd_line().ends_with(":/bin/zsh\n"));
    }

    #[test]
    fn test_shadow_line() {
        assert_eq!(
            lab_account(Profile::Debian).shadow_line("$6$abc$def"),
            "hacked:$6$abc$def:19485:0:99999:7:::\n"
        );
    }

    #[test]
    fn test_presence_marker() {
        let acct = lab_account(Profile::Debian);
        assert_eq!(acct.presence_marker(), "hacked:x:0:0:root");
        assert!(acct.passwd_line().starts_with(&acct.presence_marker()));
    }

    #[test]
    fn test_parse_forged_line() {
        let e = PasswdEntry::parse(&lab_account(Profile::Debian).passwd_line()).unwrap();
        assert_eq!(e.name, "hacked");
        assert_eq!((e.uid, e.gid), (0, 0));
        assert_eq!(e.home, "/root");
        assert_eq!(e.shell, "/bin/bash");
        assert!(e.is_root_equivalent());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(PasswdEntry::parse("").is_none());
        assert!(PasswdEntry::parse("# comment").is_none());
        assert!(PasswdEntry::parse("a:b:c").is_none());
        assert!(PasswdEntry::parse("a:x:zero:0:g:/h:/s").is_none());
    }

    #[test]
    fn test_root_equivalents() {
        let content = "root:x:0:0:root:/root:/bin/bash\n\
                       daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin\n\
                       hacked:x:0:0:root:/root:/bin/sh\n";
        let names: Vec<String> = root_equivalents(content).into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["root", "hacked"]);
    }
}
