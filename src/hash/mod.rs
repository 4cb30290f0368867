// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Password hash generation for the forged shadow entry.
//!
//! Strategies are tried in a fixed order until one yields a value:
//!
//! - **native**: the system `crypt(3)` with a fresh SHA-512 salt
//! - **openssl**: `openssl passwd -6` on the target
//! - **busybox**: `busybox openssl passwd -6`, then `busybox mkpasswd -m sha512`
//! - **library**: pure-Rust SHA-512-crypt
//! - **digest**: a plain SHA-512 digest dressed up as `$6$salt$...`
//!
//! The digest fallback is not a SHA-512-crypt instance and no PAM stack will
//! accept it; it only guarantees the append step has something to write.

pub mod native;
pub mod sha512_crypt;

use anyhow::{bail, Result};
use sha2::{Digest, Sha512};

use crate::config::HashConfig;
use crate::report;
use crate::runner::DEFAULT_CMD_TIMEOUT;
use crate::target::Target;

/// One way of producing a shadow-compatible hash.
pub trait HashStrategy {
    fn name(&self) -> &'static str;

    fn attempt(&self, secret: &str, target: &dyn Target) -> Result<String>;

    /// Output is not verifiable by `crypt(3)`.
    fn is_weak(&self) -> bool {
        false
    }
}

/// A hash plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedHash {
    pub value: String,
    pub strategy: &'static str,
    pub weak: bool,
}

pub struct NativeCrypt;

impl HashStrategy for NativeCrypt {
    fn name(&self) -> &'static str {
        "native crypt"
    }

    fn attempt(&self, secret: &str, _target: &dyn Target) -> Result<String> {
        let setting = format!(
            "{}{}",
            sha512_crypt::PREFIX,
            sha512_crypt::generate_salt(sha512_crypt::SALT_MAX)
        );
        native::crypt(secret, &setting)
    }
}

/// Run a helper on the target and take its stdout as the hash.
fn helper_hash(target: &dyn Target, argv: &[&str]) -> Result<String> {
    let out = target.exec(argv, DEFAULT_CMD_TIMEOUT)?;
    if !out.success() {
        bail!("{} exited with {:?}: {}", argv.join(" "), out.code, out.stderr.trim());
    }
    let value = out.out();
    if !value.starts_with('$') {
        bail!("{} printed no hash", argv.join(" "));
    }
    Ok(value.to_string())
}

pub struct OpenSslHelper;

impl HashStrategy for OpenSslHelper {
    fn name(&self) -> &'static str {
        "openssl"
    }

    fn attempt(&self, secret: &str, target: &dyn Target) -> Result<String> {
        helper_hash(target, &["openssl", "passwd", "-6", secret])
    }
}

pub struct BusyboxHelper;

impl HashStrategy for BusyboxHelper {
    fn name(&self) -> &'static str {
        "busybox"
    }

    fn attempt(&self, secret: &str, target: &dyn Target) -> Result<String> {
        helper_hash(target, &["busybox", "openssl", "passwd", "-6", secret])
            .or_else(|_| helper_hash(target, &["busybox", "mkpasswd", "-m", "sha512", secret]))
    }
}

pub struct Sha512CryptLibrary;

impl HashStrategy for Sha512CryptLibrary {
    fn name(&self) -> &'static str {
        "sha512-crypt library"
    }

    fn attempt(&self, secret: &str, _target: &dyn Target) -> Result<String> {
        Ok(sha512_crypt::hash(secret))
    }
}

/// Weak last resort: `$6$<salt>$` + 43 hex chars of `sha512(secret + salt)`.
pub struct DigestFallback {
    pub salt: String,
}

impl DigestFallback {
    pub fn digest(&self, secret: &str) -> String {
        let digest = Sha512::new()
            .chain_update(secret.as_bytes())
            .chain_update(self.salt.as_bytes())
            .finalize();
        let hex = hex::encode(digest);
        format!("{}{}${}", sha512_crypt::PREFIX, self.salt, &hex[..43])
    }
}

impl HashStrategy for DigestFallback {
    fn name(&self) -> &'static str {
        "simple digest"
    }

    fn attempt(&self, secret: &str, _target: &dyn Target) -> Result<String> {
        Ok(self.digest(secret))
    }

    fn is_weak(&self) -> bool {
        true
    }
}

/// Ordered list of strategies, tried until one succeeds.
pub struct HashGenerator {
    strategies: Vec<Box<dyn HashStrategy>>,
}

impl HashGenerator {
    pub fn new(strategies: Vec<Box<dyn HashStrategy>>) -> Self {
        Self { strategies }
    }

    /// Build from the configured names; unknown names are skipped with a warning.
    pub fn from_config(config: &HashConfig) -> Self {
        let mut strategies: Vec<Box<dyn HashStrategy>> = Vec::new();
        for name in &config.strategies {
            match name.as_str() {
                "native" => strategies.push(Box::new(NativeCrypt)),
                "openssl" => strategies.push(Box::new(OpenSslHelper)),
                "busybox" => strategies.push(Box::new(BusyboxHelper)),
                "library" => strategies.push(Box::new(Sha512CryptLibrary)),
                "digest" => strategies.push(Box::new(DigestFallback {
                    salt: config.fallback_salt.clone(),
                })),
                other => tracing::warn!("Unknown hash strategy '{}' ignored", other),
            }
        }
        Self::new(strategies)
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// First non-empty result, or `None` when every strategy fails.
    pub fn generate(&self, secret: &str, target: &dyn Target) -> Option<GeneratedHash> {
        report::step("Generating password hash...");
        for strategy in &self.strategies {
            if strategy.is_weak() {
                report::warn("Using simple hash generation (less secure)");
            }
            match strategy.attempt(secret, target) {
                Ok(value) if !value.is_empty() => {
                    report::good(&format!("Generated hash using {}: {}", strategy.name(), value));
                    return Some(GeneratedHash {
                        value,
                        strategy: strategy.name(),
                        weak: strategy.is_weak(),
                    });
                }
                Ok(_) => report::bad(&format!("{} produced an empty hash", strategy.name())),
                Err(e) => {
                    tracing::debug!("hash strategy {} failed: {:#}", strategy.name(), e);
                    report::bad(&format!("{} failed: {}", strategy.name(), e));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::LocalHost;

    struct Broken;

    impl HashStrategy for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }
        fn attempt(&self, _secret: &str, _target: &dyn Target) -> Result<String> {
            bail!("tool missing")
        }
    }

    struct Empty;

    impl HashStrategy for Empty {
        fn name(&self) -> &'static str {
            "empty"
        }
        fn attempt(&self, _secret: &str, _target: &dyn Target) -> Result<String> {
            Ok(String::new())
        }
    }

    #[test]
    fn test_default_chain_always_produces_a_verifiable_hash() {
        let gen = HashGenerator::from_config(&HashConfig::default());
        for secret in ["password123", "", "with space", "ünïcødé"] {
            let h = gen.generate(secret, &LocalHost).unwrap();
            assert!(!h.value.is_empty());
            assert!(!h.weak);
            assert!(sha512_crypt::verify(secret, &h.value), "{} via {}", h.value, h.strategy);
        }
    }

    #[test]
    fn test_falls_through_failures_in_order() {
        let gen = HashGenerator::new(vec![
            Box::new(Broken),
            Box::new(Empty),
            Box::new(Sha512CryptLibrary),
            Box::new(DigestFallback { salt: "salt123".into() }),
        ]);
        let h = gen.generate("password123", &LocalHost).unwrap();
        assert_eq!(h.strategy, "sha512-crypt library");
        assert!(sha512_crypt::verify("password123", &h.value));
    }

    #[test]
    fn test_all_failing_yields_none() {
        let gen = HashGenerator::new(vec![Box::new(Broken), Box::new(Empty)]);
        assert!(gen.generate("password123", &LocalHost).is_none());
        assert!(HashGenerator::new(Vec::new()).generate("x", &LocalHost).is_none());
    }

    #[test]
    fn test_digest_fallback_is_weak_and_shaped() {
        let gen = HashGenerator::new(vec![
            Box::new(Broken),
            Box::new(DigestFallback { salt: "salt123".into() }),
        ]);
        let h = gen.generate("password123", &LocalHost).unwrap();
        assert!(h.weak);
        assert!(h.value.starts_with("$6$salt123$"));
        assert_eq!(h.value.len(), "$6$salt123$".len() + 43);
        // Shaped like SHA-512-crypt but not verifiable as one.
        assert!(!sha512_crypt::verify("password123", &h.value));
    }

    #[test]
    fn test_digest_fallback_is_deterministic() {
        let d = DigestFallback { salt: "salt123".into() };
        assert_eq!(d.digest("password123"), d.digest("password123"));
        assert_ne!(d.digest("password123"), d.digest("password124"));
    }

    #[test]
    fn test_from_config_order_and_unknown_names() {
        let config = HashConfig {
            strategies: vec!["digest".into(), "md5".into(), "library".into()],
            fallback_salt: "s".into(),
        };
        let gen = HashGenerator::from_config(&config);
        assert_eq!(gen.strategy_names(), vec!["simple digest", "sha512-crypt library"]);
    }

    #[test]
    fn test_openssl_helper_when_present() {
        if !LocalHost.locate("openssl") {
            return;
        }
        // LibreSSL and old OpenSSL builds lack -6; only check a hash that did come back.
        if let Ok(h) = OpenSslHelper.attempt("password123", &LocalHost) {
            assert!(sha512_crypt::verify("password123", &h));
        }
    }
}
