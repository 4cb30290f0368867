// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! SHA-512-crypt (`$6$`) in pure Rust on top of `sha2`.
//!
//! Produces the same strings as glibc/libxcrypt `crypt(3)` so the result can
//! be written straight into a shadow file, and verifies existing `$6$` hashes.

use rand::Rng;
use sha2::{Digest, Sha512};

pub const PREFIX: &str = "$6$";
pub const ROUNDS_DEFAULT: u32 = 5000;
pub const ROUNDS_MIN: u32 = 1000;
pub const ROUNDS_MAX: u32 = 999_999_999;
pub const SALT_MAX: usize = 16;

const ITOA64: &[u8; 64] = b"./0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

// Byte triples fed to each 4-char group of the encoded digest.
const ENCODE_ORDER: [(usize, usize, usize); 21] = [
    (0, 21, 42), (22, 43, 1), (44, 2, 23), (3, 24, 45), (25, 46, 4),
    (47, 5, 26), (6, 27, 48), (28, 49, 7), (50, 8, 29), (9, 30, 51),
    (31, 52, 10), (53, 11, 32), (12, 33, 54), (34, 55, 13), (56, 14, 35),
    (15, 36, 57), (37, 58, 16), (59, 17, 38), (18, 39, 60), (40, 61, 19),
    (62, 20, 41),
];

/// Salt and optional explicit round count parsed from a `$6$` setting string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setting {
    /// `Some` only when the setting spelled out `rounds=N$`
    pub rounds: Option<u32>,
    pub salt: String,
}

impl Setting {
    /// Salts longer than 16 bytes are cut at 16 bytes, backing off to a
    /// char boundary for non-ASCII input.
    pub fn new(salt: &str) -> Self {
        let mut end = salt.len().min(SALT_MAX);
        while !salt.is_char_boundary(end) {
            end -= 1;
        }
        Self {
            rounds: None,
            salt: salt[..end].to_string(),
        }
    }

    /// Parse `$6$[rounds=N$]salt[$hash]`. Rounds are clamped, salt truncated
    /// to 16 bytes. Salt characters outside the crypt alphabet are rejected,
    /// as libxcrypt does.
    pub fn parse(setting: &str) -> Option<Self> {
        let rest = setting.strip_prefix(PREFIX)?;
        let (rounds, rest) = match rest.strip_prefix("rounds=") {
            Some(tail) => {
                let (num, tail) = tail.split_once('$')?;
                let n: u64 = num.parse().ok()?;
                let n = n.clamp(ROUNDS_MIN as u64, ROUNDS_MAX as u64) as u32;
                (Some(n), tail)
            }
            None => (None, rest),
        };
        let end = rest.find('$').unwrap_or(rest.len());
        let salt = &rest[..end];
        if !salt.bytes().all(|b| ITOA64.contains(&b)) {
            return None;
        }
        Some(Self::new(salt).with_rounds(rounds))
    }

    fn with_rounds(mut self, rounds: Option<u32>) -> Self {
        self.rounds = rounds;
        self
    }
}

/// Fresh random salt drawn from the crypt alphabet.
pub fn generate_salt(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len.min(SALT_MAX))
        .map(|_| ITOA64[rng.gen_range(0..ITOA64.len())] as char)
        .collect()
}

/// Hash `password` with a fresh 16-character salt and default rounds.
pub fn hash(password: &str) -> String {
    hash_with_setting(password, &Setting::new(&generate_salt(SALT_MAX)))
}

pub fn hash_with_setting(password: &str, setting: &Setting) -> String {
    let rounds = setting.rounds.unwrap_or(ROUNDS_DEFAULT);
    let digest = raw_digest(password.as_bytes(), setting.salt.as_bytes(), rounds);

    let mut out = String::with_capacity(123);
    out.push_str(PREFIX);
    if let Some(r) = setting.rounds {
        out.push_str(&format!("rounds={}$", r));
    }
    out.push_str(&setting.salt);
    out.push('$');
    encode(&digest, &mut out);
    out
}

/// Recompute `hashed` from `password` and compare.
pub fn verify(password: &str, hashed: &str) -> bool {
    match Setting::parse(hashed) {
        Some(setting) => hash_with_setting(password, &setting) == hashed,
        None => false,
    }
}

fn raw_digest(p: &[u8], s: &[u8], rounds: u32) -> [u8; 64] {
    let b = Sha512::new()
        .chain_update(p)
        .chain_update(s)
        .chain_update(p)
        .finalize();

    let mut ctx = Sha512::new();
    ctx.update(p);
    ctx.update(s);
    let mut cnt = p.len();
    while cnt > 64 {
        ctx.update(&b);
        cnt -= 64;
    }
    ctx.update(&b[..cnt]);
    let mut cnt = p.len();
    while cnt > 0 {
        if cnt & 1 != 0 {
            ctx.update(&b);
        } else {
            ctx.update(p);
        }
        cnt >>= 1;
    }
    let mut a = [0u8; 64];
    a.copy_from_slice(&ctx.finalize());

    let mut dp = Sha512::new();
    for _ in 0..p.len() {
        dp.update(p);
    }
    let p_seq = repeat_to(&dp.finalize(), p.len());

    let mut ds = Sha512::new();
    for _ in 0..(16 + a[0] as usize) {
        ds.update(s);
    }
    let s_seq = repeat_to(&ds.finalize(), s.len());

    let mut c = a;
    for i in 0..rounds {
        let mut ctx = Sha512::new();
        if i & 1 != 0 {
            ctx.update(&p_seq);
        } else {
            ctx.update(c);
        }
        if i % 3 != 0 {
            ctx.update(&s_seq);
        }
        if i % 7 != 0 {
            ctx.update(&p_seq);
        }
        if i & 1 != 0 {
            ctx.update(c);
        } else {
            ctx.update(&p_seq);
        }
        c.copy_from_slice(&ctx.finalize());
    }
    c
}

fn repeat_to(src: &[u8], len: usize) -> Vec<u8> {
    src.iter().cycle().take(len).copied().collect()
}

fn b64_from_24bit(b2: u8, b1: u8, b0: u8, n: usize, out: &mut String) {
    let mut w = ((b2 as u32) << 16) | ((b1 as u32) << 8) | b0 as u32;
    for _ in 0..n {
        out.push(ITOA64[(w & 0x3f) as usize] as char);
        w >>= 6;
    }
}

fn encode(d: &[u8; 64], out: &mut String) {
    for &(x, y, z) in ENCODE_ORDER.iter() {
        b64_from_24bit(d[x], d[y], d[z], 4, out);
    }
    b64_from_24bit(0, 0, d[63], 2, out);
}
