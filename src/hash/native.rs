// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! The platform `crypt(3)`, resolved at runtime.
//!
//! Linking `-lcrypt` would make the binary unusable on images that ship
//! without libcrypt, so the symbol is looked up with `dlopen`/`dlsym` and a
//! missing library simply makes this strategy unavailable.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};

type CryptFn = unsafe extern "C" fn(*const c_char, *const c_char) -> *mut c_char;

/// `crypt` returns a pointer into one process-wide buffer.
static CRYPT_LOCK: Mutex<()> = Mutex::new(());

const LIBCRYPT_CANDIDATES: &[&str] = &["libcrypt.so.1", "libcrypt.so.2", "libcrypt.so"];

fn lookup(handle: *mut c_void) -> Option<CryptFn> {
    let sym = CString::new("crypt").ok()?;
    // SAFETY: sym is a valid C string; a null handle is RTLD_DEFAULT.
    let f = unsafe { libc::dlsym(handle, sym.as_ptr()) };
    if f.is_null() {
        None
    } else {
        // SAFETY: `crypt` has this signature in glibc, libxcrypt and musl.
        Some(unsafe { std::mem::transmute::<*mut c_void, CryptFn>(f) })
    }
}

/// Find `crypt` in libcrypt, or in libc itself (musl).
pub fn resolve_crypt() -> Option<CryptFn> {
    for lib in LIBCRYPT_CANDIDATES {
        let name = CString::new(*lib).ok()?;
        // SAFETY: name is a valid C string. The handle is never closed so the
        // returned function pointer stays valid for the process lifetime.
        let handle = unsafe { libc::dlopen(name.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if handle.is_null() {
            continue;
        }
        if let Some(f) = lookup(handle) {
            tracing::debug!("crypt resolved from {}", lib);
            return Some(f);
        }
    }
    lookup(libc::RTLD_DEFAULT)
}

/// `crypt(secret, setting)` through the system library.
pub fn crypt(secret: &str, setting: &str) -> Result<String> {
    let f = resolve_crypt().context("crypt(3) is not available on this system")?;
    let c_secret = CString::new(secret).context("secret contains a NUL byte")?;
    let c_setting = CString::new(setting).context("setting contains a NUL byte")?;

    let hashed = {
        // A poisoned lock only means another caller panicked; the buffer is still usable.
        let _guard = CRYPT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        // SAFETY: both arguments are valid C strings. The result points to a
        // static buffer, read while CRYPT_LOCK is held so no other call in
        // this process can overwrite it.
        let out = unsafe { f(c_secret.as_ptr(), c_setting.as_ptr()) };
        if out.is_null() {
            bail!("crypt(3) returned NULL");
        }
        unsafe { CStr::from_ptr(out) }.to_string_lossy().into_owned()
    };

    // glibc/libxcrypt signal failure with "*0"/"*1"; older libcs echo a DES hash.
    if !hashed.starts_with(super::sha512_crypt::PREFIX) {
        bail!("crypt(3) does not support SHA-512 (got {:?})", hashed);
    }
    Ok(hashed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha512_crypt;

    #[test]
    fn test_native_matches_pure_rust_when_available() {
        let setting = "$6$labsalt";
        match crypt("password123", setting) {
            Ok(native) => {
                assert!(sha512_crypt::verify("password123", &native));
                assert_eq!(
                    native,
                    sha512_crypt::hash_with_setting(
                        "password123",
                        &sha512_crypt::Setting::parse(setting).unwrap()
                    )
                );
            }
            Err(e) => eprintln!("skipping: {}", e),
        }
    }

    #[test]
    fn test_concurrent_calls_keep_their_own_result() {
        if resolve_crypt().is_none() || crypt("x", "$6$abc").is_err() {
            return;
        }
        let handles: Vec<_> = (0..8)
            .map(|t| {
                std::thread::spawn(move || {
                    let mut bad = 0;
                    for i in 0..50 {
                        let pw = format!("pw{}-{}", t, i);
                        let setting = format!("$6$salt{}x{}", t, i);
                        let h = crypt(&pw, &setting).unwrap();
                        if !h.starts_with(&format!("{}$", setting))
                            || !sha512_crypt::verify(&pw, &h)
                        {
                            bad += 1;
                        }
                    }
                    bad
                })
            })
            .collect();
        let bad: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(bad, 0);
    }

    #[test]
    fn test_nul_in_secret_is_error() {
        assert!(crypt("pass\0word", "$6$abc").is_err());
    }
}
