// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! String hash functions for deriving routing hash codes.
//!
//! These match the classic functions other clients of the protocol use, so a
//! string key routes to the same endpoint regardless of client language.

/// `h = 5*h + c` over the characters of `s`.
pub fn hash_string(s: &str) -> u32 {
    s.chars()
        .fold(0u32, |h, c| h.wrapping_mul(5).wrapping_add(c as u32))
}

/// ELF-style hash.
pub fn hash(s: &str) -> u32 {
    let mut h: u32 = 0;
    for c in s.chars() {
        h = (h << 4).wrapping_add(c as u32);
        let g = h & 0xF000_0000;
        if g != 0 {
            h ^= g >> 24;
            h ^= g;
        }
    }
    h
}

/// One-at-a-time hash. Never returns 0.
pub fn magic_string_hash(s: &str) -> u32 {
    let mut v: u32 = 0;
    for c in s.chars() {
        v = v.wrapping_add(c as u32);
        v = v.wrapping_add(v << 10);
        v ^= v >> 6;
    }
    v = v.wrapping_add(v << 3);
    v ^= v >> 11;
    v = v.wrapping_add(v << 15);
    if v == 0 {
        1
    } else {
        v
    }
}
