// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Length-prefix framing for packets over a byte stream.
//!
//! ```text
//! +-----------------------+----------------------+
//! | Total length (4B BE)  | Serialized packet    |
//! +-----------------------+----------------------+
//! ```
//!
//! Unlike a payload-length prefix, the length counts the 4 header bytes too,
//! so the smallest valid frame is 4 bytes long.

/// Frame header size (4 bytes for the total length).
pub const FRAME_HEADER_SIZE: usize = 4;

/// Default maximum frame size (10 MiB).
pub const DEFAULT_MAX_PACKAGE_LENGTH: usize = 10 * 1024 * 1024;

/// Result of inspecting an accumulation buffer for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStatus {
    /// Need more bytes before a frame can be sliced.
    Incomplete,
    /// A full frame of this many bytes (header included) starts the buffer.
    Complete(usize),
    /// Declared length is below the header size or above the maximum.
    Error(u32),
}

/// Inspect the head of `buf` for one frame.
///
/// Pure: it never consumes anything, so it can be called again after more
/// bytes arrive.
pub fn parse_package(buf: &[u8], max_len: usize) -> PackageStatus {
    if buf.len() < FRAME_HEADER_SIZE {
        return PackageStatus::Incomplete;
    }
    let declared = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let len = declared as usize;
    if len < FRAME_HEADER_SIZE || len > max_len {
        return PackageStatus::Error(declared);
    }
    if len > buf.len() {
        return PackageStatus::Incomplete;
    }
    PackageStatus::Complete(len)
}

/// Prefix `body` with its total framed length.
pub fn pack_frame(body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
    frame.extend_from_slice(&((body.len() + FRAME_HEADER_SIZE) as u32).to_be_bytes());
    frame.extend_from_slice(body);
    frame
}
