// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request/response envelopes.

use crate::codec::{DecodeResult, TarsDecode, TarsEncode, TarsReader, TarsStruct, TarsWriter};
use std::collections::BTreeMap;

/// Propagated key/value metadata (context and status maps).
pub type Context = BTreeMap<String, String>;

// ============================================================================
// Protocol constants
// ============================================================================

pub const TARS_VERSION: i16 = 1;
pub const TUP_VERSION: i16 = 3;

pub const PACKET_NORMAL: i8 = 0;
pub const PACKET_ONEWAY: i8 = 1;

/// Message-type flag bits.
pub mod message_type {
    pub const NULL: i32 = 0x00;
    pub const HASH: i32 = 0x01;
    pub const GRID: i32 = 0x02;
    pub const DYED: i32 = 0x04;
    pub const SAMPLE: i32 = 0x08;
    pub const ASYNC: i32 = 0x10;
    pub const SET_NAME: i32 = 0x80;
    pub const TRACE: i32 = 0x100;
}

/// Return codes carried in `ResponsePacket::ret`.
pub mod ret {
    pub const SUCCESS: i32 = 0;
    pub const DECODE_ERR: i32 = -1;
    pub const ENCODE_ERR: i32 = -2;
    pub const NO_FUNC: i32 = -3;
    pub const NO_SERVANT: i32 = -4;
    pub const RESET_GRID: i32 = -5;
    pub const QUEUE_TIMEOUT: i32 = -6;
    pub const INVOKE_TIMEOUT: i32 = -7;
    pub const PROXY_CONNECT_ERR: i32 = -8;
    pub const OVERLOAD: i32 = -9;
    pub const ADAPTER_NULL: i32 = -10;
    pub const INVALID_SET: i32 = -11;
    pub const CLIENT_DECODE_ERR: i32 = -12;
    pub const SEND_REQUEST_ERR: i32 = -13;
    pub const UNKNOWN: i32 = -99;
}

/// Symbolic name of a return code, for logs and error messages.
pub fn return_code_name(code: i32) -> &'static str {
    match code {
        ret::SUCCESS => "SUCCESS",
        ret::DECODE_ERR => "SERVER_DECODE_ERR",
        ret::ENCODE_ERR => "SERVER_ENCODE_ERR",
        ret::NO_FUNC => "SERVER_NO_FUNC",
        ret::NO_SERVANT => "SERVER_NO_SERVANT",
        ret::RESET_GRID => "SERVER_RESET_GRID",
        ret::QUEUE_TIMEOUT => "SERVER_QUEUE_TIMEOUT",
        ret::INVOKE_TIMEOUT => "INVOKE_TIMEOUT",
        ret::PROXY_CONNECT_ERR => "PROXY_CONNECT_ERR",
        ret::OVERLOAD => "SERVER_OVERLOAD",
        ret::ADAPTER_NULL => "ADAPTER_NULL",
        ret::INVALID_SET => "INVOKE_BY_INVALID_SET",
        ret::CLIENT_DECODE_ERR => "CLIENT_DECODE_ERR",
        ret::SEND_REQUEST_ERR => "SEND_REQUEST_ERR",
        _ => "SERVER_UNKNOWN_ERR",
    }
}

/// Result description a server sends (with request id 0) to ask clients to reconnect.
pub const RECONNECT_DIRECTIVE: &str = "_reconnect_";

/// Function name used for keepalive and ping calls.
pub const PING_FUNC: &str = "tars_ping";

// ============================================================================
// Envelopes
// ============================================================================

/// Outgoing call envelope. Every field is required on the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestPacket {
    pub version: i16,
    pub packet_type: i8,
    pub message_type: i32,
    pub request_id: i32,
    pub servant_name: String,
    pub func_name: String,
    pub buffer: Vec<u8>,
    /// Per-call timeout in milliseconds.
    pub timeout: i32,
    pub context: Context,
    pub status: Context,
}

impl RequestPacket {
    pub fn is_oneway(&self) -> bool {
        self.packet_type == PACKET_ONEWAY
    }
}

impl TarsStruct for RequestPacket {
    fn write_to(&self, w: &mut TarsWriter) {
        w.write_i16(self.version, 1);
        w.write_i8(self.packet_type, 2);
        w.write_i32(self.message_type, 3);
        w.write_i32(self.request_id, 4);
        w.write_string(&self.servant_name, 5);
        w.write_string(&self.func_name, 6);
        w.write_bytes(&self.buffer, 7);
        w.write_i32(self.timeout, 8);
        self.context.encode_field(w, 9);
        self.status.encode_field(w, 10);
    }

    fn read_from(r: &mut TarsReader<'_>) -> DecodeResult<Self> {
        Ok(Self {
            version: i16::decode_field(r, 1, true)?,
            packet_type: i8::decode_field(r, 2, true)?,
            message_type: i32::decode_field(r, 3, true)?,
            request_id: i32::decode_field(r, 4, true)?,
            servant_name: String::decode_field(r, 5, true)?,
            func_name: String::decode_field(r, 6, true)?,
            buffer: Vec::decode_field(r, 7, true)?,
            timeout: i32::decode_field(r, 8, true)?,
            context: Context::decode_field(r, 9, true)?,
            status: Context::decode_field(r, 10, true)?,
        })
    }
}

/// Incoming reply envelope. `result_desc` and `context` are optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponsePacket {
    pub version: i16,
    pub packet_type: i8,
    pub request_id: i32,
    pub message_type: i32,
    pub ret: i32,
    pub buffer: Vec<u8>,
    pub status: Context,
    pub result_desc: String,
    pub context: Context,
}

impl ResponsePacket {
    /// Request id 0 is reserved for server-initiated pushes.
    pub fn is_push(&self) -> bool {
        self.request_id == 0
    }

    /// Build a reply addressed to `req`.
    pub fn reply_to(req: &RequestPacket, ret: i32, buffer: Vec<u8>) -> Self {
        Self {
            version: req.version,
            packet_type: req.packet_type,
            request_id: req.request_id,
            message_type: req.message_type,
            ret,
            buffer,
            ..Self::default()
        }
    }
}

impl TarsStruct for ResponsePacket {
    fn write_to(&self, w: &mut TarsWriter) {
        w.write_i16(self.version, 1);
        w.write_i8(self.packet_type, 2);
        w.write_i32(self.request_id, 3);
        w.write_i32(self.message_type, 4);
        w.write_i32(self.ret, 5);
        w.write_bytes(&self.buffer, 6);
        self.status.encode_field(w, 7);
        w.write_string(&self.result_desc, 8);
        self.context.encode_field(w, 9);
    }

    fn read_from(r: &mut TarsReader<'_>) -> DecodeResult<Self> {
        Ok(Self {
            version: i16::decode_field(r, 1, true)?,
            packet_type: i8::decode_field(r, 2, true)?,
            request_id: i32::decode_field(r, 3, true)?,
            message_type: i32::decode_field(r, 4, true)?,
            ret: i32::decode_field(r, 5, true)?,
            buffer: Vec::decode_field(r, 6, true)?,
            status: Context::decode_field(r, 7, true)?,
            result_desc: String::decode_field(r, 8, false)?,
            context: Context::decode_field(r, 9, false)?,
        })
    }
}

crate::impl_tars_struct!(RequestPacket, ResponsePacket);
