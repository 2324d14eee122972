// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Packet envelopes, framing and the protocol capability used by adapters.

pub mod frame;
pub mod packet;

pub use frame::{pack_frame, parse_package, PackageStatus, DEFAULT_MAX_PACKAGE_LENGTH};
pub use packet::{
    message_type, ret, return_code_name, Context, RequestPacket, ResponsePacket, PACKET_NORMAL,
    PACKET_ONEWAY, PING_FUNC, RECONNECT_DIRECTIVE, TARS_VERSION, TUP_VERSION,
};

use crate::codec::{DecodeResult, TarsStruct};
use frame::FRAME_HEADER_SIZE;

/// Wire protocol spoken by an adapter.
///
/// Adapters hold one of these and call through it; swapping the
/// implementation changes the packet format without touching transport code.
pub trait Protocol: Send + Sync {
    /// Serialize and frame a request.
    fn request_pack(&self, req: &RequestPacket) -> Vec<u8>;

    /// Decode one complete response frame (header included).
    fn response_unpack(&self, frame: &[u8]) -> DecodeResult<ResponsePacket>;

    /// Frame boundary detection over an accumulation buffer.
    fn parse_package(&self, buf: &[u8]) -> PackageStatus;

    /// Serialize and frame a response (server side and test peers).
    fn response_pack(&self, rsp: &ResponsePacket) -> Vec<u8>;

    /// Decode one complete request frame (server side and test peers).
    fn request_unpack(&self, frame: &[u8]) -> DecodeResult<RequestPacket>;
}

/// The native tagged-binary protocol.
#[derive(Debug, Clone, Copy)]
pub struct TarsProtocol {
    max_package_length: usize,
}

impl TarsProtocol {
    pub fn new(max_package_length: usize) -> Self {
        Self { max_package_length }
    }

    pub fn max_package_length(&self) -> usize {
        self.max_package_length
    }
}

impl Default for TarsProtocol {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PACKAGE_LENGTH)
    }
}

fn body(frame: &[u8]) -> &[u8] {
    frame.get(FRAME_HEADER_SIZE..).unwrap_or_default()
}

impl Protocol for TarsProtocol {
    fn request_pack(&self, req: &RequestPacket) -> Vec<u8> {
        pack_frame(&req.to_bytes())
    }

    fn response_unpack(&self, frame: &[u8]) -> DecodeResult<ResponsePacket> {
        ResponsePacket::from_bytes(body(frame))
    }

    fn parse_package(&self, buf: &[u8]) -> PackageStatus {
        parse_package(buf, self.max_package_length)
    }

    fn response_pack(&self, rsp: &ResponsePacket) -> Vec<u8> {
        pack_frame(&rsp.to_bytes())
    }

    fn request_unpack(&self, frame: &[u8]) -> DecodeResult<RequestPacket> {
        RequestPacket::from_bytes(body(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{DecodeError, TarsWriter};

    fn sample_request() -> RequestPacket {
        let mut context = Context::new();
        context.insert("trace".into(), "abc".into());
        RequestPacket {
            version: TARS_VERSION,
            packet_type: PACKET_NORMAL,
            message_type: message_type::HASH,
            request_id: 42,
            servant_name: "App.Server.EchoObj".into(),
            func_name: "echo".into(),
            buffer: vec![1, 2, 3],
            timeout: 3000,
            context,
            status: Context::new(),
        }
    }

    #[test]
    fn test_request_roundtrip() {
        let proto = TarsProtocol::default();
        let req = sample_request();
        let frame = proto.request_pack(&req);
        assert_eq!(proto.parse_package(&frame), PackageStatus::Complete(frame.len()));
        assert_eq!(proto.request_unpack(&frame).unwrap(), req);
    }

    #[test]
    fn test_request_head_bytes() {
        let frame = TarsProtocol::default().request_pack(&sample_request());
        // version=1 at tag 1 as a byte, packet type 0 at tag 2 as zero tag
        assert_eq!(&frame[4..7], &[0x10, 0x01, 0x2C]);
    }

    #[test]
    fn test_response_optional_fields() {
        let mut w = TarsWriter::new();
        w.write_i16(1, 1);
        w.write_i8(0, 2);
        w.write_i32(9, 3);
        w.write_i32(0, 4);
        w.write_i32(ret::SUCCESS, 5);
        w.write_bytes(b"ok", 6);
        crate::codec::TarsEncode::encode_field(&Context::new(), &mut w, 7);
        let frame = pack_frame(&w.into_bytes());

        let rsp = TarsProtocol::default().response_unpack(&frame).unwrap();
        assert_eq!(rsp.request_id, 9);
        assert_eq!(rsp.buffer, b"ok");
        assert!(rsp.result_desc.is_empty());
        assert!(rsp.context.is_empty());
    }

    #[test]
    fn test_response_missing_required_field() {
        let mut w = TarsWriter::new();
        w.write_i16(1, 1);
        w.write_i32(9, 3);
        let frame = pack_frame(&w.into_bytes());
        assert_eq!(
            TarsProtocol::default().response_unpack(&frame),
            Err(DecodeError::MissingTag(2))
        );
    }

    #[test]
    fn test_reply_to_mirrors_request() {
        let req = sample_request();
        let mut rsp = ResponsePacket::reply_to(&req, ret::NO_FUNC, Vec::new());
        rsp.result_desc = "no such function".into();
        let proto = TarsProtocol::default();
        let back = proto.response_unpack(&proto.response_pack(&rsp)).unwrap();
        assert_eq!(back.request_id, 42);
        assert_eq!(back.ret, ret::NO_FUNC);
        assert_eq!(back.result_desc, "no such function");
        assert_eq!(return_code_name(back.ret), "SERVER_NO_FUNC");
        assert!(!back.is_push());
    }
}
