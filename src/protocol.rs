//! Outbound message framing
//!
//! Wire format:
//! `[kind:u8][length:u32 BE][sid:i64 BE][route_len:u16 BE][route][payload]`
//! where `length` counts every byte after the 5-byte header.

use crate::connection::Connection;
use crate::error::{LinkError, Result};
use crate::types::FrontendSid;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Maximum frame body size: 16 MiB
pub const MAX_BODY_SIZE: u32 = 16 * 1024 * 1024;
pub(crate) const HEADER_SIZE: usize = 5;
const ADDRESS_SIZE: usize = 8 + 2;

/// Message kinds carried on a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    Request = 0x00,
    Notify = 0x01,
    Response = 0x02,
    Push = 0x03,
}

impl TryFrom<u8> for MessageKind {
    type Error = LinkError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(Self::Request),
            0x01 => Ok(Self::Notify),
            0x02 => Ok(Self::Response),
            0x03 => Ok(Self::Push),
            _ => Err(LinkError::Frame(format!(
                "Unknown message kind: 0x{:02x}",
                value
            ))),
        }
    }
}

/// A message addressed to one session on a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Route, empty for responses
    pub route: String,
    pub kind: MessageKind,
    pub payload: Bytes,
    /// Addressing key understood by the receiving side
    pub sid: FrontendSid,
}

impl OutboundMessage {
    pub fn push(route: impl Into<String>, payload: Bytes, sid: FrontendSid) -> Self {
        Self {
            route: route.into(),
            kind: MessageKind::Push,
            payload,
            sid,
        }
    }

    pub fn response(payload: Bytes, sid: FrontendSid) -> Self {
        Self {
            route: String::new(),
            kind: MessageKind::Response,
            payload,
            sid,
        }
    }

    /// Encode this message into one frame
    pub fn encode(&self) -> Result<Bytes> {
        let route = self.route.as_bytes();
        if route.len() > u16::MAX as usize {
            return Err(LinkError::Frame(format!(
                "Route too long: {} bytes",
                route.len()
            )));
        }
        let body_len = ADDRESS_SIZE + route.len() + self.payload.len();
        if body_len > MAX_BODY_SIZE as usize {
            return Err(LinkError::Frame(format!(
                "Frame too large: {} bytes (max {})",
                body_len, MAX_BODY_SIZE
            )));
        }

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + body_len);
        buf.put_u8(self.kind as u8);
        buf.put_u32(body_len as u32);
        buf.put_i64(self.sid);
        buf.put_u16(route.len() as u16);
        buf.put_slice(route);
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Decode one frame from the front of `buf`
    ///
    /// Returns the message and the number of bytes consumed, or `None`
    /// if the buffer does not yet hold a complete frame.
    pub fn decode(buf: &[u8]) -> Result<Option<(Self, usize)>> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }
        let kind = MessageKind::try_from(buf[0])?;
        let body_len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        if body_len > MAX_BODY_SIZE {
            return Err(LinkError::Frame(format!(
                "Frame too large: {} bytes (max {})",
                body_len, MAX_BODY_SIZE
            )));
        }
        if (body_len as usize) < ADDRESS_SIZE {
            return Err(LinkError::Frame(format!(
                "Frame body too short: {} bytes",
                body_len
            )));
        }
        let total = HEADER_SIZE + body_len as usize;
        if buf.len() < total {
            return Ok(None);
        }

        let mut body = &buf[HEADER_SIZE..total];
        let sid = body.get_i64();
        let route_len = body.get_u16() as usize;
        if route_len > body.remaining() {
            return Err(LinkError::Frame(format!(
                "Route length {} exceeds frame body",
                route_len
            )));
        }
        let route = std::str::from_utf8(&body[..route_len])
            .map_err(|e| LinkError::Frame(format!("Route is not UTF-8: {}", e)))?
            .to_string();
        body.advance(route_len);
        let payload = Bytes::copy_from_slice(body);

        Ok(Some((
            Self {
                route,
                kind,
                payload,
                sid,
            },
            total,
        )))
    }
}

/// Frame `msg` and write it to `conn`
pub async fn write_message(conn: &dyn Connection, msg: &OutboundMessage) -> Result<()> {
    let frame = msg.encode()?;
    conn.write(&frame).await
}
