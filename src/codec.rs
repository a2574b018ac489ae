//! Payload and argument codecs
//!
//! Push/response payloads are either raw bytes, which pass through untouched,
//! or structured values run through the node's configured [`Serializer`].
//! RPC arguments are an ordered list of individually bincode-encoded values;
//! the receiving side pulls them back out in the same order with concrete types.

use crate::error::{LinkError, Result};
use bincode::Options;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Upper bound for any bincode payload we attempt to decode
pub const MAX_DECODE_BYTES: u64 = 16 * 1024 * 1024;

fn bincode_options() -> impl bincode::Options + Copy {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

fn bincode_options_limited() -> impl bincode::Options + Copy {
    bincode_options().with_limit(MAX_DECODE_BYTES)
}

/// A push or response payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Already-encoded bytes, written as-is
    Raw(Bytes),
    /// Structured value, encoded by the configured serializer
    Value(serde_json::Value),
}

impl Payload {
    /// Wrap raw bytes
    pub fn raw(data: impl Into<Bytes>) -> Self {
        Payload::Raw(data.into())
    }

    /// Capture any serializable value as a structured payload
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Payload::Value(serde_json::to_value(value)?))
    }
}

impl From<Bytes> for Payload {
    fn from(data: Bytes) -> Self {
        Payload::Raw(data)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Payload::Raw(Bytes::from(data))
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Value(value)
    }
}

/// Serializer for structured payloads
pub trait Serializer: Send + Sync {
    fn serialize(&self, value: &serde_json::Value) -> Result<Vec<u8>>;

    /// Serializer name (e.g., "json")
    fn name(&self) -> &str;
}

/// JSON payload serializer (the default)
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, value: &serde_json::Value) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn name(&self) -> &str {
        "json"
    }
}

/// Encode a payload, passing raw bytes through unchanged
pub fn serialize_or_raw(serializer: &dyn Serializer, payload: &Payload) -> Result<Bytes> {
    match payload {
        Payload::Raw(data) => Ok(data.clone()),
        Payload::Value(value) => serializer.serialize(value).map(Bytes::from),
    }
}

/// Ordered RPC argument list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    values: Vec<Vec<u8>>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one argument
    pub fn push<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        let encoded = bincode_options()
            .serialize(value)
            .map_err(|e| LinkError::Serialization(format!("argument {}: {}", self.values.len(), e)))?;
        self.values.push(encoded);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Encode the whole list into one opaque byte sequence
    pub fn encode(&self) -> Result<Bytes> {
        bincode_options()
            .serialize(&self.values)
            .map(Bytes::from)
            .map_err(|e| LinkError::Serialization(format!("argument list: {}", e)))
    }

    /// Decode a byte sequence produced by [`Args::encode`]
    pub fn decode(data: &[u8]) -> Result<Self> {
        let values: Vec<Vec<u8>> = bincode_options_limited()
            .deserialize(data)
            .map_err(|e| LinkError::Decode(format!("argument list: {}", e)))?;
        Ok(Self { values })
    }

    /// Read the arguments back in order
    pub fn reader(&self) -> ArgsReader<'_> {
        ArgsReader {
            args: self,
            position: 0,
        }
    }
}

/// Sequential typed reader over an [`Args`] list
#[derive(Debug)]
pub struct ArgsReader<'a> {
    args: &'a Args,
    position: usize,
}

impl ArgsReader<'_> {
    /// Decode the next argument as `T`
    pub fn next<T: DeserializeOwned>(&mut self) -> Result<T> {
        let raw = self.args.values.get(self.position).ok_or_else(|| {
            LinkError::Decode(format!(
                "argument {} requested but only {} supplied",
                self.position,
                self.args.len()
            ))
        })?;
        let value = bincode_options_limited()
            .deserialize(raw)
            .map_err(|e| LinkError::Decode(format!("argument {}: {}", self.position, e)))?;
        self.position += 1;
        Ok(value)
    }

    /// Number of arguments not yet read
    pub fn remaining(&self) -> usize {
        self.args.len() - self.position
    }
}

/// Encode a reply value for the wire
pub fn encode_reply<T: Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    bincode_options()
        .serialize(value)
        .map(Bytes::from)
        .map_err(|e| LinkError::Serialization(format!("reply: {}", e)))
}

/// Decode a reply produced by [`encode_reply`]
pub fn decode_reply<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    bincode_options_limited()
        .deserialize(data)
        .map_err(|e| LinkError::Decode(format!("reply: {}", e)))
}
