//! Chunk framing and reassembly for the write-limited GATT transport
//!
//! A serialized envelope longer than the write limit is split into chunk
//! frames, each a small JSON object:
//!
//! ```text
//! {"chunk":<index>,"total":<count>,"dataB64":"<base64 slice of the UTF-8 bytes>"}
//! ```
//!
//! Older firmware sends `"data"` holding the raw text slice with quotes and
//! backslashes escaped, often not valid JSON once the slice cuts through a
//! string. Both forms are accepted on receive; only `dataB64` is produced.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::errors::ProtocolError;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Maximum bytes accepted by one characteristic write
pub const TRANSPORT_WRITE_LIMIT: usize = 512;

/// Default raw bytes per chunk; Base64 expansion plus the frame keys keep
/// every frame under [`TRANSPORT_WRITE_LIMIT`]
pub const DEFAULT_CHUNK_PAYLOAD_BUDGET: usize = 348;

/// Largest chunk count representable in a frame
pub const MAX_CHUNKS_PER_MESSAGE: usize = u16::MAX as usize;

const CHUNK_KEY: &str = "\"chunk\":";
const TOTAL_KEY: &str = "\"total\":";
const LEGACY_DATA_KEY: &str = "\"data\":\"";

// ----------------------------------------------------------------------------
// Chunk Frames
// ----------------------------------------------------------------------------

/// Outbound chunk frame as serialized on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEnvelope {
    pub chunk: u16,
    pub total: u16,
    #[serde(rename = "dataB64")]
    pub data_b64: String,
}

/// Decoded chunk, independent of the encoding it arrived in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFrame {
    pub index: u16,
    pub total: u16,
    pub data: Vec<u8>,
}

impl ChunkFrame {
    fn validated(index: u64, total: u64, data: Vec<u8>) -> Result<Self, ProtocolError> {
        let index = u16::try_from(index)
            .map_err(|_| ProtocolError::MalformedChunk(format!("index {} out of range", index)))?;
        let total = u16::try_from(total)
            .map_err(|_| ProtocolError::MalformedChunk(format!("total {} out of range", total)))?;

        if total == 0 {
            return Err(ProtocolError::MalformedChunk("total cannot be zero".into()));
        }
        if index >= total {
            return Err(ProtocolError::MalformedChunk(format!(
                "index {} not below total {}",
                index, total
            )));
        }

        Ok(Self { index, total, data })
    }
}

/// Result of sniffing one inbound notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// A chunk of a larger message
    Chunk(ChunkFrame),
    /// A complete, unchunked message
    Message(String),
}

// ----------------------------------------------------------------------------
// Outbound
// ----------------------------------------------------------------------------

/// Check whether a message must be chunked for the given write limit
pub fn needs_chunking(message_len: usize, write_limit: usize) -> bool {
    message_len > write_limit
}

/// Split message bytes into serialized `dataB64` chunk frames
pub fn split_into_frames(data: &[u8], payload_budget: usize) -> Result<Vec<String>, ProtocolError> {
    let budget = payload_budget.max(1);
    let total = data.len().div_ceil(budget);

    if total == 0 {
        return Err(ProtocolError::MalformedChunk(
            "cannot chunk an empty message".into(),
        ));
    }
    if total > MAX_CHUNKS_PER_MESSAGE {
        return Err(ProtocolError::TooManyChunks {
            size: data.len(),
            max: MAX_CHUNKS_PER_MESSAGE,
        });
    }

    data.chunks(budget)
        .enumerate()
        .map(|(index, slice)| {
            let frame = ChunkEnvelope {
                chunk: index as u16,
                total: total as u16,
                data_b64: STANDARD.encode(slice),
            };
            serde_json::to_string(&frame).map_err(|e| ProtocolError::MalformedChunk(e.to_string()))
        })
        .collect()
}

// ----------------------------------------------------------------------------
// Inbound
// ----------------------------------------------------------------------------

/// Classify inbound text as a chunk frame or a complete message
pub fn classify_inbound(text: &str) -> Result<InboundFrame, ProtocolError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) if map.contains_key("chunk") && map.contains_key("total") => {
            // Legacy `data` follows the firmware's escaping even when the frame parses
            let frame = if map.contains_key("dataB64") {
                decode_json_chunk(&map)
            } else {
                decode_legacy_chunk(text)
            };
            frame.map(InboundFrame::Chunk)
        }
        Ok(_) => Ok(InboundFrame::Message(text.to_string())),
        Err(_) if text.contains(CHUNK_KEY) && text.contains(TOTAL_KEY) => {
            decode_legacy_chunk(text).map(InboundFrame::Chunk)
        }
        // Not JSON at all; the envelope parser will reject it
        Err(_) => Ok(InboundFrame::Message(text.to_string())),
    }
}

fn decode_json_chunk(map: &serde_json::Map<String, Value>) -> Result<ChunkFrame, ProtocolError> {
    let index = map
        .get("chunk")
        .and_then(Value::as_u64)
        .ok_or_else(|| ProtocolError::MalformedChunk("chunk is not an integer".into()))?;
    let total = map
        .get("total")
        .and_then(Value::as_u64)
        .ok_or_else(|| ProtocolError::MalformedChunk("total is not an integer".into()))?;

    let encoded = map
        .get("dataB64")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::MalformedChunk("dataB64 is not a string".into()))?;
    let data = STANDARD
        .decode(encoded)
        .map_err(|e| ProtocolError::MalformedChunk(format!("bad base64: {}", e)))?;

    ChunkFrame::validated(index, total, data)
}

/// Scan a legacy frame the way the firmware builds it: the data runs from
/// the opening quote after `"data":` to the last quote in the frame
fn decode_legacy_chunk(text: &str) -> Result<ChunkFrame, ProtocolError> {
    let index = scan_integer(text, CHUNK_KEY)?;
    let total = scan_integer(text, TOTAL_KEY)?;

    let start = text
        .find(LEGACY_DATA_KEY)
        .map(|pos| pos + LEGACY_DATA_KEY.len())
        .ok_or_else(|| ProtocolError::MalformedChunk("missing data".into()))?;
    let end = text
        .rfind('"')
        .filter(|end| *end >= start)
        .ok_or_else(|| ProtocolError::MalformedChunk("unterminated data".into()))?;

    let data = unescape_legacy(&text[start..end]);
    ChunkFrame::validated(index, total, data.into_bytes())
}

fn scan_integer(text: &str, key: &str) -> Result<u64, ProtocolError> {
    let start = text
        .find(key)
        .map(|pos| pos + key.len())
        .ok_or_else(|| ProtocolError::MalformedChunk(format!("missing {}", key)))?;
    let digits: String = text[start..]
        .chars()
        .skip_while(|c| c.is_whitespace())
        .take_while(char::is_ascii_digit)
        .collect();
    digits
        .parse()
        .map_err(|_| ProtocolError::MalformedChunk(format!("non-numeric {}", key)))
}

fn unescape_legacy(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if next == '"' || next == '\\' {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

// ----------------------------------------------------------------------------
// Reassembly
// ----------------------------------------------------------------------------

/// Message being rebuilt from its chunks
#[derive(Debug, Clone)]
struct PartialMessage {
    total: u16,
    chunks: BTreeMap<u16, Vec<u8>>,
}

impl PartialMessage {
    fn new(total: u16) -> Self {
        Self {
            total,
            chunks: BTreeMap::new(),
        }
    }

    fn is_complete(&self) -> bool {
        self.chunks.len() == self.total as usize
    }

    fn into_bytes(self) -> Vec<u8> {
        self.chunks.into_values().flatten().collect()
    }
}

/// Single-slot reassembly buffer; interleaved multi-chunk messages are not
/// supported by the protocol
#[derive(Debug, Default)]
pub struct Reassembler {
    current: Option<PartialMessage>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk. Returns the full message text once every index in
    /// `[0, total)` has arrived.
    pub fn accept(&mut self, frame: ChunkFrame) -> Result<Option<String>, ProtocolError> {
        if frame.index == 0 {
            if let Some(previous) = self.current.take() {
                debug!(
                    "Chunk 0 restarts reassembly, discarding {}/{} chunks",
                    previous.chunks.len(),
                    previous.total
                );
            }
            self.current = Some(PartialMessage::new(frame.total));
        }

        let partial = self
            .current
            .as_mut()
            .ok_or(ProtocolError::UnexpectedChunk { index: frame.index })?;

        if partial.total != frame.total {
            return Err(ProtocolError::ChunkTotalMismatch {
                expected: partial.total,
                actual: frame.total,
            });
        }

        partial.chunks.entry(frame.index).or_insert(frame.data);

        if !partial.is_complete() {
            return Ok(None);
        }

        let bytes = match self.current.take() {
            Some(complete) => complete.into_bytes(),
            None => return Ok(None),
        };
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// `(received, total)` for the message in progress
    pub fn progress(&self) -> Option<(usize, u16)> {
        self.current
            .as_ref()
            .map(|partial| (partial.chunks.len(), partial.total))
    }

    /// Drop any partial message
    pub fn reset(&mut self) {
        self.current = None;
    }
}
