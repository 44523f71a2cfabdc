//! Wire protocol: envelopes, chunk framing and the request/response handler

pub mod chunking;
pub mod envelope;
pub mod handler;
mod operations;

pub use chunking::{
    classify_inbound, needs_chunking, split_into_frames, ChunkEnvelope, ChunkFrame, InboundFrame,
    Reassembler, DEFAULT_CHUNK_PAYLOAD_BUDGET, TRANSPORT_WRITE_LIMIT,
};
pub use envelope::{Command, Envelope, EventKind, MessageType, PROTOCOL_VERSION};
pub use handler::ProtocolHandler;
