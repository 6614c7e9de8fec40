//! Runner wire protocol.
//!
//! One request is one UTF-8 JSON object on a single `\n`-terminated line
//! written to the runner's stdin; one accepted response is one JSON object on
//! a single line of its stdout carrying the same `request_id`.
//!
//! - `codec`: [`LinesCodec`](tokio_util::codec::LinesCodec)-based line framing.
//! - `wire`: request encoding and tolerant response-line decoding.

pub mod codec;
pub mod wire;

pub use codec::{RunnerCodec, MAX_LINE_BYTES};
pub use wire::{
    decode_line, encode_request, DecodeError, RunnerRequest, WireResponse, SHUTDOWN_LINE,
};
