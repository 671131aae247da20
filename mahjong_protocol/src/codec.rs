// Binary payload codec for protocol messages.
//
// Payloads are `bincode` encodings of the `message.rs` enums with fixed-width
// big-endian integers: a `u32` tag (the variant's declaration index) followed
// by the variant's fields in declaration order. `i32` points are 4 bytes,
// `bool` is one byte (0 or 1), `Wind` is its own `u32` tag, and the
// four-player block of a snapshot is laid out back to back with no length.
//
// Decoding is strict: unknown tags, out-of-range enumerants, invalid bools,
// short payloads, and trailing bytes are all `CodecError::Payload`. The
// server treats any decode failure as a faulted connection.
//
// `send`/`recv` combine this codec with `framing.rs` for blocking streams
// (tests, simple clients). The server's reactor uses `decode` on frames cut
// by a `FrameBuffer` instead.

use std::io::{self, Read, Write};

use bincode::Options;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::framing::{MAX_MESSAGE_SIZE, read_message, write_message};

/// Failure to move a message across the wire.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("framing error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed payload: {0}")]
    Payload(#[from] bincode::Error),
}

impl CodecError {
    /// True if the peer closed the stream (cleanly or mid-frame).
    pub fn is_closed(&self) -> bool {
        matches!(self, CodecError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(u64::from(MAX_MESSAGE_SIZE))
        .with_big_endian()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Encode a message into a frame payload.
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, CodecError> {
    Ok(options().serialize(msg)?)
}

/// Decode a frame payload into a message.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, CodecError> {
    Ok(options().deserialize(payload)?)
}

/// Encode and write one framed message.
pub fn send<W: Write, T: Serialize>(writer: &mut W, msg: &T) -> Result<(), CodecError> {
    let payload = encode(msg)?;
    write_message(writer, &payload)?;
    Ok(())
}

/// Read and decode one framed message.
pub fn recv<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T, CodecError> {
    let payload = read_message(reader)?;
    decode(&payload)
}
