// Length-delimited message framing over TCP.
//
// Wire format: a 4-byte big-endian length prefix followed by the payload
// bytes. `write_message` and `read_message` operate on raw `&[u8]` /
// `Vec<u8>` over blocking `Write`/`Read` streams; the caller handles message
// encoding separately (see `codec.rs`), keeping this module format-agnostic.
//
// The server does not block on reads. Its reactor reads whatever bytes a
// ready socket has and feeds them to a `FrameBuffer`, which hands back whole
// frames once they are complete and keeps any partial tail for the next read.
//
// A `MAX_MESSAGE_SIZE` constant protects against unbounded allocation from
// malformed or malicious length prefixes. The largest real message is a
// table snapshot, which is a few dozen bytes.

use std::io::{self, Read, Write};

/// Maximum allowed payload size (64 KiB).
pub const MAX_MESSAGE_SIZE: u32 = 64 * 1024;

const LEN_PREFIX: usize = 4;

fn oversized(len: usize) -> String {
    format!("message too large: {len} bytes (max {MAX_MESSAGE_SIZE})")
}

/// Write a length-delimited message: 4-byte big-endian length, then payload.
pub fn write_message<W: Write>(writer: &mut W, msg: &[u8]) -> io::Result<()> {
    let len = match u32::try_from(msg.len()) {
        Ok(len) if len <= MAX_MESSAGE_SIZE => len,
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                oversized(msg.len()),
            ));
        }
    };
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(msg)?;
    writer.flush()?;
    Ok(())
}

/// Read a length-delimited message: 4-byte big-endian length, then payload.
///
/// Returns `UnexpectedEof` if the stream closes cleanly before or during a
/// message. Returns `InvalidData` if the length exceeds `MAX_MESSAGE_SIZE`.
pub fn read_message<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; LEN_PREFIX];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            oversized(len as usize),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Accumulates bytes from non-blocking reads and splits them into frames.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame payload, if one is buffered.
    ///
    /// Returns `InvalidData` as soon as a length prefix exceeds
    /// `MAX_MESSAGE_SIZE`, without waiting for the payload to arrive.
    pub fn next_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        let Some(prefix) = self.buf.first_chunk::<LEN_PREFIX>() else {
            return Ok(None);
        };
        let len = u32::from_be_bytes(*prefix);
        if len > MAX_MESSAGE_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                oversized(len as usize),
            ));
        }
        let end = LEN_PREFIX + len as usize;
        if self.buf.len() < end {
            return Ok(None);
        }
        let frame = self.buf[LEN_PREFIX..end].to_vec();
        self.buf.drain(..end);
        Ok(Some(frame))
    }

    /// True if no bytes (not even a partial frame) are buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
