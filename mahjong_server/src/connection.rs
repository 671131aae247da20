// Connection registry: the server's live TCP connections.
//
// Every accepted socket gets a `ConnectionId` issued here. Ids are opaque,
// monotonically increasing, and never reused within a process, so a stale id
// held by the session can never alias a newer connection. The session
// (`session.rs`) only ever sees ids; this module owns the sockets.
//
// Reads are driven by the reactor in `server.rs`: when poll reports a socket
// readable, `Connection::read_available` does exactly one `read()` (which
// cannot block after a readable event) and buffers the bytes in a
// `FrameBuffer`. `next_message` then decodes whole frames one at a time.
//
// Writes go straight to the socket with blocking framed writes. Messages are
// a few dozen bytes, far below the kernel socket buffer, but each write is
// bounded by `WRITE_TIMEOUT`: a client that stops reading eventually fails a
// write and is disconnected rather than stalling the reactor.

use std::collections::BTreeMap;
use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use mahjong_protocol::{ClientMessage, CodecError, FrameBuffer, ServerMessage, decode, send};

const READ_CHUNK: usize = 4096;

/// Longest a single framed write may block.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Put an accepted client socket into the mode the reactor expects. Reads
/// only happen after a readable event, so the socket stays blocking; writes
/// are bounded by `WRITE_TIMEOUT`.
pub fn prepare_client(stream: &TcpStream) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))
}

/// Registry-issued identity of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u32);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result of servicing one readable event.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes were buffered (possibly zero on a spurious wakeup).
    Data(usize),
    /// The peer closed the stream.
    Closed,
}

pub struct Connection {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    stream: TcpStream,
    frames: FrameBuffer,
}

impl Connection {
    pub fn fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    /// Perform a single `read()` and buffer whatever arrived.
    ///
    /// A zero-byte read is an orderly close. Any partial frame still
    /// buffered at that point is discarded with the connection.
    pub fn read_available(&mut self) -> io::Result<ReadOutcome> {
        let mut chunk = [0u8; READ_CHUNK];
        match self.stream.read(&mut chunk) {
            Ok(0) => Ok(ReadOutcome::Closed),
            Ok(n) => {
                self.frames.extend(&chunk[..n]);
                Ok(ReadOutcome::Data(n))
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(ReadOutcome::Data(0))
            }
            Err(e) => Err(e),
        }
    }

    /// Decode the next complete message, if a whole frame is buffered.
    pub fn next_message(&mut self) -> Result<Option<ClientMessage>, CodecError> {
        match self.frames.next_frame()? {
            Some(payload) => Ok(Some(decode(&payload)?)),
            None => Ok(None),
        }
    }

    pub fn send(&mut self, msg: &ServerMessage) -> Result<(), CodecError> {
        send(&mut self.stream, msg)
    }
}

/// All live connections, keyed by id.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: BTreeMap<ConnectionId, Connection>,
    next_id: u32,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of an accepted stream and issue its id.
    pub fn add(&mut self, stream: TcpStream, peer: SocketAddr) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        self.connections.insert(
            id,
            Connection {
                id,
                peer,
                stream,
                frames: FrameBuffer::new(),
            },
        );
        id
    }

    /// Remove a connection. Dropping the returned value closes the socket.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        self.connections.remove(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Send to one connection. Unknown ids (already removed) are skipped.
    pub fn send_to(&mut self, id: ConnectionId, msg: &ServerMessage) -> Result<(), CodecError> {
        match self.connections.get_mut(&id) {
            Some(conn) => conn.send(msg),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
