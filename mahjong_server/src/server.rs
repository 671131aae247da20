// TCP server and reactor loop for the table server.
//
// Architecture: a single-threaded reactor over `poll(2)` (see `poll.rs`).
//
// - The listening socket and every client socket are registered with one
//   `Multiplexer<Token>`. `Token::Listener` means "accept", and
//   `Token::Client(id)` means "read from connection `id`".
// - When a client is readable, the reactor does one `read()` into that
//   connection's frame buffer and feeds every complete message to the
//   `Session`. A zero-byte read, a hang-up, a read error, or an undecodable
//   frame all drop the connection and notify the session.
// - After every event the reactor flushes the session's outbox, writing each
//   queued message to its recipient. A failed write drops that recipient,
//   which may queue more messages, so flushing loops until the outbox stays
//   empty.
//
// All sockets, the registry, and the session live on the reactor thread.
// Nothing is shared across threads except the `keep_running` flag.
//
// Shutdown: `run_once` waits at most `POLL_INTERVAL`, so the loop notices a
// cleared `keep_running` flag (set by `ServerHandle::stop`) promptly.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use mahjong_protocol::CodecError;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionId, ConnectionRegistry, ReadOutcome, prepare_client};
use crate::error::ServerError;
use crate::poll::{Interest, Multiplexer, Readiness};
use crate::scoring::Rules;
use crate::session::{Admission, Outbound, Session};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Token {
    Listener,
    Client(ConnectionId),
}

/// Why a connection was dropped.
#[derive(Debug, thiserror::Error)]
enum Departure {
    #[error("closed by peer")]
    Closed,
    #[error("hung up")]
    HungUp,
    #[error("read failed: {0}")]
    Read(io::Error),
    #[error("bad packet: {0}")]
    Packet(CodecError),
    #[error("write failed: {0}")]
    Write(CodecError),
}

/// Handle returned by `start_server` to control the running server.
pub struct ServerHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<Result<(), ServerError>>>,
}

impl ServerHandle {
    /// Signal the server to stop and wait for it to shut down. Open
    /// connections are closed when the reactor exits.
    pub fn stop(mut self) -> Result<(), ServerError> {
        self.keep_running.store(false, Ordering::SeqCst);
        match self.thread.take() {
            Some(handle) => handle.join().map_err(|_| ServerError::Panicked)?,
            None => Ok(()),
        }
    }
}

fn bind(config: &ServerConfig) -> Result<(TcpListener, SocketAddr), ServerError> {
    let addr = config.address();
    let listener = TcpListener::bind(&addr).map_err(|source| ServerError::Bind {
        addr: addr.clone(),
        source,
    })?;
    let local = listener
        .local_addr()
        .map_err(|source| ServerError::Bind { addr, source })?;
    listener
        .set_nonblocking(true)
        .map_err(|source| ServerError::Listener {
            addr: local,
            source,
        })?;
    Ok((listener, local))
}

/// Start the server on a background thread. Returns a handle for stopping
/// it and the actual bound address (useful when port 0 is used to let the
/// OS pick a free port).
pub fn start_server(config: ServerConfig) -> Result<(ServerHandle, SocketAddr), ServerError> {
    let (listener, addr) = bind(&config)?;
    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_clone = keep_running.clone();

    let thread = thread::Builder::new()
        .name("mahjong-reactor".into())
        .spawn(move || Reactor::new(listener, config.rules).run(addr, &keep_running_clone))
        .map_err(|source| ServerError::Listener { addr, source })?;

    Ok((
        ServerHandle {
            keep_running,
            thread: Some(thread),
        },
        addr,
    ))
}

/// Bind and serve on the calling thread until a fatal error.
pub fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let (listener, addr) = bind(&config)?;
    Reactor::new(listener, config.rules).run(addr, &AtomicBool::new(true))
}

struct Reactor {
    listener: TcpListener,
    mux: Multiplexer<Token>,
    registry: ConnectionRegistry,
    session: Session,
}

impl Reactor {
    fn new(listener: TcpListener, rules: Rules) -> Self {
        let mut mux = Multiplexer::new();
        mux.register(listener.as_raw_fd(), Interest::READABLE, Token::Listener);
        Self {
            listener,
            mux,
            registry: ConnectionRegistry::new(),
            session: Session::new(rules),
        }
    }

    fn run(mut self, addr: SocketAddr, keep_running: &AtomicBool) -> Result<(), ServerError> {
        info!(%addr, "listening");
        while keep_running.load(Ordering::SeqCst) {
            let Reactor {
                listener,
                mux,
                registry,
                session,
            } = &mut self;
            mux.run_once(Some(POLL_INTERVAL), |mux, token, readiness| {
                match token {
                    Token::Listener => accept_all(listener, mux, registry, session),
                    Token::Client(id) => service_client(id, readiness, mux, registry, session),
                }
                flush(mux, registry, session);
            })
            .map_err(ServerError::Poll)?;
        }
        info!(connections = self.registry.len(), "server stopped");
        Ok(())
    }
}

fn accept_all(
    listener: &TcpListener,
    mux: &mut Multiplexer<Token>,
    registry: &mut ConnectionRegistry,
    session: &mut Session,
) {
    loop {
        match listener.accept() {
            Ok((stream, peer)) => admit(stream, peer, mux, registry, session),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                warn!(error = %e, "accept failed");
                break;
            }
        }
    }
}

fn admit(
    stream: TcpStream,
    peer: SocketAddr,
    mux: &mut Multiplexer<Token>,
    registry: &mut ConnectionRegistry,
    session: &mut Session,
) {
    if let Err(e) = prepare_client(&stream) {
        warn!(%peer, error = %e, "could not configure client socket");
        return;
    }
    let fd = stream.as_raw_fd();
    let id = registry.add(stream, peer);

    match session.on_connect(id) {
        Admission::Accepted => {
            mux.register(fd, Interest::READABLE, Token::Client(id));
            info!(%id, %peer, "connected");
        }
        Admission::Refused => {
            info!(%peer, "game in progress, refusing connection");
            registry.remove(id);
        }
    }
}

fn service_client(
    id: ConnectionId,
    readiness: Readiness,
    mux: &mut Multiplexer<Token>,
    registry: &mut ConnectionRegistry,
    session: &mut Session,
) {
    let result = match registry.get_mut(id) {
        Some(conn) if readiness.is_readable() => pump(conn, session),
        Some(_) if readiness.is_hangup() => Err(Departure::HungUp),
        _ => Ok(()),
    };
    if let Err(departure) = result {
        disconnect(id, &departure, mux, registry, session);
    }
}

/// Read once and hand every complete message to the session.
fn pump(conn: &mut Connection, session: &mut Session) -> Result<(), Departure> {
    if conn.read_available().map_err(Departure::Read)? == ReadOutcome::Closed {
        return Err(Departure::Closed);
    }
    while let Some(msg) = conn.next_message().map_err(Departure::Packet)? {
        session.on_message(conn.id, msg);
    }
    Ok(())
}

fn disconnect(
    id: ConnectionId,
    departure: &Departure,
    mux: &mut Multiplexer<Token>,
    registry: &mut ConnectionRegistry,
    session: &mut Session,
) {
    let Some(conn) = registry.remove(id) else {
        return;
    };
    mux.unregister(conn.fd());
    match departure {
        Departure::Closed => info!(%id, peer = %conn.peer, "disconnected"),
        other => warn!(%id, peer = %conn.peer, reason = %other, "dropping connection"),
    }
    session.on_disconnect(id);
}

/// Deliver everything the session has queued.
fn flush(mux: &mut Multiplexer<Token>, registry: &mut ConnectionRegistry, session: &mut Session) {
    loop {
        let outbox = session.drain_outbox();
        if outbox.is_empty() {
            return;
        }
        for Outbound { to, message } in outbox {
            debug!(%to, ?message, "send");
            if let Err(e) = registry.send_to(to, &message) {
                disconnect(to, &Departure::Write(e), mux, registry, session);
            }
        }
    }
}
