// Readiness multiplexer over `poll(2)`.
//
// `Multiplexer<K>` keeps a set of registered descriptors, each with an
// interest mask and a caller-chosen key (the server uses a `Token` naming
// either the listener or a `ConnectionId`). `run_once` blocks in a single
// `poll` call until at least one descriptor is ready or the timeout expires,
// then invokes the callback once per ready descriptor with the observed
// readiness bits.
//
// The callback receives the multiplexer itself so it can register and
// unregister descriptors. Ready events are snapshotted before dispatch, and
// each event is re-checked against the live registration right before its
// callback runs: if an earlier callback in the same cycle unregistered the
// descriptor (or closed it and a new socket reused the number under a new
// key), the stale event is dropped.
//
// Errors: `EINTR` restarts the wait. Any other failure of `poll` itself is
// returned to the caller, which treats it as fatal. Per-descriptor errors
// (`POLLERR`, `POLLNVAL`) are reported through the hang-up bit.

use std::io;
use std::ops::BitOr;
use std::os::fd::RawFd;
use std::time::Duration;

/// Events a descriptor is registered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interest(libc::c_short);

impl Interest {
    pub const READABLE: Interest = Interest(libc::POLLIN);
    pub const WRITABLE: Interest = Interest(libc::POLLOUT);
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

/// Readiness bits observed for one descriptor in one cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Readiness(libc::c_short);

impl Readiness {
    pub fn is_readable(self) -> bool {
        self.0 & (libc::POLLIN | libc::POLLPRI) != 0
    }

    pub fn is_writable(self) -> bool {
        self.0 & libc::POLLOUT != 0
    }

    /// Peer hang-up or a descriptor error.
    pub fn is_hangup(self) -> bool {
        self.0 & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0
    }
}

struct Entry<K> {
    fd: RawFd,
    interest: Interest,
    key: K,
}

pub struct Multiplexer<K> {
    entries: Vec<Entry<K>>,
}

impl<K> Default for Multiplexer<K> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<K: Copy + PartialEq> Multiplexer<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `fd`, replacing any previous registration of the same fd.
    pub fn register(&mut self, fd: RawFd, interest: Interest, key: K) {
        match self.entries.iter_mut().find(|e| e.fd == fd) {
            Some(entry) => {
                entry.interest = interest;
                entry.key = key;
            }
            None => self.entries.push(Entry { fd, interest, key }),
        }
    }

    /// Stop watching `fd`. Returns its key if it was registered.
    pub fn unregister(&mut self, fd: RawFd) -> Option<K> {
        let pos = self.entries.iter().position(|e| e.fd == fd)?;
        Some(self.entries.remove(pos).key)
    }

    pub fn contains(&self, fd: RawFd) -> bool {
        self.key_of(fd).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn key_of(&self, fd: RawFd) -> Option<K> {
        self.entries.iter().find(|e| e.fd == fd).map(|e| e.key)
    }

    /// Wait once and dispatch every ready descriptor to `callback`.
    ///
    /// `None` waits indefinitely. Returns the number of callbacks invoked;
    /// zero means the timeout expired.
    pub fn run_once<F>(&mut self, timeout: Option<Duration>, mut callback: F) -> io::Result<usize>
    where
        F: FnMut(&mut Self, K, Readiness),
    {
        let mut pollfds: Vec<libc::pollfd> = self
            .entries
            .iter()
            .map(|e| libc::pollfd {
                fd: e.fd,
                events: e.interest.0,
                revents: 0,
            })
            .collect();
        let timeout_ms = match timeout {
            Some(d) => libc::c_int::try_from(d.as_millis()).unwrap_or(libc::c_int::MAX),
            None => -1,
        };

        loop {
            // SAFETY: the pointer and length describe `pollfds`, which stays
            // alive and unaliased for the duration of the call.
            let rc = unsafe {
                libc::poll(
                    pollfds.as_mut_ptr(),
                    pollfds.len() as libc::nfds_t,
                    timeout_ms,
                )
            };
            if rc >= 0 {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }

        let ready: Vec<(RawFd, K, Readiness)> = pollfds
            .iter()
            .zip(&self.entries)
            .filter(|(p, _)| p.revents != 0)
            .map(|(p, e)| (p.fd, e.key, Readiness(p.revents)))
            .collect();

        let mut dispatched = 0;
        for (fd, key, readiness) in ready {
            if self.key_of(fd) != Some(key) {
                continue;
            }
            callback(self, key, readiness);
            dispatched += 1;
        }
        Ok(dispatched)
    }
}
