// mahjong_server: four-player mahjong table server.
//
// Players connect over TCP, wait in a lobby until four are present, and then
// report the outcome of each hand (riichi, self-draw, discard win, draw). The
// server never sees tiles: it trusts the hand values players declare and
// keeps the authoritative score table, settling points and broadcasting each
// player's view after every change.
//
// Module overview:
// - `poll.rs`:       `Multiplexer`, a readiness loop over `poll(2)`.
// - `connection.rs`: `ConnectionRegistry`, the live sockets with their ids and
//                    frame buffers.
// - `session.rs`:    The phase state machine (lobby, game, ron and draw
//                    resolution). Pure logic that queues outgoing messages.
// - `scoring.rs`:    The score `Table` and the settlement rules.
// - `server.rs`:     The reactor that ties the above together, plus
//                    `start_server` / `run_server`.
// - `config.rs`:     `ServerConfig`, loaded from JSON.
// - `error.rs`:      `ServerError`.
//
// Dependencies: `mahjong_protocol` (message types and wire codec), `libc`
// for `poll`, `tracing` for logs. Unix only.
//
// The server can run as a standalone binary (`main.rs`) or be embedded via
// the library API (`start_server`), which the tests use.

pub mod config;
pub mod connection;
pub mod error;
pub mod poll;
pub mod scoring;
pub mod server;
pub mod session;

pub use config::ServerConfig;
pub use error::ServerError;
pub use scoring::Rules;
pub use server::{ServerHandle, run_server, start_server};
