// mahjong_protocol: wire protocol between table clients and the server.
//
// This crate defines the message types, framing, and binary encoding used by
// the table server (`mahjong_server`) and its clients over TCP. It is shared
// by both sides and has no dependency on the server.
//
// Module overview:
// - `types.rs`:    Core value types: `Wind`, `SeatIndex`, `PublicPlayer`.
// - `message.rs`:  Client-to-server and server-to-client message enums.
// - `framing.rs`:  Length-delimited framing over any `Read`/`Write` stream
//                  (4-byte big-endian length prefix), plus `FrameBuffer` for
//                  incremental, non-blocking reads.
// - `codec.rs`:    Binary payload encoding (`bincode`, big-endian fixed
//                  width): a variant tag followed by the variant's fields.
//
// Design decisions:
// - **Closed message set.** Every payload starts with the enum tag; anything
//   that does not decode to a known variant is an error, never skipped.
// - **No async runtime.** Framing uses `std::io::Read`/`Write`, compatible
//   with blocking streams, buffered wrappers, and the server's poll loop.

pub mod codec;
pub mod framing;
pub mod message;
pub mod types;

pub use codec::{CodecError, decode, encode, recv, send};
pub use framing::{FrameBuffer, MAX_MESSAGE_SIZE, read_message, write_message};
pub use message::{ClientMessage, ServerMessage};
pub use types::{PublicPlayer, SEAT_COUNT, SeatIndex, Wind};
