// Protocol messages for client-server communication.
//
// Two enums define the full protocol vocabulary:
// - `ClientMessage`: sent by players to the table server.
// - `ServerMessage`: sent by the table server to players.
//
// Both sets are closed. The variant declaration order is the wire tag (see
// `codec.rs`), so new variants must be appended, never inserted.
//
// The client only ever reports the outcome of a hand (riichi stake, self-draw
// win, discard win, exhaustive draw) together with the hand value it computed
// itself. The server arbitrates who pays whom but never validates tiles.

use serde::{Deserialize, Serialize};

use crate::types::{PublicPlayer, SEAT_COUNT, SeatIndex, Wind};

/// Messages sent by a player to the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Put up a riichi stick.
    DeclareRiichi,
    /// Win by self-draw. `dealer_points` is what the East seat pays,
    /// `points` what each other opponent pays (honba excluded).
    DeclareTsumo { dealer_points: i32, points: i32 },
    /// Win off the discard of `from_wind`. Also used as the answer to a
    /// `RequestRon` prompt, where `points == 0` means "no win".
    DeclareRon { from_wind: Wind, points: i32 },
    /// Declare an exhaustive draw, or answer a `RequestDraw` prompt.
    DeclareDraw { tenpai: bool },
}

/// Messages sent by the server to a player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Lobby occupancy, broadcast on every join and leave.
    LobbyPlayerCount { players: u32, capacity: u32 },
    /// Full snapshot of the table as seen from `seat`.
    PlayerGameState {
        hand: u32,
        repeat: u32,
        bonus_honba: u32,
        bonus_riichi: u32,
        seat: SeatIndex,
        players: [PublicPlayer; SEAT_COUNT],
    },
    /// Someone declared ron on the discard of `from_wind`; answer with
    /// `DeclareRon` (points, or 0 to pass).
    RequestRon { from_wind: Wind },
    /// Someone declared an exhaustive draw; answer with `DeclareDraw`.
    RequestDraw,
}
