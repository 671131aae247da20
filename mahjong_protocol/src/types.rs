// Core value types for the table protocol.
//
// These are shared by `message.rs` (protocol messages) and the server's
// scoring engine (`mahjong_server::scoring`). `Wind` is the seat role that
// rotates with each hand; `SeatIndex` is the fixed arrival-order seat a
// connection keeps for the whole game. The server derives one from the other
// using the current hand number, so only the seat index travels in snapshots.

use serde::{Deserialize, Serialize};

/// Number of seats at a table.
pub const SEAT_COUNT: usize = 4;

/// One of the four rotating player roles. East is the dealer.
///
/// Declaration order is the cyclic wind order and also the order used to
/// break ties when several players win off the same discard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Wind {
    East,
    South,
    West,
    North,
}

impl Wind {
    /// All winds in cyclic order, starting from the dealer.
    pub const ALL: [Wind; SEAT_COUNT] = [Wind::East, Wind::South, Wind::West, Wind::North];

    /// Position of this wind in cyclic order (East = 0).
    pub fn index(self) -> usize {
        self as usize
    }

    /// Wind at `index` in cyclic order, wrapping modulo four.
    pub fn from_index(index: usize) -> Wind {
        Self::ALL[index % SEAT_COUNT]
    }

    /// The following wind in cyclic order (North wraps to East).
    pub fn next(self) -> Wind {
        Self::from_index(self.index() + 1)
    }
}

/// Fixed seat assigned at game start, in lobby arrival order (0..=3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeatIndex(pub u8);

impl SeatIndex {
    pub fn all() -> impl Iterator<Item = SeatIndex> {
        (0..SEAT_COUNT as u8).map(SeatIndex)
    }

    pub fn as_usize(self) -> usize {
        usize::from(self.0)
    }
}

/// The publicly visible part of a seated player, as broadcast in every
/// `PlayerGameState` snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicPlayer {
    pub points: i32,
    pub riichi: bool,
}
