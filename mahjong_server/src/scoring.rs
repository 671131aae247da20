// Scoring engine: point settlement for every hand-ending event.
//
// `Table` is the authoritative game state: hand/repeat counters, the riichi
// escrow carried over from earlier hands, and the four seats with their
// points. The session (`session.rs`) owns exactly one `Table` while a game is
// running and calls into it; nothing in here does I/O.
//
// Settlements are computed and applied in two steps. `settle_tsumo`,
// `settle_ron` and `settle_draw` take `&self` and return a `Settlement`
// describing every point transfer plus the counters for the next hand;
// `apply` commits one. Keeping the computation side-effect free lets tests
// audit exact transfers before anything changes.
//
// Seat and wind: seats are fixed in lobby arrival order, winds rotate with
// the hand number, `wind = (hand + seat) mod 4`. A repeated hand keeps the
// hand number, so the dealer keeps East.
//
// Conservation: `sum(points) + total_riichi * riichi_stake` is the same
// before and after every operation. Riichi stakes leave a player's points
// and sit in escrow until a winner collects them or a draw carries them over.
// Hand values come straight from clients, so every settlement is computed
// with checked arithmetic. A declaration whose payments or resulting totals
// would leave the `i32` range yields `None` and changes nothing.

use mahjong_protocol::{PublicPlayer, SEAT_COUNT, SeatIndex, ServerMessage, Wind};
use serde::{Deserialize, Serialize};

use crate::connection::ConnectionId;

/// Point amounts used by the settlement rules. Loaded as part of
/// `ServerConfig`; every field falls back to its default when omitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rules {
    /// Points each player starts the game with.
    pub starting_points: i32,
    /// Cost of a riichi declaration, held in escrow until the next win.
    pub riichi_stake: i32,
    /// Added to each opponent's payment on a self-draw, per honba.
    pub tsumo_honba_unit: i32,
    /// Added to the discarder's payment to each ron winner, per honba.
    pub ron_honba_unit: i32,
    /// Paid by each non-tenpai player to each tenpai player at a draw.
    pub draw_unit: i32,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            starting_points: 25000,
            riichi_stake: 1000,
            tsumo_honba_unit: 100,
            ron_honba_unit: 300,
            draw_unit: 1000,
        }
    }
}

/// Whether the dealer keeps East for the next hand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandOutcome {
    /// Dealer keeps the seat; `repeat` goes up.
    Repeat,
    /// Winds rotate; `hand` goes up and `repeat` resets.
    Advance,
}

/// Hand progression counters, as shown in every table snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    pub hand: u32,
    pub repeat: u32,
    /// Extra honba carried from a drawn hand that rotated the dealer.
    pub bonus_honba: u32,
    /// Riichi sticks carried over from earlier hands, not yet collected.
    pub bonus_riichi: u32,
}

/// Every point movement caused by one hand-ending event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settlement {
    /// Net change per seat, escrow payout included.
    pub deltas: [i32; SEAT_COUNT],
    /// Points paid out of riichi escrow (zero if the escrow carries over).
    pub escrow_paid: i32,
    pub outcome: HandOutcome,
    /// Counters for the next hand. Riichi flags are always cleared.
    pub next: Counters,
}

impl Settlement {
    fn transfer(&mut self, from: SeatIndex, to: SeatIndex, amount: i32) -> Option<()> {
        let (from, to) = (from.as_usize(), to.as_usize());
        self.deltas[from] = self.deltas[from].checked_sub(amount)?;
        self.deltas[to] = self.deltas[to].checked_add(amount)?;
        Some(())
    }
}

/// A seated player.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Seat {
    pub conn: ConnectionId,
    pub points: i32,
    /// Has a riichi stick in escrow for the current hand.
    pub riichi: bool,
    /// False once the connection has dropped. Absent seats keep their points
    /// and forfeit any vote they are asked for.
    pub present: bool,
}

#[derive(Clone, Debug)]
pub struct Table {
    pub counters: Counters,
    seats: [Seat; SEAT_COUNT],
    rules: Rules,
}

impl Table {
    /// Seat four connections in the given order with the starting points.
    pub fn new(conns: [ConnectionId; SEAT_COUNT], rules: Rules) -> Self {
        let seats = conns.map(|conn| Seat {
            conn,
            points: rules.starting_points,
            riichi: false,
            present: true,
        });
        Self {
            counters: Counters::default(),
            seats,
            rules,
        }
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn seats(&self) -> &[Seat; SEAT_COUNT] {
        &self.seats
    }

    pub fn seat(&self, seat: SeatIndex) -> &Seat {
        &self.seats[seat.as_usize()]
    }

    /// Seat held by `conn`, whether or not it is still present.
    pub fn seat_of_conn(&self, conn: ConnectionId) -> Option<SeatIndex> {
        SeatIndex::all().find(|s| self.seat(*s).conn == conn)
    }

    pub fn wind_of(&self, seat: SeatIndex) -> Wind {
        Wind::from_index(self.counters.hand as usize % SEAT_COUNT + seat.as_usize())
    }

    pub fn seat_of(&self, wind: Wind) -> SeatIndex {
        let hand = self.counters.hand as usize % SEAT_COUNT;
        let seat = (wind.index() + SEAT_COUNT - hand) % SEAT_COUNT;
        SeatIndex(seat as u8)
    }

    /// Seats ordered East, South, West, North for the current hand.
    pub fn seats_by_wind(&self) -> [SeatIndex; SEAT_COUNT] {
        Wind::ALL.map(|wind| self.seat_of(wind))
    }

    pub fn total_honba(&self) -> u32 {
        self.counters.repeat + self.counters.bonus_honba
    }

    /// Carried-over sticks plus the sticks declared this hand.
    pub fn total_riichi(&self) -> u32 {
        let declared = self.seats.iter().filter(|s| s.riichi).count() as u32;
        self.counters.bonus_riichi + declared
    }

    /// Everything in play: points on the table plus the riichi escrow.
    /// Constant across every operation in this module.
    pub fn total_value(&self) -> i64 {
        let points: i64 = self.seats.iter().map(|s| i64::from(s.points)).sum();
        points + i64::from(self.total_riichi()) * i64::from(self.rules.riichi_stake)
    }

    /// Mark the seat held by `conn` as departed.
    pub fn mark_absent(&mut self, conn: ConnectionId) -> Option<SeatIndex> {
        let seat = self.seat_of_conn(conn)?;
        self.seats[seat.as_usize()].present = false;
        Some(seat)
    }

    pub fn all_absent(&self) -> bool {
        self.seats.iter().all(|s| !s.present)
    }

    /// Escrow a riichi stick. Returns false (and changes nothing) if the seat
    /// already declared this hand or cannot pay the stake.
    pub fn declare_riichi(&mut self, seat: SeatIndex) -> bool {
        let stake = self.rules.riichi_stake;
        let seat = &mut self.seats[seat.as_usize()];
        if seat.riichi {
            return false;
        }
        let Some(points) = seat.points.checked_sub(stake) else {
            return false;
        };
        seat.riichi = true;
        seat.points = points;
        true
    }

    fn escrow(&self) -> Option<i32> {
        i32::try_from(self.total_riichi())
            .ok()?
            .checked_mul(self.rules.riichi_stake)
    }

    fn honba_bonus(&self, unit: i32) -> Option<i32> {
        i32::try_from(self.total_honba()).ok()?.checked_mul(unit)
    }

    /// Keep `settlement` only if every seat's new total stays in range.
    fn in_range(&self, settlement: Settlement) -> Option<Settlement> {
        for (seat, delta) in self.seats.iter().zip(settlement.deltas) {
            seat.points.checked_add(delta)?;
        }
        Some(settlement)
    }

    fn after_win(&self, outcome: HandOutcome) -> Counters {
        let Counters { hand, repeat, .. } = self.counters;
        match outcome {
            HandOutcome::Repeat => Counters {
                hand,
                repeat: repeat + 1,
                bonus_honba: 0,
                bonus_riichi: 0,
            },
            HandOutcome::Advance => Counters {
                hand: hand + 1,
                repeat: 0,
                bonus_honba: 0,
                bonus_riichi: 0,
            },
        }
    }

    fn empty_settlement(&self, outcome: HandOutcome, next: Counters) -> Settlement {
        Settlement {
            deltas: [0; SEAT_COUNT],
            escrow_paid: 0,
            outcome,
            next,
        }
    }

    /// Self-draw win by `winner`. The East seat pays `dealer_points`, other
    /// opponents pay `points`; each payment carries the honba bonus. The
    /// winner also collects the whole riichi escrow.
    pub fn settle_tsumo(
        &self,
        winner: SeatIndex,
        dealer_points: i32,
        points: i32,
    ) -> Option<Settlement> {
        let outcome = if self.wind_of(winner) == Wind::East {
            HandOutcome::Repeat
        } else {
            HandOutcome::Advance
        };
        let mut settlement = self.empty_settlement(outcome, self.after_win(outcome));

        let escrow = self.escrow()?;
        settlement.escrow_paid = escrow;
        settlement.deltas[winner.as_usize()] = escrow;

        let honba = self.honba_bonus(self.rules.tsumo_honba_unit)?;
        for payer in SeatIndex::all().filter(|s| *s != winner) {
            let base = if self.wind_of(payer) == Wind::East {
                dealer_points
            } else {
                points
            };
            settlement.transfer(payer, winner, base.checked_add(honba)?)?;
        }
        self.in_range(settlement)
    }

    /// Discard win(s) against `from_wind`. `votes` are `(seat, points)`
    /// answers; only positive votes from seats other than the discarder win.
    /// Each winner is paid by the discarder alone, honba added per winner.
    /// The riichi escrow goes in full to the first winner in wind order.
    ///
    /// With no winners nothing is paid, the hand advances, and the escrow is
    /// carried to the next hand.
    pub fn settle_ron(&self, from_wind: Wind, votes: &[(SeatIndex, i32)]) -> Option<Settlement> {
        let discarder = self.seat_of(from_wind);
        let mut winners: Vec<(SeatIndex, i32)> = votes
            .iter()
            .copied()
            .filter(|(seat, points)| *seat != discarder && *points > 0)
            .collect();
        winners.sort_by_key(|(seat, _)| self.wind_of(*seat));
        winners.dedup_by_key(|(seat, _)| *seat);

        let Some((first, _)) = winners.first().copied() else {
            let next = Counters {
                hand: self.counters.hand + 1,
                repeat: 0,
                bonus_honba: 0,
                bonus_riichi: self.total_riichi(),
            };
            return Some(self.empty_settlement(HandOutcome::Advance, next));
        };

        let outcome = if winners
            .iter()
            .any(|(seat, _)| self.wind_of(*seat) == Wind::East)
        {
            HandOutcome::Repeat
        } else {
            HandOutcome::Advance
        };
        let mut settlement = self.empty_settlement(outcome, self.after_win(outcome));

        let escrow = self.escrow()?;
        settlement.escrow_paid = escrow;
        settlement.deltas[first.as_usize()] = escrow;

        let honba = self.honba_bonus(self.rules.ron_honba_unit)?;
        for (winner, points) in winners {
            settlement.transfer(discarder, winner, points.checked_add(honba)?)?;
        }
        self.in_range(settlement)
    }

    /// Exhaustive draw. Every non-tenpai seat pays `draw_unit` to every
    /// tenpai seat. The riichi escrow carries over either way; the dealer
    /// repeats if tenpai, otherwise the hand advances with one more honba
    /// than the current repeat count.
    pub fn settle_draw(&self, tenpai: [bool; SEAT_COUNT]) -> Option<Settlement> {
        let Counters {
            hand,
            repeat,
            bonus_honba,
            ..
        } = self.counters;
        let carried = self.total_riichi();
        let (outcome, next) = if tenpai[self.seat_of(Wind::East).as_usize()] {
            let next = Counters {
                hand,
                repeat: repeat + 1,
                bonus_honba,
                bonus_riichi: carried,
            };
            (HandOutcome::Repeat, next)
        } else {
            let next = Counters {
                hand: hand + 1,
                repeat: 0,
                bonus_honba: repeat + 1,
                bonus_riichi: carried,
            };
            (HandOutcome::Advance, next)
        };
        let mut settlement = self.empty_settlement(outcome, next);

        for receiver in SeatIndex::all().filter(|s| tenpai[s.as_usize()]) {
            for payer in SeatIndex::all().filter(|s| !tenpai[s.as_usize()]) {
                settlement.transfer(payer, receiver, self.rules.draw_unit)?;
            }
        }
        self.in_range(settlement)
    }

    /// Commit a settlement returned by one of the `settle_*` methods: move
    /// the points, clear riichi flags, and install the next hand's counters.
    pub fn apply(&mut self, settlement: &Settlement) {
        for (seat, delta) in self.seats.iter_mut().zip(settlement.deltas) {
            seat.points += delta;
            seat.riichi = false;
        }
        self.counters = settlement.next;
    }

    /// `PlayerGameState` snapshot as seen from `viewer`.
    pub fn snapshot(&self, viewer: SeatIndex) -> ServerMessage {
        let Counters {
            hand,
            repeat,
            bonus_honba,
            bonus_riichi,
        } = self.counters;
        ServerMessage::PlayerGameState {
            hand,
            repeat,
            bonus_honba,
            bonus_riichi,
            seat: viewer,
            players: self.seats.each_ref().map(|s| PublicPlayer {
                points: s.points,
                riichi: s.riichi,
            }),
        }
    }
}
