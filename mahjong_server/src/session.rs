// Session state machine for the table server.
//
// `Session` is the central data structure that `server.rs` drives. It holds
// the current `Phase` by value and replaces it wholesale on every event:
// `Phase::transition` consumes the old phase and returns the next one. Each
// phase variant carries only the data it needs:
//
//   Lobby ──(4th connect)──▶ GameSetup ──▶ Game ◀──────────────┐
//     ▲                                     │  ├─ DeclareRon ──▶ RonResolution
//     └────────(every seat left)────────────┘  └─ DeclareDraw ─▶ DrawResolution
//
// `GameSetup` only exists inside a single transition: the lobby returns it
// once the fourth player arrives, and `Phase::transition` seats the roster
// before handing control back, so it never receives an event of its own.
// The resolution phases own the suspended `Table` while they collect votes
// and hand it back to `Game` once every vote is in.
//
// The session performs no I/O. Connections are identified by the registry's
// `ConnectionId`, and outgoing messages are queued as `Outbound` records that
// the reactor drains after each event. All mutation happens on the reactor
// thread, one event at a time.
//
// Disconnects while a game is running: the seat stays at the table with its
// points but is marked absent. A vote the seat owes is forfeited on the spot
// (no ron / not tenpai), and resolutions opened later pre-fill its vote the
// same way without prompting it. When the last seat leaves, the session ends
// and returns to an empty lobby.
//
// Invalid actions (ron on one's own discard, a second riichi, votes from
// players who are not being asked) are ignored and produce no messages. A
// declaration whose settlement would leave the `i32` point range counts as
// invalid too. If that only shows once a resolution has every vote, the
// resolution is voided and the unchanged table is broadcast so the voters
// are released.

use mahjong_protocol::{ClientMessage, SEAT_COUNT, SeatIndex, ServerMessage, Wind};
use tracing::{debug, info, warn};

use crate::connection::ConnectionId;
use crate::scoring::{Rules, Settlement, Table};

/// A message the reactor must deliver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outbound {
    pub to: ConnectionId,
    pub message: ServerMessage,
}

/// Whether a new connection was taken into the lobby.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// A game is in progress; the reactor closes the connection.
    Refused,
}

/// Input to the state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Connect(ConnectionId),
    Disconnect(ConnectionId),
    Message(ConnectionId, ClientMessage),
}

fn send(out: &mut Vec<Outbound>, to: ConnectionId, message: ServerMessage) {
    out.push(Outbound { to, message });
}

fn broadcast_lobby_count(roster: &[ConnectionId], out: &mut Vec<Outbound>) {
    let message = ServerMessage::LobbyPlayerCount {
        players: roster.len() as u32,
        capacity: SEAT_COUNT as u32,
    };
    for conn in roster {
        send(out, *conn, message.clone());
    }
}

/// Send every present seat its own view of the table.
fn broadcast_table(table: &Table, out: &mut Vec<Outbound>) {
    for seat in SeatIndex::all() {
        let occupant = table.seat(seat);
        if occupant.present {
            send(out, occupant.conn, table.snapshot(seat));
        }
    }
}

fn commit(
    mut table: Table,
    settlement: &Settlement,
    event: &str,
    out: &mut Vec<Outbound>,
) -> Phase {
    table.apply(settlement);
    info!(
        event,
        deltas = ?settlement.deltas,
        escrow_paid = settlement.escrow_paid,
        outcome = ?settlement.outcome,
        hand = table.counters.hand,
        repeat = table.counters.repeat,
        "hand settled"
    );
    broadcast_table(&table, out);
    Phase::Game(table)
}

fn void(table: Table, event: &str, out: &mut Vec<Outbound>) -> Phase {
    warn!(event, "settlement leaves the point range; declaration voided");
    broadcast_table(&table, out);
    Phase::Game(table)
}

/// Players waiting for a table, in arrival order.
#[derive(Clone, Debug, Default)]
pub struct Lobby {
    roster: Vec<ConnectionId>,
}

impl Lobby {
    pub fn roster(&self) -> &[ConnectionId] {
        &self.roster
    }

    fn on_event(mut self, event: Event, out: &mut Vec<Outbound>) -> Phase {
        match event {
            Event::Connect(conn) => {
                self.roster.push(conn);
                broadcast_lobby_count(&self.roster, out);
                if let Ok(seats) = <[ConnectionId; SEAT_COUNT]>::try_from(self.roster.as_slice()) {
                    return Phase::GameSetup(GameSetup { seats });
                }
            }
            Event::Disconnect(conn) => {
                if let Some(pos) = self.roster.iter().position(|c| *c == conn) {
                    self.roster.remove(pos);
                    broadcast_lobby_count(&self.roster, out);
                }
            }
            Event::Message(..) => {}
        }
        Phase::Lobby(self)
    }
}

/// A full lobby about to be seated.
#[derive(Clone, Debug)]
pub struct GameSetup {
    seats: [ConnectionId; SEAT_COUNT],
}

impl GameSetup {
    /// Seat the roster in arrival order and deal the first hand.
    fn start(self, rules: &Rules, out: &mut Vec<Outbound>) -> Phase {
        let table = Table::new(self.seats, rules.clone());
        info!(seats = ?self.seats, "game started");
        broadcast_table(&table, out);
        Phase::Game(table)
    }
}

fn on_game_event(mut table: Table, event: Event, out: &mut Vec<Outbound>) -> Phase {
    let (conn, msg) = match event {
        Event::Message(conn, msg) => (conn, msg),
        Event::Disconnect(conn) => {
            table.mark_absent(conn);
            return end_if_deserted(table).unwrap_or_else(Phase::Game);
        }
        Event::Connect(_) => return Phase::Game(table),
    };
    let Some(seat) = table.seat_of_conn(conn) else {
        return Phase::Game(table);
    };

    match msg {
        ClientMessage::DeclareRiichi => {
            if table.declare_riichi(seat) {
                debug!(%conn, seat = seat.0, "riichi");
                broadcast_table(&table, out);
            }
            Phase::Game(table)
        }
        ClientMessage::DeclareTsumo {
            dealer_points,
            points,
        } => {
            match table.settle_tsumo(seat, dealer_points, points) {
                Some(settlement) => commit(table, &settlement, "tsumo", out),
                None => {
                    warn!(%conn, dealer_points, points, "tsumo out of point range; ignored");
                    Phase::Game(table)
                }
            }
        }
        ClientMessage::DeclareRon { from_wind, points } => {
            if table.wind_of(seat) == from_wind {
                return Phase::Game(table);
            }
            if table.settle_ron(from_wind, &[(seat, points)]).is_none() {
                warn!(%conn, points, "ron out of point range; ignored");
                return Phase::Game(table);
            }
            Phase::RonResolution(RonResolution::open(table, seat, from_wind, points, out))
        }
        ClientMessage::DeclareDraw { tenpai } => {
            Phase::DrawResolution(DrawResolution::open(table, seat, tenpai, out))
        }
    }
}

/// `Err(table)` hands the table back if anyone is still seated.
fn end_if_deserted(table: Table) -> Result<Phase, Table> {
    if table.all_absent() {
        info!("every seat has left; session over");
        Ok(Phase::Lobby(Lobby::default()))
    } else {
        Err(table)
    }
}

/// One eligible player's answer to a ron declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RonVote {
    pub conn: ConnectionId,
    pub seat: SeatIndex,
    /// `None` while pending; `Some(0)` is a pass.
    pub points: Option<i32>,
}

/// Collecting ron answers from everyone but the discarder.
#[derive(Clone, Debug)]
pub struct RonResolution {
    table: Table,
    from_wind: Wind,
    votes: Vec<RonVote>,
}

impl RonResolution {
    fn open(
        table: Table,
        declarer: SeatIndex,
        from_wind: Wind,
        points: i32,
        out: &mut Vec<Outbound>,
    ) -> Self {
        let discarder = table.seat_of(from_wind);
        let votes = table
            .seats_by_wind()
            .into_iter()
            .filter(|seat| *seat != discarder)
            .map(|seat| {
                let occupant = table.seat(seat);
                let points = if seat == declarer {
                    Some(points)
                } else if !occupant.present {
                    Some(0)
                } else {
                    send(out, occupant.conn, ServerMessage::RequestRon { from_wind });
                    None
                };
                RonVote {
                    conn: occupant.conn,
                    seat,
                    points,
                }
            })
            .collect();
        debug!(?from_wind, declarer = declarer.0, "collecting ron votes");
        Self {
            table,
            from_wind,
            votes,
        }
    }

    pub fn from_wind(&self) -> Wind {
        self.from_wind
    }

    pub fn votes(&self) -> &[RonVote] {
        &self.votes
    }

    fn pending_vote(&mut self, conn: ConnectionId) -> Option<&mut RonVote> {
        self.votes
            .iter_mut()
            .find(|v| v.conn == conn && v.points.is_none())
    }

    fn on_event(mut self, event: Event, _out: &mut Vec<Outbound>) -> Phase {
        match event {
            Event::Message(conn, ClientMessage::DeclareRon { points, .. }) => {
                if let Some(vote) = self.pending_vote(conn) {
                    vote.points = Some(points);
                }
            }
            Event::Disconnect(conn) => {
                if let Some(vote) = self.pending_vote(conn) {
                    vote.points = Some(0);
                }
                self.table.mark_absent(conn);
                match end_if_deserted(self.table) {
                    Ok(lobby) => return lobby,
                    Err(table) => self.table = table,
                }
            }
            _ => {}
        }
        Phase::RonResolution(self)
    }

    fn is_complete(&self) -> bool {
        self.votes.iter().all(|v| v.points.is_some())
    }

    fn resolve(self, out: &mut Vec<Outbound>) -> Phase {
        let votes: Vec<(SeatIndex, i32)> = self
            .votes
            .iter()
            .filter_map(|v| v.points.map(|points| (v.seat, points)))
            .collect();
        match self.table.settle_ron(self.from_wind, &votes) {
            Some(settlement) => commit(self.table, &settlement, "ron", out),
            None => void(self.table, "ron", out),
        }
    }
}

/// One player's answer to a draw declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrawVote {
    pub conn: ConnectionId,
    /// `None` while pending.
    pub tenpai: Option<bool>,
}

/// Collecting tenpai answers from all four seats.
#[derive(Clone, Debug)]
pub struct DrawResolution {
    table: Table,
    votes: [DrawVote; SEAT_COUNT],
}

impl DrawResolution {
    fn open(table: Table, declarer: SeatIndex, tenpai: bool, out: &mut Vec<Outbound>) -> Self {
        let votes = std::array::from_fn(|i| {
            let seat = SeatIndex(i as u8);
            let occupant = table.seat(seat);
            let tenpai = if seat == declarer {
                Some(tenpai)
            } else if !occupant.present {
                Some(false)
            } else {
                send(out, occupant.conn, ServerMessage::RequestDraw);
                None
            };
            DrawVote {
                conn: occupant.conn,
                tenpai,
            }
        });
        debug!(declarer = declarer.0, "collecting draw votes");
        Self { table, votes }
    }

    pub fn votes(&self) -> &[DrawVote; SEAT_COUNT] {
        &self.votes
    }

    fn pending_vote(&mut self, conn: ConnectionId) -> Option<&mut DrawVote> {
        self.votes
            .iter_mut()
            .find(|v| v.conn == conn && v.tenpai.is_none())
    }

    fn on_event(mut self, event: Event, _out: &mut Vec<Outbound>) -> Phase {
        match event {
            Event::Message(conn, ClientMessage::DeclareDraw { tenpai }) => {
                if let Some(vote) = self.pending_vote(conn) {
                    vote.tenpai = Some(tenpai);
                }
            }
            Event::Disconnect(conn) => {
                if let Some(vote) = self.pending_vote(conn) {
                    vote.tenpai = Some(false);
                }
                self.table.mark_absent(conn);
                match end_if_deserted(self.table) {
                    Ok(lobby) => return lobby,
                    Err(table) => self.table = table,
                }
            }
            _ => {}
        }
        Phase::DrawResolution(self)
    }

    fn is_complete(&self) -> bool {
        self.votes.iter().all(|v| v.tenpai.is_some())
    }

    fn resolve(self, out: &mut Vec<Outbound>) -> Phase {
        let tenpai = self.votes.each_ref().map(|v| v.tenpai == Some(true));
        match self.table.settle_draw(tenpai) {
            Some(settlement) => commit(self.table, &settlement, "draw", out),
            None => void(self.table, "draw", out),
        }
    }
}

/// The server's current phase.
#[derive(Clone, Debug)]
pub enum Phase {
    Lobby(Lobby),
    GameSetup(GameSetup),
    Game(Table),
    RonResolution(RonResolution),
    DrawResolution(DrawResolution),
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Lobby(Lobby::default())
    }
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Lobby(_) => "lobby",
            Phase::GameSetup(_) => "game-setup",
            Phase::Game(_) => "game",
            Phase::RonResolution(_) => "ron-resolution",
            Phase::DrawResolution(_) => "draw-resolution",
        }
    }

    /// The running game's table, including while a resolution holds it.
    pub fn table(&self) -> Option<&Table> {
        match self {
            Phase::Game(table) => Some(table),
            Phase::RonResolution(ron) => Some(&ron.table),
            Phase::DrawResolution(draw) => Some(&draw.table),
            Phase::Lobby(_) | Phase::GameSetup(_) => None,
        }
    }

    /// New connections are only taken while waiting in the lobby.
    pub fn accepts_players(&self) -> bool {
        matches!(self, Phase::Lobby(_))
    }

    /// Consume this phase, apply `event`, and return the next phase. Phases
    /// that are ready to move on by themselves (a full `GameSetup`, a
    /// resolution with every vote in) are advanced before returning.
    pub fn transition(self, event: Event, rules: &Rules, out: &mut Vec<Outbound>) -> Phase {
        let next = match self {
            Phase::Lobby(lobby) => lobby.on_event(event, out),
            // Not reachable through `Session`; seat first, then handle the event.
            Phase::GameSetup(setup) => {
                return setup.start(rules, out).transition(event, rules, out);
            }
            Phase::Game(table) => on_game_event(table, event, out),
            Phase::RonResolution(ron) => ron.on_event(event, out),
            Phase::DrawResolution(draw) => draw.on_event(event, out),
        };
        match next {
            Phase::GameSetup(setup) => setup.start(rules, out),
            Phase::RonResolution(ron) if ron.is_complete() => ron.resolve(out),
            Phase::DrawResolution(draw) if draw.is_complete() => draw.resolve(out),
            phase => phase,
        }
    }
}

/// Table session driven by the reactor.
pub struct Session {
    phase: Phase,
    rules: Rules,
    outbox: Vec<Outbound>,
}

impl Session {
    pub fn new(rules: Rules) -> Self {
        Self {
            phase: Phase::default(),
            rules,
            outbox: Vec::new(),
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// A connection was accepted. Refused unless the lobby is open.
    pub fn on_connect(&mut self, conn: ConnectionId) -> Admission {
        if !self.phase.accepts_players() {
            return Admission::Refused;
        }
        self.apply(Event::Connect(conn));
        Admission::Accepted
    }

    /// A connection closed, hung up, or sent something undecodable.
    pub fn on_disconnect(&mut self, conn: ConnectionId) {
        self.apply(Event::Disconnect(conn));
    }

    pub fn on_message(&mut self, conn: ConnectionId, msg: ClientMessage) {
        debug!(%conn, ?msg, phase = self.phase.name(), "packet");
        self.apply(Event::Message(conn, msg));
    }

    fn apply(&mut self, event: Event) {
        let from = self.phase.name();
        let phase = std::mem::take(&mut self.phase);
        self.phase = phase.transition(event, &self.rules, &mut self.outbox);
        let to = self.phase.name();
        if from != to {
            info!(from, to, "phase change");
        }
    }

    /// Take every message queued since the last drain, in order.
    pub fn drain_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }
}
