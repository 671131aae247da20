// Test-only mahjong client for multi-hand integration tests.
//
// `TestPlayer` wraps a plain `TcpStream` speaking the real wire codec from
// `mahjong_protocol`, and remembers the last table snapshot it received as a
// `TableView`. The helpers block with a read timeout, so a server that fails
// to answer makes the test fail instead of hang.
//
// The only test-specific code here is the synchronous expect/send wrappers.
// The server under test is the real `mahjong_server::start_server`.
//
// See also: `tests/full_game.rs` for the scenarios.

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use mahjong_protocol::{
    ClientMessage, CodecError, PublicPlayer, SEAT_COUNT, SeatIndex, ServerMessage, Wind, recv,
    send,
};
use mahjong_server::{ServerConfig, ServerHandle, start_server};

/// Default timeout for blocking reads.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// How long `expect_silence` listens before concluding nothing is coming.
const SILENCE: Duration = Duration::from_millis(200);

/// Start a server with default rules on a free port.
pub fn start_test_server() -> (ServerHandle, SocketAddr) {
    let config = ServerConfig {
        port: 0,
        ..ServerConfig::default()
    };
    start_server(config).expect("start_server failed")
}

/// A player's view of the table, as carried by `PlayerGameState`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableView {
    pub hand: u32,
    pub repeat: u32,
    pub bonus_honba: u32,
    pub bonus_riichi: u32,
    pub seat: SeatIndex,
    pub players: [PublicPlayer; SEAT_COUNT],
}

impl TableView {
    /// This viewer's wind for the current hand.
    pub fn wind(&self) -> Wind {
        Wind::from_index(self.hand as usize + self.seat.as_usize())
    }

    pub fn points(&self) -> [i32; SEAT_COUNT] {
        self.players.map(|p| p.points)
    }

    /// Riichi sticks in escrow: carried over plus declared this hand.
    pub fn sticks(&self) -> u32 {
        let declared = self.players.iter().filter(|p| p.riichi).count() as u32;
        self.bonus_riichi + declared
    }

    /// Points on the table plus the escrow at `stake` per stick.
    pub fn total_value(&self, stake: i32) -> i64 {
        let points: i64 = self.players.iter().map(|p| i64::from(p.points)).sum();
        points + i64::from(self.sticks()) * i64::from(stake)
    }
}

pub struct TestPlayer {
    stream: TcpStream,
    pub view: Option<TableView>,
}

impl TestPlayer {
    pub fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).expect("connect failed");
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .expect("set_read_timeout failed");
        Self { stream, view: None }
    }

    /// Connect and expect to be the `players`-th player in the lobby.
    /// Retries while the server is still refusing (a previous game winding
    /// down).
    pub fn join_lobby(addr: SocketAddr, players: u32) -> Self {
        let start = Instant::now();
        loop {
            assert!(
                start.elapsed() < READ_TIMEOUT,
                "timed out waiting for the lobby to open"
            );
            let mut player = Self::connect(addr);
            match recv::<_, ServerMessage>(&mut player.stream) {
                Ok(msg) => {
                    assert_eq!(
                        msg,
                        ServerMessage::LobbyPlayerCount {
                            players,
                            capacity: SEAT_COUNT as u32
                        }
                    );
                    return player;
                }
                Err(e) if e.is_closed() => thread::sleep(Duration::from_millis(20)),
                Err(e) => panic!("lobby join failed: {e}"),
            }
        }
    }

    pub fn send(&mut self, msg: &ClientMessage) {
        send(&mut self.stream, msg).expect("send failed");
    }

    /// Blocking receive. Snapshots are recorded in `view`.
    pub fn recv(&mut self) -> ServerMessage {
        let msg: ServerMessage = recv(&mut self.stream).expect("recv failed");
        if let ServerMessage::PlayerGameState {
            hand,
            repeat,
            bonus_honba,
            bonus_riichi,
            seat,
            players,
        } = msg.clone()
        {
            self.view = Some(TableView {
                hand,
                repeat,
                bonus_honba,
                bonus_riichi,
                seat,
                players,
            });
        }
        msg
    }

    pub fn expect_lobby(&mut self, players: u32) {
        assert_eq!(
            self.recv(),
            ServerMessage::LobbyPlayerCount {
                players,
                capacity: SEAT_COUNT as u32
            }
        );
    }

    pub fn expect_state(&mut self) -> TableView {
        match self.recv() {
            ServerMessage::PlayerGameState { .. } => self.view.clone().expect("view recorded"),
            other => panic!("expected PlayerGameState, got {other:?}"),
        }
    }

    pub fn expect_request_ron(&mut self) -> Wind {
        match self.recv() {
            ServerMessage::RequestRon { from_wind } => from_wind,
            other => panic!("expected RequestRon, got {other:?}"),
        }
    }

    pub fn expect_request_draw(&mut self) {
        assert_eq!(self.recv(), ServerMessage::RequestDraw);
    }

    /// Assert that nothing arrives for a short while.
    pub fn expect_silence(&mut self) {
        self.stream
            .set_read_timeout(Some(SILENCE))
            .expect("set_read_timeout failed");
        match recv::<_, ServerMessage>(&mut self.stream) {
            Err(CodecError::Io(e))
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            other => panic!("expected silence, got {other:?}"),
        }
        self.stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .expect("set_read_timeout failed");
    }

    pub fn expect_closed(&mut self) {
        match recv::<_, ServerMessage>(&mut self.stream) {
            Err(e) if e.is_closed() => {}
            other => panic!("expected the server to close the connection, got {other:?}"),
        }
    }

    /// The wind recorded in the last snapshot.
    pub fn wind(&self) -> Wind {
        self.view.as_ref().expect("no snapshot yet").wind()
    }

    pub fn riichi(&mut self) {
        self.send(&ClientMessage::DeclareRiichi);
    }

    pub fn tsumo(&mut self, dealer_points: i32, points: i32) {
        self.send(&ClientMessage::DeclareTsumo {
            dealer_points,
            points,
        });
    }

    pub fn ron(&mut self, from_wind: Wind, points: i32) {
        self.send(&ClientMessage::DeclareRon { from_wind, points });
    }

    pub fn draw(&mut self, tenpai: bool) {
        self.send(&ClientMessage::DeclareDraw { tenpai });
    }
}

/// Connect four players in seat order and consume everything up to and
/// including the first snapshot.
pub fn seat_four(addr: SocketAddr) -> Vec<TestPlayer> {
    let mut players: Vec<TestPlayer> = Vec::new();
    for n in 1..=SEAT_COUNT as u32 {
        let player = TestPlayer::join_lobby(addr, n);
        for earlier in &mut players {
            earlier.expect_lobby(n);
        }
        players.push(player);
    }
    let view = expect_states(&mut players);
    assert_eq!(view.hand, 0);
    players
}

/// Every player receives one snapshot. Asserts they agree on everything but
/// the viewer's seat and returns the first.
pub fn expect_states(players: &mut [TestPlayer]) -> TableView {
    let views: Vec<TableView> = players.iter_mut().map(TestPlayer::expect_state).collect();
    for (index, view) in views.iter().enumerate() {
        assert_eq!(view.seat.as_usize(), index);
        assert_eq!(
            TableView {
                seat: views[0].seat,
                ..view.clone()
            },
            views[0]
        );
    }
    views[0].clone()
}

/// Index of the player currently holding `wind`.
pub fn seat_with_wind(players: &[TestPlayer], wind: Wind) -> usize {
    players
        .iter()
        .position(|p| p.wind() == wind)
        .expect("every wind is held by a seated player")
}
