// Integration smoke test for the table server.
//
// Starts a server on localhost and drives it with plain TCP sockets using the
// protocol crate's codec: lobby fill-up, the first hand's snapshots, a riichi
// and self-draw, a ron vote, refusal of a fifth player, a malformed packet,
// and shutdown.
//
// Clients connect one at a time and wait for their lobby count before the
// next one connects, so seat order (and therefore wind) is deterministic.

use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use mahjong_protocol::{ClientMessage, PublicPlayer, ServerMessage, Wind, recv, send};
use mahjong_server::{ServerConfig, ServerHandle, start_server};

fn start() -> (ServerHandle, SocketAddr) {
    let config = ServerConfig {
        port: 0,
        ..ServerConfig::default()
    };
    start_server(config).unwrap()
}

fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
}

fn recv_msg(stream: &mut TcpStream) -> ServerMessage {
    recv(stream).unwrap()
}

fn expect_lobby(stream: &mut TcpStream, players: u32) {
    assert_eq!(
        recv_msg(stream),
        ServerMessage::LobbyPlayerCount {
            players,
            capacity: 4
        }
    );
}

fn expect_points(stream: &mut TcpStream) -> [i32; 4] {
    match recv_msg(stream) {
        ServerMessage::PlayerGameState { players, .. } => players.map(|p| p.points),
        other => panic!("expected PlayerGameState, got {other:?}"),
    }
}

/// Connect four players and consume everything up to the first snapshot.
fn seat_four(addr: SocketAddr) -> Vec<TcpStream> {
    let mut clients: Vec<TcpStream> = Vec::new();
    for n in 1..=4 {
        let mut stream = connect(addr);
        expect_lobby(&mut stream, n);
        for earlier in &mut clients {
            expect_lobby(earlier, n);
        }
        clients.push(stream);
    }
    for (seat, client) in clients.iter_mut().enumerate() {
        match recv_msg(client) {
            ServerMessage::PlayerGameState {
                hand: 0,
                repeat: 0,
                bonus_honba: 0,
                bonus_riichi: 0,
                seat: viewer,
                players,
            } => {
                assert_eq!(viewer.as_usize(), seat);
                assert!(players.iter().all(|p| p.points == 25000 && !p.riichi));
            }
            other => panic!("expected initial PlayerGameState, got {other:?}"),
        }
    }
    clients
}

#[test]
fn riichi_then_tsumo_over_the_wire() {
    let (handle, addr) = start();
    let mut clients = seat_four(addr);

    send(&mut clients[0], &ClientMessage::DeclareRiichi).unwrap();
    for client in &mut clients {
        match recv_msg(client) {
            ServerMessage::PlayerGameState { players, .. } => {
                assert_eq!(
                    players[0],
                    PublicPlayer {
                        points: 24000,
                        riichi: true
                    }
                );
            }
            other => panic!("expected PlayerGameState, got {other:?}"),
        }
    }

    send(
        &mut clients[1],
        &ClientMessage::DeclareTsumo {
            dealer_points: 2000,
            points: 1000,
        },
    )
    .unwrap();
    for client in &mut clients {
        assert_eq!(expect_points(client), [22000, 30000, 24000, 24000]);
    }

    // A fifth player is turned away while the game runs.
    let mut late = connect(addr);
    let err = recv::<_, ServerMessage>(&mut late).unwrap_err();
    assert!(err.is_closed(), "expected close, got {err}");

    handle.stop().unwrap();
}

#[test]
fn ron_vote_round_trip() {
    let (handle, addr) = start();
    let mut clients = seat_four(addr);

    send(
        &mut clients[1],
        &ClientMessage::DeclareRon {
            from_wind: Wind::East,
            points: 2000,
        },
    )
    .unwrap();
    for voter in [2, 3] {
        assert_eq!(
            recv_msg(&mut clients[voter]),
            ServerMessage::RequestRon {
                from_wind: Wind::East
            }
        );
        send(
            &mut clients[voter],
            &ClientMessage::DeclareRon {
                from_wind: Wind::East,
                points: 0,
            },
        )
        .unwrap();
    }

    for client in &mut clients {
        assert_eq!(expect_points(client), [23000, 27000, 25000, 25000]);
    }

    handle.stop().unwrap();
}

#[test]
fn malformed_packet_drops_only_the_sender() {
    let (handle, addr) = start();
    let mut a = connect(addr);
    expect_lobby(&mut a, 1);
    let mut b = connect(addr);
    expect_lobby(&mut b, 2);
    expect_lobby(&mut a, 2);

    // Frame of length 4 carrying an unknown message tag.
    b.write_all(&[0, 0, 0, 4, 0, 0, 0, 42]).unwrap();

    expect_lobby(&mut a, 1);
    let err = recv::<_, ServerMessage>(&mut b).unwrap_err();
    assert!(err.is_closed(), "expected close, got {err}");

    handle.stop().unwrap();
}

#[test]
fn departed_player_forfeits_and_table_continues() {
    let (handle, addr) = start();
    let mut clients = seat_four(addr);

    send(&mut clients[2], &ClientMessage::DeclareDraw { tenpai: true }).unwrap();
    for voter in [0, 1, 3] {
        assert_eq!(recv_msg(&mut clients[voter]), ServerMessage::RequestDraw);
    }
    send(&mut clients[0], &ClientMessage::DeclareDraw { tenpai: true }).unwrap();
    send(&mut clients[1], &ClientMessage::DeclareDraw { tenpai: false }).unwrap();
    drop(clients.pop());

    // North left without answering: counted as not tenpai.
    for client in &mut clients {
        assert_eq!(expect_points(client), [27000, 23000, 27000, 23000]);
    }

    handle.stop().unwrap();
}

#[test]
fn stop_closes_connections() {
    let (handle, addr) = start();
    let mut a = connect(addr);
    expect_lobby(&mut a, 1);

    handle.stop().unwrap();
    let err = recv::<_, ServerMessage>(&mut a).unwrap_err();
    assert!(err.is_closed(), "expected close, got {err}");
}
