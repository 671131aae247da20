// End-to-end tests spanning several hands.
//
// Each test starts a real table server, seats four `TestPlayer`s and plays
// out a sequence of hands over TCP, checking the snapshots every player
// receives: dealer rotation and repeats, honba and riichi sticks carried
// between hands, votes, departures, and the table reopening once everyone
// has left.
//
// Seats are fixed in join order and winds follow `(hand + seat) mod 4`, so
// the dealer for hand 1 is seat 3, for hand 2 seat 2, and so on.

use mahjong_protocol::Wind;
use multiplayer_tests::{TestPlayer, expect_states, seat_four, seat_with_wind, start_test_server};

const STAKE: i32 = 1000;
const TABLE_TOTAL: i64 = 100_000;

// ---------------------------------------------------------------------------
// Test scenarios
// ---------------------------------------------------------------------------

/// Non-dealer win passes East on; a dealer win repeats the hand and the
/// next self-draw carries one honba.
#[test]
fn dealer_rotates_and_repeats_with_honba() {
    let (handle, addr) = start_test_server();
    let mut players = seat_four(addr);
    assert_eq!(players[0].wind(), Wind::East);

    players[1].tsumo(2000, 1000);
    let view = expect_states(&mut players);
    assert_eq!(view.points(), [23000, 29000, 24000, 24000]);
    assert_eq!((view.hand, view.repeat), (1, 0));
    assert_eq!(seat_with_wind(&players, Wind::East), 3);
    assert_eq!(players[0].wind(), Wind::South);

    players[3].tsumo(0, 2000);
    let view = expect_states(&mut players);
    assert_eq!(view.points(), [21000, 27000, 22000, 30000]);
    assert_eq!((view.hand, view.repeat), (1, 1));
    assert_eq!(seat_with_wind(&players, Wind::East), 3);

    // One honba: 100 on top of every payment.
    players[0].tsumo(1000, 500);
    let view = expect_states(&mut players);
    assert_eq!(view.points(), [23300, 26400, 21400, 28900]);
    assert_eq!((view.hand, view.repeat), (2, 0));
    assert_eq!(seat_with_wind(&players, Wind::East), 2);

    handle.stop().unwrap();
}

/// A draw with nobody tenpai advances the hand with a bonus honba, which the
/// next discard win collects at 300 per honba.
#[test]
fn draw_bonus_honba_paid_by_discarder() {
    let (handle, addr) = start_test_server();
    let mut players = seat_four(addr);

    players[1].draw(false);
    for voter in [0, 2, 3] {
        players[voter].expect_request_draw();
        players[voter].draw(false);
    }
    let view = expect_states(&mut players);
    assert_eq!(view.points(), [25000; 4]);
    assert_eq!((view.hand, view.repeat, view.bonus_honba), (1, 0, 1));

    assert_eq!(players[1].wind(), Wind::West);
    players[0].ron(Wind::West, 3900);
    // The discarder is not asked.
    players[1].expect_silence();
    for voter in [3, 2] {
        assert_eq!(players[voter].expect_request_ron(), Wind::West);
        players[voter].ron(Wind::West, 0);
    }

    let view = expect_states(&mut players);
    assert_eq!(view.points(), [29200, 20800, 25000, 25000]);
    assert_eq!((view.hand, view.repeat, view.bonus_honba), (2, 0, 0));

    handle.stop().unwrap();
}

/// Riichi sticks survive a draw and go to the next winner.
#[test]
fn riichi_sticks_carry_over_a_draw() {
    let (handle, addr) = start_test_server();
    let mut players = seat_four(addr);

    players[0].riichi();
    expect_states(&mut players);
    players[2].riichi();
    let view = expect_states(&mut players);
    assert_eq!(view.points(), [24000, 25000, 24000, 25000]);
    assert_eq!(view.sticks(), 2);

    // A repeated declaration changes nothing and is not broadcast.
    players[2].riichi();
    for player in &mut players {
        player.expect_silence();
    }

    players[0].draw(true);
    for (voter, tenpai) in [(1, false), (2, true), (3, false)] {
        players[voter].expect_request_draw();
        players[voter].draw(tenpai);
    }
    let view = expect_states(&mut players);
    assert_eq!(view.points(), [26000, 23000, 26000, 23000]);
    assert_eq!((view.hand, view.repeat, view.bonus_riichi), (0, 1, 2));
    assert!(view.players.iter().all(|p| !p.riichi));
    assert_eq!(view.total_value(STAKE), TABLE_TOTAL);

    players[1].ron(Wind::North, 1000);
    for voter in [0, 2] {
        assert_eq!(players[voter].expect_request_ron(), Wind::North);
        players[voter].ron(Wind::North, 0);
    }
    let view = expect_states(&mut players);
    assert_eq!(view.points(), [26000, 26300, 26000, 21700]);
    assert_eq!((view.hand, view.repeat, view.bonus_riichi), (1, 0, 0));
    assert_eq!(view.total_value(STAKE), TABLE_TOTAL);

    handle.stop().unwrap();
}

/// The table total never changes over a long mix of hands.
#[test]
fn points_are_conserved_over_many_hands() {
    let (handle, addr) = start_test_server();
    let mut players = seat_four(addr);

    for round in 0..9 {
        let east = seat_with_wind(&players, Wind::East);
        let south = seat_with_wind(&players, Wind::South);
        let west = seat_with_wind(&players, Wind::West);

        if players[east].view.as_ref().is_some_and(|v| !v.players[east].riichi) {
            players[east].riichi();
            expect_states(&mut players);
        }

        match round % 3 {
            0 => players[south].tsumo(2000, 1000),
            1 => {
                players[east].draw(false);
                for voter in (0..4).filter(|seat| *seat != east) {
                    players[voter].expect_request_draw();
                    players[voter].draw(voter % 2 == 0);
                }
            }
            _ => {
                players[west].ron(Wind::North, 5200);
                for voter in [east, south] {
                    assert_eq!(players[voter].expect_request_ron(), Wind::North);
                    players[voter].ron(Wind::North, 0);
                }
            }
        }

        let view = expect_states(&mut players);
        assert_eq!(view.total_value(STAKE), TABLE_TOTAL, "round {round}: {view:?}");
    }

    handle.stop().unwrap();
}

/// A player leaving mid-vote forfeits; the rest keep playing. Once every
/// player has left, a fresh table forms from new connections.
#[test]
fn table_reopens_after_everyone_leaves() {
    let (handle, addr) = start_test_server();
    let mut players = seat_four(addr);

    players[1].tsumo(2000, 1000);
    expect_states(&mut players);

    // Hand 1: seat 3 is East and declares ron on seat 0's discard.
    players[3].ron(Wind::South, 8000);
    players[1].expect_request_ron();
    players[2].expect_request_ron();
    players[1].ron(Wind::South, 0);
    drop(players.pop());
    drop(players.remove(2));

    // Only seats 0 and 1 are left to see the result. Seat 2 forfeited and
    // seat 3's own vote stands even though it left.
    let views: Vec<_> = players.iter_mut().map(TestPlayer::expect_state).collect();
    assert_eq!(views[0].points(), [15000, 29000, 24000, 32000]);
    assert_eq!(views[1].points(), views[0].points());
    assert_eq!((views[0].hand, views[0].repeat), (1, 1));

    // A newcomer cannot take an empty seat mid-game.
    let mut late = TestPlayer::connect(addr);
    late.expect_closed();

    drop(players);

    let fresh = seat_four(addr);
    let view = fresh[0].view.clone().unwrap();
    assert_eq!(view.points(), [25000; 4]);
    assert_eq!((view.hand, view.repeat, view.bonus_honba), (0, 0, 0));

    handle.stop().unwrap();
}
