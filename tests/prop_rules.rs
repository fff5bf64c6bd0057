//! Property-based tests for the game rules.
//!
//! These verify the board/score invariants over arbitrary move sequences.
//! Run with: cargo test prop_rules

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use proptest::prelude::*;

use chompchamps::game::{
    any_valid_move, apply_move, check_invariants, decide_winner, is_valid_move, new_game,
    Direction, Outcome, PlayerRecord, Snapshot,
};

fn dir_strategy() -> impl Strategy<Value = Direction> {
    (0u8..8).prop_map(|b| Direction::from_byte(b).unwrap())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    /// Fresh games are internally consistent for every seed and shape.
    #[test]
    fn prop_new_game_consistent(
        seed in any::<u64>(),
        width in 3u16..20,
        height in 3u16..20,
        players in 1usize..=4,
    ) {
        let snap = new_game(seed, width, height, players);
        prop_assert!(check_invariants(&snap).is_empty());
        for (i, player) in snap.players.iter().enumerate() {
            // Placement already consumed the starting cell.
            prop_assert!((1..=9).contains(&player.score));
            prop_assert_eq!(player.valid_moves, 0);
            prop_assert_eq!(snap.cell(player.x, player.y).owner(), Some(i));
        }
    }

    /// Any sequence of applied moves preserves the invariants, and rejected
    /// moves change nothing.
    #[test]
    fn prop_moves_preserve_invariants(
        seed in any::<u64>(),
        width in 3u16..12,
        height in 3u16..12,
        players in 1usize..=3,
        moves in prop::collection::vec((0usize..3, dir_strategy()), 0..60),
    ) {
        let mut snap = new_game(seed, width, height, players);
        for (who, dir) in moves {
            let who = who % players;
            let before = snap.clone();
            let legal = is_valid_move(&snap, who, dir);
            let applied = apply_move(&mut snap, who, dir);
            prop_assert_eq!(applied.is_some(), legal);
            if let Some(reward) = applied {
                prop_assert!((1..=9).contains(&reward));
                prop_assert_eq!(snap.players[who].score, before.players[who].score + reward as u32);
                prop_assert_eq!(snap.players[who].valid_moves, before.players[who].valid_moves + 1);
            } else {
                // A rejected move leaves the whole state untouched.
                prop_assert_eq!(&snap.board, &before.board);
                prop_assert_eq!(snap.players[who].score, before.players[who].score);
                prop_assert_eq!(
                    (snap.players[who].x, snap.players[who].y),
                    (before.players[who].x, before.players[who].y)
                );
            }
            prop_assert!(check_invariants(&snap).is_empty());
        }
    }

    /// Playing greedily to exhaustion always reaches "no legal move", and
    /// the claimed-cell count matches the accepted-move count.
    #[test]
    fn prop_exhaustion_reaches_terminal_state(
        seed in any::<u64>(),
        width in 2u16..8,
        height in 2u16..8,
    ) {
        let mut snap = new_game(seed, width, height, 1);
        let mut guard = 0;
        while any_valid_move(&snap) {
            let dir = Direction::ALL
                .into_iter()
                .find(|&d| is_valid_move(&snap, 0, d))
                .unwrap();
            apply_move(&mut snap, 0, dir).unwrap();
            guard += 1;
            prop_assert!(guard <= snap.board.len());
        }
        let claimed = snap.board.iter().filter(|c| !c.is_free()).count() as u32;
        prop_assert_eq!(claimed, snap.players[0].valid_moves + 1);
        prop_assert!(check_invariants(&snap).is_empty());
    }

    /// The winner, when one exists, is strictly better than everyone else
    /// under the lexicographic key; a tie means the best key is shared.
    #[test]
    fn prop_winner_is_lexicographic_best(
        stats in prop::collection::vec((0u32..50, 0u32..50, 0u32..50), 1..9),
    ) {
        let players: Vec<PlayerRecord> = stats
            .iter()
            .map(|&(score, valid, invalid)| {
                let mut r = PlayerRecord::empty();
                r.score = score;
                r.valid_moves = valid;
                r.invalid_moves = invalid;
                r
            })
            .collect();
        let key = |p: &PlayerRecord| (std::cmp::Reverse(p.score), p.valid_moves, p.invalid_moves);
        let best = players.iter().map(key).min().unwrap();

        match decide_winner(&players) {
            Outcome::Winner(index) => {
                prop_assert_eq!(key(&players[index]), best);
                let holders = players.iter().filter(|p| key(p) == best).count();
                prop_assert_eq!(holders, 1);
            }
            Outcome::Tie => {
                let holders = players.iter().filter(|p| key(p) == best).count();
                prop_assert!(holders >= 2);
            }
        }
    }
}

/// Snapshot-level sanity outside the proptest macro: the 1x1 game is born
/// finished.
#[test]
fn one_by_one_game_starts_terminal() {
    let snap: Snapshot = new_game(1, 1, 1, 1);
    assert!(!any_valid_move(&snap));
    assert!(check_invariants(&snap).is_empty());
}
