//! Move-selection policies.
//!
//! A policy is a pure function from a snapshot to a direction; all the IPC
//! choreography lives in the runtime. Policies must only propose moves whose
//! target is free and in bounds on the snapshot they were given; when no such
//! move exists they return `None` and the runtime emits a placeholder the
//! master counts as invalid.

use rand::rngs::SmallRng;
use rand::Rng;

use crate::game::{move_target, valid_moves, Direction, Snapshot};

/// A move-selection policy, invoked once per turn on a private snapshot.
pub trait Policy {
    /// Pick a direction with a free, in-bounds target cell, or `None` when
    /// no legal move exists.
    fn select(&mut self, snap: &Snapshot, me: usize, rng: &mut SmallRng) -> Option<Direction>;
}

/// The reference policy: greedy with liberties.
///
/// Prefers targets no opponent head can also reach this turn, then ranks by
/// immediate reward plus the number of free neighbours of the target (so the
/// player does not eat itself into a dead end), breaking ties uniformly at
/// random.
#[derive(Debug, Default)]
pub struct Greedy;

impl Policy for Greedy {
    fn select(&mut self, snap: &Snapshot, me: usize, rng: &mut SmallRng) -> Option<Direction> {
        let (dirs, count) = valid_moves(snap, me);
        if count == 0 {
            return None;
        }
        let dirs = &dirs[..count];

        // Targets adjacent to an opponent head can be stolen or contested;
        // keep them only if nothing safer exists.
        let safe: Vec<Direction> = dirs
            .iter()
            .copied()
            .filter(|&dir| {
                let (tx, ty) = move_target(snap, me, dir).expect("valid move has a target");
                !near_opponent_head(snap, me, tx, ty)
            })
            .collect();
        let candidates: &[Direction] = if safe.is_empty() { dirs } else { &safe };

        let mut best_score = i32::MIN;
        let mut best = [Direction::Up; 8];
        let mut best_count = 0;
        for &dir in candidates {
            let (tx, ty) = move_target(snap, me, dir).expect("valid move has a target");
            let score = snap.cell(tx, ty).value() + liberties(snap, tx, ty);
            if score > best_score {
                best_score = score;
                best_count = 0;
                best[best_count] = dir;
                best_count += 1;
            } else if score == best_score {
                best[best_count] = dir;
                best_count += 1;
            }
        }
        Some(best[rng.gen_range(0..best_count)])
    }
}

/// Number of free in-bounds neighbours of `(x, y)`.
pub(crate) fn liberties(snap: &Snapshot, x: u16, y: u16) -> i32 {
    Direction::ALL
        .iter()
        .filter_map(|&dir| crate::game::step(x, y, dir, snap.width, snap.height))
        .filter(|&(nx, ny)| snap.cell(nx, ny).is_free())
        .count() as i32
}

fn near_opponent_head(snap: &Snapshot, me: usize, x: u16, y: u16) -> bool {
    snap.players.iter().enumerate().any(|(index, player)| {
        index != me
            && i32::from(player.x).abs_diff(i32::from(x)) <= 1
            && i32::from(player.y).abs_diff(i32::from(y)) <= 1
    })
}
