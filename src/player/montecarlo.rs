//! Flat Monte-Carlo policy.
//!
//! Every candidate move is evaluated by playing the game out many times on
//! private copies of the snapshot, with all players driven by a cheap
//! greedy-plus-noise policy. The candidate with the best average final score
//! wins; ties fall back to the larger immediate reward.
//!
//! The playout count adapts to the board size and the whole selection is
//! additionally bounded by the `PLAYER_TIME_MS` budget.

use std::time::{Duration, Instant};

use rand::rngs::SmallRng;
use rand::Rng;

use crate::game::{any_valid_move, apply_move, move_target, valid_moves, Direction, Snapshot};
use crate::player::Policy;

/// Environment variable tuning the per-move decision budget, in milliseconds.
pub const TIME_BUDGET_ENV: &str = "PLAYER_TIME_MS";

/// Default decision budget.
const DEFAULT_BUDGET: Duration = Duration::from_millis(120);

/// Hard cap on playouts across all candidates, independent of the budget.
const MAX_TOTAL_PLAYOUTS: u32 = 2500;

/// Probability (out of 256) that a playout step picks a uniformly random
/// valid move instead of the greedy one.
const PLAYOUT_NOISE: u8 = 38;

/// Flat Monte-Carlo move selection with a wall-clock budget.
#[derive(Debug)]
pub struct MonteCarlo {
    budget: Duration,
}

impl MonteCarlo {
    /// Budget from `PLAYER_TIME_MS`, defaulting to 120 ms.
    #[must_use]
    pub fn from_env() -> Self {
        let budget = std::env::var(TIME_BUDGET_ENV)
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .map_or(DEFAULT_BUDGET, Duration::from_millis);
        Self { budget }
    }

    /// Fixed budget, for tests and benchmarks.
    #[must_use]
    pub fn with_budget(budget: Duration) -> Self {
        Self { budget }
    }

    /// Playouts per candidate: more on small boards where they are cheap.
    fn playouts_per_candidate(cells: usize, candidates: usize) -> u32 {
        let base = match cells {
            0..=25 => 2000,
            26..=100 => 800,
            101..=400 => 300,
            _ => 150,
        };
        let capped = MAX_TOTAL_PLAYOUTS / candidates.max(1) as u32;
        base.min(capped).max(10)
    }
}

impl Policy for MonteCarlo {
    fn select(&mut self, snap: &Snapshot, me: usize, rng: &mut SmallRng) -> Option<Direction> {
        let (dirs, count) = valid_moves(snap, me);
        if count == 0 {
            return None;
        }
        if count == 1 {
            return Some(dirs[0]);
        }
        let candidates = &dirs[..count];

        let deadline = Instant::now() + self.budget;
        let playouts =
            Self::playouts_per_candidate(snap.board.len(), count);

        let mut best_avg = f64::NEG_INFINITY;
        let mut best = [Direction::Up; 8];
        let mut best_count = 0;

        for &candidate in candidates {
            let mut total = 0.0;
            let mut ran = 0u32;
            for _ in 0..playouts {
                // Always finish at least one playout per candidate so the
                // comparison stays meaningful under a tight budget.
                if ran > 0 && Instant::now() >= deadline {
                    break;
                }
                let mut sim = snap.clone();
                if apply_move(&mut sim, me, candidate).is_none() {
                    break;
                }
                let num_players = sim.players.len();
                run_playout(&mut sim, (me + 1) % num_players, rng);
                total += f64::from(sim.players[me].score);
                ran += 1;
            }
            if ran == 0 {
                continue;
            }
            let avg = total / f64::from(ran);
            if avg > best_avg {
                best_avg = avg;
                best_count = 0;
                best[best_count] = candidate;
                best_count += 1;
            } else if avg == best_avg {
                best[best_count] = candidate;
                best_count += 1;
            }
        }

        if best_count == 0 {
            // Budget too tight for any playout; fall back to the immediate
            // best reward.
            best[..count].copy_from_slice(candidates);
            best_count = count;
        }

        // Tie-break on the immediate reward, then randomly.
        let reward = |dir: Direction| {
            let (tx, ty) = move_target(snap, me, dir).expect("valid move has a target");
            snap.cell(tx, ty).value()
        };
        let top = best[..best_count]
            .iter()
            .map(|&dir| reward(dir))
            .max()
            .expect("best set is non-empty");
        let finalists: Vec<Direction> = best[..best_count]
            .iter()
            .copied()
            .filter(|&dir| reward(dir) == top)
            .collect();
        Some(finalists[rng.gen_range(0..finalists.len())])
    }
}

/// Play the position out to the end with every player on the light policy.
fn run_playout(sim: &mut Snapshot, first: usize, rng: &mut SmallRng) {
    let players = sim.players.len();
    let mut turn = first;
    while any_valid_move(sim) {
        let current = turn;
        turn = (turn + 1) % players;
        if sim.players[current].blocked {
            continue;
        }
        match playout_move(sim, current, rng) {
            Some(dir) => {
                apply_move(sim, current, dir);
            }
            // Claims are permanent, so a player out of moves stays out.
            None => sim.players[current].blocked = true,
        }
    }
}

/// Light playout policy: greedy on reward with a small random factor so the
/// continuations do not collapse onto one line.
fn playout_move(sim: &Snapshot, player: usize, rng: &mut SmallRng) -> Option<Direction> {
    let (dirs, count) = valid_moves(sim, player);
    if count == 0 {
        return None;
    }
    let dirs = &dirs[..count];
    if rng.gen::<u8>() < PLAYOUT_NOISE {
        return Some(dirs[rng.gen_range(0..count)]);
    }

    let mut best_value = i32::MIN;
    let mut best = [Direction::Up; 8];
    let mut best_count = 0;
    for &dir in dirs {
        let (tx, ty) = move_target(sim, player, dir).expect("valid move has a target");
        let value = sim.cell(tx, ty).value();
        if value > best_value {
            best_value = value;
            best_count = 0;
            best[best_count] = dir;
            best_count += 1;
        } else if value == best_value {
            best[best_count] = dir;
            best_count += 1;
        }
    }
    Some(best[rng.gen_range(0..best_count)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Cell, PlayerRecord};
    use rand::SeedableRng;

    fn snapshot(width: u16, height: u16, heads: &[(u16, u16)]) -> Snapshot {
        let mut snap = Snapshot {
            width,
            height,
            players: Vec::new(),
            game_over: false,
            board: vec![Cell::reward(3); usize::from(width) * usize::from(height)],
        };
        for (i, &(x, y)) in heads.iter().enumerate() {
            let mut record = PlayerRecord::empty();
            record.x = x;
            record.y = y;
            snap.players.push(record);
            snap.set_cell(x, y, Cell::claimed_by(i));
        }
        snap
    }

    #[test]
    fn test_single_valid_move_returned_without_playouts() {
        let mut snap = snapshot(2, 2, &[(0, 0)]);
        snap.set_cell(1, 0, Cell::claimed_by(0));
        snap.set_cell(1, 1, Cell::claimed_by(0));
        let mut rng = SmallRng::seed_from_u64(1);
        let mut policy = MonteCarlo::with_budget(Duration::from_millis(5));
        assert_eq!(policy.select(&snap, 0, &mut rng), Some(Direction::Down));
    }

    #[test]
    fn test_no_valid_move_gives_up() {
        let snap = snapshot(1, 1, &[(0, 0)]);
        let mut rng = SmallRng::seed_from_u64(1);
        let mut policy = MonteCarlo::with_budget(Duration::from_millis(5));
        assert_eq!(policy.select(&snap, 0, &mut rng), None);
    }

    #[test]
    fn test_selection_is_a_valid_move() {
        let snap = snapshot(5, 5, &[(0, 0), (4, 4)]);
        let mut rng = SmallRng::seed_from_u64(9);
        let mut policy = MonteCarlo::with_budget(Duration::from_millis(30));
        let dir = policy.select(&snap, 0, &mut rng).expect("moves exist");
        assert!(crate::game::is_valid_move(&snap, 0, dir));
    }

    #[test]
    fn test_playout_reaches_a_terminal_position() {
        let mut sim = snapshot(4, 4, &[(0, 0), (3, 3)]);
        let mut rng = SmallRng::seed_from_u64(11);
        run_playout(&mut sim, 0, &mut rng);
        assert!(!any_valid_move(&sim));
        // Everything consumed went somewhere: claimed cells match move
        // counts plus placements.
        let claimed = sim.board.iter().filter(|c| !c.is_free()).count() as u32;
        let moves: u32 = sim.players.iter().map(|p| p.valid_moves).sum();
        assert_eq!(claimed, moves + 2);
    }

    #[test]
    fn test_playouts_per_candidate_bounds() {
        assert_eq!(MonteCarlo::playouts_per_candidate(9, 2), 1250);
        assert_eq!(MonteCarlo::playouts_per_candidate(100, 2), 800);
        assert_eq!(MonteCarlo::playouts_per_candidate(10_000, 8), 150);
        assert!(MonteCarlo::playouts_per_candidate(25, 8) >= 10);
    }
}
