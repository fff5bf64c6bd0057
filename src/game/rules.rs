//! Move validation, application, placement, and winner selection.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::game::{Cell, Direction, PlayerRecord, Snapshot, MAX_PLAYERS};

/// One step from `(x, y)` in `dir`, or `None` if it leaves a
/// `width x height` board.
#[must_use]
pub fn step(x: u16, y: u16, dir: Direction, width: u16, height: u16) -> Option<(u16, u16)> {
    let (dx, dy) = dir.offset();
    let nx = i32::from(x) + dx;
    let ny = i32::from(y) + dy;
    if nx < 0 || ny < 0 || nx >= i32::from(width) || ny >= i32::from(height) {
        return None;
    }
    Some((nx as u16, ny as u16))
}

/// Target cell of `player`'s head moving in `dir`, if it stays on the board.
#[must_use]
pub fn move_target(snap: &Snapshot, player: usize, dir: Direction) -> Option<(u16, u16)> {
    let record = &snap.players[player];
    step(record.x, record.y, dir, snap.width, snap.height)
}

/// Whether moving `player` in `dir` is legal: in bounds and onto a free cell.
#[must_use]
pub fn is_valid_move(snap: &Snapshot, player: usize, dir: Direction) -> bool {
    match move_target(snap, player, dir) {
        Some((tx, ty)) => snap.cell(tx, ty).is_free(),
        None => false,
    }
}

/// All legal directions for `player`, in wire order.
///
/// Returns a fixed-size array and count to avoid heap allocation in the
/// per-turn hot path.
#[must_use]
pub fn valid_moves(snap: &Snapshot, player: usize) -> ([Direction; 8], usize) {
    let mut dirs = [Direction::Up; 8];
    let mut count = 0;
    for dir in Direction::ALL {
        if is_valid_move(snap, player, dir) {
            dirs[count] = dir;
            count += 1;
        }
    }
    (dirs, count)
}

/// Apply a move on a snapshot, returning the consumed reward.
///
/// This is the same bookkeeping the master performs on the live region:
/// credit the reward, claim the cell, move the head, count the move. Returns
/// `None` (and changes nothing) if the move is illegal.
pub fn apply_move(snap: &mut Snapshot, player: usize, dir: Direction) -> Option<i32> {
    let (tx, ty) = move_target(snap, player, dir)?;
    let target = snap.cell(tx, ty);
    if !target.is_free() {
        return None;
    }
    let reward = target.value();
    snap.set_cell(tx, ty, Cell::claimed_by(player));
    let record = &mut snap.players[player];
    record.score += reward as u32;
    record.valid_moves += 1;
    record.x = tx;
    record.y = ty;
    Some(reward)
}

/// Whether any non-blocked player still has a legal move.
///
/// This is the first (and strongest) termination condition.
#[must_use]
pub fn any_valid_move(snap: &Snapshot) -> bool {
    (0..snap.players.len()).any(|i| {
        !snap.players[i].blocked && Direction::ALL.iter().any(|&d| is_valid_move(snap, i, d))
    })
}

/// Deterministic placement table: corners first, then the centre and the
/// mid-edges. The first `player_count` entries are used, in order.
#[must_use]
pub fn starting_positions(width: u16, height: u16) -> [(u16, u16); MAX_PLAYERS] {
    let right = width - 1;
    let bottom = height - 1;
    let mid_x = width / 2;
    let mid_y = height / 2;
    [
        (0, 0),
        (right, 0),
        (0, bottom),
        (right, bottom),
        (mid_x, mid_y),
        (mid_x, 0),
        (mid_x, bottom),
        (0, mid_y),
        (right, mid_y),
    ]
}

/// Seed a fresh board: every cell drawn uniformly from 1..=9.
#[must_use]
pub fn seed_board(rng: &mut impl Rng, width: u16, height: u16) -> Vec<Cell> {
    (0..usize::from(width) * usize::from(height))
        .map(|_| Cell::reward(rng.gen_range(1..=9)))
        .collect()
}

/// Build the initial game state: seeded board, players placed on the
/// deterministic table, each consuming (and scoring) its starting cell.
///
/// The master writes exactly this into the shared region; tests use it to
/// predict scores for a given seed.
#[must_use]
pub fn new_game(seed: u64, width: u16, height: u16, players: usize) -> Snapshot {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut snap = Snapshot {
        width,
        height,
        players: Vec::with_capacity(players),
        game_over: false,
        board: seed_board(&mut rng, width, height),
    };
    let positions = starting_positions(width, height);
    for (index, &(x, y)) in positions.iter().take(players).enumerate() {
        let mut record = PlayerRecord::empty();
        record.set_name(&format!("Player{}", index + 1));
        record.x = x;
        record.y = y;
        record.score = snap.cell(x, y).value() as u32;
        snap.players.push(record);
        snap.set_cell(x, y, Cell::claimed_by(index));
    }
    snap
}

/// Final result of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A single player won the lexicographic tiebreak.
    Winner(usize),
    /// Two or more players share the best key.
    Tie,
}

/// Pick the winner: maximum score, then minimum accepted moves, then minimum
/// rejected moves. Players still tied after that produce [`Outcome::Tie`].
#[must_use]
pub fn decide_winner(players: &[PlayerRecord]) -> Outcome {
    let key = |p: &PlayerRecord| (std::cmp::Reverse(p.score), p.valid_moves, p.invalid_moves);

    let best = match players.iter().min_by_key(|p| key(p)) {
        Some(best) => best,
        None => return Outcome::Tie,
    };
    let best_key = key(best);
    let mut holders = players.iter().enumerate().filter(|(_, p)| key(p) == best_key);
    let (index, _) = holders.next().expect("best key has a holder");
    if holders.next().is_some() {
        Outcome::Tie
    } else {
        Outcome::Winner(index)
    }
}
