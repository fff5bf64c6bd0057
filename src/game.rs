//! Game layer for ChompChamps.
//!
//! Implements the rules of the arena game independently of any process or
//! shared-memory concern:
//! - Board cells (positive reward / negative owner encoding)
//! - The eight movement directions and their wire encoding
//! - Player records and board snapshots
//! - Move validation and application, placement, termination, winner pick

mod board;
mod direction;
mod invariants;
mod rules;
mod state;

pub use board::Cell;
pub use direction::Direction;
pub use invariants::{assert_invariants, check_invariants, InvariantViolation};
pub use rules::{
    any_valid_move, apply_move, decide_winner, is_valid_move, move_target, new_game, seed_board,
    starting_positions, step, valid_moves, Outcome,
};
pub use state::{state_region_size, PlayerRecord, Snapshot, StateHeader, MAX_PLAYERS, NAME_LEN};
