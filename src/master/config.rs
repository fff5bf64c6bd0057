//! Master configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::game::{starting_positions, MAX_PLAYERS};
use crate::master::MasterError;

/// Everything the master needs to host one game.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    /// Board width in cells.
    pub width: u16,
    /// Board height in cells.
    pub height: u16,
    /// Pacing delay between applied moves, also the scheduler's poll bound.
    pub delay: Duration,
    /// Idle timeout: the game ends when no move is accepted for this long.
    pub timeout: Duration,
    /// Board seed.
    pub seed: u64,
    /// Optional view executable.
    pub view: Option<PathBuf>,
    /// Player executables, one per slot, in slot order.
    pub players: Vec<PathBuf>,
}

impl MasterConfig {
    /// Validate dimensions and the player list.
    pub fn validate(&self) -> Result<(), MasterError> {
        if self.width == 0 || self.height == 0 {
            return Err(MasterError::Config(
                "board width and height must be at least 1".into(),
            ));
        }
        if self.players.is_empty() {
            return Err(MasterError::Config("at least one player is required".into()));
        }
        if self.players.len() > MAX_PLAYERS {
            return Err(MasterError::Config(format!(
                "at most {MAX_PLAYERS} players are supported, got {}",
                self.players.len()
            )));
        }

        // Placement must give every player its own starting cell.
        let positions = starting_positions(self.width, self.height);
        let mut used = positions[..self.players.len()].to_vec();
        used.sort_unstable();
        used.dedup();
        if used.len() != self.players.len() {
            return Err(MasterError::Config(format!(
                "a {}x{} board is too small to place {} players",
                self.width,
                self.height,
                self.players.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(width: u16, height: u16, players: usize) -> MasterConfig {
        MasterConfig {
            width,
            height,
            delay: Duration::from_millis(200),
            timeout: Duration::from_secs(10),
            seed: 1,
            view: None,
            players: (0..players).map(|i| PathBuf::from(format!("p{i}"))).collect(),
        }
    }

    #[test]
    fn test_default_sized_board_accepts_nine() {
        assert!(config(10, 10, 9).validate().is_ok());
    }

    #[test]
    fn test_zero_players_rejected() {
        assert!(config(10, 10, 0).validate().is_err());
    }

    #[test]
    fn test_ten_players_rejected() {
        assert!(config(10, 10, 10).validate().is_err());
    }

    #[test]
    fn test_tiny_board_cannot_hold_two() {
        assert!(config(1, 1, 1).validate().is_ok());
        assert!(config(1, 1, 2).validate().is_err());
    }
}
