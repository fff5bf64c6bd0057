//! Shared state layout: player records, the state header, and snapshots.

use std::mem;
use std::sync::atomic::AtomicBool;

use crate::game::Cell;

/// Maximum number of concurrent players.
pub const MAX_PLAYERS: usize = 9;

/// Size of the fixed player name buffer (display name plus NUL padding).
pub const NAME_LEN: usize = 16;

/// Per-player record, stored inline in the state header.
///
/// `repr(C)` because nine of these live inside the shared state region and
/// every process must agree on the layout.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct PlayerRecord {
    /// Display name, NUL-padded.
    pub name: [u8; NAME_LEN],
    /// Sum of the rewards this player has consumed.
    pub score: u32,
    /// Count of rejected moves.
    pub invalid_moves: u32,
    /// Count of accepted moves.
    pub valid_moves: u32,
    /// Head column.
    pub x: u16,
    /// Head row.
    pub y: u16,
    /// Process id, written by the master before the child can observe it.
    pub pid: i32,
    /// Set when the player's pipe closed; no further turn tokens are issued.
    pub blocked: bool,
}

impl PlayerRecord {
    /// A zeroed record for an unused slot.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            name: [0; NAME_LEN],
            score: 0,
            invalid_moves: 0,
            valid_moves: 0,
            x: 0,
            y: 0,
            pid: 0,
            blocked: false,
        }
    }

    /// Display name as a string slice (up to the first NUL).
    #[must_use]
    pub fn name_str(&self) -> &str {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        std::str::from_utf8(&self.name[..end]).unwrap_or("?")
    }

    /// Overwrite the display name, truncating to `NAME_LEN - 1` bytes.
    pub fn set_name(&mut self, name: &str) {
        self.name = [0; NAME_LEN];
        let bytes = name.as_bytes();
        let len = bytes.len().min(NAME_LEN - 1);
        self.name[..len].copy_from_slice(&bytes[..len]);
    }
}

/// Fixed header of the state region.
///
/// The board follows immediately after this header, row-major, as
/// `width * height` [`Cell`]s in the same mapping.
#[repr(C)]
pub struct StateHeader {
    /// Board width in cells.
    pub width: u16,
    /// Board height in cells.
    pub height: u16,
    /// Number of active player slots.
    pub player_count: u32,
    /// Player records; slots `player_count..` are unused.
    pub players: [PlayerRecord; MAX_PLAYERS],
    /// Once set, no further mutation of the state region happens.
    ///
    /// This is the one field players poll without entering the readers'
    /// protocol, hence the atomic.
    pub game_over: AtomicBool,
}

/// Size in bytes of the state region for a `width x height` board.
#[must_use]
pub fn state_region_size(width: u16, height: u16) -> usize {
    mem::size_of::<StateHeader>()
        + usize::from(width) * usize::from(height) * mem::size_of::<Cell>()
}

/// A local copy of the shared state, taken under the readers' protocol.
///
/// Policies and the view work exclusively on snapshots so that no lock is
/// held while they compute.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Board width in cells.
    pub width: u16,
    /// Board height in cells.
    pub height: u16,
    /// One record per active player.
    pub players: Vec<PlayerRecord>,
    /// Whether the game had ended when the snapshot was taken.
    pub game_over: bool,
    /// Row-major board copy.
    pub board: Vec<Cell>,
}

impl Snapshot {
    /// Row-major index of `(x, y)`.
    #[must_use]
    #[inline]
    pub fn index(&self, x: u16, y: u16) -> usize {
        usize::from(y) * usize::from(self.width) + usize::from(x)
    }

    /// Cell at `(x, y)`. Panics if out of bounds.
    #[must_use]
    #[inline]
    pub fn cell(&self, x: u16, y: u16) -> Cell {
        self.board[self.index(x, y)]
    }

    /// Overwrite the cell at `(x, y)`. Used by simulations on private copies.
    #[inline]
    pub fn set_cell(&mut self, x: u16, y: u16, cell: Cell) {
        let idx = self.index(x, y);
        self.board[idx] = cell;
    }

    /// Whether `(x, y)` lies on the board.
    #[must_use]
    #[inline]
    pub fn in_bounds(&self, x: u16, y: u16) -> bool {
        x < self.width && y < self.height
    }
}
