//! Typed view of the `/game_state` region.
//!
//! The region holds a fixed [`StateHeader`] followed by the row-major board,
//! all in one mapping. [`StateView`] addresses both without copying; reads
//! and writes go through raw pointers so no long-lived reference into the
//! shared mapping ever exists.
//!
//! Locking contract: the master (the only writer) calls the mutating methods
//! while holding the writer lock; everyone else calls the read methods under
//! the readers' protocol. `game_over` is the single exception - it is atomic
//! and may be polled without a lock.

use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::game::{state_region_size, Cell, PlayerRecord, Snapshot, StateHeader, MAX_PLAYERS};
use crate::ipc::SharedRegion;

/// Errors from mapping a state region.
#[derive(Debug, Error)]
pub enum StateError {
    /// The region cannot hold the header.
    #[error("state region holds {actual} bytes, the header alone needs {needed}")]
    RegionTooSmall {
        /// Bytes available.
        actual: usize,
        /// Bytes required.
        needed: usize,
    },

    /// The header's dimensions do not fit the region.
    #[error("a {width}x{height} board needs {needed} bytes, the region holds {actual}")]
    BoardOverrunsRegion {
        /// Header width.
        width: u16,
        /// Header height.
        height: u16,
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Width, height, or player count is unusable.
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(&'static str),
}

/// View of the state header and board inside a mapped region.
pub struct StateView<'a> {
    header: NonNull<StateHeader>,
    cells: NonNull<Cell>,
    writable: bool,
    _region: PhantomData<&'a SharedRegion>,
}

impl<'a> StateView<'a> {
    /// Initialise the header in a freshly created region and fill the board
    /// with placeholder rewards (the master seeds the real board next).
    ///
    /// Master-only, before any child is spawned.
    pub fn init(
        region: &'a SharedRegion,
        width: u16,
        height: u16,
        player_count: u32,
    ) -> Result<Self, StateError> {
        if width == 0 || height == 0 {
            return Err(StateError::InvalidDimensions("board sides must be non-zero"));
        }
        if player_count == 0 || player_count as usize > MAX_PLAYERS {
            return Err(StateError::InvalidDimensions("player count must be 1..=9"));
        }
        let needed = state_region_size(width, height);
        if region.data_size() < needed {
            return Err(StateError::BoardOverrunsRegion {
                width,
                height,
                needed,
                actual: region.data_size(),
            });
        }

        let header = region.data().cast::<StateHeader>();
        unsafe {
            let h = header.as_ptr();
            ptr::addr_of_mut!((*h).width).write(width);
            ptr::addr_of_mut!((*h).height).write(height);
            ptr::addr_of_mut!((*h).player_count).write(player_count);
            let players = ptr::addr_of_mut!((*h).players).cast::<PlayerRecord>();
            for i in 0..MAX_PLAYERS {
                players.add(i).write(PlayerRecord::empty());
            }
            ptr::addr_of_mut!((*h).game_over).write(AtomicBool::new(false));
        }

        let view = Self::assemble(region, header, true);
        unsafe {
            for i in 0..view.cell_count() {
                view.cells.as_ptr().add(i).write(Cell::reward(1));
            }
        }
        Ok(view)
    }

    /// Map an existing, initialised region.
    pub fn open(region: &'a SharedRegion) -> Result<Self, StateError> {
        let header_size = mem::size_of::<StateHeader>();
        if region.data_size() < header_size {
            return Err(StateError::RegionTooSmall {
                actual: region.data_size(),
                needed: header_size,
            });
        }

        let header = region.data().cast::<StateHeader>();
        let (width, height) = unsafe {
            let h = header.as_ptr();
            (
                ptr::addr_of!((*h).width).read(),
                ptr::addr_of!((*h).height).read(),
            )
        };
        let needed = state_region_size(width, height);
        if region.data_size() < needed {
            return Err(StateError::BoardOverrunsRegion {
                width,
                height,
                needed,
                actual: region.data_size(),
            });
        }

        Ok(Self::assemble(region, header, !region.is_read_only()))
    }

    fn assemble(
        region: &'a SharedRegion,
        header: NonNull<StateHeader>,
        writable: bool,
    ) -> Self {
        let cells = unsafe {
            NonNull::new_unchecked(
                region
                    .data()
                    .as_ptr()
                    .add(mem::size_of::<StateHeader>())
                    .cast::<Cell>(),
            )
        };
        Self {
            header,
            cells,
            writable,
            _region: PhantomData,
        }
    }

    /// Board width.
    #[must_use]
    pub fn width(&self) -> u16 {
        unsafe { ptr::addr_of!((*self.header.as_ptr()).width).read() }
    }

    /// Board height.
    #[must_use]
    pub fn height(&self) -> u16 {
        unsafe { ptr::addr_of!((*self.header.as_ptr()).height).read() }
    }

    /// Number of active player slots.
    #[must_use]
    pub fn player_count(&self) -> usize {
        unsafe { ptr::addr_of!((*self.header.as_ptr()).player_count).read() as usize }
    }

    /// Whether the game has ended. Lock-free.
    #[must_use]
    pub fn game_over(&self) -> bool {
        unsafe { &*ptr::addr_of!((*self.header.as_ptr()).game_over) }.load(Ordering::Acquire)
    }

    /// Freeze the state. Lock-free publication; the master stores this while
    /// holding the writer lock so readers never see a mutation after it.
    pub fn set_game_over(&self) {
        debug_assert!(self.writable);
        unsafe { &*ptr::addr_of!((*self.header.as_ptr()).game_over) }
            .store(true, Ordering::Release);
    }

    /// Copy of one player record.
    #[must_use]
    pub fn player(&self, index: usize) -> PlayerRecord {
        debug_assert!(index < self.player_count());
        unsafe { self.player_ptr(index).read() }
    }

    /// Read-modify-write one player record.
    pub fn update_player(&self, index: usize, update: impl FnOnce(&mut PlayerRecord)) {
        debug_assert!(self.writable);
        debug_assert!(index < MAX_PLAYERS);
        let ptr = self.player_ptr(index);
        let mut record = unsafe { ptr.read() };
        update(&mut record);
        unsafe { ptr.write(record) };
    }

    /// Cell at `(x, y)`.
    #[must_use]
    pub fn cell(&self, x: u16, y: u16) -> Cell {
        let idx = self.cell_index(x, y);
        unsafe { self.cells.as_ptr().add(idx).read() }
    }

    /// Overwrite the cell at `(x, y)`.
    pub fn set_cell(&self, x: u16, y: u16, cell: Cell) {
        debug_assert!(self.writable);
        let idx = self.cell_index(x, y);
        unsafe { self.cells.as_ptr().add(idx).write(cell) };
    }

    /// Copy a whole seeded board into the region. Master-only, at setup.
    pub fn write_board(&self, board: &[Cell]) {
        debug_assert!(self.writable);
        assert_eq!(board.len(), self.cell_count());
        unsafe {
            ptr::copy_nonoverlapping(board.as_ptr(), self.cells.as_ptr(), board.len());
        }
    }

    /// Copy the full state into local buffers.
    ///
    /// Call under the readers' protocol (or as the master, which is the sole
    /// writer and may read its own state freely).
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let width = self.width();
        let height = self.height();
        let count = self.player_count().min(MAX_PLAYERS);
        let players = (0..count).map(|i| self.player(i)).collect();
        let mut board = Vec::with_capacity(self.cell_count());
        for i in 0..self.cell_count() {
            board.push(unsafe { self.cells.as_ptr().add(i).read() });
        }
        Snapshot {
            width,
            height,
            players,
            game_over: self.game_over(),
            board,
        }
    }

    fn player_ptr(&self, index: usize) -> *mut PlayerRecord {
        unsafe {
            ptr::addr_of_mut!((*self.header.as_ptr()).players)
                .cast::<PlayerRecord>()
                .add(index)
        }
    }

    fn cell_index(&self, x: u16, y: u16) -> usize {
        debug_assert!(x < self.width() && y < self.height());
        usize::from(y) * usize::from(self.width()) + usize::from(x)
    }

    fn cell_count(&self) -> usize {
        usize::from(self.width()) * usize::from(self.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustix::fs::Mode;

    fn test_region(tag: &str, width: u16, height: u16) -> SharedRegion {
        let name = format!("/chompchamps-state-test-{}-{}", tag, std::process::id());
        SharedRegion::create(
            &name,
            state_region_size(width, height),
            Mode::RUSR | Mode::WUSR,
            false,
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_init_then_open_round_trip() {
        let region = test_region("roundtrip", 4, 3);
        let state = StateView::init(&region, 4, 3, 2).unwrap();
        state.set_cell(2, 1, Cell::reward(7));
        state.update_player(0, |p| {
            p.set_name("Player1");
            p.x = 2;
            p.y = 2;
            p.score = 9;
        });

        let reopened = StateView::open(&region).unwrap();
        assert_eq!(reopened.width(), 4);
        assert_eq!(reopened.height(), 3);
        assert_eq!(reopened.player_count(), 2);
        assert_eq!(reopened.cell(2, 1).value(), 7);
        let record = reopened.player(0);
        assert_eq!(record.name_str(), "Player1");
        assert_eq!((record.x, record.y), (2, 2));
        assert_eq!(record.score, 9);
    }

    #[test]
    fn test_game_over_is_monotonic_flag() {
        let region = test_region("gameover", 2, 2);
        let state = StateView::init(&region, 2, 2, 1).unwrap();
        assert!(!state.game_over());
        state.set_game_over();
        assert!(state.game_over());
        assert!(StateView::open(&region).unwrap().game_over());
    }

    #[test]
    fn test_snapshot_copies_everything() {
        let region = test_region("snapshot", 3, 3);
        let state = StateView::init(&region, 3, 3, 1).unwrap();
        state.set_cell(0, 0, Cell::claimed_by(0));
        state.set_cell(1, 2, Cell::reward(4));

        let snap = state.snapshot();
        assert_eq!(snap.width, 3);
        assert_eq!(snap.players.len(), 1);
        assert_eq!(snap.cell(0, 0), Cell::claimed_by(0));
        assert_eq!(snap.cell(1, 2).value(), 4);

        // The snapshot is a copy: later region writes do not show up.
        state.set_cell(1, 2, Cell::reward(9));
        assert_eq!(snap.cell(1, 2).value(), 4);
    }

    #[test]
    fn test_open_rejects_truncated_region() {
        let region = test_region("short", 2, 2);
        // Claim a much larger board than the region holds.
        let state = StateView::init(&region, 2, 2, 1).unwrap();
        state.update_player(0, |_| {});
        unsafe {
            ptr::addr_of_mut!((*region.data().cast::<StateHeader>().as_ptr()).width).write(100);
        }
        assert!(matches!(
            StateView::open(&region),
            Err(StateError::BoardOverrunsRegion { .. })
        ));
    }

    #[test]
    fn test_init_validates_dimensions() {
        let region = test_region("dims", 2, 2);
        assert!(matches!(
            StateView::init(&region, 0, 2, 1),
            Err(StateError::InvalidDimensions(_))
        ));
        assert!(matches!(
            StateView::init(&region, 2, 2, 10),
            Err(StateError::InvalidDimensions(_))
        ));
        assert!(matches!(
            StateView::init(&region, 200, 200, 1),
            Err(StateError::BoardOverrunsRegion { .. })
        ));
    }
}
