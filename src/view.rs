//! The view process: a semaphore-paced renderer of the live state.
//!
//! The view never touches the board; it waits for the master's signal,
//! copies the state under the readers' protocol, redraws, and signals back.

mod render;

use std::io;

use thiserror::Error;

use crate::game::state_region_size;
use crate::ipc::{
    SemError, ShmError, StateError, StateView, SyncBlock, STATE_REGION_NAME, SYNC_REGION_NAME,
};
use crate::ipc::SharedRegion;

/// Errors from the view side of the protocol.
#[derive(Debug, Error)]
pub enum ViewError {
    /// Shared-region failure.
    #[error(transparent)]
    Shm(#[from] ShmError),

    /// Semaphore failure.
    #[error(transparent)]
    Sem(#[from] SemError),

    /// State-region layout failure.
    #[error(transparent)]
    State(#[from] StateError),

    /// The sync region must be writable to operate the semaphores.
    #[error("sync region is mapped read-only")]
    SyncReadOnly,

    /// Terminal output failed.
    #[error("render failure: {0}")]
    Io(#[from] io::Error),
}

/// Run the redraw loop until the master publishes the terminal state.
pub fn run(width: u16, height: u16) -> Result<(), ViewError> {
    let state_region =
        SharedRegion::open(STATE_REGION_NAME, state_region_size(width, height), false)?;
    let sync_region = SharedRegion::open(SYNC_REGION_NAME, SyncBlock::region_size(), false)?;
    if sync_region.is_read_only() {
        return Err(ViewError::SyncReadOnly);
    }

    let state = StateView::open(&state_region)?;
    let sync = SyncBlock::from_region(&sync_region)?;

    let mut stdout = io::stdout();
    loop {
        sync.await_state_change()?;

        let snap = {
            let _guard = sync.read()?;
            state.snapshot()
        };
        render::draw(&mut stdout, &snap)?;
        sync.signal_redraw_done()?;

        if snap.game_over {
            render::draw_final(&mut stdout, &snap)?;
            return Ok(());
        }
    }
}
