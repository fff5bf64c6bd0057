//! Inter-process coordination core.
//!
//! Everything the three process roles share lives here:
//! - [`SharedRegion`]: POSIX named shared memory with typed lifecycle
//!   (create / open / close / destroy) and an optional front semaphore slot
//! - [`SharedSemaphore`]: a process-shared unnamed semaphore usable inside a
//!   shared region
//! - [`SyncBlock`]: the writer-preference reader/writer protocol, the
//!   per-player turn tokens, and the master/view handshake
//! - [`StateView`]: the typed view of the game-state region
//!
//! The master is the only writer of the state region; players and the view
//! are readers. All blocking happens on semaphores, never on spinning.

mod sem;
mod shm;
mod state;
mod sync;

pub use sem::{SemError, SharedSemaphore};
pub use shm::{SharedRegion, ShmError};
pub use state::{StateError, StateView};
pub use sync::{EmissionGuard, ReadGuard, SyncBlock, WriteGuard};

/// Name of the state region, shared by all three binaries.
pub const STATE_REGION_NAME: &str = "/game_state";

/// Name of the sync region, shared by all three binaries.
pub const SYNC_REGION_NAME: &str = "/game_sync";
