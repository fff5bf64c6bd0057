//! IPC choreography shared by every player variant.
//!
//! The policy is pluggable; the choreography is not:
//! 1. wait on the turn token
//! 2. copy the state under the readers' protocol
//! 3. pick a move from the snapshot, off-lock
//! 4. re-verify the snapshot under the state lock and write exactly one byte

use std::io::{self, Write};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::rngs::SmallRng;
use rand::SeedableRng;
use thiserror::Error;

use crate::game::{state_region_size, Direction, Snapshot};
use crate::ipc::{
    SemError, SharedRegion, ShmError, StateError, StateView, SyncBlock, STATE_REGION_NAME,
    SYNC_REGION_NAME,
};
use crate::player::Policy;

/// How long slot discovery keeps scanning before giving up.
const DISCOVERY_ATTEMPTS: u32 = 500;

/// Sleep between slot-discovery scans.
const DISCOVERY_PAUSE: Duration = Duration::from_millis(10);

/// Bound on a single token wait; between waits the player re-checks
/// `game_over` so a vanished master cannot park it forever.
const TOKEN_POLL: Duration = Duration::from_millis(500);

/// Errors from the player side of the protocol.
#[derive(Debug, Error)]
pub enum PlayerError {
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

    /// No player record carries this process id.
    #[error("could not determine the player slot for pid {pid}")]
    SlotNotFound {
        /// Our process id.
        pid: i32,
    },

    /// Writing the move byte failed for a reason other than a closed pipe.
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),
}

/// A connected player: both regions mapped, slot discovered, RNG seeded.
pub struct PlayerRuntime {
    state_region: SharedRegion,
    sync_region: SharedRegion,
    my_index: usize,
    rng: SmallRng,
}

impl PlayerRuntime {
    /// Open both regions and discover our slot by pid scan.
    ///
    /// The scan runs under the readers' protocol and retries with short
    /// sleeps until the master has recorded our pid, the game ends, or the
    /// retry budget runs out.
    pub fn connect(width: u16, height: u16) -> Result<Self, PlayerError> {
        let state_region =
            SharedRegion::open(STATE_REGION_NAME, state_region_size(width, height), false)?;
        let sync_region = SharedRegion::open(SYNC_REGION_NAME, SyncBlock::region_size(), false)?;
        if sync_region.is_read_only() {
            return Err(PlayerError::SyncReadOnly);
        }

        let pid = std::process::id() as i32;
        let my_index = discover_slot(&state_region, &sync_region, pid)?;

        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        let rng = SmallRng::seed_from_u64(u64::from(pid as u32) ^ wall);

        Ok(Self {
            state_region,
            sync_region,
            my_index,
            rng,
        })
    }

    /// Slot index assigned by the master.
    #[must_use]
    pub fn index(&self) -> usize {
        self.my_index
    }

    /// Run the per-turn loop until the game ends, we are blocked, or the
    /// master goes away.
    pub fn run(&mut self, policy: &mut dyn Policy) -> Result<(), PlayerError> {
        let state = StateView::open(&self.state_region)?;
        let sync = SyncBlock::from_region(&self.sync_region)?;

        loop {
            // Wait for our token, periodically re-checking for termination.
            loop {
                if state.game_over() {
                    return Ok(());
                }
                if sync.await_turn_timeout(self.my_index, TOKEN_POLL)? {
                    break;
                }
            }
            if state.game_over() {
                return Ok(());
            }

            // One token authorises exactly one byte; retry with a fresh
            // snapshot until that byte is out or the game is gone.
            loop {
                let snap = {
                    let _guard = sync.read()?;
                    state.snapshot()
                };
                if snap.game_over || snap.players[self.my_index].blocked {
                    return Ok(());
                }

                let dir = policy
                    .select(&snap, self.my_index, &mut self.rng)
                    // No legal move: emit a placeholder the master will count
                    // as invalid, keeping the token flow intact.
                    .unwrap_or(Direction::Up);

                match emit_byte(&state, sync, &snap, self.my_index, dir)? {
                    Emission::Sent => break,
                    Emission::Stale => continue,
                    Emission::PipeClosed | Emission::GameOver => return Ok(()),
                }
            }
        }
    }
}

/// Serialise the byte against the master: take the state lock, re-verify the
/// snapshot, write exactly one byte.
fn emit_byte(
    state: &StateView<'_>,
    sync: &SyncBlock,
    snap: &Snapshot,
    me: usize,
    dir: Direction,
) -> Result<Emission, PlayerError> {
    let _guard = sync.emission()?;

    if state.game_over() {
        return Ok(Emission::GameOver);
    }
    let live = state.player(me);
    let seen = &snap.players[me];
    if live.blocked || (live.x, live.y) != (seen.x, seen.y) {
        return Ok(Emission::Stale);
    }

    let mut stdout = io::stdout().lock();
    match stdout
        .write_all(&[dir.as_byte()])
        .and_then(|()| stdout.flush())
    {
        Ok(()) => Ok(Emission::Sent),
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(Emission::PipeClosed),
        Err(err) => Err(PlayerError::Io(err)),
    }
}

enum Emission {
    Sent,
    Stale,
    PipeClosed,
    GameOver,
}

fn discover_slot(
    state_region: &SharedRegion,
    sync_region: &SharedRegion,
    pid: i32,
) -> Result<usize, PlayerError> {
    let state = StateView::open(state_region)?;
    let sync = SyncBlock::from_region(sync_region)?;

    let scan = |state: &StateView<'_>| -> Result<Option<usize>, PlayerError> {
        let _guard = sync.read()?;
        let count = state.player_count();
        for index in 0..count {
            if state.player(index).pid == pid {
                return Ok(Some(index));
            }
        }
        Ok(None)
    };

    for _ in 0..DISCOVERY_ATTEMPTS {
        if let Some(index) = scan(&state)? {
            return Ok(index);
        }
        if state.game_over() {
            break;
        }
        thread::sleep(DISCOVERY_PAUSE);
    }
    // One final attempt without the pause.
    if let Some(index) = scan(&state)? {
        return Ok(index);
    }
    Err(PlayerError::SlotNotFound { pid })
}
