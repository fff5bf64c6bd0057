//! The coordination block living in the `/game_sync` region.
//!
//! Writer-preference reader/writer protocol:
//! - a reader passes through `writer_intent` (acquire + immediate release),
//!   then increments `reader_count` under `reader_count_lock`; the first
//!   reader in takes `state_lock` on behalf of the whole cohort and the last
//!   one out releases it
//! - the writer (the master, and only the master) holds `writer_intent`
//!   across the acquisition of `state_lock`, so newly arriving readers queue
//!   behind a pending write
//!
//! Turn tokens are per-player counting semaphores: one `post` authorises
//! exactly one move emission. The view handshake is a pair of binary
//! semaphores the master and the view bounce between them after every
//! mutation.

use std::mem;
use std::ptr::{addr_of_mut, NonNull};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::game::MAX_PLAYERS;
use crate::ipc::{SemError, SharedRegion, SharedSemaphore, ShmError};

/// Shared synchronisation state. Lives in its own named region, initialised
/// in place by the master, and never moved.
#[repr(C)]
pub struct SyncBlock {
    master_to_view: SharedSemaphore,
    view_to_master: SharedSemaphore,
    writer_intent: SharedSemaphore,
    state_lock: SharedSemaphore,
    reader_count_lock: SharedSemaphore,
    reader_count: AtomicU32,
    turn_token: [SharedSemaphore; MAX_PLAYERS],
}

impl SyncBlock {
    /// Size the sync region must have.
    #[must_use]
    pub fn region_size() -> usize {
        mem::size_of::<SyncBlock>()
    }

    /// Initialise every semaphore in place.
    ///
    /// Handshake semaphores and turn tokens start at 0; the three lock
    /// semaphores start at 1.
    ///
    /// # Safety
    ///
    /// `this` must point at `region_size()` writable bytes inside a shared
    /// mapping, and no other process may touch the block until this returns.
    pub unsafe fn init(this: *mut SyncBlock) -> Result<(), SemError> {
        SharedSemaphore::init(addr_of_mut!((*this).master_to_view), 0)?;
        SharedSemaphore::init(addr_of_mut!((*this).view_to_master), 0)?;
        SharedSemaphore::init(addr_of_mut!((*this).writer_intent), 1)?;
        SharedSemaphore::init(addr_of_mut!((*this).state_lock), 1)?;
        SharedSemaphore::init(addr_of_mut!((*this).reader_count_lock), 1)?;
        addr_of_mut!((*this).reader_count).write(AtomicU32::new(0));
        let tokens = addr_of_mut!((*this).turn_token).cast::<SharedSemaphore>();
        for i in 0..MAX_PLAYERS {
            SharedSemaphore::init(tokens.add(i), 0)?;
        }
        Ok(())
    }

    /// Destroy every semaphore in place. Master-only, after all children
    /// exited.
    ///
    /// # Safety
    ///
    /// `this` must have been initialised with [`SyncBlock::init`] and no
    /// process may be waiting on any of the semaphores.
    pub unsafe fn destroy(this: *mut SyncBlock) {
        SharedSemaphore::destroy(addr_of_mut!((*this).master_to_view));
        SharedSemaphore::destroy(addr_of_mut!((*this).view_to_master));
        SharedSemaphore::destroy(addr_of_mut!((*this).writer_intent));
        SharedSemaphore::destroy(addr_of_mut!((*this).state_lock));
        SharedSemaphore::destroy(addr_of_mut!((*this).reader_count_lock));
        let tokens = addr_of_mut!((*this).turn_token).cast::<SharedSemaphore>();
        for i in 0..MAX_PLAYERS {
            SharedSemaphore::destroy(tokens.add(i));
        }
    }

    /// View of the block inside a mapped region.
    ///
    /// Fails if the region is too small to hold the block.
    pub fn from_region(region: &SharedRegion) -> Result<&SyncBlock, ShmError> {
        if region.data_size() < Self::region_size() {
            return Err(ShmError::InvalidArgument(
                "sync region too small for the sync block",
            ));
        }
        let ptr = region.data().cast::<SyncBlock>();
        Ok(unsafe { ptr.as_ref() })
    }

    /// Raw pointer for init/destroy on a freshly created region.
    #[must_use]
    pub fn raw_from_region(region: &SharedRegion) -> NonNull<SyncBlock> {
        region.data().cast::<SyncBlock>()
    }

    /// Enter the readers' protocol. The returned guard holds the read side
    /// until dropped.
    pub fn read(&self) -> Result<ReadGuard<'_>, SemError> {
        // Barrier: queue behind a pending writer.
        self.writer_intent.wait()?;
        self.writer_intent.post()?;

        self.reader_count_lock.wait()?;
        let previous = self.reader_count.load(Ordering::Relaxed);
        if previous == 0 {
            if let Err(err) = self.state_lock.wait() {
                let _ = self.reader_count_lock.post();
                return Err(err);
            }
        }
        self.reader_count.store(previous + 1, Ordering::Relaxed);
        self.reader_count_lock.post()?;
        Ok(ReadGuard { sync: self })
    }

    /// Enter the writer side. Master-only: holds `writer_intent` across the
    /// whole mutation so arriving readers cannot starve the writer.
    pub fn write(&self) -> Result<WriteGuard<'_>, SemError> {
        self.writer_intent.wait()?;
        if let Err(err) = self.state_lock.wait() {
            let _ = self.writer_intent.post();
            return Err(err);
        }
        Ok(WriteGuard { sync: self })
    }

    /// Take `state_lock` alone, as an ordering device for a player's move
    /// emission: the write of the byte is serialised against the master's
    /// read-and-mutate sequence without announcing writer intent.
    pub fn emission(&self) -> Result<EmissionGuard<'_>, SemError> {
        self.state_lock.wait()?;
        Ok(EmissionGuard { sync: self })
    }

    /// Authorise one move emission from player `index`.
    pub fn grant_turn(&self, index: usize) -> Result<(), SemError> {
        self.turn_token[index].post()
    }

    /// Block until the master grants this player a turn.
    pub fn await_turn(&self, index: usize) -> Result<(), SemError> {
        self.turn_token[index].wait()
    }

    /// Bounded turn wait; `Ok(false)` when the timeout elapsed.
    pub fn await_turn_timeout(&self, index: usize, timeout: Duration) -> Result<bool, SemError> {
        self.turn_token[index].wait_timeout(timeout)
    }

    /// Master side of the handshake: tell the view the state changed.
    pub fn signal_view(&self) -> Result<(), SemError> {
        self.master_to_view.post()
    }

    /// Master side of the handshake: wait for the view's redraw.
    pub fn await_view_done(&self) -> Result<(), SemError> {
        self.view_to_master.wait()
    }

    /// Bounded variant for the terminal handshake, so a dead view cannot
    /// hang the master at shutdown. `Ok(false)` when the timeout elapsed.
    pub fn await_view_done_timeout(&self, timeout: Duration) -> Result<bool, SemError> {
        self.view_to_master.wait_timeout(timeout)
    }

    /// View side of the handshake: wait for a state change.
    pub fn await_state_change(&self) -> Result<(), SemError> {
        self.master_to_view.wait()
    }

    /// View side of the handshake: report the redraw finished.
    pub fn signal_redraw_done(&self) -> Result<(), SemError> {
        self.view_to_master.post()
    }
}

/// Read side of the protocol; last reader out releases the state lock.
pub struct ReadGuard<'a> {
    sync: &'a SyncBlock,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        // Semaphore failures cannot be reported from drop; the protocol is
        // unrecoverable at that point anyway.
        let _ = self.sync.reader_count_lock.wait();
        let remaining = self.sync.reader_count.load(Ordering::Relaxed) - 1;
        self.sync.reader_count.store(remaining, Ordering::Relaxed);
        if remaining == 0 {
            let _ = self.sync.state_lock.post();
        }
        let _ = self.sync.reader_count_lock.post();
    }
}

/// Writer side of the protocol.
pub struct WriteGuard<'a> {
    sync: &'a SyncBlock,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        let _ = self.sync.state_lock.post();
        let _ = self.sync.writer_intent.post();
    }
}

/// Bare `state_lock` hold used to order a player's byte emission.
pub struct EmissionGuard<'a> {
    sync: &'a SyncBlock,
}

impl Drop for EmissionGuard<'_> {
    fn drop(&mut self) {
        let _ = self.sync.state_lock.post();
    }
}
