//! Process-shared unnamed semaphores.
//!
//! A [`SharedSemaphore`] wraps a `sem_t` initialised with `pshared = 1` so it
//! works from every process that maps the region it lives in. It is only ever
//! constructed in place inside shared memory; it never moves after `init`.

use std::cell::UnsafeCell;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors from semaphore operations.
#[derive(Debug, Error)]
pub enum SemError {
    /// The underlying `sem_*` call failed.
    #[error("semaphore {op} failed: {source}")]
    System {
        /// Which operation failed.
        op: &'static str,
        /// The OS error.
        source: io::Error,
    },
}

impl SemError {
    fn system(op: &'static str) -> Self {
        Self::System {
            op,
            source: io::Error::last_os_error(),
        }
    }
}

/// A process-shared counting semaphore living inside a shared region.
///
/// `repr(transparent)` over the raw `sem_t`, so a region layout can reserve
/// exactly `size_of::<SharedSemaphore>()` bytes for it.
#[repr(transparent)]
pub struct SharedSemaphore(UnsafeCell<libc::sem_t>);

// The whole point of the type: sem_t is designed for concurrent use from
// multiple processes once initialised with pshared = 1.
unsafe impl Send for SharedSemaphore {}
unsafe impl Sync for SharedSemaphore {}

impl SharedSemaphore {
    /// Initialise the semaphore in place with the given starting value.
    ///
    /// # Safety
    ///
    /// `this` must point into a mapping shared by every process that will use
    /// the semaphore, and must not already hold an initialised semaphore.
    pub unsafe fn init(this: *mut SharedSemaphore, value: u32) -> Result<(), SemError> {
        if libc::sem_init((*this).0.get(), 1, value) == -1 {
            return Err(SemError::system("init"));
        }
        Ok(())
    }

    /// Destroy the semaphore in place.
    ///
    /// # Safety
    ///
    /// `this` must point to a semaphore initialised by [`SharedSemaphore::init`]
    /// that no process is waiting on.
    pub unsafe fn destroy(this: *mut SharedSemaphore) {
        let _ = libc::sem_destroy((*this).0.get());
    }

    /// Decrement, blocking until the count is positive.
    ///
    /// Interrupted waits are retried; callers never observe `EINTR`.
    pub fn wait(&self) -> Result<(), SemError> {
        loop {
            let rc = unsafe { libc::sem_wait(self.0.get()) };
            if rc == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(SemError::System {
                op: "wait",
                source: err,
            });
        }
    }

    /// Decrement with a bound: returns `Ok(true)` on success, `Ok(false)` if
    /// `timeout` elapsed first. Interrupted waits are retried.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool, SemError> {
        let deadline = absolute_deadline(timeout)?;
        loop {
            let rc = unsafe { libc::sem_timedwait(self.0.get(), &deadline) };
            if rc == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::ETIMEDOUT) => return Ok(false),
                _ => {
                    return Err(SemError::System {
                        op: "timedwait",
                        source: err,
                    })
                }
            }
        }
    }

    /// Increment, waking one waiter if any.
    pub fn post(&self) -> Result<(), SemError> {
        if unsafe { libc::sem_post(self.0.get()) } == -1 {
            return Err(SemError::system("post"));
        }
        Ok(())
    }
}

/// `sem_timedwait` takes an absolute `CLOCK_REALTIME` deadline.
fn absolute_deadline(timeout: Duration) -> Result<libc::timespec, SemError> {
    let mut now = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    if unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut now) } == -1 {
        return Err(SemError::system("clock_gettime"));
    }
    let mut sec = now.tv_sec + timeout.as_secs() as libc::time_t;
    let mut nsec = now.tv_nsec + libc::c_long::from(timeout.subsec_nanos());
    if nsec >= 1_000_000_000 {
        sec += 1;
        nsec -= 1_000_000_000;
    }
    Ok(libc::timespec {
        tv_sec: sec,
        tv_nsec: nsec,
    })
}
