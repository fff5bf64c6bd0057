//! POSIX named shared memory regions.
//!
//! A [`SharedRegion`] is a named `shm_open` object mapped into the process.
//! The creator may reserve the first bytes of the region for one
//! process-shared semaphore; `data()` then addresses the bytes *after* that
//! reservation. The creator destroys the region (semaphore destroy, unmap,
//! unlink); every other process only unmaps.

use std::mem;
use std::ptr::{null_mut, NonNull};

use rustix::fs::{fstat, ftruncate, Mode};
use rustix::io::Errno;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use rustix::shm;
use thiserror::Error;

use crate::ipc::sem::SharedSemaphore;

/// Errors from shared-region operations.
#[derive(Debug, Error)]
pub enum ShmError {
    /// A caller-supplied argument cannot work (bad name, zero size,
    /// inconsistent size on open).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The region could not be created or opened.
    #[error("shared region `{name}` unavailable: {source}")]
    Unavailable {
        /// Region name.
        name: String,
        /// The OS error.
        source: Errno,
    },

    /// A system call failed after the region was located.
    #[error("{op} failed for shared region `{name}`: {source}")]
    System {
        /// The failing call.
        op: &'static str,
        /// Region name.
        name: String,
        /// The OS error.
        source: Errno,
    },
}

/// Bytes reserved at the front of a region when a front semaphore is
/// requested.
const FRONT_SEM_SIZE: usize = mem::size_of::<SharedSemaphore>();

/// A named shared memory region mapped into this process.
#[derive(Debug)]
pub struct SharedRegion {
    name: String,
    ptr: NonNull<u8>,
    map_size: usize,
    data_size: usize,
    front_sem: bool,
    read_only: bool,
    owner: bool,
}

// The mapping is plain memory; cross-process coordination is the caller's
// responsibility (SyncBlock).
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Create (or re-create) the named region with `data_size` usable bytes.
    ///
    /// With `front_sem` set, one process-shared semaphore is initialised at
    /// the front of the region with `sem_value`, and `data()` starts after
    /// it.
    pub fn create(
        name: &str,
        data_size: usize,
        mode: Mode,
        front_sem: bool,
        sem_value: u32,
    ) -> Result<Self, ShmError> {
        validate_name(name)?;
        if data_size == 0 {
            return Err(ShmError::InvalidArgument("data size must be non-zero"));
        }

        let fd = shm::open(name, shm::OFlags::CREATE | shm::OFlags::RDWR, mode).map_err(
            |source| ShmError::Unavailable {
                name: name.to_string(),
                source,
            },
        )?;

        let map_size = data_size + if front_sem { FRONT_SEM_SIZE } else { 0 };

        if let Err(source) = ftruncate(&fd, map_size as u64) {
            let _ = shm::unlink(name);
            return Err(ShmError::System {
                op: "ftruncate",
                name: name.to_string(),
                source,
            });
        }

        let ptr = match unsafe {
            mmap(
                null_mut(),
                map_size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &fd,
                0,
            )
        } {
            Ok(ptr) => ptr,
            Err(source) => {
                let _ = shm::unlink(name);
                return Err(ShmError::System {
                    op: "mmap",
                    name: name.to_string(),
                    source,
                });
            }
        };
        let ptr = NonNull::new(ptr.cast::<u8>()).expect("mmap success returns non-null");

        if front_sem {
            let sem = ptr.as_ptr().cast::<SharedSemaphore>();
            if let Err(err) = unsafe { SharedSemaphore::init(sem, sem_value) } {
                unsafe {
                    let _ = munmap(ptr.as_ptr().cast(), map_size);
                }
                let _ = shm::unlink(name);
                return Err(ShmError::System {
                    op: "sem_init",
                    name: name.to_string(),
                    source: errno_of(&err),
                });
            }
        }

        Ok(Self {
            name: name.to_string(),
            ptr,
            map_size,
            data_size,
            front_sem,
            read_only: false,
            owner: true,
        })
    }

    /// Open an existing region.
    ///
    /// `data_size == 0` means "take the size from the region's metadata"; an
    /// explicit size maps exactly that much (plus the front-semaphore
    /// reservation, when requested). Opening retries read-only when
    /// read-write is refused and no front semaphore was requested.
    pub fn open(name: &str, data_size: usize, front_sem: bool) -> Result<Self, ShmError> {
        validate_name(name)?;

        let mut read_only = false;
        let fd = match shm::open(name, shm::OFlags::RDWR, Mode::empty()) {
            Ok(fd) => fd,
            Err(source) if source == Errno::ACCESS && !front_sem => {
                read_only = true;
                shm::open(name, shm::OFlags::RDONLY, Mode::empty()).map_err(|source| {
                    ShmError::Unavailable {
                        name: name.to_string(),
                        source,
                    }
                })?
            }
            Err(source) => {
                return Err(ShmError::Unavailable {
                    name: name.to_string(),
                    source,
                })
            }
        };

        let reserved = if front_sem { FRONT_SEM_SIZE } else { 0 };
        let map_size = if data_size == 0 {
            let stat = fstat(&fd).map_err(|source| ShmError::System {
                op: "fstat",
                name: name.to_string(),
                source,
            })?;
            let size = usize::try_from(stat.st_size)
                .map_err(|_| ShmError::InvalidArgument("region size out of range"))?;
            if size == 0 || size < reserved {
                return Err(ShmError::InvalidArgument(
                    "region too small for the requested layout",
                ));
            }
            size
        } else {
            data_size + reserved
        };

        let prot = if read_only {
            ProtFlags::READ
        } else {
            ProtFlags::READ | ProtFlags::WRITE
        };
        let ptr = unsafe { mmap(null_mut(), map_size, prot, MapFlags::SHARED, &fd, 0) }.map_err(
            |source| ShmError::System {
                op: "mmap",
                name: name.to_string(),
                source,
            },
        )?;
        let ptr = NonNull::new(ptr.cast::<u8>()).expect("mmap success returns non-null");

        Ok(Self {
            name: name.to_string(),
            ptr,
            map_size,
            data_size: map_size - reserved,
            front_sem,
            read_only,
            owner: false,
        })
    }

    /// Region name, as passed to `shm_open`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Usable bytes after the optional front-semaphore reservation.
    #[must_use]
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    /// Start of the usable data, past the front-semaphore reservation.
    #[must_use]
    pub fn data(&self) -> NonNull<u8> {
        let offset = if self.front_sem { FRONT_SEM_SIZE } else { 0 };
        // Within the mapping by construction.
        unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(offset)) }
    }

    /// Whether the mapping fell back to read-only on open.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// The front semaphore, when the region carries one.
    #[must_use]
    pub fn front_sem(&self) -> Option<&SharedSemaphore> {
        if self.front_sem {
            Some(unsafe { &*self.ptr.as_ptr().cast::<SharedSemaphore>() })
        } else {
            None
        }
    }

    /// Unmap without unlinking the name. The non-creating processes' exit
    /// path.
    pub fn close(mut self) -> Result<(), ShmError> {
        self.owner = false;
        self.unmap()
    }

    /// Full teardown: destroy the front semaphore, unmap, and unlink the
    /// name. The creator's exit path.
    pub fn destroy(mut self) -> Result<(), ShmError> {
        if self.front_sem {
            unsafe {
                SharedSemaphore::destroy(self.ptr.as_ptr().cast::<SharedSemaphore>());
            }
        }
        self.owner = false;
        let unmap = self.unmap();
        shm::unlink(self.name.as_str()).map_err(|source| ShmError::System {
            op: "shm_unlink",
            name: self.name.clone(),
            source,
        })?;
        unmap
    }

    fn unmap(&mut self) -> Result<(), ShmError> {
        if self.map_size == 0 {
            return Ok(());
        }
        let result = unsafe { munmap(self.ptr.as_ptr().cast(), self.map_size) };
        self.map_size = 0;
        result.map_err(|source| ShmError::System {
            op: "munmap",
            name: self.name.clone(),
            source,
        })
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        let _ = self.unmap();
        // The creator unlinks even on abnormal exits so the next run starts
        // clean.
        if self.owner {
            let _ = shm::unlink(self.name.as_str());
        }
    }
}

fn validate_name(name: &str) -> Result<(), ShmError> {
    if !name.starts_with('/') || name.len() < 2 || name[1..].contains('/') {
        return Err(ShmError::InvalidArgument(
            "region name must be `/name` with no further slashes",
        ));
    }
    Ok(())
}

fn errno_of(err: &crate::ipc::SemError) -> Errno {
    let crate::ipc::SemError::System { source, .. } = err;
    source
        .raw_os_error()
        .map_or(Errno::IO, Errno::from_raw_os_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("/chompchamps-test-{}-{}", tag, std::process::id())
    }

    fn rw_mode() -> Mode {
        Mode::RUSR | Mode::WUSR
    }

    #[test]
    fn test_create_write_reopen_read() {
        let name = unique_name("rw");
        let region = SharedRegion::create(&name, 64, rw_mode(), false, 0).unwrap();
        assert_eq!(region.data_size(), 64);
        unsafe {
            region.data().as_ptr().write(0xAB);
            region.data().as_ptr().add(63).write(0xCD);
        }

        let other = SharedRegion::open(&name, 64, false).unwrap();
        unsafe {
            assert_eq!(other.data().as_ptr().read(), 0xAB);
            assert_eq!(other.data().as_ptr().add(63).read(), 0xCD);
        }
        other.close().unwrap();
        region.destroy().unwrap();
    }

    #[test]
    fn test_open_infers_size_from_metadata() {
        let name = unique_name("infer");
        let region = SharedRegion::create(&name, 128, rw_mode(), false, 0).unwrap();
        let other = SharedRegion::open(&name, 0, false).unwrap();
        assert_eq!(other.data_size(), 128);
        other.close().unwrap();
        region.destroy().unwrap();
    }

    #[test]
    fn test_front_sem_reserves_leading_bytes() {
        let name = unique_name("frontsem");
        let region = SharedRegion::create(&name, 32, rw_mode(), true, 1).unwrap();
        assert_eq!(region.data_size(), 32);
        let sem = region.front_sem().expect("front semaphore present");
        assert!(sem
            .wait_timeout(std::time::Duration::from_millis(10))
            .unwrap());
        // The data pointer sits after the reservation.
        let gap = region.data().as_ptr() as usize
            - region.front_sem().unwrap() as *const _ as usize;
        assert_eq!(gap, super::FRONT_SEM_SIZE);
        region.destroy().unwrap();
    }

    #[test]
    fn test_zero_data_size_create_rejected() {
        let name = unique_name("zero");
        let err = SharedRegion::create(&name, 0, rw_mode(), false, 0).unwrap_err();
        assert!(matches!(err, ShmError::InvalidArgument(_)));
    }

    #[test]
    fn test_bad_name_rejected() {
        assert!(matches!(
            SharedRegion::create("noslash", 16, rw_mode(), false, 0),
            Err(ShmError::InvalidArgument(_))
        ));
        assert!(matches!(
            SharedRegion::open("/nested/name", 0, false),
            Err(ShmError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_open_missing_region_unavailable() {
        let err = SharedRegion::open(&unique_name("missing"), 0, false).unwrap_err();
        assert!(matches!(err, ShmError::Unavailable { .. }));
    }

    #[test]
    fn test_destroy_unlinks_name() {
        let name = unique_name("unlink");
        let region = SharedRegion::create(&name, 16, rw_mode(), false, 0).unwrap();
        region.destroy().unwrap();
        assert!(matches!(
            SharedRegion::open(&name, 0, false),
            Err(ShmError::Unavailable { .. })
        ));
    }
}
