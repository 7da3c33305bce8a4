use std::ffi::c_void;
use std::fs::{self, File, OpenOptions};
use std::num::NonZeroUsize;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::mman::{mmap, msync, munmap, MapFlags, MsFlags, ProtFlags};
use nix::unistd::{getpid, sysconf, Pid, SysconfVar};

use crate::checkpoint::{Slot, SLOT_SIZE};
use crate::error::{Error, Result};
use crate::RegionOptions;

/// Environment variable naming the shared segment, for processes that reach
/// their current image via `exec()` and need to reattach.
pub const IPC_ENV_VAR: &str = "SYNCPOINT_IPC_PATH";

const REGION_MAGIC: u32 = 0x636b_7074;

/// Distinguishes concurrently-created regions within one process.
static REGION_SEQ: AtomicU32 = AtomicU32::new(0);

/// Lives at the base of the mapping, ahead of the slot array. `reinit`
/// validates it before handing out slots.
#[repr(C)]
struct RegionHeader {
    magic: u32,
    nr_slots: u32,
    default_timeout_ms: u32,
    _reserved: u32,
}

const HEADER_SIZE: usize = std::mem::size_of::<RegionHeader>();

/// A process-shared array of numbered checkpoint slots.
///
/// The creating process owns the backing file and unlinks it on drop.
/// Forked children inherit the mapping automatically; a process that
/// replaced its image via `exec()` reattaches with [`CheckpointRegion::reinit`].
/// Either way the resulting handle is a non-owning view: dropping it unmaps
/// this process's view but leaves the segment alive for everyone else.
pub struct CheckpointRegion {
    map: NonNull<c_void>,
    len: usize,
    nr_slots: u32,
    default_timeout: Duration,
    path: PathBuf,
    owner: Option<Pid>,
}

// The mapping is shared memory mutated exclusively through the per-slot
// atomics; the struct itself holds no thread-affine state.
unsafe impl Send for CheckpointRegion {}
unsafe impl Sync for CheckpointRegion {}

impl CheckpointRegion {
    /// Allocate the shared segment and become its owner.
    ///
    /// Must happen before any cooperating process is forked so they all
    /// inherit the mapping.
    pub fn create(options: RegionOptions) -> Result<Self> {
        let dir = match &options.base_dir {
            Some(dir) => dir.clone(),
            None => {
                let shm = PathBuf::from("/dev/shm");
                if shm.is_dir() {
                    shm
                } else {
                    std::env::temp_dir()
                }
            }
        };

        let path = dir.join(format!(
            "{}_{}_{}",
            options.tag,
            getpid(),
            REGION_SEQ.fetch_add(1, Ordering::Relaxed)
        ));

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)?;

        let len = region_len(options.nr_slots)?;
        file.set_len(len as u64)?;

        let map = map_shared(&file, len)?;

        let header = map.as_ptr() as *mut RegionHeader;
        unsafe {
            (*header).magic = REGION_MAGIC;
            (*header).nr_slots = options.nr_slots;
            (*header).default_timeout_ms =
                options.default_timeout.as_millis().min(u32::MAX as u128) as u32;
        }

        debug!(
            "created checkpoint region at {} with {} slots",
            path.display(),
            options.nr_slots
        );

        Ok(Self {
            map,
            len,
            nr_slots: options.nr_slots,
            default_timeout: options.default_timeout,
            path,
            owner: Some(getpid()),
        })
    }

    /// Map an existing segment created by another process.
    pub fn attach(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| Error::Reattach(format!("cannot open {}: {e}", path.display())))?;

        let len = file
            .metadata()
            .map_err(|e| Error::Reattach(format!("cannot stat {}: {e}", path.display())))?
            .len() as usize;

        if len < HEADER_SIZE {
            return Err(Error::Reattach(format!(
                "{} is too small ({len} bytes) to hold a checkpoint region",
                path.display()
            )));
        }

        let map = map_shared(&file, len)?;

        let header = unsafe { &*(map.as_ptr() as *const RegionHeader) };
        let (magic, nr_slots, default_timeout_ms) =
            (header.magic, header.nr_slots, header.default_timeout_ms);

        // Constructed before validation so the mapping is released through
        // Drop on the error paths.
        let region = Self {
            map,
            len,
            nr_slots,
            default_timeout: Duration::from_millis(default_timeout_ms as u64),
            path: path.to_path_buf(),
            owner: None,
        };

        if magic != REGION_MAGIC {
            return Err(Error::Reattach(format!(
                "{} is not a checkpoint region (bad magic {magic:#x})",
                path.display()
            )));
        }

        if region_len(nr_slots)? != len {
            return Err(Error::Reattach(format!(
                "{} has {len} bytes, expected {} for {nr_slots} slots",
                path.display(),
                region_len(nr_slots)?,
            )));
        }

        debug!(
            "attached to checkpoint region at {} with {nr_slots} slots",
            path.display()
        );

        Ok(region)
    }

    /// Re-establish the mapping after `exec()` replaced the process image,
    /// locating the segment through [`IPC_ENV_VAR`].
    ///
    /// Must be called before any wait/wake in an exec'd process. Failure is
    /// a fatal configuration error for the caller: the region either was
    /// never exported or can no longer be confirmed.
    pub fn reinit() -> Result<Self> {
        let path = std::env::var_os(IPC_ENV_VAR)
            .ok_or_else(|| Error::Reattach(format!("{IPC_ENV_VAR} is not set")))?;

        Self::attach(Path::new(&path))
    }

    /// Block until checkpoint `id` is signaled. `None` applies the region's
    /// default bound.
    pub fn wait(&self, id: u32, timeout: Option<Duration>) -> Result<()> {
        self.slot(id)?
            .wait(id, timeout.unwrap_or(self.default_timeout))
    }

    /// Release `nr_wake` waiters blocked on checkpoint `id`, retrying until
    /// they have all consumed the signal or the bound elapses.
    pub fn wake(&self, id: u32, nr_wake: u32, timeout: Option<Duration>) -> Result<()> {
        self.slot(id)?
            .wake(id, nr_wake, timeout.unwrap_or(self.default_timeout))
    }

    /// Two-way handshake: signal checkpoint `id`, then block on it. The
    /// first failing step aborts the composition.
    pub fn wake_and_wait(&self, id: u32) -> Result<()> {
        self.wake(id, 1, None)?;
        self.wait(id, None)
    }

    fn slot(&self, id: u32) -> Result<&Slot> {
        if id >= self.nr_slots {
            return Err(Error::InvalidCheckpoint {
                id,
                max: self.nr_slots,
            });
        }

        let slots = unsafe { (self.map.as_ptr() as *const u8).add(HEADER_SIZE) as *const Slot };
        Ok(unsafe { &*slots.add(id as usize) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn nr_slots(&self) -> u32 {
        self.nr_slots
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Whether this handle tears the segment down on drop. False in forked
    /// children even though they hold the same struct.
    pub fn is_owner(&self) -> bool {
        self.owner == Some(getpid())
    }

    /// `KEY=value` entry for callers assembling an `execve` environment by
    /// hand.
    pub fn env_entry(&self) -> String {
        format!("{}={}", IPC_ENV_VAR, self.path.display())
    }

    /// Export the segment path into this process's environment so exec'd
    /// children can reattach.
    pub fn export_env(&self) {
        std::env::set_var(IPC_ENV_VAR, &self.path);
    }
}

impl Drop for CheckpointRegion {
    fn drop(&mut self) {
        if self.is_owner() {
            if let Err(errno) = unsafe { msync(self.map, self.len, MsFlags::MS_SYNC) } {
                warn!("msync of checkpoint region failed: {errno}");
            }

            if let Err(e) = fs::remove_file(&self.path) {
                warn!("unlink of {} failed: {e}", self.path.display());
            }

            debug!("checkpoint region at {} torn down", self.path.display());
        }

        if let Err(errno) = unsafe { munmap(self.map, self.len) } {
            warn!("munmap of checkpoint region failed: {errno}");
        }
    }
}

/// Slot array rounded up to whole pages, matching what `create` truncates
/// the backing file to.
fn region_len(nr_slots: u32) -> Result<usize> {
    let page = sysconf(SysconfVar::PAGE_SIZE)?.unwrap_or(4096) as usize;
    let raw = HEADER_SIZE + nr_slots as usize * SLOT_SIZE;

    Ok(raw.div_ceil(page) * page)
}

fn map_shared(file: &File, len: usize) -> Result<NonNull<c_void>> {
    let len = NonZeroUsize::new(len).ok_or(Error::Nix {
        errno: Errno::EINVAL,
    })?;

    let map = unsafe {
        mmap(
            None,
            len,
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
            MapFlags::MAP_SHARED,
            file,
            0,
        )
    }?;

    Ok(map)
}
