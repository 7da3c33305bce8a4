//! Numbered rendezvous points for coordinating forked (and exec'd)
//! processes through a shared futex-backed memory segment.

pub mod checkpoint;
pub mod error;
pub mod futex;
pub mod region;

use std::path::PathBuf;
use std::time::Duration;

use derive_builder::Builder;

pub use checkpoint::Op;
pub use error::{Error, Result};
pub use region::{CheckpointRegion, IPC_ENV_VAR};

/// Number of checkpoint slots a region holds unless overridden.
pub const DEFAULT_NR_SLOTS: u32 = 510;

/// Bound applied to wait/wake calls that pass no explicit timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Builder)]
#[builder(default, pattern = "owned")]
pub struct RegionOptions {
    /// Number of numbered checkpoint slots in the region.
    pub nr_slots: u32,

    /// Bound for wait/wake calls that do not carry their own timeout.
    pub default_timeout: Duration,

    /// Directory the shared segment file is placed in. When unset,
    /// `/dev/shm` if present, the system temp directory otherwise.
    pub base_dir: Option<PathBuf>,

    /// Name component of the shared segment file.
    pub tag: String,
}

impl Default for RegionOptions {
    fn default() -> Self {
        Self {
            nr_slots: DEFAULT_NR_SLOTS,
            default_timeout: DEFAULT_TIMEOUT,
            base_dir: None,
            tag: "syncpoint".to_string(),
        }
    }
}
