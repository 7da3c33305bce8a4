use std::time::Duration;

use crate::checkpoint::Op;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid checkpoint id {id} (region holds {max} slots)")]
    InvalidCheckpoint { id: u32, max: u32 },

    #[error("{op} on checkpoint {id} timed out after {bound:?}")]
    Timeout { op: Op, id: u32, bound: Duration },

    #[error("cannot reattach checkpoint region: {0}")]
    Reattach(String),

    #[error("nix error: `{errno}`")]
    Nix {
        #[from]
        errno: nix::errno::Errno,
    },

    #[error("std::io error: `{0}`")]
    StdIO(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the failure is a bounded wait expiring, as opposed to a
    /// caller defect or an OS-level fault.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}
