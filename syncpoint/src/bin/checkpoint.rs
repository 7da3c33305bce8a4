use std::time::Duration;

use clap::{Parser, Subcommand};
use log::error;

use syncpoint::CheckpointRegion;

/// Shell-facing access to a checkpoint region inherited through
/// SYNCPOINT_IPC_PATH.
#[derive(Parser, Debug)]
#[command(version, about)]
struct CliArgs {
    #[command(subcommand)]
    command: CheckpointCommand,
}

#[derive(Subcommand, Debug)]
enum CheckpointCommand {
    /// Block until the checkpoint is signaled.
    Wait {
        /// Checkpoint id to wait on.
        id: u32,

        /// Timeout in milliseconds (0 = region default).
        #[arg(long, default_value_t = 0)]
        timeout_ms: u64,
    },

    /// Release waiters blocked on a checkpoint.
    Wake {
        /// Checkpoint id to signal.
        id: u32,

        /// Number of waiters to release.
        #[arg(long, default_value_t = 1)]
        nr_wake: u32,

        /// Timeout in milliseconds (0 = region default).
        #[arg(long, default_value_t = 0)]
        timeout_ms: u64,
    },

    /// Signal the checkpoint, then block on it (two-way handshake).
    WakeAndWait {
        /// Checkpoint id.
        id: u32,
    },
}

fn timeout_from_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn run(args: CliArgs) -> syncpoint::Result<()> {
    let region = CheckpointRegion::reinit()?;

    match args.command {
        CheckpointCommand::Wait { id, timeout_ms } => region.wait(id, timeout_from_ms(timeout_ms)),
        CheckpointCommand::Wake {
            id,
            nr_wake,
            timeout_ms,
        } => region.wake(id, nr_wake, timeout_from_ms(timeout_ms)),
        CheckpointCommand::WakeAndWait { id } => region.wake_and_wait(id),
    }
}

fn main() {
    pretty_env_logger::formatted_builder()
        .parse_default_env()
        .init();

    let args = CliArgs::parse();

    if let Err(e) = run(args) {
        error!("{e}");
        std::process::exit(1);
    }
}
