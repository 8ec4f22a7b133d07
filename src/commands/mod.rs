//! CLI command implementations
//!
//! Device commands take the [`Session`] built in `main`, run their requests
//! through it and print the result. Offline commands (`md5`, `parameter`,
//! `list-chips`, `list-backends`) never touch the backend.

mod confirm;
mod device;
mod list;
mod mass;
mod partition;
mod progress;
mod storage;
mod transfer;

pub use device::{capability, chip, flash_id, flash_info, info, run_request};
pub use list::{list_backends, list_chips, list_devices, watch};
pub use mass::{mass_run, mass_scan};
pub use partition::{parameter, partitions};
pub use storage::{storage_list, storage_set};
pub use transfer::{backup, backup_partition, burn, md5, merge_burn_options, read, upgrade, verify};

use rkflasher_core::backend::Request;
use rkflasher_core::partition::PartitionTable;
use rkflasher_tool::{Session, ToolError};

/// Result type shared by all commands
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Run a short query and return its output, failing on a non-zero exit
fn query(session: &Session, request: &Request) -> rkflasher_tool::Result<String> {
    let out = session
        .runner()
        .capture(request, Some(session.query_timeout()))?;
    if out.success() {
        Ok(out.text)
    } else {
        Err(ToolError::CommandFailed {
            code: out.exit_code,
            output: out.text,
        })
    }
}

/// Print a partition table as aligned columns
fn print_partitions(table: &PartitionTable) {
    println!("Partition table ({}):", table.source);
    println!("{:<20} {:>12} {:>12}", "Name", "Start", "Size");
    println!("{}", "-".repeat(46));
    for part in table.iter() {
        println!(
            "{:<20} {:>12} {:>12}",
            part.name,
            part.address(),
            part.size_display()
        );
    }
}
