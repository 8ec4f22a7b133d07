//! Partition tables
//!
//! Tables come from two places: the `ppt` command, which prints the table the
//! device currently holds, and Rockchip `parameter.txt` files, whose
//! `mtdparts=` argument defines one. Both produce a [`PartitionTable`]
//! sorted by start sector.

mod export;
mod parameter;
mod ppt;
mod types;

pub use parameter::{parse_mtdparts, ParameterFile, DEFAULT_MTD_DEVICE};
pub use ppt::parse_ppt;
pub use types::{Partition, PartitionSource, PartitionTable};
