//! rkflasher-core - Parsing and lookup support for rkdeveloptool
//!
//! `rkdeveloptool` does all the real work of talking to a Rockchip device in
//! maskrom or loader mode. What it gives back is human-readable text whose
//! exact shape depends on the tool version. This crate turns that text into
//! typed records:
//!
//! - [`device`] - `ld` device lists and the maskrom/loader mode
//! - [`chip`] - `rci` chip identification and the chip database
//! - [`capability`] - `rcb` capability blocks
//! - [`flash_info`] - `rfi` flash info and `rid` flash IDs
//! - [`partition`] - `ppt` partition tables and parameter files
//! - [`storage`] - `cs` storage media
//! - [`progress`] - `NN%` progress tokens
//!
//! [`backend`] defines the [`Request`](backend::Request) enum and the
//! [`Backend`](backend::Backend) trait the tool and dummy crates implement.
//!
//! Parsers never fail. They return a [`ParseOutcome`] so callers can tell a
//! field that was simply not emitted apart from output nobody recognised.
//!
//! # Example
//!
//! ```ignore
//! use rkflasher_core::partition::PartitionTable;
//!
//! let table = PartitionTable::from_ppt(&ppt_output);
//! for part in table.iter() {
//!     println!("{} {} {}", part.name, part.address(), part.size_display());
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod backend;
pub mod capability;
pub mod chip;
pub mod device;
pub mod error;
pub mod flash_info;
pub mod hash;
pub mod i18n;
pub mod outcome;
pub mod partition;
pub mod progress;
pub mod storage;
pub mod units;

pub use error::{Error, Result};
pub use outcome::ParseOutcome;
