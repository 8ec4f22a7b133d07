//! rkflasher-tool - Running rkdeveloptool and the flows built on it
//!
//! This crate sits between the CLI and the [`Backend`] trait from
//! `rkflasher-core`:
//!
//! ```text
//!  CLI (bin/rkflasher)
//!        │
//!        ▼
//!  Session ── CommandRunner ── Backend ──┬── RkDevelopTool (child process)
//!     │                                  └── DummyTool (emulated device)
//!     ├── DevicePoller        (ld + rci every 2 s, own thread)
//!     ├── PartitionRefresher  (ppt, single-slot mailbox, own thread)
//!     └── burn / upgrade / backup / verify / Batch
//! ```
//!
//! Only one user command runs at a time per [`CommandRunner`]. The poller,
//! the refresher and batch workers talk to the backend directly.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rkflasher_core::chip::ChipDatabase;
//! use rkflasher_core::i18n::Lang;
//! use rkflasher_tool::{open_backend, Session};
//!
//! let backend = open_backend("rkdeveloptool", None)?;
//! let mut session = Session::new(backend, Arc::new(ChipDatabase::builtin()), Lang::En);
//! if session.detect().is_some() {
//!     for part in session.refresh_partitions()?.iter() {
//!         println!("{}", part);
//!     }
//! }
//! ```

#![warn(missing_docs)]

pub mod backup;
pub mod batch;
pub mod burn;
mod error;
pub mod poller;
pub mod process;
pub mod refresh;
pub mod registry;
pub mod runner;
pub mod session;
pub mod verify;

pub use error::{Result, ToolError};
pub use registry::{available_backends, open_backend, parse_backend_params, BackendInfo};
pub use rkflasher_core::backend::{Backend, CancelToken, Request};
pub use runner::{CommandRunner, LogObserver, NullObserver, RunObserver, RunReport};
pub use session::Session;
