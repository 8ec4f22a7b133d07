//! Backend abstraction
//!
//! Every device operation is a [`Request`] handed to a [`Backend`]. The
//! process backend in `rkflasher-tool` runs the real rkdeveloptool binary;
//! `rkflasher-dummy` answers from an emulated device.

mod request;
mod traits;

pub use request::Request;
pub use traits::{capture_via_stream, Backend, BackendError, CancelToken, Output};
