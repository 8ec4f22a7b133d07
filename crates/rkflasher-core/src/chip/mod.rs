//! Rockchip SoC identification
//!
//! A chip can be recognised three ways:
//!
//! - the USB product ID in `ld` output (`Pid=0x350b`)
//! - an explicit hex ID or chip name in `rci` output
//! - the `rci` byte dump, which spells the chip number in ASCII, byte-reversed
//!   (`Chip Info: 38 38 35 33 ...` is "8853", i.e. RK3588). Signatures the
//!   table does not know are reported as "RK" followed by the digits as read.
//!
//! The built-in table can be extended with RON files:
//!
//! ```ron
//! [
//!     (name: "RK3506", usb_pids: [0x350d], signatures: ["6053"]),
//! ]
//! ```

mod database;
mod types;

pub use database::{decode_signature, ChipDatabase};
pub use types::{ChipEntry, ChipIdentity, IdentSource};
