//! `rcb` (read capability) output parsing
//!
//! rkdeveloptool prints the raw capability bytes followed by one line per
//! enabled feature:
//!
//! ```text
//! Capability:0D 01 00 00 00 00 00 00
//! Direct LBA
//! First 4m Access
//! Read LBA
//! New IDB
//! ```

use bitflags::bitflags;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::outcome::ParseOutcome;

static BYTE_DUMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Capability[ \t]*:[ \t]*((?:[0-9a-f]{1,2}[ \t]*)+)").unwrap()
});

bitflags! {
    /// Loader capabilities reported by `rcb`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capability: u16 {
        /// Direct LBA addressing
        const DIRECT_LBA = 1 << 0;
        /// Vendor storage access
        const VENDOR_STORAGE = 1 << 1;
        /// First 4 MiB of flash accessible
        const FIRST_4M_ACCESS = 1 << 2;
        /// LBA reads supported
        const READ_LBA = 1 << 3;
        /// Communication log readable
        const READ_COM_LOG = 1 << 5;
        /// IDB configuration readable
        const READ_IDB_CONFIG = 1 << 6;
        /// Secure mode readable
        const READ_SECURE_MODE = 1 << 7;
        /// New IDB layout
        const NEW_IDB = 1 << 8;
    }
}

/// Display names as printed by rkdeveloptool
const NAMES: &[(&str, Capability)] = &[
    ("Direct LBA", Capability::DIRECT_LBA),
    ("Vendor Storage", Capability::VENDOR_STORAGE),
    ("First 4m Access", Capability::FIRST_4M_ACCESS),
    ("Read LBA", Capability::READ_LBA),
    ("Read Com Log", Capability::READ_COM_LOG),
    ("Read IDB Config", Capability::READ_IDB_CONFIG),
    ("Read Secure Mode", Capability::READ_SECURE_MODE),
    ("New IDB", Capability::NEW_IDB),
];

impl Capability {
    /// Build flags from the first two raw capability bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let low = bytes.first().copied().unwrap_or(0) as u16;
        let high = bytes.get(1).copied().unwrap_or(0) as u16;
        Self::from_bits_truncate(low | (high << 8))
    }

    /// Names of the enabled capabilities, in rkdeveloptool's order
    pub fn names(self) -> Vec<&'static str> {
        NAMES
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect()
    }
}

/// Parsed `rcb` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityReport {
    /// Raw bytes, when the dump line was present
    pub raw: Vec<u8>,
    /// Decoded flags
    pub flags: Capability,
}

/// Parse `rcb` output
pub fn parse_rcb(text: &str) -> ParseOutcome<CapabilityReport> {
    if let Some(caps) = BYTE_DUMP.captures(text) {
        let raw: Vec<u8> = caps[1]
            .split_whitespace()
            .filter_map(|t| u8::from_str_radix(t, 16).ok())
            .collect();
        if !raw.is_empty() {
            let flags = Capability::from_bytes(&raw);
            return ParseOutcome::Recognized(CapabilityReport { raw, flags });
        }
    }

    let mut flags = Capability::empty();
    for line in text.lines().map(str::trim) {
        for (name, flag) in NAMES {
            if line.eq_ignore_ascii_case(name) {
                flags |= *flag;
            }
        }
    }

    if flags.is_empty() {
        ParseOutcome::unrecognized(text)
    } else {
        ParseOutcome::Recognized(CapabilityReport {
            raw: Vec::new(),
            flags,
        })
    }
}
