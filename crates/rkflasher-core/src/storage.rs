//! Storage media selectable with `cs`

use std::fmt;

/// Responses to `cs <code>` that mean the medium is not usable
const FAILURE_SENTINELS: &[&str] = &["not available", "not support", "failed", "fail"];

/// A storage medium the loader can switch to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageType {
    /// Code passed to `cs`
    pub code: u8,
    /// Short name ("EMMC")
    pub name: &'static str,
    /// Longer description
    pub description: &'static str,
}

/// Media offered when nothing better is known
pub const DEFAULT_STORAGE: &[StorageType] = &[
    StorageType {
        code: 1,
        name: "EMMC",
        description: "eMMC flash",
    },
    StorageType {
        code: 2,
        name: "SD",
        description: "SD card",
    },
    StorageType {
        code: 9,
        name: "SPINOR",
        description: "SPI NOR flash",
    },
];

impl StorageType {
    /// Look up a default medium by `cs` code
    pub fn from_code(code: u8) -> Option<Self> {
        DEFAULT_STORAGE.iter().copied().find(|s| s.code == code)
    }

    /// Look up a default medium by name (case-insensitive) or numeric code
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        DEFAULT_STORAGE
            .iter()
            .copied()
            .find(|st| st.name.eq_ignore_ascii_case(s))
            .or_else(|| s.parse().ok().and_then(Self::from_code))
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.code)
    }
}

/// Whether a `cs` response reports the medium as supported
pub fn storage_supported(response: &str) -> bool {
    let lower = response.to_ascii_lowercase();
    !FAILURE_SENTINELS.iter().any(|s| lower.contains(s))
}
