//! Chip database types

use std::fmt;

/// One known SoC
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChipEntry {
    /// Chip name ("RK3588")
    pub name: String,
    /// Family label shown next to the name
    #[serde(default)]
    pub family: Option<String>,
    /// USB product IDs the boot ROM / loader enumerates with
    #[serde(default)]
    pub usb_pids: Vec<u16>,
    /// Hex IDs some tool versions print in `rci` output ("0x3588")
    #[serde(default)]
    pub legacy_ids: Vec<String>,
    /// ASCII digit signatures decoded from the `rci` byte dump ("8853")
    #[serde(default)]
    pub signatures: Vec<String>,
}

impl ChipEntry {
    pub(crate) fn builtin(
        name: &str,
        family: &str,
        usb_pids: &[u16],
        legacy_ids: &[&str],
        signatures: &[&str],
    ) -> Self {
        Self {
            name: name.to_string(),
            family: Some(family.to_string()),
            usb_pids: usb_pids.to_vec(),
            legacy_ids: legacy_ids.iter().map(|s| s.to_string()).collect(),
            signatures: signatures.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// How a chip was identified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentSource {
    /// Matched an explicit hex ID in `rci` output
    LegacyId(String),
    /// The chip name appeared literally in the output
    Name,
    /// Matched a decoded byte signature
    Signature(String),
    /// Signature not in the table; name derived from the digits
    Derived(String),
    /// Matched the USB product ID from `ld`
    UsbPid(u16),
}

/// Result of identifying a chip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipIdentity {
    /// Chip name ("RK3588")
    pub name: String,
    /// Family label, when known
    pub family: Option<String>,
    /// What the identification was based on
    pub source: IdentSource,
}

impl ChipIdentity {
    pub(crate) fn from_entry(entry: &ChipEntry, source: IdentSource) -> Self {
        Self {
            name: entry.name.clone(),
            family: entry.family.clone(),
            source,
        }
    }

    /// Label with the evidence in parentheses ("RK3588 (0x3588)")
    pub fn label(&self) -> String {
        match &self.source {
            IdentSource::LegacyId(id) => format!("{} ({})", self.name, id),
            IdentSource::Name => match &self.family {
                Some(family) => format!("{} ({})", family, self.name),
                None => self.name.clone(),
            },
            IdentSource::Signature(_) | IdentSource::Derived(_) => self.name.clone(),
            IdentSource::UsbPid(pid) => format!("{} (PID 0x{:04x})", self.name, pid),
        }
    }
}

impl fmt::Display for ChipIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
