//! `ld` (list devices) output parsing
//!
//! Current rkdeveloptool prints one line per device:
//!
//! ```text
//! DevNo=1	Vid=0x2207,Pid=0x350b,LocationID=104	Maskrom
//! ```
//!
//! Older builds print free text, and "no device" is reported as a line of
//! text too (`Did not find any rockusb device, please plug device in!`).
//! Every non-empty, non-sentinel line counts as a device; the key/value
//! fields are filled in when present.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Lines containing any of these (case-insensitive) mean "no device"
const NOT_FOUND_SENTINELS: &[&str] = &[
    "did not find any rockusb device",
    "not found",
    "no devices",
    "no device found",
];

/// Header printed by some versions before the device lines
const LIST_HEADER: &str = "list of rockusb connected";

static DEV_NO: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)DevNo\s*=\s*(\d+)").unwrap());
static VID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Vid\s*=\s*(?:0x)?([0-9a-f]{1,4})").unwrap());
static PID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Pid\s*=\s*(?:0x)?([0-9a-f]{1,4})").unwrap());
static LOCATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)LocationID\s*=\s*([0-9a-fx]+)").unwrap());

/// Rockchip USB vendor ID
pub const ROCKCHIP_VID: u16 = 0x2207;

/// Device mode as reported by `ld`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceMode {
    /// Boot ROM recovery mode; only `db` and a few queries work
    Maskrom,
    /// Loader running; flash read/write accepted
    Loader,
    /// USB mass storage mode
    Msc,
    /// Device present but mode not reported
    #[default]
    Unknown,
}

impl DeviceMode {
    /// Detect the mode from a chunk of text
    pub fn detect(text: &str) -> Self {
        let upper = text.to_ascii_uppercase();
        if upper.contains("MASKROM") {
            Self::Maskrom
        } else if upper.contains("LOADER") {
            Self::Loader
        } else if upper.contains("MSC") {
            Self::Msc
        } else {
            Self::Unknown
        }
    }

    /// Translation key for this mode's status line
    pub fn status_key(self) -> &'static str {
        match self {
            Self::Maskrom => "connected_maskrom",
            Self::Loader => "connected_loader",
            Self::Msc => "connected_msc",
            Self::Unknown => "connected_unknown_mode",
        }
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Maskrom => write!(f, "Maskrom"),
            Self::Loader => write!(f, "Loader"),
            Self::Msc => write!(f, "MSC"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One device line from `ld`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    /// The line as printed (trimmed)
    pub raw: String,
    /// `DevNo=` value
    pub dev_no: Option<u32>,
    /// USB vendor ID
    pub vid: Option<u16>,
    /// USB product ID
    pub pid: Option<u16>,
    /// `LocationID=` value as printed
    pub location_id: Option<String>,
    /// Mode word on the line
    pub mode: DeviceMode,
}

impl DeviceEntry {
    /// Parse one device line
    pub fn parse(line: &str) -> Self {
        let raw = line.trim().to_string();
        let hex16 = |re: &Regex| {
            re.captures(&raw)
                .and_then(|c| u16::from_str_radix(&c[1], 16).ok())
        };
        Self {
            dev_no: DEV_NO.captures(&raw).and_then(|c| c[1].parse().ok()),
            vid: hex16(&VID),
            pid: hex16(&PID),
            location_id: LOCATION.captures(&raw).map(|c| c[1].to_string()),
            mode: DeviceMode::detect(&raw),
            raw,
        }
    }

    /// Short label for logs ("#1 2207:350b @104" or the raw line)
    pub fn label(&self) -> String {
        match (self.dev_no, self.vid, self.pid) {
            (Some(no), Some(vid), Some(pid)) => {
                let mut label = format!("#{} {:04x}:{:04x}", no, vid, pid);
                if let Some(loc) = &self.location_id {
                    label.push_str(" @");
                    label.push_str(loc);
                }
                label
            }
            _ => self.raw.clone(),
        }
    }
}

/// Parsed `ld` output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceList {
    /// Devices in the order printed
    pub devices: Vec<DeviceEntry>,
    /// Overall mode for the whole output
    pub mode: DeviceMode,
}

impl DeviceList {
    /// Whether no device was listed
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Number of devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// First device, which the single-device commands act on
    pub fn first(&self) -> Option<&DeviceEntry> {
        self.devices.first()
    }
}

/// Whether a line is a "no device" sentinel
fn is_sentinel(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    NOT_FOUND_SENTINELS.iter().any(|s| lower.contains(s)) || lower.starts_with(LIST_HEADER)
}

/// Parse `ld` output into a device list. Never fails; an empty list means
/// no device.
pub fn parse_ld(text: &str) -> DeviceList {
    let devices: Vec<DeviceEntry> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_sentinel(line))
        .map(DeviceEntry::parse)
        .collect();

    let mode = if devices.is_empty() {
        DeviceMode::Unknown
    } else {
        DeviceMode::detect(text)
    };

    DeviceList { devices, mode }
}
