//! `rfi` (flash info) and `rid` (flash ID) output parsing
//!
//! Typical `rfi` output:
//!
//! ```text
//! Flash Info:
//! 	Manufacturer: SAMSUNG, value=00
//! 	Flash Size: 7456 MB
//! 	Flash Size: 15269888 Sectors
//! 	Block Size: 512 KB
//! 	Page Size: 2 KB
//! 	ECC Bits: 0
//! 	Access Time: 40
//! 	Flash CS: Flash<0>
//! ```
//!
//! and `rid` output is a short byte dump such as `Flash ID: C8 40 18`.
//! Every field is optional: it is set only when its pattern matched.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use crate::outcome::ParseOutcome;
use crate::units::{self, format_capacity, SECTOR_SIZE};

static MANUFACTURER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*Manufacturer\s*:\s*([^,\r\n]+)").unwrap());
static CAPACITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:Flash\s*Size|Capacity)\s*:?\s*([0-9]+(?:\.[0-9]+)?)\s*([KMGT])(i?)B\b")
        .unwrap()
});
static SECTORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Flash\s*Size\s*:\s*([0-9]+)\s*Sectors").unwrap());
static BLOCK_SIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Block\s*Size\s*:\s*([0-9]+)\s*([KMG]?)i?B\b").unwrap());
static PAGE_SIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Page\s*Size\s*:\s*([0-9]+)\s*([KMG]?)i?B\b").unwrap());
static ECC_BITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)ECC\s*Bits\s*:\s*([0-9]+)").unwrap());
static ACCESS_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Access\s*Time\s*:\s*([0-9]+)").unwrap());
static FLASH_CS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*Flash\s*CS\s*:\s*(.+?)\s*$").unwrap());
static FLASH_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)Flash\s*ID\s*:?[ \t]*((?:[0-9a-f]{2}(?:[ \t]+|$|\r))+)").unwrap()
});

/// JEDEC-style manufacturer codes (first ID byte)
const MANUFACTURERS: &[(u8, &str)] = &[
    (0x01, "Spansion"),
    (0x0B, "XTX"),
    (0x1C, "EON"),
    (0x20, "XMC"),
    (0x2C, "Micron"),
    (0x45, "SanDisk"),
    (0x5E, "Zbit"),
    (0x68, "Boya"),
    (0x85, "Puya"),
    (0x89, "Intel"),
    (0x98, "Toshiba"),
    (0xA1, "Fudan Micro"),
    (0xAD, "SK Hynix"),
    (0xC2, "Macronix"),
    (0xC8, "GigaDevice"),
    (0xEC, "Samsung"),
    (0xEF, "Winbond"),
];

/// Lowest and highest capacity codes (log2 of bytes) taken as plausible
const CAPACITY_CODES: core::ops::RangeInclusive<u8> = 0x10..=0x22;

/// Look up a manufacturer by its first ID byte
pub fn manufacturer_name(code: u8) -> Option<&'static str> {
    MANUFACTURERS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Parsed `rid` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashId {
    /// ID bytes in the order printed
    pub bytes: Vec<u8>,
}

impl FlashId {
    /// ID bytes as spaced uppercase hex ("C8 40 18")
    pub fn hex(&self) -> String {
        self.bytes
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The ID as text, when every byte is printable ASCII (eMMC reports "EMMC ")
    pub fn ascii(&self) -> Option<String> {
        if self.bytes.len() >= 4 && self.bytes.iter().all(|b| (0x20..=0x7e).contains(b)) {
            Some(String::from_utf8_lossy(&self.bytes).trim().to_string())
        } else {
            None
        }
    }

    /// Manufacturer guessed from the first byte
    pub fn manufacturer(&self) -> Option<String> {
        if self.ascii().is_some() {
            return None;
        }
        let code = *self.bytes.first()?;
        Some(
            manufacturer_name(code)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Unknown (0x{:02X})", code)),
        )
    }

    /// Capacity guessed from the third byte (log2 of the size in bytes)
    pub fn capacity(&self) -> Option<String> {
        if self.ascii().is_some() {
            return None;
        }
        let code = *self.bytes.get(2)?;
        CAPACITY_CODES
            .contains(&code)
            .then(|| format_capacity(1u64 << code))
    }
}

/// Parse `rid` output
pub fn parse_rid(text: &str) -> ParseOutcome<FlashId> {
    let bytes: Vec<u8> = match FLASH_ID.captures(text) {
        Some(caps) => caps[1]
            .split_whitespace()
            .filter_map(|t| u8::from_str_radix(t, 16).ok())
            .collect(),
        None => Vec::new(),
    };
    if bytes.is_empty() {
        ParseOutcome::unrecognized(text)
    } else {
        ParseOutcome::Recognized(FlashId { bytes })
    }
}

/// Best-effort flash description merged from `rfi` and `rid`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlashInfo {
    /// Manufacturer name
    pub manufacturer: Option<String>,
    /// Capacity, normalized ("7456MB")
    pub capacity: Option<String>,
    /// Capacity in sectors
    pub sectors: Option<u64>,
    /// Erase block size ("512KB")
    pub block_size: Option<String>,
    /// Page size ("2KB")
    pub page_size: Option<String>,
    /// ECC bits
    pub ecc_bits: Option<u32>,
    /// Access time
    pub access_time: Option<u32>,
    /// Chip select description
    pub flash_cs: Option<String>,
    /// Flash ID bytes as hex
    pub flash_id: Option<String>,
    /// SoC name, filled in by callers that identified the chip
    pub chip: Option<String>,
}

fn normalize_size(number: &str, unit: &str) -> String {
    format!("{}{}B", number, unit.to_ascii_uppercase())
}

impl FlashInfo {
    /// Whether no field is set
    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Present fields as (key, value) pairs; absent fields are omitted
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        let mut push = |key: &'static str, value: Option<String>| {
            if let Some(value) = value {
                out.push((key, value));
            }
        };
        push("manufacturer", self.manufacturer.clone());
        push("capacity", self.capacity.clone());
        push("sectors", self.sectors.map(|s| s.to_string()));
        push("block_size", self.block_size.clone());
        push("page_size", self.page_size.clone());
        push("ecc_bits", self.ecc_bits.map(|v| v.to_string()));
        push("access_time", self.access_time.map(|v| v.to_string()));
        push("flash_cs", self.flash_cs.clone());
        push("flash_id", self.flash_id.clone());
        push("chip", self.chip.clone());
        out
    }

    /// Present fields as a map
    pub fn to_map(&self) -> BTreeMap<&'static str, String> {
        self.fields().into_iter().collect()
    }

    /// Total size in bytes, from the capacity string or the sector count
    pub fn capacity_bytes(&self) -> Option<u64> {
        self.capacity
            .as_deref()
            .and_then(|c| units::parse_size(c).ok())
            .or_else(|| self.sectors.and_then(|s| s.checked_mul(SECTOR_SIZE)))
    }

    /// Fill fields `rfi` left empty from a `rid` result
    pub fn merge_id(&mut self, id: &FlashId) {
        if self.flash_id.is_none() {
            self.flash_id = Some(match id.ascii() {
                Some(text) => format!("{} ({})", id.hex(), text),
                None => id.hex(),
            });
        }
        if self.manufacturer.is_none() {
            self.manufacturer = id.manufacturer();
        }
        if self.capacity.is_none() {
            self.capacity = id.capacity().map(|c| c.replace(' ', ""));
        }
    }
}

/// Parse `rfi` output. A `Flash ID` line in the same text is merged in.
pub fn parse_rfi(text: &str) -> ParseOutcome<FlashInfo> {
    let group = |re: &Regex, idx: usize| -> Option<String> {
        re.captures(text)
            .and_then(|c| c.get(idx).map(|m| m.as_str().trim().to_string()))
    };

    let mut info = FlashInfo {
        manufacturer: group(&MANUFACTURER, 1).filter(|m| !m.is_empty()),
        capacity: CAPACITY
            .captures(text)
            .map(|c| normalize_size(&c[1], &c[2])),
        sectors: group(&SECTORS, 1).and_then(|s| s.parse().ok()),
        block_size: BLOCK_SIZE
            .captures(text)
            .map(|c| normalize_size(&c[1], &c[2])),
        page_size: PAGE_SIZE
            .captures(text)
            .map(|c| normalize_size(&c[1], &c[2])),
        ecc_bits: group(&ECC_BITS, 1).and_then(|s| s.parse().ok()),
        access_time: group(&ACCESS_TIME, 1).and_then(|s| s.parse().ok()),
        flash_cs: group(&FLASH_CS, 1),
        flash_id: None,
        chip: None,
    };

    if let ParseOutcome::Recognized(id) = parse_rid(text) {
        info.merge_id(&id);
    }

    if info.is_empty() {
        ParseOutcome::unrecognized(text)
    } else {
        ParseOutcome::Recognized(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFI: &str = "Flash Info:\r\n\
        \tManufacturer: SAMSUNG, value=00\r\n\
        \tFlash Size: 7456 MB\r\n\
        \tFlash Size: 15269888 Sectors\r\n\
        \tBlock Size: 512 KB\r\n\
        \tPage Size: 2 KB\r\n\
        \tECC Bits: 0\r\n\
        \tAccess Time: 40\r\n\
        \tFlash CS: Flash<0> \r\n";

    #[test]
    fn test_parse_rfi_full() {
        let info = parse_rfi(RFI).recognized().unwrap();
        assert_eq!(info.manufacturer.as_deref(), Some("SAMSUNG"));
        assert_eq!(info.capacity.as_deref(), Some("7456MB"));
        assert_eq!(info.sectors, Some(15269888));
        assert_eq!(info.block_size.as_deref(), Some("512KB"));
        assert_eq!(info.page_size.as_deref(), Some("2KB"));
        assert_eq!(info.ecc_bits, Some(0));
        assert_eq!(info.access_time, Some(40));
        assert_eq!(info.flash_cs.as_deref(), Some("Flash<0>"));
        assert_eq!(info.flash_id, None);
        assert_eq!(info.capacity_bytes(), Some(7456 * 1024 * 1024));
    }

    #[test]
    fn test_capacity_only() {
        let info = parse_rfi("Flash Size: 128MB").recognized().unwrap();
        assert_eq!(info.capacity.as_deref(), Some("128MB"));
        let map = info.to_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("capacity").map(String::as_str), Some("128MB"));
        assert!(!map.contains_key("manufacturer"));
        assert!(!map.contains_key("page_size"));
    }

    #[test]
    fn test_capacity_whitespace_and_case() {
        let info = parse_rfi("flash size:   1.5 gb").recognized().unwrap();
        assert_eq!(info.capacity.as_deref(), Some("1.5GB"));
        let info = parse_rfi("Flash Size: 16 MiB").recognized().unwrap();
        assert_eq!(info.capacity.as_deref(), Some("16MB"));
    }

    #[test]
    fn test_unrecognized_rfi() {
        assert!(!parse_rfi("").is_recognized());
        assert!(!parse_rfi("Read Flash Info failed!").is_recognized());
        assert!(parse_rfi("???").unwrap_or_default().is_empty());
    }

    #[test]
    fn test_parse_rid_spi_nor() {
        let id = parse_rid("Flash ID: C8 40 18\r\n").recognized().unwrap();
        assert_eq!(id.bytes, vec![0xC8, 0x40, 0x18]);
        assert_eq!(id.hex(), "C8 40 18");
        assert_eq!(id.manufacturer().as_deref(), Some("GigaDevice"));
        assert_eq!(id.capacity().as_deref(), Some("16 MB"));
        assert_eq!(id.ascii(), None);
    }

    #[test]
    fn test_parse_rid_emmc_ascii() {
        let id = parse_rid("Flash ID: 45 4D 4D 43 20").recognized().unwrap();
        assert_eq!(id.ascii().as_deref(), Some("EMMC"));
        assert_eq!(id.manufacturer(), None);
        assert_eq!(id.capacity(), None);
    }

    #[test]
    fn test_parse_rid_unknown_vendor() {
        let id = parse_rid("Flash ID: 77 00 7F").recognized().unwrap();
        assert_eq!(id.manufacturer().as_deref(), Some("Unknown (0x77)"));
        assert_eq!(id.capacity(), None);
        assert!(!parse_rid("Read flash ID failed").is_recognized());
    }

    #[test]
    fn test_merge_id_keeps_rfi_fields() {
        let mut info = parse_rfi(RFI).recognized().unwrap();
        let id = parse_rid("Flash ID: EF 40 19").recognized().unwrap();
        info.merge_id(&id);
        assert_eq!(info.manufacturer.as_deref(), Some("SAMSUNG"));
        assert_eq!(info.capacity.as_deref(), Some("7456MB"));
        assert_eq!(info.flash_id.as_deref(), Some("EF 40 19"));

        let mut empty = FlashInfo::default();
        empty.merge_id(&id);
        assert_eq!(empty.manufacturer.as_deref(), Some("Winbond"));
        assert_eq!(empty.capacity.as_deref(), Some("32MB"));
        assert_eq!(empty.capacity_bytes(), Some(32 * 1024 * 1024));
    }

    #[test]
    fn test_capacity_bytes_overflow_is_unknown() {
        let info = parse_rfi("Flash Size: 99999999999999999 Sectors")
            .recognized()
            .unwrap();
        assert_eq!(info.sectors, Some(99_999_999_999_999_999));
        assert_eq!(info.capacity_bytes(), None);
    }

    #[test]
    fn test_parse_idempotent() {
        assert_eq!(parse_rfi(RFI), parse_rfi(RFI));
    }
}
