//! Number and size helpers
//!
//! rkdeveloptool takes sector addresses and counts as `0x`-prefixed hex or
//! decimal. Users type sizes like `128MB` or `1.5 GB`. Sizes use binary
//! multiples throughout (`MB` == `MiB`), matching what the tool prints.

use crate::error::{Error, Result};

/// Bytes per LBA sector
pub const SECTOR_SIZE: u64 = 512;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * 1024 * 1024;

/// Parse a number that can be hex (0x...) or decimal
pub fn parse_number(s: &str) -> Result<u64> {
    let s = s.trim();
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        s.parse::<u64>()
    };
    parsed.map_err(|_| Error::InvalidNumber(s.to_string()))
}

/// Parse a size string like "16 MiB", "1.5GB", "4096" or "0x1000" into bytes
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim();

    if let Ok(n) = parse_number(s) {
        return Ok(n);
    }

    let lower = s.to_ascii_lowercase();
    let (num_str, multiplier) = if let Some(n) = lower
        .strip_suffix("gib")
        .or_else(|| lower.strip_suffix("gb"))
        .or_else(|| lower.strip_suffix('g'))
    {
        (n, GIB)
    } else if let Some(n) = lower
        .strip_suffix("mib")
        .or_else(|| lower.strip_suffix("mb"))
        .or_else(|| lower.strip_suffix('m'))
    {
        (n, MIB)
    } else if let Some(n) = lower
        .strip_suffix("kib")
        .or_else(|| lower.strip_suffix("kb"))
        .or_else(|| lower.strip_suffix('k'))
    {
        (n, KIB)
    } else if let Some(n) = lower.strip_suffix('b') {
        (n, 1)
    } else {
        return Err(Error::InvalidSize(s.to_string()));
    };

    let value: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| Error::InvalidSize(s.to_string()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(Error::InvalidSize(s.to_string()));
    }
    Ok((value * multiplier as f64) as u64)
}

/// Number of sectors needed to hold `bytes` (rounded up)
pub fn sectors_for(bytes: u64, sector_size: u64) -> u64 {
    bytes.div_ceil(sector_size.max(1))
}

/// Render a value the way rkdeveloptool arguments expect it
pub fn format_hex(value: u64) -> String {
    format!("0x{:x}", value)
}

/// Human readable file size, two decimals ("1.50 MB")
pub fn format_file_size(bytes: u64) -> String {
    if bytes >= GIB {
        format!("{:.2} GB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.2} MB", bytes as f64 / MIB as f64)
    } else {
        format!("{:.2} KB", bytes as f64 / KIB as f64)
    }
}

/// Short capacity label used for flash chips ("16 MB", "2.0 GB")
pub fn format_capacity(bytes: u64) -> String {
    if bytes >= GIB {
        format!("{:.1} GB", bytes as f64 / GIB as f64)
    } else {
        format!("{} MB", bytes / MIB)
    }
}
