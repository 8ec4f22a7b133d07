//! Rockchip `parameter.txt` files
//!
//! A parameter file is a list of `KEY: value` lines. The partition layout
//! lives in the `mtdparts=` argument of the `CMDLINE` line:
//!
//! ```text
//! FIRMWARE_VER: 11.0
//! MACHINE_MODEL: RK3568
//! CMDLINE: mtdparts=rk29xxnand:0x00002000@0x00004000(uboot),-@0x00038000(userdata:grow)
//! ```
//!
//! Sizes and offsets are in 512-byte sectors. A size of `-` means "to the end
//! of the device".

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;

use super::{Partition, PartitionSource, PartitionTable};
use crate::error::Result;
use crate::outcome::ParseOutcome;
use crate::units::parse_number;

static MTDPARTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"mtdparts=([^:\s]+):(\S+)").unwrap());
static MTD_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(-|0[xX][0-9A-Fa-f]+|\d+)@(0[xX][0-9A-Fa-f]+|\d+)\(([^)]+)\)$").unwrap()
});
static FIELD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Z][A-Z0-9_]*)\s*:\s*(.*)$").unwrap());

/// Default mtd device name used when rendering a table
pub const DEFAULT_MTD_DEVICE: &str = "rk29xxnand";

/// Parsed parameter file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterFile {
    /// `KEY: value` pairs in file order, `CMDLINE` included
    pub fields: Vec<(String, String)>,
    /// mtd device name from `mtdparts=<device>:`
    pub mtd_device: Option<String>,
    /// Partitions from `mtdparts=`
    pub partitions: PartitionTable,
}

impl ParameterFile {
    /// Parse parameter file text
    pub fn parse(text: &str) -> Self {
        let fields = text
            .lines()
            .filter_map(|line| {
                let caps = FIELD.captures(line.trim())?;
                Some((caps[1].to_string(), caps[2].trim().to_string()))
            })
            .collect();
        let mtd_device = MTDPARTS.captures(text).map(|c| c[1].to_string());

        Self {
            fields,
            mtd_device,
            partitions: PartitionTable::from_parameter(text),
        }
    }

    /// Read and parse a parameter file
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    /// Look up a field by key (case-insensitive)
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Parse the `mtdparts=` definition in parameter text
pub fn parse_mtdparts(text: &str) -> ParseOutcome<PartitionTable> {
    let Some(caps) = MTDPARTS.captures(text) else {
        return ParseOutcome::unrecognized(text);
    };

    let mut partitions = Vec::new();
    for entry in caps[2].split(',') {
        let Some(parts) = MTD_ENTRY.captures(entry.trim()) else {
            log::debug!("Skipping malformed mtdparts entry '{}'", entry);
            continue;
        };
        let size = match &parts[1] {
            "-" => None,
            s => parse_number(s).ok(),
        };
        let Ok(start) = parse_number(&parts[2]) else {
            continue;
        };
        let name = parts[3].split(':').next().unwrap_or_default().to_string();
        partitions.retain(|p: &Partition| p.name != name);
        partitions.push(Partition::new(name, start, size));
    }

    if partitions.is_empty() {
        return ParseOutcome::unrecognized(text);
    }
    partitions.sort_by_key(|p| p.start_lba);
    ParseOutcome::Recognized(PartitionTable {
        source: PartitionSource::Parameter,
        partitions,
    })
}

impl PartitionTable {
    /// Parse the `mtdparts=` definition of a parameter file.
    /// Yields an empty table when none is present.
    pub fn from_parameter(text: &str) -> Self {
        parse_mtdparts(text).unwrap_or_default()
    }

    /// Render as an `mtdparts=` argument. Partitions without a size are
    /// written as `-@offset(name:grow)`.
    pub fn to_mtdparts(&self, device: &str) -> String {
        let entries: Vec<String> = self
            .partitions
            .iter()
            .map(|p| match p.size_lba {
                Some(size) => format!("0x{:08x}@0x{:08x}({})", size, p.start_lba, p.name),
                None => format!("-@0x{:08x}({}:grow)", p.start_lba, p.name),
            })
            .collect();
        format!("mtdparts={}:{}", device, entries.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMETER: &str = "FIRMWARE_VER: 11.0\n\
        MACHINE_MODEL: RK3568\n\
        MACHINE_ID: 007\n\
        MAGIC: 0x5041524B\n\
        TYPE: GPT\n\
        CMDLINE: mtdparts=rk29xxnand:0x00002000@0x00004000(uboot),0x00002000@0x00006000(misc),\
        0x00030000@0x00008000(boot:bootable),-@0x00038000(userdata:grow)\n";

    #[test]
    fn test_parse_parameter_file() {
        let param = ParameterFile::parse(PARAMETER);
        assert_eq!(param.field("machine_model"), Some("RK3568"));
        assert_eq!(param.field("MAGIC"), Some("0x5041524B"));
        assert_eq!(param.mtd_device.as_deref(), Some("rk29xxnand"));

        let table = &param.partitions;
        assert_eq!(table.source, PartitionSource::Parameter);
        assert_eq!(table.names(), vec!["uboot", "misc", "boot", "userdata"]);
        assert_eq!(table.get("boot").unwrap().start_lba, 0x8000);
        assert_eq!(table.get("boot").unwrap().size_lba, Some(0x30000));
        assert_eq!(table.get("userdata").unwrap().size_lba, None);
    }

    #[test]
    fn test_render_mtdparts() {
        let table = PartitionTable::from_parameter(PARAMETER);
        let rendered = table.to_mtdparts(DEFAULT_MTD_DEVICE);
        assert!(rendered.starts_with("mtdparts=rk29xxnand:0x00002000@0x00004000(uboot),"));
        assert!(rendered.ends_with(",-@0x00038000(userdata:grow)"));
        assert_eq!(PartitionTable::from_parameter(&rendered), table);
    }

    #[test]
    fn test_no_mtdparts() {
        assert!(PartitionTable::from_parameter("FIRMWARE_VER: 1.0\n").is_empty());
        assert!(!parse_mtdparts("mtdparts=nand:garbage").is_recognized());
        let param = ParameterFile::parse("");
        assert!(param.fields.is_empty());
        assert!(param.partitions.is_empty());
    }
}
