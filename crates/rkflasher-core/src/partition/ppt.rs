//! `ppt` (print partition table) output parsing
//!
//! ```text
//! **********Partition Info(GPT)**********
//! NO  LBA       Name
//! 00  00004000  uboot
//! 01  00006000  misc
//! 02  00008000  boot
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

use super::{PartitionSource, PartitionTable};
use crate::outcome::ParseOutcome;

static ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+[\s,]+([0-9A-Fa-f]+)[\s,]+(\S+)$").unwrap());
static BANNER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Partition\s*Info\s*\(\s*(\w+)\s*\)").unwrap());

fn source_of(text: &str) -> PartitionSource {
    match BANNER.captures(text) {
        Some(caps) if caps[1].eq_ignore_ascii_case("gpt") => PartitionSource::Gpt,
        Some(caps) if caps[1].eq_ignore_ascii_case("parameter") => PartitionSource::Parameter,
        _ => PartitionSource::Unknown,
    }
}

/// Parse `ppt` output
pub fn parse_ppt(text: &str) -> ParseOutcome<PartitionTable> {
    let pairs: Vec<(String, u64)> = text
        .lines()
        .filter_map(|line| {
            let caps = ENTRY.captures(line.trim())?;
            let lba = u64::from_str_radix(&caps[1], 16).ok()?;
            Some((caps[2].to_string(), lba))
        })
        .collect();

    if pairs.is_empty() {
        return ParseOutcome::unrecognized(text);
    }
    ParseOutcome::Recognized(PartitionTable::from_pairs(source_of(text), pairs))
}

impl PartitionTable {
    /// Parse `ppt` output, yielding an empty table when nothing matched
    pub fn from_ppt(text: &str) -> Self {
        parse_ppt(text).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GPT: &str = "**********Partition Info(GPT)**********\r\n\
        NO  LBA       Name                \r\n\
        00  00004000  uboot\r\n\
        01  00006000  misc\r\n\
        02  00008000  boot\r\n\
        03  00038000  rootfs\r\n";

    #[test]
    fn test_parse_gpt() {
        let table = PartitionTable::from_ppt(GPT);
        assert_eq!(table.source, PartitionSource::Gpt);
        assert_eq!(table.len(), 4);
        assert_eq!(table.names(), vec!["uboot", "misc", "boot", "rootfs"]);

        let uboot = table.get("uboot").unwrap();
        assert_eq!(uboot.address(), "0x4000");
        assert_eq!(uboot.size_display(), "0x2000");
        assert_eq!(table.get("boot").unwrap().size_display(), "0x30000");
        assert_eq!(table.get("rootfs").unwrap().size_display(), "unknown");
        assert_eq!(table.get("rootfs").unwrap().size_lba, None);
    }

    #[test]
    fn test_sizes_follow_next_start() {
        let table = PartitionTable::from_ppt(GPT);
        for pair in table.partitions.windows(2) {
            assert_eq!(
                pair[0].size_lba,
                Some(pair[1].start_lba - pair[0].start_lba)
            );
        }
    }

    #[test]
    fn test_unsorted_and_comma_separated() {
        let text = "Partition Info(parameter):\n2,0x0,x\n1,8000,boot\n0,  2000, loader";
        // "0x0" is not bare hex, so that line is skipped
        let table = PartitionTable::from_ppt(text);
        assert_eq!(table.source, PartitionSource::Parameter);
        assert_eq!(table.names(), vec!["loader", "boot"]);
        assert_eq!(table.get("loader").unwrap().size_lba, Some(0x6000));
    }

    #[test]
    fn test_duplicate_name_later_wins() {
        let text = "00 00002000 misc\n01 00004000 boot\n02 00006000 misc\n03 00008000 userdata";
        let table = PartitionTable::from_ppt(text);
        assert_eq!(table.names(), vec!["boot", "misc", "userdata"]);
        let misc = table.get("misc").unwrap();
        assert_eq!(misc.start_lba, 0x6000);
        assert_eq!(misc.size_lba, Some(0x2000));
        assert_eq!(table.get("boot").unwrap().size_lba, Some(0x2000));
    }

    #[test]
    fn test_malformed_is_empty() {
        assert!(PartitionTable::from_ppt("").is_empty());
        assert!(PartitionTable::from_ppt("Read partition table failed!").is_empty());
        assert!(PartitionTable::from_ppt("NO  LBA  Name\n** junk **\n\u{0}\u{ff}").is_empty());
        assert!(!parse_ppt("no rockusb device").is_recognized());
    }

    #[test]
    fn test_reparse_is_equal() {
        assert_eq!(PartitionTable::from_ppt(GPT), PartitionTable::from_ppt(GPT));
    }
}
