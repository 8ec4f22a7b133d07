//! Partition table types

use std::fmt;

use crate::units::{format_hex, SECTOR_SIZE};

/// One partition, addressed in LBA sectors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Partition name ("uboot", "rootfs")
    pub name: String,
    /// First sector
    pub start_lba: u64,
    /// Length in sectors; unknown for the last partition of a `ppt` read
    pub size_lba: Option<u64>,
}

impl Partition {
    /// Create a new partition
    pub fn new(name: impl Into<String>, start_lba: u64, size_lba: Option<u64>) -> Self {
        Self {
            name: name.into(),
            start_lba,
            size_lba,
        }
    }

    /// Start address as rkdeveloptool takes it ("0x4000")
    pub fn address(&self) -> String {
        format_hex(self.start_lba)
    }

    /// Size as hex, or "unknown"
    pub fn size_display(&self) -> String {
        match self.size_lba {
            Some(size) => format_hex(size),
            None => "unknown".to_string(),
        }
    }

    /// Size in bytes, when known
    pub fn size_bytes(&self) -> Option<u64> {
        self.size_lba.and_then(|s| s.checked_mul(SECTOR_SIZE))
    }

    /// Last sector (inclusive), when the size is known
    pub fn end_lba(&self) -> Option<u64> {
        self.size_lba
            .filter(|&s| s > 0)
            .and_then(|s| self.start_lba.checked_add(s - 1))
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} ({})", self.name, self.address(), self.size_display())
    }
}

/// Where a partition table came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartitionSource {
    /// `ppt` reported a GPT
    Gpt,
    /// `ppt` reported a Rockchip parameter table, or a parameter file was parsed
    Parameter,
    /// Dialect not reported
    #[default]
    Unknown,
}

impl fmt::Display for PartitionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpt => write!(f, "GPT"),
            Self::Parameter => write!(f, "parameter"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Partitions sorted by start sector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionTable {
    /// Dialect the table was read from
    pub source: PartitionSource,
    /// Partitions in ascending `start_lba` order
    pub partitions: Vec<Partition>,
}

impl PartitionTable {
    /// Create an empty table
    pub fn new(source: PartitionSource) -> Self {
        Self {
            source,
            partitions: Vec::new(),
        }
    }

    /// Number of partitions
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Iterate over partitions in address order
    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.iter()
    }

    /// Find a partition by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&Partition> {
        self.partitions
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Partition names in address order
    pub fn names(&self) -> Vec<&str> {
        self.partitions.iter().map(|p| p.name.as_str()).collect()
    }

    /// Build a table from `(name, lba)` pairs.
    ///
    /// Pairs are sorted by LBA and each size is the distance to the next
    /// start. When a name repeats, the later entry replaces the earlier one.
    pub fn from_pairs(source: PartitionSource, mut pairs: Vec<(String, u64)>) -> Self {
        pairs.sort_by_key(|(_, lba)| *lba);

        let mut partitions: Vec<Partition> = Vec::with_capacity(pairs.len());
        for (i, (name, lba)) in pairs.iter().enumerate() {
            let size = pairs.get(i + 1).map(|(_, next)| next - lba);
            partitions.retain(|p| p.name != *name);
            partitions.push(Partition::new(name.clone(), *lba, size));
        }

        Self { source, partitions }
    }
}
