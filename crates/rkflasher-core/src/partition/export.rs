//! TOML export of partition tables
//!
//! ```toml
//! source = "GPT"
//!
//! [[partition]]
//! name = "uboot"
//! start = "0x4000"
//! size = "0x2000"
//! ```
//!
//! Values are hex strings so they can be pasted into `rl`/`wl` arguments.

use serde::Serialize;
use std::fs;
use std::path::Path;

use super::PartitionTable;
use crate::error::Result;

#[derive(Serialize)]
struct TomlTable {
    source: String,
    partition: Vec<TomlPartition>,
}

#[derive(Serialize)]
struct TomlPartition {
    name: String,
    start: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<String>,
}

impl PartitionTable {
    /// Render the table as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        let file = TomlTable {
            source: self.source.to_string(),
            partition: self
                .partitions
                .iter()
                .map(|p| TomlPartition {
                    name: p.name.clone(),
                    start: p.address(),
                    size: p.size_lba.map(|_| p.size_display()),
                })
                .collect(),
        };
        Ok(toml::to_string(&file)?)
    }

    /// Write the table to a TOML file
    pub fn to_toml_file(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }
}
