//! Partition table commands

use std::path::Path;

use rkflasher_core::i18n::tr;
use rkflasher_core::partition::{ParameterFile, PartitionTable, DEFAULT_MTD_DEVICE};
use rkflasher_tool::Session;

use super::{print_partitions, CommandResult};

fn print_table(
    table: &PartitionTable,
    export: Option<&Path>,
    mtdparts: Option<&str>,
) -> CommandResult {
    print_partitions(table);
    if let Some(device) = mtdparts {
        println!();
        println!("{}", table.to_mtdparts(device));
    }
    if let Some(path) = export {
        table.to_toml_file(path)?;
        println!("Exported {} partitions to {}", table.len(), path.display());
    }
    Ok(())
}

/// Read the device's partition table with `ppt`
pub fn partitions(session: &mut Session, export: Option<&Path>, mtdparts: bool) -> CommandResult {
    let lang = session.lang();
    let table = session.refresh_partitions()?;
    if table.is_empty() {
        println!("{}", tr(lang, "no_partitions"));
        return Ok(());
    }
    print_table(table, export, mtdparts.then_some(DEFAULT_MTD_DEVICE))
}

/// Show the fields and partitions of a parameter file
pub fn parameter(file: &Path, export: Option<&Path>) -> CommandResult {
    let param = ParameterFile::load(file)?;
    for (key, value) in &param.fields {
        if key != "CMDLINE" {
            println!("{}: {}", key, value);
        }
    }
    if param.partitions.is_empty() {
        return Err(format!("no mtdparts= definition in {}", file.display()).into());
    }

    println!();
    let device = param.mtd_device.as_deref().unwrap_or(DEFAULT_MTD_DEVICE);
    print_table(&param.partitions, export, Some(device))
}
