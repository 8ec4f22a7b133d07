//! Storage media commands

use rkflasher_core::i18n::{tr, tr_fmt};
use rkflasher_core::storage::StorageType;
use rkflasher_tool::{Session, ToolError};

use super::{print_partitions, CommandResult};

/// Probe every known medium and report which ones the loader accepts
pub fn storage_list(session: &mut Session) -> CommandResult {
    let lang = session.lang();
    let probes = session.probe_storage()?;

    println!("{:<6} {:<8} {:<16} {}", "Code", "Name", "Description", "Status");
    println!("{}", "-".repeat(46));
    for probe in &probes {
        let status = if probe.supported {
            tr(lang, "storage_supported")
        } else {
            tr(lang, "storage_unsupported")
        };
        println!(
            "{:<6} {:<8} {:<16} {}",
            probe.storage.code, probe.storage.name, probe.storage.description, status
        );
    }

    if let Some(last) = probes.last() {
        log::debug!("{} is selected after probing", last.storage);
    }
    Ok(())
}

/// Switch to a medium and show its partition table
pub fn storage_set(session: &mut Session, storage: &str) -> CommandResult {
    let lang = session.lang();
    let storage = StorageType::parse(storage)
        .ok_or_else(|| ToolError::Precondition(tr_fmt(lang, "select_storage", &[&storage])))?;

    let table = session.change_storage(storage.code)?;
    println!("{}", tr_fmt(lang, "storage_switched", &[&storage]));
    if table.is_empty() {
        println!("{}", tr(lang, "no_partitions"));
    } else {
        print_partitions(table);
    }
    Ok(())
}
