//! List and watch commands

use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use rkflasher_core::chip::ChipDatabase;
use rkflasher_core::device::DeviceMode;
use rkflasher_core::i18n::tr;
use rkflasher_tool::available_backends;
use rkflasher_tool::poller::{DevicePoller, PollerConfig};
use rkflasher_tool::refresh::PartitionRefresher;
use rkflasher_tool::Session;

use super::{print_partitions, CommandResult};

/// How long `watch` blocks on the poller before checking for partition tables
const EVENT_WAIT: Duration = Duration::from_millis(100);

/// Detect the device and print everything `ld` reported
pub fn list_devices(session: &mut Session) -> CommandResult {
    let lang = session.lang();
    println!("{}", tr(lang, "detecting_device"));

    let Some(snapshot) = session.detect() else {
        println!("{}", tr(lang, "no_device"));
        return Ok(());
    };
    for device in &snapshot.devices.devices {
        println!("  {}", device.raw);
    }
    println!("{}", session.status_line());
    Ok(())
}

/// Print device arrival and removal until `count` changes were seen.
///
/// A device arriving in loader mode also gets its partition table read in
/// the background.
pub fn watch(session: &mut Session, config: PollerConfig, count: Option<usize>) -> CommandResult {
    let poller = DevicePoller::spawn(session.backend().clone(), session.chips().clone(), config)?;
    let refresher = PartitionRefresher::spawn(session.backend().clone(), session.query_timeout())?;
    println!("{}", tr(session.lang(), "detecting_device"));

    let mut seen = 0;
    loop {
        match poller.events().recv_timeout(EVENT_WAIT) {
            Ok(event) => {
                let had_device = session.snapshot().is_some();
                if session.apply_event(event) {
                    println!("{}", session.status_line());
                    if session.mode() == Some(DeviceMode::Loader) {
                        refresher.request();
                    }
                    seen += 1;
                } else if had_device && session.snapshot().is_none() {
                    println!("{}", tr(session.lang(), "device_lost"));
                    seen += 1;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        while let Ok(result) = refresher.results().try_recv() {
            if let Some(table) = session.apply_refresh(result) {
                print_partitions(table);
            }
        }

        if count.is_some_and(|limit| seen >= limit) {
            break;
        }
    }

    // Let a read started by the last arrival finish
    if refresher.is_busy() {
        if let Ok(result) = refresher.results().recv_timeout(session.query_timeout()) {
            if let Some(table) = session.apply_refresh(result) {
                print_partitions(table);
            }
        }
    }

    poller.stop();
    Ok(())
}

/// List all known chips
pub fn list_chips(db: &ChipDatabase) {
    println!("Known chips:");
    println!();
    println!("{:<10} {:<24} {:<20} {}", "Name", "Family", "USB PIDs", "Signatures");
    println!("{}", "-".repeat(70));

    for chip in db.iter() {
        let pids = chip
            .usb_pids
            .iter()
            .map(|pid| format!("{:04x}", pid))
            .collect::<Vec<_>>()
            .join(",");
        println!(
            "{:<10} {:<24} {:<20} {}",
            chip.name,
            chip.family.as_deref().unwrap_or("-"),
            pids,
            chip.signatures.join(",")
        );
    }
}

/// List the backends compiled into this build
pub fn list_backends() {
    println!("Available backends:");
    println!();
    for backend in available_backends() {
        let name = if backend.aliases.is_empty() {
            backend.name.to_string()
        } else {
            format!("{} ({})", backend.name, backend.aliases.join(", "))
        };
        println!("  {:<28} - {}", name, backend.description);
    }
}
