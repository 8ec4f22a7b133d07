//! Mass production: one image to every connected device

use std::collections::HashMap;
use std::path::Path;
use std::process;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use rkflasher_core::device::DeviceEntry;
use rkflasher_core::i18n::{tr, tr_fmt};
use rkflasher_tool::batch::{Batch, BatchEvent};
use rkflasher_tool::{Session, ToolError};

use super::confirm::confirm;
use super::CommandResult;

fn scan(session: &mut Session) -> Vec<DeviceEntry> {
    log::info!("{}", tr(session.lang(), "mass_device_scan"));
    session
        .detect()
        .map(|s| s.devices.devices.clone())
        .unwrap_or_default()
}

/// List the devices a run would write to
pub fn mass_scan(session: &mut Session) -> CommandResult {
    let devices = scan(session);
    if devices.is_empty() {
        println!("{}", tr(session.lang(), "no_device"));
        return Ok(());
    }
    for device in &devices {
        println!("  {:<24} {}", device.label(), device.mode);
    }
    Ok(())
}

fn device_bar(multi: &MultiProgress, device: &str) -> ProgressBar {
    let pb = multi.add(ProgressBar::new(100));
    let style = ProgressStyle::default_bar()
        .template("{prefix:<24} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_prefix(device.to_string());
    pb
}

/// Write `firmware` at LBA 0 on every connected device
pub fn mass_run(session: &mut Session, firmware: &Path, assume_yes: bool) -> CommandResult {
    let lang = session.lang();
    let devices = scan(session);
    if devices.is_empty() {
        return Err(ToolError::Precondition(tr(lang, "no_device").to_string()).into());
    }

    let message = format!(
        "{}\n{}",
        tr(lang, "confirm_mass_production"),
        tr_fmt(lang, "mass_production_warning", &[&devices.len()])
    );
    if !confirm(assume_yes, lang, &message)? {
        return Ok(());
    }

    let handle = Batch::start(
        session.backend().clone(),
        &devices,
        firmware.to_path_buf(),
        lang,
    )?;

    // First Ctrl-C cancels the writes, a second one exits
    let stopper = handle.stopper();
    let mut interrupted = false;
    if let Err(e) = ctrlc::set_handler(move || {
        if interrupted {
            process::exit(130);
        }
        interrupted = true;
        stopper.stop();
    }) {
        log::warn!("Cannot install Ctrl-C handler: {}", e);
    }

    let multi = MultiProgress::new();
    let mut bars: HashMap<String, ProgressBar> = devices
        .iter()
        .map(|d| {
            let label = d.label();
            let bar = device_bar(&multi, &label);
            (label, bar)
        })
        .collect();

    for event in handle.events().iter() {
        match event {
            BatchEvent::Line { device, line } => log::debug!("[{}] {}", device, line),
            BatchEvent::Progress { device, percent } => {
                if let Some(pb) = bars.get(&device) {
                    pb.set_position(u64::from(percent));
                }
            }
            BatchEvent::Finished(result) => {
                if let Some(pb) = bars.remove(&result.device) {
                    match result.message {
                        None => pb.finish_with_message("OK"),
                        Some(message) => pb.abandon_with_message(message),
                    }
                }
            }
        }
    }

    let summary = handle.wait();
    for result in summary.results.iter().filter(|r| !r.success) {
        eprintln!(
            "  {}: {}",
            result.device,
            result.message.as_deref().unwrap_or("failed")
        );
    }
    println!(
        "{}",
        tr_fmt(
            lang,
            "mass_production_complete",
            &[&summary.succeeded, &summary.total]
        )
    );
    if summary.succeeded < summary.total {
        return Err(format!("{} devices failed", summary.total - summary.succeeded).into());
    }
    Ok(())
}
