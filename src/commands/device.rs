//! Device queries and single-request commands

use rkflasher_core::backend::Request;
use rkflasher_core::capability::parse_rcb;
use rkflasher_core::device::DeviceMode;
use rkflasher_core::flash_info::parse_rid;
use rkflasher_core::i18n::{tr, tr_fmt};
use rkflasher_core::outcome::ParseOutcome;
use rkflasher_tool::{Session, ToolError};

use super::confirm::confirm;
use super::progress::BarObserver;
use super::{print_partitions, query, CommandResult};

/// Print "key: value" lines with aligned keys
fn print_fields(fields: &[(&str, String)]) {
    let width = fields.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    for (key, value) in fields {
        println!("  {:<width$} : {}", key, value, width = width);
    }
}

fn require_device(session: &mut Session) -> Result<(), ToolError> {
    match session.detect() {
        Some(_) => Ok(()),
        None => Err(ToolError::Precondition(
            tr(session.lang(), "no_device").to_string(),
        )),
    }
}

/// Show status, chip, flash info and partitions in one go
pub fn info(session: &mut Session) -> CommandResult {
    let lang = session.lang();
    require_device(session)?;
    println!("{}", session.status_line());
    if let Some(snapshot) = session.snapshot() {
        for device in &snapshot.devices.devices {
            println!("  {}", device.label());
        }
    }

    // Maskrom devices only answer ld and rci
    if session.mode() != Some(DeviceMode::Loader) {
        return Ok(());
    }

    println!();
    match session.read_flash_info() {
        Ok(info) => {
            println!("{}:", tr(lang, "reading_flash_info"));
            print_fields(&info.fields());
        }
        Err(e) => log::warn!("{}: {}", tr(lang, "reading_flash_info"), e),
    }

    println!();
    match session.refresh_partitions() {
        Ok(table) if !table.is_empty() => print_partitions(table),
        Ok(_) => println!("{}", tr(lang, "no_partitions")),
        Err(e) => log::warn!("{}: {}", tr(lang, "reading_partitions"), e),
    }
    Ok(())
}

/// Identify the chip from `rci`, falling back to the USB PID
pub fn chip(session: &mut Session) -> CommandResult {
    let text = query(session, &Request::ChipInfo)?;
    match session.chips().identify_rci(&text) {
        ParseOutcome::Recognized(identity) => {
            println!("{}: {}", tr(session.lang(), "chip"), identity.label());
        }
        ParseOutcome::Unrecognized(raw) => {
            let by_pid = session
                .detect()
                .and_then(|s| s.chip.as_ref())
                .map(|c| c.label());
            match by_pid {
                Some(label) => println!("{}: {}", tr(session.lang(), "chip"), label),
                None => println!("{}", raw),
            }
        }
    }
    Ok(())
}

/// Print the loader's capabilities
pub fn capability(session: &mut Session) -> CommandResult {
    let text = query(session, &Request::Capability)?;
    match parse_rcb(&text) {
        ParseOutcome::Recognized(report) => {
            if !report.raw.is_empty() {
                let bytes: Vec<String> = report.raw.iter().map(|b| format!("{:02X}", b)).collect();
                println!("Capability: {}", bytes.join(" "));
            }
            for name in report.flags.names() {
                println!("  {}", name);
            }
        }
        ParseOutcome::Unrecognized(raw) => println!("{}", raw),
    }
    Ok(())
}

/// Print flash info merged from `rfi` and `rid`
pub fn flash_info(session: &mut Session) -> CommandResult {
    session.detect();
    let info = session.read_flash_info()?;
    print_fields(&info.fields());
    Ok(())
}

/// Print the flash ID with the manufacturer and capacity guessed from it
pub fn flash_id(session: &mut Session) -> CommandResult {
    let text = query(session, &Request::FlashId)?;
    match parse_rid(&text) {
        ParseOutcome::Recognized(id) => {
            let mut fields = vec![("flash_id", id.hex())];
            if let Some(ascii) = id.ascii() {
                fields.push(("text", ascii));
            }
            if let Some(manufacturer) = id.manufacturer() {
                fields.push(("manufacturer", manufacturer));
            }
            if let Some(capacity) = id.capacity() {
                fields.push(("capacity", capacity));
            }
            print_fields(&fields);
        }
        ParseOutcome::Unrecognized(raw) => println!("{}", raw),
    }
    Ok(())
}

/// Run one request with a progress bar, asking first when it modifies the device
pub fn run_request(session: &mut Session, request: &Request, assume_yes: bool) -> CommandResult {
    let lang = session.lang();
    request.validate(lang).map_err(ToolError::Precondition)?;

    if request.is_destructive() {
        let message = match request {
            Request::EraseFlash => tr(lang, "erase_flash_warning_message").to_string(),
            _ => tr_fmt(lang, "confirm_destructive", &[&request]),
        };
        if !confirm(assume_yes, lang, &message)? {
            return Ok(());
        }
    }

    let mut observer = BarObserver::new();
    session.execute(request, &mut observer)?.into_result()?;
    Ok(())
}
