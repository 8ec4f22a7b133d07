//! Read, write, backup and verify commands

use std::path::Path;

use rkflasher_core::backend::Request;
use rkflasher_core::hash::file_md5;
use rkflasher_core::i18n::{tr, tr_fmt};
use rkflasher_core::units::{format_hex, sectors_for, SECTOR_SIZE};
use rkflasher_tool::backup::backup_firmware;
use rkflasher_tool::burn::{self as flow, BurnOptions, BurnReport, BurnTarget};
use rkflasher_tool::verify::{verify_region, VerifyReport};
use rkflasher_tool::{Session, ToolError};

use super::confirm::{burn_summary, confirm};
use super::progress::BarObserver;
use super::CommandResult;
use crate::cli::{BurnArgs, TargetArgs};

/// Apply command-line burn flags on top of the configured options
pub fn merge_burn_options(base: BurnOptions, args: &BurnArgs) -> BurnOptions {
    BurnOptions {
        verify: base.verify && !args.no_verify,
        erase: base.erase || args.erase,
        reset: base.reset && !args.no_reset,
        retries: args.retries.unwrap_or(base.retries),
        loader_timeout: base.loader_timeout,
    }
}

/// Turn `--address`/`--partition` into a burn target
pub fn burn_target(args: &TargetArgs) -> Result<BurnTarget, ToolError> {
    match (args.address, &args.partition) {
        (Some(lba), _) => Ok(BurnTarget::Lba(lba)),
        (None, Some(name)) => Ok(BurnTarget::Partition(name.clone())),
        (None, None) => Err(ToolError::Precondition(
            "give --address or --partition".into(),
        )),
    }
}

fn print_verify(session: &Session, report: &VerifyReport) {
    let lang = session.lang();
    println!("  {}: {}", tr(lang, "expected_md5"), report.expected);
    println!("  {}: {}", tr(lang, "actual_md5"), report.actual);
    if report.matched {
        println!("{}", tr(lang, "verify_ok"));
    } else {
        println!("{}", tr(lang, "verify_mismatch"));
    }
}

fn finish_burn(session: &Session, report: &BurnReport) -> CommandResult {
    if report.attempts > 1 {
        log::info!("Write succeeded after {} attempts", report.attempts);
    }
    match &report.verify {
        Some(verify) => {
            print_verify(session, verify);
            if !verify.matched {
                return Err(tr(session.lang(), "verify_mismatch").into());
            }
        }
        None => {
            let lang = session.lang();
            println!("{}", tr_fmt(lang, "command_succeeded", &[&tr(lang, "burning")]));
        }
    }
    Ok(())
}

/// Read sectors into a file
pub fn read(
    session: &mut Session,
    start: u64,
    count: Option<u64>,
    length: Option<u64>,
    output: &Path,
) -> CommandResult {
    let count = count
        .or_else(|| length.map(|bytes| sectors_for(bytes, SECTOR_SIZE)))
        .ok_or("give --count or --length")?;
    let request = Request::ReadLba {
        start,
        count,
        output: output.to_path_buf(),
    };
    request.validate(session.lang()).map_err(ToolError::Precondition)?;

    let mut observer = BarObserver::new();
    session.execute(&request, &mut observer)?.into_result()?;
    println!("Read {} sectors from {} to {}", count, format_hex(start), output.display());
    Ok(())
}

/// Write an image at an LBA or into a partition
pub fn burn(
    session: &mut Session,
    image: &Path,
    target: &TargetArgs,
    options: BurnOptions,
    assume_yes: bool,
) -> CommandResult {
    let lang = session.lang();
    let target = burn_target(target)?;
    let address = match &target {
        BurnTarget::Lba(lba) => format_hex(*lba),
        BurnTarget::Partition(name) => {
            format!("{} ({})", name, format_hex(target.start_lba(session)?))
        }
    };

    if !image.is_file() {
        return Err(tr(lang, "select_firmware").into());
    }
    let summary = burn_summary(lang, image, &address)?;
    if !confirm(assume_yes, lang, &summary)? {
        return Ok(());
    }

    let mut observer = BarObserver::new();
    let report = flow::burn(session, &target, image, &options, &mut observer)?;
    finish_burn(session, &report)
}

/// Read one partition into a file
pub fn backup_partition(
    session: &mut Session,
    name: &str,
    output: &Path,
    length: Option<u64>,
) -> CommandResult {
    let part = session.partition(name)?;
    let count = length
        .map(|bytes| sectors_for(bytes, SECTOR_SIZE))
        .or(part.size_lba)
        .ok_or_else(|| ToolError::Precondition(tr(session.lang(), "no_capacity").to_string()))?;

    let request = Request::ReadLba {
        start: part.start_lba,
        count,
        output: output.to_path_buf(),
    };
    let mut observer = BarObserver::new();
    session.execute(&request, &mut observer)?.into_result()?;
    println!(
        "{} {} ({} sectors) -> {}",
        tr(session.lang(), "backing_up"),
        part.name,
        count,
        output.display()
    );
    Ok(())
}

/// Read the whole flash into a file
pub fn backup(session: &mut Session, output: &Path, length: Option<u64>) -> CommandResult {
    session.detect();
    let mut observer = BarObserver::new();
    backup_firmware(session, output, length, &mut observer)?;
    println!("{}: {}", tr(session.lang(), "md5"), file_md5(output)?);
    Ok(())
}

/// Compare flash contents with a file
pub fn verify(
    session: &mut Session,
    image: &Path,
    target: &TargetArgs,
    length: Option<u64>,
) -> CommandResult {
    let start = burn_target(target)?.start_lba(session)?;
    let mut observer = BarObserver::new();
    let report = verify_region(
        session.runner(),
        start,
        image,
        SECTOR_SIZE,
        length,
        &mut observer,
    )?;
    print_verify(session, &report);
    if !report.matched {
        return Err(tr(session.lang(), "verify_mismatch").into());
    }
    Ok(())
}

/// Print a file's MD5 like md5sum does
pub fn md5(file: &Path) -> CommandResult {
    println!("{}  {}", file_md5(file)?, file.display());
    Ok(())
}

/// Download the loader if needed, then write a full firmware image
pub fn upgrade(
    session: &mut Session,
    loader: &Path,
    firmware: &Path,
    options: BurnOptions,
    assume_yes: bool,
) -> CommandResult {
    let lang = session.lang();
    if !loader.is_file() {
        return Err(tr(lang, "select_loader").into());
    }
    if !firmware.is_file() {
        return Err(tr(lang, "select_firmware").into());
    }
    let summary = burn_summary(lang, firmware, &format_hex(0))?;
    if !confirm(assume_yes, lang, &summary)? {
        return Ok(());
    }

    let mut observer = BarObserver::new();
    let report = flow::upgrade(session, loader, firmware, &options, &mut observer)?;
    finish_burn(session, &report)
}
