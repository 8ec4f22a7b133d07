//! Burn and upgrade flows
//!
//! A burn writes an image at an LBA, optionally erasing first, retrying the
//! write, verifying the result and resetting the device. An upgrade brings a
//! maskrom device into loader mode with `db` before burning at LBA 0.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use rkflasher_core::backend::Request;
use rkflasher_core::device::DeviceMode;
use rkflasher_core::i18n::{tr, tr_fmt};
use rkflasher_core::units::SECTOR_SIZE;

use crate::error::{Result, ToolError};
use crate::poller::DeviceSnapshot;
use crate::runner::{RunObserver, RunReport};
use crate::session::Session;
use crate::verify::{verify_region, VerifyReport};

/// How often the device is polled while waiting for a mode change
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Options applied to burns and upgrades
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurnOptions {
    /// Read back and compare after writing
    pub verify: bool,
    /// Erase the whole flash before writing
    pub erase: bool,
    /// Reset the device when done
    pub reset: bool,
    /// Extra write attempts after a failed one
    pub retries: u32,
    /// How long to wait for loader mode after `db`
    pub loader_timeout: Duration,
}

impl Default for BurnOptions {
    fn default() -> Self {
        Self {
            verify: true,
            erase: false,
            reset: true,
            retries: 3,
            loader_timeout: Duration::from_secs(30),
        }
    }
}

/// Where an image is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BurnTarget {
    /// Start sector (`wl`)
    Lba(u64),
    /// Named partition (`wlx`)
    Partition(String),
}

impl BurnTarget {
    fn request(&self, image: &Path) -> Request {
        match self {
            Self::Lba(start) => Request::WriteLba {
                start: *start,
                input: image.to_path_buf(),
            },
            Self::Partition(name) => Request::WritePartition {
                name: name.clone(),
                input: image.to_path_buf(),
            },
        }
    }

    /// Start sector, looking partitions up in the session's table
    pub fn start_lba(&self, session: &mut Session) -> Result<u64> {
        match self {
            Self::Lba(start) => Ok(*start),
            Self::Partition(name) => Ok(session.partition(name)?.start_lba),
        }
    }
}

/// Outcome of a burn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnReport {
    /// Write attempts made
    pub attempts: u32,
    /// The successful write
    pub write: RunReport,
    /// Verification result, when enabled
    pub verify: Option<VerifyReport>,
}

/// Write `image` to `target` with the given options
pub fn burn(
    session: &mut Session,
    target: &BurnTarget,
    image: &Path,
    options: &BurnOptions,
    observer: &mut dyn RunObserver,
) -> Result<BurnReport> {
    let lang = session.lang();
    let request = target.request(image);
    request.validate(lang).map_err(ToolError::Precondition)?;
    let start_lba = target.start_lba(session)?;

    if options.erase {
        session.execute(&Request::EraseFlash, observer)?.into_result()?;
    }

    let total = options.retries + 1;
    let mut attempts = 0;
    let write = loop {
        attempts += 1;
        let report = session.execute(&request, observer)?;
        if report.success || attempts >= total {
            break report.into_result()?;
        }
        log::warn!("{}", tr_fmt(lang, "retrying", &[&attempts, &options.retries]));
    };

    let verify = if options.verify {
        let report = verify_region(
            session.runner(),
            start_lba,
            image,
            SECTOR_SIZE,
            None,
            observer,
        )?;
        Some(report)
    } else {
        None
    };

    if options.reset && verify.as_ref().map_or(true, |v| v.matched) {
        session.execute(&Request::Reset, observer)?.into_result()?;
    }

    Ok(BurnReport {
        attempts,
        write,
        verify,
    })
}

/// Poll until the device shows up in `mode`
pub fn wait_for_mode(
    session: &mut Session,
    mode: DeviceMode,
    timeout: Duration,
) -> Result<DeviceSnapshot> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(snapshot) = session.detect() {
            if snapshot.mode == mode {
                return Ok(snapshot.clone());
            }
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(ToolError::Timeout(timeout));
        }
        thread::sleep(WAIT_POLL_INTERVAL.min(deadline - now));
    }
}

/// Bring the device into loader mode if needed, then burn `firmware` at LBA 0
pub fn upgrade(
    session: &mut Session,
    loader: &Path,
    firmware: &Path,
    options: &BurnOptions,
    observer: &mut dyn RunObserver,
) -> Result<BurnReport> {
    let lang = session.lang();
    let mode = session
        .detect()
        .map(|s| s.mode)
        .ok_or_else(|| ToolError::Precondition(tr(lang, "no_device").to_string()))?;

    if mode == DeviceMode::Maskrom {
        session
            .execute(
                &Request::DownloadBoot {
                    loader: loader.to_path_buf(),
                },
                observer,
            )?
            .into_result()?;
        log::info!("{}", tr(lang, "waiting_for_loader"));
        if let Err(e) = wait_for_mode(session, DeviceMode::Loader, options.loader_timeout) {
            log::error!("{}", tr(lang, "loader_timeout"));
            return Err(e);
        }
    }

    let report = burn(session, &BurnTarget::Lba(0), firmware, options, observer)?;
    if report.verify.as_ref().map_or(true, |v| v.matched) {
        log::info!("{}", tr(lang, "upgrade_complete"));
    }
    Ok(report)
}
