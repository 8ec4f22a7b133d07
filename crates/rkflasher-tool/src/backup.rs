//! Full firmware backup

use std::path::Path;

use rkflasher_core::backend::Request;
use rkflasher_core::i18n::tr;
use rkflasher_core::units::{sectors_for, SECTOR_SIZE};

use crate::error::{Result, ToolError};
use crate::runner::{RunObserver, RunReport};
use crate::session::Session;

/// Number of sectors a full backup reads.
///
/// An explicit length wins; otherwise the capacity reported by `rfi` is used.
pub fn backup_sectors(capacity: Option<u64>, length: Option<u64>) -> Option<u64> {
    length
        .or(capacity)
        .filter(|&bytes| bytes > 0)
        .map(|bytes| sectors_for(bytes, SECTOR_SIZE))
}

/// Read the whole flash (or `length` bytes) into `output`
pub fn backup_firmware(
    session: &mut Session,
    output: &Path,
    length: Option<u64>,
    observer: &mut dyn RunObserver,
) -> Result<RunReport> {
    let capacity = match length {
        Some(_) => None,
        None => match session.read_flash_info() {
            Ok(info) => info.capacity_bytes(),
            Err(e) => {
                log::debug!("No flash info for backup: {}", e);
                None
            }
        },
    };

    let count = backup_sectors(capacity, length).ok_or_else(|| {
        ToolError::Precondition(format!(
            "{}: {}",
            tr(session.lang(), "backing_up"),
            tr(session.lang(), "no_capacity")
        ))
    })?;
    log::info!(
        "{} {} sectors to {}",
        tr(session.lang(), "backing_up"),
        count,
        output.display()
    );

    session
        .execute(
            &Request::ReadLba {
                start: 0,
                count,
                output: output.to_path_buf(),
            },
            observer,
        )?
        .into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::NullObserver;
    use rkflasher_core::chip::ChipDatabase;
    use rkflasher_core::i18n::Lang;
    use rkflasher_dummy::{DummyConfig, DummyTool};
    use std::sync::Arc;

    #[test]
    fn test_backup_sectors() {
        assert_eq!(backup_sectors(Some(128 * 1024 * 1024), None), Some(262144));
        assert_eq!(backup_sectors(Some(1 << 30), Some(1000)), Some(2));
        assert_eq!(backup_sectors(None, Some(512)), Some(1));
        assert_eq!(backup_sectors(None, None), None);
        assert_eq!(backup_sectors(Some(0), None), None);
    }

    #[test]
    fn test_backup_uses_flash_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("backup.img");
        let tool = Arc::new(DummyTool::new(DummyConfig {
            capacity: 1024 * 1024,
            ..Default::default()
        }));
        let mut session = Session::new(tool.clone(), Arc::new(ChipDatabase::builtin()), Lang::En);

        backup_firmware(&mut session, &output, None, &mut NullObserver).unwrap();
        assert_eq!(std::fs::metadata(&output).unwrap().len(), 1024 * 1024);
        assert!(tool
            .history()
            .iter()
            .any(|c| c.starts_with("rl 0x0 0x800 ")));
    }

    #[test]
    fn test_backup_without_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let tool = DummyTool::new_default();
        tool.fail_command("rfi");
        tool.fail_command("rid");
        let mut session =
            Session::new(Arc::new(tool), Arc::new(ChipDatabase::builtin()), Lang::En);

        let err = backup_firmware(
            &mut session,
            &dir.path().join("backup.img"),
            None,
            &mut NullObserver,
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::Precondition(_)));

        backup_firmware(
            &mut session,
            &dir.path().join("head.img"),
            Some(4096),
            &mut NullObserver,
        )
        .unwrap();
    }
}
