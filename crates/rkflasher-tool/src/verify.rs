//! Read-back verification

use std::fs;
use std::path::Path;

use rkflasher_core::backend::Request;
use rkflasher_core::hash::file_prefix_md5;
use rkflasher_core::i18n::{tr, tr_fmt};
use rkflasher_core::units::sectors_for;

use crate::error::{Result, ToolError};
use crate::runner::{CommandRunner, RunObserver};

/// Outcome of comparing a file against flash contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    /// MD5 of the file
    pub expected: String,
    /// MD5 of the data read back
    pub actual: String,
    /// Number of bytes compared
    pub length: u64,
    /// Digests are equal
    pub matched: bool,
}

/// Read back the region at `start_lba` and compare it with `file`.
///
/// `length` limits the comparison to fewer bytes than the file holds. The
/// read-back is rounded up to whole sectors and truncated to the compared
/// length before hashing. The temporary file is removed in every case.
pub fn verify_region(
    runner: &CommandRunner,
    start_lba: u64,
    file: &Path,
    sector_size: u64,
    length: Option<u64>,
    observer: &mut dyn RunObserver,
) -> Result<VerifyReport> {
    let lang = runner.lang();
    let file_len = fs::metadata(file)
        .map_err(|_| {
            ToolError::Precondition(tr_fmt(lang, "file_not_found", &[&file.display()]))
        })?
        .len();
    let length = length.map_or(file_len, |l| l.min(file_len));
    let count = sectors_for(length, sector_size);

    let readback = tempfile::Builder::new()
        .prefix("rkflasher-verify-")
        .suffix(".img")
        .tempfile()?;
    log::debug!(
        "{}: {} sectors at 0x{:x} into {}",
        tr(lang, "verifying"),
        count,
        start_lba,
        readback.path().display()
    );

    runner
        .run(
            &Request::ReadLba {
                start: start_lba,
                count,
                output: readback.path().to_path_buf(),
            },
            observer,
        )?
        .into_result()?;

    let expected = file_prefix_md5(file, length)?;
    let actual = file_prefix_md5(readback.path(), length)?;
    let matched = expected == actual;
    if matched {
        log::info!("{}", tr(lang, "verify_ok"));
    } else {
        log::warn!("{}", tr(lang, "verify_mismatch"));
        log::warn!("{}: {}", tr(lang, "expected_md5"), expected);
        log::warn!("{}: {}", tr(lang, "actual_md5"), actual);
    }

    Ok(VerifyReport {
        expected,
        actual,
        length,
        matched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::NullObserver;
    use rkflasher_core::i18n::Lang;
    use rkflasher_core::units::SECTOR_SIZE;
    use rkflasher_dummy::DummyTool;
    use std::sync::Arc;

    fn write_image(dir: &tempfile::TempDir, name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_verify_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..1500u32).map(|i| (i % 251) as u8).collect();
        let image = write_image(&dir, "image.bin", &data);

        let runner = CommandRunner::new(Arc::new(DummyTool::new_default()), Lang::En);
        runner
            .run(
                &Request::WriteLba {
                    start: 0x100,
                    input: image.clone(),
                },
                &mut NullObserver,
            )
            .unwrap();

        let report =
            verify_region(&runner, 0x100, &image, SECTOR_SIZE, None, &mut NullObserver).unwrap();
        assert!(report.matched);
        assert_eq!(report.length, 1500);
        assert_eq!(report.expected, report.actual);
    }

    #[test]
    fn test_verify_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_image(&dir, "image.bin", &[0x11; 600]);
        let tool = Arc::new(DummyTool::new_default());
        let runner = CommandRunner::new(tool.clone(), Lang::En);

        let report =
            verify_region(&runner, 0, &image, SECTOR_SIZE, None, &mut NullObserver).unwrap();
        assert!(!report.matched);
        assert_ne!(report.expected, report.actual);
        let history = tool.history();
        assert_eq!(history.len(), 1);
        assert!(history[0].starts_with("rl 0x0 0x2 "));
    }

    #[test]
    fn test_verify_partial_length() {
        let dir = tempfile::tempdir().unwrap();
        let image = write_image(&dir, "image.bin", &[0x22; 2048]);
        let runner = CommandRunner::new(Arc::new(DummyTool::new_default()), Lang::En);
        runner
            .run(
                &Request::WriteLba {
                    start: 0,
                    input: write_image(&dir, "head.bin", &[0x22; 512]),
                },
                &mut NullObserver,
            )
            .unwrap();

        let report =
            verify_region(&runner, 0, &image, SECTOR_SIZE, Some(512), &mut NullObserver).unwrap();
        assert!(report.matched);
        assert_eq!(report.length, 512);
    }

    #[test]
    fn test_verify_missing_file() {
        let runner = CommandRunner::new(Arc::new(DummyTool::new_default()), Lang::En);
        let err = verify_region(
            &runner,
            0,
            Path::new("/nonexistent/image.bin"),
            SECTOR_SIZE,
            None,
            &mut NullObserver,
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::Precondition(_)));
    }
}
