//! Command execution service
//!
//! All user-initiated commands go through one [`CommandRunner`]. It checks
//! preconditions, refuses to start a second command while one is running,
//! streams output lines to a [`RunObserver`] and turns `NN%` tokens into
//! progress updates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rkflasher_core::backend::{Backend, CancelToken, Output, Request};
use rkflasher_core::i18n::{tr, tr_fmt, Lang};
use rkflasher_core::progress::ProgressTracker;

use crate::error::{Result, ToolError};

/// Receives events from a running command
///
/// All methods default to doing nothing.
pub trait RunObserver {
    /// The command is about to start
    fn on_start(&mut self, _request: &Request, _description: &str) {}

    /// One output line
    fn on_line(&mut self, _line: &str) {}

    /// New progress percentage (capped at 99 until the command exits)
    fn on_progress(&mut self, _percent: u8) {}

    /// The command exited
    fn on_finish(&mut self, _report: &RunReport) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl RunObserver for NullObserver {}

/// Observer that forwards output lines to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl RunObserver for LogObserver {
    fn on_line(&mut self, line: &str) {
        log::info!("{}", line);
    }
}

/// Outcome of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Exit code 0
    pub success: bool,
    /// Process exit code
    pub exit_code: i32,
    /// Combined output
    pub output: String,
}

impl RunReport {
    /// Turn a non-zero exit into [`ToolError::CommandFailed`]
    pub fn into_result(self) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(ToolError::CommandFailed {
                code: self.exit_code,
                output: self.output,
            })
        }
    }
}

/// Clears the busy flag when dropped
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs one command at a time on a backend
#[derive(Clone)]
pub struct CommandRunner {
    backend: Arc<dyn Backend>,
    busy: Arc<AtomicBool>,
    lang: Lang,
}

impl CommandRunner {
    /// Create a runner for a backend
    pub fn new(backend: Arc<dyn Backend>, lang: Lang) -> Self {
        Self {
            backend,
            busy: Arc::new(AtomicBool::new(false)),
            lang,
        }
    }

    /// The backend commands run on
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Message language
    pub fn lang(&self) -> Lang {
        self.lang
    }

    /// Whether a command is running
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn acquire(&self) -> Result<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| BusyGuard(&self.busy))
            .map_err(|_| {
                log::warn!("{}", tr(self.lang, "command_already_running"));
                ToolError::Busy
            })
    }

    /// Run a command to completion
    pub fn run(&self, request: &Request, observer: &mut dyn RunObserver) -> Result<RunReport> {
        self.run_with_cancel(request, observer, &CancelToken::new())
    }

    /// Run a command that can be cancelled through `cancel`
    pub fn run_with_cancel(
        &self,
        request: &Request,
        observer: &mut dyn RunObserver,
        cancel: &CancelToken,
    ) -> Result<RunReport> {
        request.validate(self.lang).map_err(ToolError::Precondition)?;
        let _guard = self.acquire()?;

        let description = request.describe(self.lang);
        log::info!("{}", tr_fmt(self.lang, "command_started", &[&description]));
        log::debug!("{}: {}", self.backend.name(), request);
        observer.on_start(request, description);

        let mut tracker = ProgressTracker::new();
        let mut output = String::new();
        let result = self.backend.stream(
            request,
            &mut |line| {
                output.push_str(line);
                output.push('\n');
                observer.on_line(line);
                if let Some(percent) = tracker.observe_line(line) {
                    observer.on_progress(percent);
                }
            },
            cancel,
        );

        let exit_code = match result {
            Ok(code) => code,
            Err(e) => {
                observer.on_progress(tracker.finish(false));
                let err = ToolError::from(e);
                if matches!(err, ToolError::Cancelled) {
                    log::warn!("{}", tr_fmt(self.lang, "command_cancelled", &[&description]));
                } else {
                    log::error!("{}: {}", description, err);
                }
                return Err(err);
            }
        };

        let success = exit_code == 0;
        observer.on_progress(tracker.finish(success));
        if success {
            log::info!("{}", tr_fmt(self.lang, "command_succeeded", &[&description]));
        } else {
            log::warn!(
                "{}",
                tr_fmt(self.lang, "command_failed", &[&description, &exit_code])
            );
        }

        let report = RunReport {
            success,
            exit_code,
            output,
        };
        observer.on_finish(&report);
        Ok(report)
    }

    /// Run a short query and collect its output, under the same busy rule
    pub fn capture(&self, request: &Request, timeout: Option<Duration>) -> Result<Output> {
        request.validate(self.lang).map_err(ToolError::Precondition)?;
        let _guard = self.acquire()?;
        log::debug!("{}: {}", self.backend.name(), request);
        Ok(self.backend.capture(request, timeout)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rkflasher_dummy::{DummyConfig, DummyTool};
    use std::thread;
    use std::time::Instant;

    #[derive(Default)]
    struct Recorder {
        started: Option<String>,
        lines: Vec<String>,
        progress: Vec<u8>,
        finished: Option<RunReport>,
    }

    impl RunObserver for Recorder {
        fn on_start(&mut self, _request: &Request, description: &str) {
            self.started = Some(description.to_string());
        }
        fn on_line(&mut self, line: &str) {
            self.lines.push(line.to_string());
        }
        fn on_progress(&mut self, percent: u8) {
            self.progress.push(percent);
        }
        fn on_finish(&mut self, report: &RunReport) {
            self.finished = Some(report.clone());
        }
    }

    fn firmware(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("fw.img");
        std::fs::write(&path, vec![0x5A; 4096]).unwrap();
        path
    }

    #[test]
    fn test_run_reports_progress() {
        let dir = tempfile::tempdir().unwrap();
        let runner = CommandRunner::new(Arc::new(DummyTool::new_default()), Lang::En);
        let mut rec = Recorder::default();
        let report = runner
            .run(
                &Request::WriteLba {
                    start: 0,
                    input: firmware(&dir),
                },
                &mut rec,
            )
            .unwrap();

        assert!(report.success);
        assert_eq!(rec.started.as_deref(), Some("Burning"));
        assert!(rec.progress[..rec.progress.len() - 1].iter().all(|&p| p <= 99));
        assert_eq!(rec.progress.iter().rev().nth(1), Some(&99));
        assert_eq!(rec.progress.last(), Some(&100));
        assert_eq!(rec.finished.unwrap().exit_code, 0);
        assert!(report.output.contains("Write LBA from file (100%)"));
    }

    #[test]
    fn test_failure_forces_zero() {
        let tool = DummyTool::new_default();
        tool.fail_command("td");
        let runner = CommandRunner::new(Arc::new(tool), Lang::En);
        let mut rec = Recorder::default();
        let report = runner.run(&Request::TestDevice, &mut rec).unwrap();
        assert!(!report.success);
        assert_eq!(rec.progress.last(), Some(&0));
        match report.into_result() {
            Err(ToolError::CommandFailed { code, output }) => {
                assert_eq!(code, 1);
                assert!(output.contains("td failed!"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_precondition_checked_before_spawn() {
        let tool = Arc::new(DummyTool::new_default());
        let runner = CommandRunner::new(tool.clone(), Lang::En);
        let err = runner
            .run(
                &Request::WriteLba {
                    start: 0,
                    input: "/nonexistent/fw.img".into(),
                },
                &mut NullObserver,
            )
            .unwrap_err();
        assert!(matches!(err, ToolError::Precondition(_)));
        assert!(tool.history().is_empty());
    }

    #[test]
    fn test_busy_rejects_second_command() {
        let dir = tempfile::tempdir().unwrap();
        let fw = firmware(&dir);
        let tool = DummyTool::new(DummyConfig {
            latency: Duration::from_millis(30),
            ..Default::default()
        });
        let runner = CommandRunner::new(Arc::new(tool), Lang::En);

        let background = runner.clone();
        let handle = thread::spawn(move || {
            background.run(&Request::WriteLba { start: 0, input: fw }, &mut NullObserver)
        });

        let deadline = Instant::now() + Duration::from_secs(2);
        while !runner.is_busy() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        let err = runner.run(&Request::TestDevice, &mut NullObserver).unwrap_err();
        assert!(matches!(err, ToolError::Busy));
        assert!(matches!(
            runner.capture(&Request::ListDevices, None),
            Err(ToolError::Busy)
        ));

        assert!(handle.join().unwrap().unwrap().success);
        assert!(!runner.is_busy());
        assert!(runner.run(&Request::TestDevice, &mut NullObserver).unwrap().success);
    }

    #[test]
    fn test_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let tool = DummyTool::new(DummyConfig {
            latency: Duration::from_millis(10),
            ..Default::default()
        });
        let runner = CommandRunner::new(Arc::new(tool), Lang::En);
        let cancel = CancelToken::new();

        struct CancelAt<'a>(&'a CancelToken);
        impl RunObserver for CancelAt<'_> {
            fn on_progress(&mut self, percent: u8) {
                if percent >= 20 {
                    self.0.cancel();
                }
            }
        }

        let err = runner
            .run_with_cancel(
                &Request::WriteLba {
                    start: 0,
                    input: firmware(&dir),
                },
                &mut CancelAt(&cancel),
                &cancel,
            )
            .unwrap_err();
        assert!(matches!(err, ToolError::Cancelled));
        assert!(!runner.is_busy());
    }
}
