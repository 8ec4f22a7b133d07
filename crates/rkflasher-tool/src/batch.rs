//! Mass production: one firmware written to several devices at once

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rkflasher_core::backend::{Backend, CancelToken, Request};
use rkflasher_core::device::DeviceEntry;
use rkflasher_core::i18n::{tr, tr_fmt, Lang};
use rkflasher_core::progress::ProgressTracker;

use crate::error::{Result, ToolError};

/// Progress of one device in a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    /// Output line from a device's write
    Line {
        /// Device label
        device: String,
        /// The line
        line: String,
    },
    /// New progress value for a device
    Progress {
        /// Device label
        device: String,
        /// Percentage
        percent: u8,
    },
    /// A device finished
    Finished(DeviceResult),
}

/// Final state of one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceResult {
    /// Device label
    pub device: String,
    /// The write exited with code 0
    pub success: bool,
    /// Error or exit status when it did not
    pub message: Option<String>,
}

/// Outcome of a whole batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    /// Devices written successfully
    pub succeeded: usize,
    /// Devices in the batch
    pub total: usize,
    /// Per-device results in start order
    pub results: Vec<DeviceResult>,
}

/// Stops a running batch; cloneable and usable from a signal handler
#[derive(Debug, Clone)]
pub struct BatchStopper {
    cancel: CancelToken,
    lang: Lang,
}

impl BatchStopper {
    /// Cancel every write still running
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            log::warn!("{}", tr(self.lang, "mass_production_stopped"));
        }
        self.cancel.cancel();
    }
}

/// Handle to a running batch
pub struct BatchHandle {
    cancel: CancelToken,
    events: Receiver<BatchEvent>,
    workers: Vec<(String, JoinHandle<DeviceResult>)>,
    lang: Lang,
}

impl BatchHandle {
    /// Channel the per-device events arrive on
    pub fn events(&self) -> &Receiver<BatchEvent> {
        &self.events
    }

    /// Cancel every write still running
    pub fn stop(&self) {
        self.stopper().stop();
    }

    /// A handle that stops this batch from another thread
    pub fn stopper(&self) -> BatchStopper {
        BatchStopper {
            cancel: self.cancel.clone(),
            lang: self.lang,
        }
    }

    /// Wait for all workers and summarize
    pub fn wait(self) -> BatchSummary {
        let results: Vec<DeviceResult> = self
            .workers
            .into_iter()
            .map(|(device, worker)| {
                worker.join().unwrap_or_else(|_| DeviceResult {
                    device,
                    success: false,
                    message: Some("worker panicked".into()),
                })
            })
            .collect();
        let succeeded = results.iter().filter(|r| r.success).count();
        let total = results.len();
        log::info!(
            "{}",
            tr_fmt(self.lang, "mass_production_complete", &[&succeeded, &total])
        );
        BatchSummary {
            succeeded,
            total,
            results,
        }
    }
}

fn write_device(
    backend: &dyn Backend,
    device: &str,
    request: &Request,
    cancel: &CancelToken,
    events: &Sender<BatchEvent>,
) -> DeviceResult {
    let mut tracker = ProgressTracker::new();
    let result = backend.stream(
        request,
        &mut |line| {
            log::info!("[{}] {}", device, line);
            let _ = events.send(BatchEvent::Line {
                device: device.to_string(),
                line: line.to_string(),
            });
            if let Some(percent) = tracker.observe_line(line) {
                let _ = events.send(BatchEvent::Progress {
                    device: device.to_string(),
                    percent,
                });
            }
        },
        cancel,
    );

    let (success, message) = match result {
        Ok(0) => (true, None),
        Ok(code) => (false, Some(format!("exit code {}", code))),
        Err(e) => (false, Some(ToolError::from(e).to_string())),
    };
    let _ = events.send(BatchEvent::Progress {
        device: device.to_string(),
        percent: tracker.finish(success),
    });
    let result = DeviceResult {
        device: device.to_string(),
        success,
        message,
    };
    let _ = events.send(BatchEvent::Finished(result.clone()));
    result
}

/// Mass production batch
pub struct Batch;

impl Batch {
    /// Start writing `firmware` at LBA 0 on every device, one thread each
    pub fn start(
        backend: Arc<dyn Backend>,
        devices: &[DeviceEntry],
        firmware: PathBuf,
        lang: Lang,
    ) -> Result<BatchHandle> {
        let request = Request::WriteLba {
            start: 0,
            input: firmware,
        };
        request.validate(lang).map_err(ToolError::Precondition)?;
        if devices.is_empty() {
            return Err(ToolError::Precondition(tr(lang, "no_device").to_string()));
        }

        log::info!(
            "{}",
            tr_fmt(lang, "mass_production_warning", &[&devices.len()])
        );
        log::info!("{}", tr(lang, "mass_production_running"));

        let cancel = CancelToken::new();
        let (tx, rx) = mpsc::channel();
        let mut workers = Vec::with_capacity(devices.len());
        for device in devices {
            let label = device.label();
            let backend = backend.clone();
            let request = request.clone();
            let worker_cancel = cancel.clone();
            let tx = tx.clone();
            let name = label.clone();
            let worker = thread::Builder::new()
                .name(format!("batch-{}", label))
                .spawn(move || {
                    write_device(backend.as_ref(), &name, &request, &worker_cancel, &tx)
                });
            match worker {
                Ok(worker) => workers.push((label, worker)),
                Err(e) => {
                    cancel.cancel();
                    return Err(e.into());
                }
            }
        }

        Ok(BatchHandle {
            cancel,
            events: rx,
            workers,
            lang,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rkflasher_core::device::parse_ld;
    use rkflasher_dummy::{DummyConfig, DummyTool};
    use std::fs;
    use std::time::Duration;

    fn scan(tool: &DummyTool) -> Vec<DeviceEntry> {
        parse_ld(&tool.capture(&Request::ListDevices, None).unwrap().text).devices
    }

    #[test]
    fn test_batch_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let fw = dir.path().join("fw.img");
        fs::write(&fw, vec![0x42; 2048]).unwrap();

        let tool = Arc::new(DummyTool::new(DummyConfig {
            devices: 3,
            ..Default::default()
        }));
        let devices = scan(&tool);
        let handle = Batch::start(tool.clone(), &devices, fw, Lang::En).unwrap();
        let summary = handle.wait();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.results[0].device, "#1 2207:350b @101");
        assert!(summary.results.iter().all(|r| r.message.is_none()));
    }

    #[test]
    fn test_batch_events() {
        let dir = tempfile::tempdir().unwrap();
        let fw = dir.path().join("fw.img");
        fs::write(&fw, b"fw").unwrap();

        let tool = Arc::new(DummyTool::new_default());
        let devices = scan(&tool);
        let handle = Batch::start(tool, &devices, fw, Lang::En).unwrap();

        let mut finished = None;
        while let Ok(event) = handle.events().recv_timeout(Duration::from_secs(2)) {
            if let BatchEvent::Finished(result) = event {
                finished = Some(result);
                break;
            }
        }
        assert!(finished.unwrap().success);
        assert_eq!(handle.wait().succeeded, 1);
    }

    #[test]
    fn test_batch_failure_counted() {
        let dir = tempfile::tempdir().unwrap();
        let fw = dir.path().join("fw.img");
        fs::write(&fw, b"fw").unwrap();

        let tool = Arc::new(DummyTool::new(DummyConfig {
            devices: 2,
            ..Default::default()
        }));
        tool.fail_command("wl");
        let devices = scan(&tool);
        let summary = Batch::start(tool, &devices, fw, Lang::En).unwrap().wait();
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.results[1].message.as_deref(), Some("exit code 1"));
    }

    #[test]
    fn test_batch_stop() {
        let dir = tempfile::tempdir().unwrap();
        let fw = dir.path().join("fw.img");
        fs::write(&fw, b"fw").unwrap();

        let tool = Arc::new(DummyTool::new(DummyConfig {
            devices: 2,
            latency: Duration::from_millis(50),
            ..Default::default()
        }));
        let devices = scan(&tool);
        let handle = Batch::start(tool, &devices, fw, Lang::En).unwrap();
        handle.stop();
        let summary = handle.wait();
        assert_eq!(summary.succeeded, 0);
        assert_eq!(
            summary.results[0].message.as_deref(),
            Some("command cancelled")
        );
    }

    #[test]
    fn test_batch_stopped_from_other_thread() {
        let dir = tempfile::tempdir().unwrap();
        let fw = dir.path().join("fw.img");
        fs::write(&fw, vec![0x42; 4096]).unwrap();

        let tool = Arc::new(DummyTool::new(DummyConfig {
            devices: 2,
            latency: Duration::from_millis(100),
            ..Default::default()
        }));
        let devices = scan(&tool);
        let handle = Batch::start(tool, &devices, fw, Lang::En).unwrap();

        let stopper = handle.stopper();
        let interrupt = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            stopper.stop();
            // A second stop is harmless
            stopper.stop();
        });
        interrupt.join().unwrap();

        let summary = handle.wait();
        assert_eq!(summary.succeeded, 0);
        assert!(summary
            .results
            .iter()
            .all(|r| r.message.as_deref() == Some("command cancelled")));
    }

    #[test]
    fn test_batch_preconditions() {
        let tool: Arc<dyn Backend> = Arc::new(DummyTool::new_default());
        assert!(matches!(
            Batch::start(tool.clone(), &[], PathBuf::from("/nonexistent.img"), Lang::En),
            Err(ToolError::Precondition(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let fw = dir.path().join("fw.img");
        fs::write(&fw, b"fw").unwrap();
        assert!(matches!(
            Batch::start(tool, &[], fw, Lang::En),
            Err(ToolError::Precondition(_))
        ));
    }
}
