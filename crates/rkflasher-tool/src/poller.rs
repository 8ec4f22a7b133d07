//! Background device detection
//!
//! The poller runs `ld` on a fixed interval. When a device answers it runs
//! `rci` once to identify the chip and reports a [`DeviceEvent::Found`]
//! snapshot; any failure on the way is reported as [`DeviceEvent::Lost`].

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rkflasher_core::backend::{Backend, Request};
use rkflasher_core::chip::{ChipDatabase, ChipIdentity};
use rkflasher_core::device::{parse_ld, DeviceList, DeviceMode};

/// Default time between two polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default bound on each `ld`/`rci` invocation
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(3);

/// Poller timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Time between polls
    pub interval: Duration,
    /// Timeout for each tool invocation
    pub timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// What the poller saw on one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSnapshot {
    /// Parsed `ld` output
    pub devices: DeviceList,
    /// Overall device mode
    pub mode: DeviceMode,
    /// Identified chip, if any
    pub chip: Option<ChipIdentity>,
}

impl DeviceSnapshot {
    /// Chip label for the status line
    pub fn chip_label(&self) -> Option<String> {
        self.chip.as_ref().map(ChipIdentity::label)
    }
}

/// Poller output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// At least one device answered
    Found(DeviceSnapshot),
    /// No device, or the tool failed
    Lost,
}

/// Identify the chip from `rci`, falling back to the `ld` product ID
fn identify(
    backend: &dyn Backend,
    chips: &ChipDatabase,
    devices: &DeviceList,
    timeout: Duration,
) -> Option<ChipIdentity> {
    match backend.capture(&Request::ChipInfo, Some(timeout)) {
        Ok(out) if out.success() => {
            if let Some(chip) = chips.identify_rci(&out.text).recognized() {
                return Some(chip);
            }
            log::debug!("Unrecognized chip info: {}", out.text.trim());
        }
        Ok(out) => log::debug!("rci exited with code {}", out.exit_code),
        Err(e) => log::debug!("rci failed: {}", e),
    }
    devices
        .first()
        .and_then(|d| d.pid)
        .and_then(|pid| chips.identify_pid(pid))
}

/// Run a single detection tick
pub fn poll_once(backend: &dyn Backend, chips: &ChipDatabase, timeout: Duration) -> DeviceEvent {
    let out = match backend.capture(&Request::ListDevices, Some(timeout)) {
        Ok(out) => out,
        Err(e) => {
            log::debug!("Device poll failed: {}", e);
            return DeviceEvent::Lost;
        }
    };

    let devices = parse_ld(&out.text);
    if devices.is_empty() {
        return DeviceEvent::Lost;
    }

    let chip = identify(backend, chips, &devices, timeout);
    DeviceEvent::Found(DeviceSnapshot {
        mode: devices.mode,
        devices,
        chip,
    })
}

/// Handle to a running poller thread
pub struct PollerHandle {
    events: Receiver<DeviceEvent>,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Channel the events arrive on
    pub fn events(&self) -> &Receiver<DeviceEvent> {
        &self.events
    }

    /// Stop the thread and wait for it to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Periodic device poller
pub struct DevicePoller;

impl DevicePoller {
    /// Start polling on a new thread. The first tick runs immediately.
    pub fn spawn(
        backend: Arc<dyn Backend>,
        chips: Arc<ChipDatabase>,
        config: PollerConfig,
    ) -> std::io::Result<PollerHandle> {
        let (event_tx, event_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name("device-poller".into())
            .spawn(move || loop {
                let event = poll_once(backend.as_ref(), &chips, config.timeout);
                if event_tx.send(event).is_err() {
                    break;
                }
                match stop_rx.recv_timeout(config.interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(PollerHandle {
            events: event_rx,
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rkflasher_core::chip::IdentSource;
    use rkflasher_dummy::{DummyConfig, DummyTool};
    use std::time::Instant;

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[test]
    fn test_poll_found() {
        let tool = DummyTool::new_default();
        let db = ChipDatabase::builtin();
        match poll_once(&tool, &db, TIMEOUT) {
            DeviceEvent::Found(snapshot) => {
                assert_eq!(snapshot.mode, DeviceMode::Loader);
                assert_eq!(snapshot.devices.len(), 1);
                assert_eq!(snapshot.chip.unwrap().name, "RK3588");
            }
            DeviceEvent::Lost => panic!("device not found"),
        }
        assert_eq!(tool.history(), vec!["ld", "rci"]);
    }

    #[test]
    fn test_poll_lost() {
        let tool = DummyTool::new_default();
        tool.detach();
        let db = ChipDatabase::builtin();
        assert_eq!(poll_once(&tool, &db, TIMEOUT), DeviceEvent::Lost);
        assert_eq!(tool.history(), vec!["ld"]);

        let slow = DummyTool::new(DummyConfig {
            latency: Duration::from_millis(50),
            ..Default::default()
        });
        assert_eq!(
            poll_once(&slow, &db, Duration::from_millis(5)),
            DeviceEvent::Lost
        );
    }

    #[test]
    fn test_chip_falls_back_to_pid() {
        let tool = DummyTool::new(DummyConfig {
            mode: DeviceMode::Maskrom,
            pid: 0x350a,
            chip_signature: String::new(),
            ..Default::default()
        });
        let db = ChipDatabase::builtin();
        let DeviceEvent::Found(snapshot) = poll_once(&tool, &db, TIMEOUT) else {
            panic!("device not found");
        };
        assert_eq!(snapshot.mode, DeviceMode::Maskrom);
        let chip = snapshot.chip.clone().unwrap();
        assert_eq!(chip.name, "RK3568");
        assert_eq!(chip.source, IdentSource::UsbPid(0x350a));
        assert_eq!(snapshot.chip_label().unwrap(), "RK3568 (PID 0x350a)");
    }

    #[test]
    fn test_thread_reports_and_stops() {
        let tool = Arc::new(DummyTool::new_default());
        let handle = DevicePoller::spawn(
            tool.clone(),
            Arc::new(ChipDatabase::builtin()),
            PollerConfig {
                interval: Duration::from_millis(10),
                timeout: TIMEOUT,
            },
        )
        .unwrap();

        let first = handle.events().recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(first, DeviceEvent::Found(_)));

        tool.detach();
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut lost = false;
        while Instant::now() < deadline {
            let event = handle.events().recv_timeout(Duration::from_millis(100));
            if let Ok(DeviceEvent::Lost) = event {
                lost = true;
                break;
            }
        }
        assert!(lost);

        let started = Instant::now();
        handle.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
