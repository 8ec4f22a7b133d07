//! Session state shared by all commands
//!
//! A [`Session`] holds the backend, the command runner and everything learned
//! about the attached device: the last poller snapshot, the partition table
//! and the flash info. Commands read and update it explicitly.

use std::sync::Arc;
use std::time::Duration;

use rkflasher_core::backend::{Backend, Request};
use rkflasher_core::chip::ChipDatabase;
use rkflasher_core::device::DeviceMode;
use rkflasher_core::flash_info::{parse_rfi, parse_rid, FlashInfo};
use rkflasher_core::i18n::{tr, tr_fmt, Lang};
use rkflasher_core::partition::{Partition, PartitionTable};
use rkflasher_core::storage::{storage_supported, StorageType, DEFAULT_STORAGE};

use crate::error::{Result, ToolError};
use crate::poller::{poll_once, DeviceEvent, DeviceSnapshot};
use crate::refresh::table_from_output;
use crate::runner::{CommandRunner, RunObserver, RunReport};

/// Default bound on short queries (`rfi`, `rid`, `ppt`, `cs`)
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of probing one storage medium
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageProbe {
    /// The medium
    pub storage: StorageType,
    /// Whether `cs` accepted it
    pub supported: bool,
}

/// Explicit application context
pub struct Session {
    runner: CommandRunner,
    chips: Arc<ChipDatabase>,
    query_timeout: Duration,
    snapshot: Option<DeviceSnapshot>,
    partitions: PartitionTable,
    flash_info: Option<FlashInfo>,
}

impl Session {
    /// Create a session on a backend
    pub fn new(backend: Arc<dyn Backend>, chips: Arc<ChipDatabase>, lang: Lang) -> Self {
        Self {
            runner: CommandRunner::new(backend, lang),
            chips,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            snapshot: None,
            partitions: PartitionTable::default(),
            flash_info: None,
        }
    }

    /// Use a different bound for short queries
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// The backend
    pub fn backend(&self) -> &Arc<dyn Backend> {
        self.runner.backend()
    }

    /// The command runner
    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    /// The chip database
    pub fn chips(&self) -> &Arc<ChipDatabase> {
        &self.chips
    }

    /// Message language
    pub fn lang(&self) -> Lang {
        self.runner.lang()
    }

    /// Bound for short queries
    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Last device snapshot
    pub fn snapshot(&self) -> Option<&DeviceSnapshot> {
        self.snapshot.as_ref()
    }

    /// Mode of the attached device
    pub fn mode(&self) -> Option<DeviceMode> {
        self.snapshot.as_ref().map(|s| s.mode)
    }

    /// Apply a poller event. Returns true when a device appeared that was
    /// not there before.
    pub fn apply_event(&mut self, event: DeviceEvent) -> bool {
        match event {
            DeviceEvent::Found(snapshot) => {
                let appeared = self.snapshot.is_none();
                if appeared {
                    log::info!(
                        "{}: {}",
                        tr(self.lang(), snapshot.mode.status_key()),
                        snapshot.chip_label().unwrap_or_default()
                    );
                }
                self.snapshot = Some(snapshot);
                appeared
            }
            DeviceEvent::Lost => {
                if self.snapshot.take().is_some() {
                    log::info!("{}", tr(self.lang(), "device_lost"));
                }
                self.partitions = PartitionTable::default();
                self.flash_info = None;
                false
            }
        }
    }

    /// Run one detection tick now and apply it
    pub fn detect(&mut self) -> Option<&DeviceSnapshot> {
        log::debug!("{}", tr(self.lang(), "detecting_device"));
        let event = poll_once(self.backend().as_ref(), &self.chips, self.query_timeout);
        self.apply_event(event);
        self.snapshot.as_ref()
    }

    /// Translated one-line status
    pub fn status_line(&self) -> String {
        match &self.snapshot {
            None => tr(self.lang(), "no_device").to_string(),
            Some(snapshot) => {
                let mut line = tr(self.lang(), snapshot.mode.status_key()).to_string();
                if let Some(chip) = snapshot.chip_label() {
                    line.push_str(&format!(" - {}: {}", tr(self.lang(), "chip"), chip));
                }
                line
            }
        }
    }

    /// Label of the identified chip
    pub fn chip_label(&self) -> Option<String> {
        self.snapshot.as_ref().and_then(DeviceSnapshot::chip_label)
    }

    /// Partition table last read
    pub fn partitions(&self) -> &PartitionTable {
        &self.partitions
    }

    /// Read the partition table now
    pub fn refresh_partitions(&mut self) -> Result<&PartitionTable> {
        let out = self
            .runner
            .capture(&Request::PartitionTable, Some(self.query_timeout))?;
        self.partitions = table_from_output(out)?;
        Ok(&self.partitions)
    }

    /// Take a result delivered by the refresh worker.
    ///
    /// Returns the new table, or `None` when the read failed or the device
    /// went away before the result arrived.
    pub fn apply_refresh(&mut self, result: Result<PartitionTable>) -> Option<&PartitionTable> {
        match result {
            Ok(_) if self.snapshot.is_none() => {
                log::debug!("Dropping partition table for a lost device");
                None
            }
            Ok(table) => {
                self.partitions = table;
                Some(&self.partitions)
            }
            Err(e) => {
                log::warn!("{}: {}", tr(self.lang(), "reading_partitions"), e);
                None
            }
        }
    }

    /// Look up a partition by name, reading the table first if none is known
    pub fn partition(&mut self, name: &str) -> Result<Partition> {
        if self.partitions.is_empty() {
            self.refresh_partitions()?;
        }
        if self.partitions.is_empty() {
            return Err(ToolError::Precondition(
                tr(self.lang(), "no_partitions").to_string(),
            ));
        }
        self.partitions.get(name).cloned().ok_or_else(|| {
            ToolError::Precondition(tr_fmt(self.lang(), "select_partition", &[&name]))
        })
    }

    /// Flash info from `rfi` and `rid`, read once and cached
    pub fn read_flash_info(&mut self) -> Result<&FlashInfo> {
        if self.flash_info.is_none() {
            let rfi = self
                .runner
                .capture(&Request::FlashInfo, Some(self.query_timeout))?;
            let mut info = if rfi.success() {
                parse_rfi(&rfi.text).unwrap_or_default()
            } else {
                log::debug!("rfi exited with code {}", rfi.exit_code);
                FlashInfo::default()
            };

            match self
                .runner
                .capture(&Request::FlashId, Some(self.query_timeout))
            {
                Ok(rid) if rid.success() => {
                    if let Some(id) = parse_rid(&rid.text).recognized() {
                        info.merge_id(&id);
                    }
                }
                Ok(rid) => log::debug!("rid exited with code {}", rid.exit_code),
                Err(e) => log::debug!("rid failed: {}", e),
            }

            if info.is_empty() && !rfi.success() {
                return Err(ToolError::CommandFailed {
                    code: rfi.exit_code,
                    output: rfi.text,
                });
            }
            info.chip = self.chip_label();
            self.flash_info = Some(info);
        }
        Ok(self.flash_info.get_or_insert_with(FlashInfo::default))
    }

    /// Forget cached flash info
    pub fn invalidate_flash_info(&mut self) {
        self.flash_info = None;
    }

    fn switch_storage(&mut self, code: u8) -> Result<bool> {
        let out = self
            .runner
            .capture(&Request::ChangeStorage { code }, Some(self.query_timeout))?;
        self.flash_info = None;
        Ok(out.success() && storage_supported(&out.text))
    }

    /// Switch storage with `cs`, then read the new partition table
    pub fn change_storage(&mut self, code: u8) -> Result<&PartitionTable> {
        if !self.switch_storage(code)? {
            return Err(ToolError::CommandFailed {
                code: 1,
                output: tr(self.lang(), "storage_unsupported").to_string(),
            });
        }
        let name = StorageType::from_code(code)
            .map(|s| s.to_string())
            .unwrap_or_else(|| code.to_string());
        log::info!("{}", tr_fmt(self.lang(), "storage_switched", &[&name]));
        self.refresh_partitions()
    }

    /// Try each known medium with `cs`. The last one probed stays selected.
    pub fn probe_storage(&mut self) -> Result<Vec<StorageProbe>> {
        let mut probes = Vec::with_capacity(DEFAULT_STORAGE.len());
        for storage in DEFAULT_STORAGE.iter().copied() {
            let supported = self.switch_storage(storage.code)?;
            log::debug!("{}: supported={}", storage, supported);
            probes.push(StorageProbe { storage, supported });
        }
        Ok(probes)
    }

    /// Run a request through the runner and update the session afterwards
    pub fn execute(
        &mut self,
        request: &Request,
        observer: &mut dyn RunObserver,
    ) -> Result<RunReport> {
        let report = self.runner.run(request, observer)?;
        if !report.success {
            return Ok(report);
        }
        match request {
            Request::ChangeStorage { .. }
            | Request::WriteGpt { .. }
            | Request::WriteParameter { .. } => {
                self.flash_info = None;
                if let Err(e) = self.refresh_partitions() {
                    log::warn!("{}", e);
                }
            }
            Request::EraseFlash => {
                self.partitions = PartitionTable::default();
            }
            Request::Reset | Request::DownloadBoot { .. } => {
                self.apply_event(DeviceEvent::Lost);
            }
            _ => {}
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::PartitionRefresher;
    use crate::runner::NullObserver;
    use rkflasher_dummy::{default_partitions, DummyConfig, DummyTool};
    use std::fs;

    fn session(tool: Arc<DummyTool>) -> Session {
        Session::new(tool, Arc::new(ChipDatabase::builtin()), Lang::En)
    }

    #[test]
    fn test_detect_and_status() {
        let tool = Arc::new(DummyTool::new_default());
        let mut s = session(tool.clone());
        assert_eq!(s.status_line(), "No device found");

        assert!(s.detect().is_some());
        assert_eq!(s.mode(), Some(DeviceMode::Loader));
        assert_eq!(s.status_line(), "Connected (Loader mode) - Chip: RK3588");

        s.refresh_partitions().unwrap();
        tool.detach();
        assert!(s.detect().is_none());
        assert!(s.partitions().is_empty());
        assert_eq!(s.status_line(), "No device found");
    }

    #[test]
    fn test_apply_event_reports_new_device() {
        let tool = Arc::new(DummyTool::new_default());
        let mut s = session(tool.clone());
        let event = poll_once(tool.as_ref(), s.chips(), DEFAULT_QUERY_TIMEOUT);
        assert!(s.apply_event(event.clone()));
        assert!(!s.apply_event(event));
        assert!(!s.apply_event(DeviceEvent::Lost));
        assert!(s.snapshot().is_none());
    }

    #[test]
    fn test_background_refresh_updates_table() {
        let tool = Arc::new(DummyTool::new_default());
        let mut s = session(tool.clone());
        let refresher = PartitionRefresher::spawn(tool.clone(), DEFAULT_QUERY_TIMEOUT).unwrap();
        let wait = Duration::from_secs(2);

        // No device yet: the table is stale and dropped
        refresher.request();
        let result = refresher.results().recv_timeout(wait).unwrap();
        assert!(s.apply_refresh(result).is_none());
        assert!(s.partitions().is_empty());

        assert!(s.detect().is_some());
        refresher.request();
        let result = refresher.results().recv_timeout(wait).unwrap();
        assert_eq!(s.apply_refresh(result), Some(&default_partitions()));
        assert_eq!(s.partitions(), &default_partitions());

        // A failed read keeps the last good table
        tool.fail_command("ppt");
        refresher.request();
        let result = refresher.results().recv_timeout(wait).unwrap();
        assert!(s.apply_refresh(result).is_none());
        assert_eq!(s.partitions(), &default_partitions());
    }

    #[test]
    fn test_partition_lookup() {
        let mut s = session(Arc::new(DummyTool::new_default()));
        let boot = s.partition("BOOT").unwrap();
        assert_eq!(boot.start_lba, 0x6000);
        assert_eq!(s.partitions(), &default_partitions());

        let err = s.partition("vendor").unwrap_err();
        assert_eq!(err.to_string(), "Partition not found: vendor");
    }

    #[test]
    fn test_flash_info_cached() {
        let tool = Arc::new(DummyTool::new_default());
        let mut s = session(tool.clone());
        s.detect();
        let info = s.read_flash_info().unwrap().clone();
        assert_eq!(info.manufacturer.as_deref(), Some("SAMSUNG"));
        assert_eq!(info.capacity.as_deref(), Some("64MB"));
        assert_eq!(info.chip.as_deref(), Some("RK3588"));
        assert!(info.flash_id.unwrap().contains("EMMC"));

        s.read_flash_info().unwrap();
        let queries = tool
            .history()
            .iter()
            .filter(|c| c.as_str() == "rfi")
            .count();
        assert_eq!(queries, 1);
    }

    #[test]
    fn test_flash_info_failure() {
        let tool = DummyTool::new_default();
        tool.fail_command("rfi");
        tool.fail_command("rid");
        let mut s = session(Arc::new(tool));
        assert!(matches!(
            s.read_flash_info(),
            Err(ToolError::CommandFailed { .. })
        ));
    }

    #[test]
    fn test_change_storage_refreshes() {
        let tool = Arc::new(DummyTool::new_default());
        let mut s = session(tool.clone());
        assert_eq!(s.change_storage(2).unwrap().len(), 4);
        assert_eq!(tool.storage(), 2);
        assert_eq!(tool.history(), vec!["cs 2", "ppt"]);

        assert!(matches!(
            s.change_storage(9),
            Err(ToolError::CommandFailed { .. })
        ));
        assert_eq!(tool.storage(), 2);
    }

    #[test]
    fn test_probe_storage() {
        let tool = Arc::new(DummyTool::new(DummyConfig {
            supported_storage: vec![1, 9],
            ..Default::default()
        }));
        let mut s = session(tool.clone());
        let probes = s.probe_storage().unwrap();
        let supported: Vec<(u8, bool)> = probes
            .iter()
            .map(|p| (p.storage.code, p.supported))
            .collect();
        assert_eq!(supported, vec![(1, true), (2, false), (9, true)]);
        assert_eq!(tool.storage(), 9);
    }

    #[test]
    fn test_execute_parameter_refreshes_table() {
        let dir = tempfile::tempdir().unwrap();
        let param = dir.path().join("parameter.txt");
        fs::write(
            &param,
            "FIRMWARE_VER: 1.0\nCMDLINE: mtdparts=rk29xxnand:0x00002000@0x00002000(uboot),-@0x00004000(rootfs:grow)\n",
        )
        .unwrap();

        let mut s = session(Arc::new(DummyTool::new_default()));
        let report = s
            .execute(&Request::WriteParameter { file: param }, &mut NullObserver)
            .unwrap();
        assert!(report.success);
        assert_eq!(s.partitions().names(), vec!["uboot", "rootfs"]);
    }

    #[test]
    fn test_execute_reset_forgets_device() {
        let mut s = session(Arc::new(DummyTool::new_default()));
        s.detect();
        s.execute(&Request::Reset, &mut NullObserver).unwrap();
        assert!(s.snapshot().is_none());
    }
}
