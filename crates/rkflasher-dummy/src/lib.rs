//! rkflasher-dummy - In-memory rkdeveloptool emulator for testing
//!
//! [`DummyTool`] answers [`Request`]s the way rkdeveloptool does, with the
//! same text output, but from an emulated device held in memory. Flash
//! contents, mode changes, storage switches and partition tables written
//! with `gpt`/`prm` all persist for the lifetime of the emulator, so whole
//! flows (burn, read back, verify) can be exercised without hardware.

use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use rkflasher_core::backend::{Backend, BackendError, CancelToken, Output, Request};
use rkflasher_core::device::{DeviceMode, ROCKCHIP_VID};
use rkflasher_core::partition::{ParameterFile, PartitionSource, PartitionTable};
use rkflasher_core::units::SECTOR_SIZE;

const NO_DEVICE: &str = "Did not find any rockusb device, please plug device in!";
const NOT_SUPPORTED: &str = "The device does not support this operation!";
const OPEN_FAILED: &str = "Open file failed!";

/// Progress lines emitted per transfer (0%, 10%, ... 100%)
const PROGRESS_STEPS: u64 = 10;

/// Longest single sleep while waiting, so cancellation is noticed quickly
const WAIT_SLICE: Duration = Duration::from_millis(5);

/// Configuration for the emulated device
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Mode the device starts in
    pub mode: DeviceMode,
    /// Number of devices `ld` reports
    pub devices: usize,
    /// USB product ID
    pub pid: u16,
    /// Chip number as printed in the `rci` byte dump ("8853" for RK3588)
    pub chip_signature: String,
    /// Initially selected storage code
    pub storage: u8,
    /// Storage codes `cs` accepts
    pub supported_storage: Vec<u8>,
    /// Flash size in bytes
    pub capacity: u64,
    /// Partition table `ppt` reports
    pub partitions: PartitionTable,
    /// Delay per output step
    pub latency: Duration,
}

/// A small GPT layout that fits the default capacity
pub fn default_partitions() -> PartitionTable {
    PartitionTable::from_pairs(
        PartitionSource::Gpt,
        vec![
            ("uboot".to_string(), 0x2000),
            ("misc".to_string(), 0x4000),
            ("boot".to_string(), 0x6000),
            ("rootfs".to_string(), 0x10000),
        ],
    )
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            mode: DeviceMode::Loader,
            devices: 1,
            pid: 0x350b,
            chip_signature: "8853".to_string(),
            storage: 1,
            supported_storage: vec![1, 2],
            capacity: 64 * 1024 * 1024,
            partitions: default_partitions(),
            latency: Duration::ZERO,
        }
    }
}

#[derive(Debug)]
struct State {
    connected: bool,
    mode: DeviceMode,
    storage: u8,
    flash: Vec<u8>,
    partitions: PartitionTable,
    failing: Vec<&'static str>,
    history: Vec<String>,
}

/// Emulated rkdeveloptool
#[derive(Debug)]
pub struct DummyTool {
    config: DummyConfig,
    state: Mutex<State>,
}

/// Result of one emulated command: exit code, or a backend error
type Exec = Result<i32, BackendError>;

impl DummyTool {
    /// Create an emulator with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        let state = State {
            connected: true,
            mode: config.mode,
            storage: config.storage,
            flash: Vec::new(),
            partitions: config.partitions.clone(),
            failing: Vec::new(),
            history: Vec::new(),
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    /// Create an emulator with the default configuration (RK3588 in loader mode)
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current mode, or `None` when no device is attached
    pub fn mode(&self) -> Option<DeviceMode> {
        let state = self.state();
        state.connected.then_some(state.mode)
    }

    /// Plug the device in, in the given mode
    pub fn attach(&self, mode: DeviceMode) {
        let mut state = self.state();
        state.connected = true;
        state.mode = mode;
    }

    /// Unplug the device
    pub fn detach(&self) {
        self.state().connected = false;
    }

    /// Currently selected storage code
    pub fn storage(&self) -> u8 {
        self.state().storage
    }

    /// Partition table the device currently holds
    pub fn partitions(&self) -> PartitionTable {
        self.state().partitions.clone()
    }

    /// Every request received so far, rendered as a command line
    pub fn history(&self) -> Vec<String> {
        self.state().history.clone()
    }

    /// Make every later run of `command` ("wl", "ppt", ...) fail
    pub fn fail_command(&self, command: &'static str) {
        self.state().failing.push(command);
    }

    /// Read emulated flash contents; unwritten bytes read as 0xFF
    pub fn read_flash(&self, offset: u64, len: usize) -> Vec<u8> {
        let state = self.state();
        (0..len as u64)
            .map(|i| {
                state
                    .flash
                    .get((offset + i) as usize)
                    .copied()
                    .unwrap_or(0xFF)
            })
            .collect()
    }

    fn write_flash(&self, offset: u64, data: &[u8]) {
        let mut state = self.state();
        let start = offset as usize;
        let end = start + data.len();
        if state.flash.len() < end {
            state.flash.resize(end, 0xFF);
        }
        state.flash[start..end].copy_from_slice(data);
    }

    /// Sleep for one latency step, honouring cancellation and the deadline
    fn wait(
        &self,
        cancel: &CancelToken,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<(), BackendError> {
        let until = Instant::now() + self.config.latency;
        loop {
            if cancel.is_cancelled() {
                return Err(BackendError::Cancelled);
            }
            let now = Instant::now();
            if let Some((at, timeout)) = deadline {
                if now >= at {
                    return Err(BackendError::Timeout(timeout));
                }
            }
            if now >= until {
                return Ok(());
            }
            thread::sleep(WAIT_SLICE.min(until - now));
        }
    }

    fn progress(
        &self,
        label: &str,
        sink: &mut dyn FnMut(&str),
        cancel: &CancelToken,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<(), BackendError> {
        for step in 0..=PROGRESS_STEPS {
            sink(&format!("{} ({}%)", label, step * 100 / PROGRESS_STEPS));
            if step < PROGRESS_STEPS {
                self.wait(cancel, deadline)?;
            }
        }
        Ok(())
    }

    fn in_range(&self, start_lba: u64, bytes: u64) -> bool {
        start_lba
            .checked_mul(SECTOR_SIZE)
            .and_then(|s| s.checked_add(bytes))
            .is_some_and(|end| end <= self.config.capacity)
    }

    fn execute(
        &self,
        request: &Request,
        sink: &mut dyn FnMut(&str),
        cancel: &CancelToken,
        deadline: Option<(Instant, Duration)>,
    ) -> Exec {
        log::debug!("dummy: {}", request);
        self.state().history.push(request.to_string());
        self.wait(cancel, deadline)?;

        let (connected, mode, failing) = {
            let state = self.state();
            (
                state.connected,
                state.mode,
                state.failing.contains(&request.command()),
            )
        };

        if !connected {
            sink(NO_DEVICE);
            return Ok(if *request == Request::ListDevices { 0 } else { 1 });
        }
        if failing {
            sink(&format!("{} failed!", request.command()));
            return Ok(1);
        }
        if mode == DeviceMode::Maskrom && needs_loader(request) {
            sink(NOT_SUPPORTED);
            return Ok(1);
        }

        match request {
            Request::ListDevices => self.list_devices(mode, sink),
            Request::ChipInfo => self.chip_info(sink),
            Request::Capability => {
                sink("Capability:0D 01 00 00 00 00 00 00 ");
                for line in ["Direct LBA", "First 4m Access", "Read LBA", "New IDB"] {
                    sink(line);
                }
                Ok(0)
            }
            Request::FlashInfo => self.flash_info(sink),
            Request::FlashId => self.flash_id(sink),
            Request::PartitionTable => self.print_partitions(sink),
            Request::DownloadBoot { loader } => {
                if fs::metadata(loader).is_err() {
                    sink("Opening loader failed, exiting download boot!");
                    return Ok(1);
                }
                self.state().mode = DeviceMode::Loader;
                sink("Downloading bootloader succeeded.");
                Ok(0)
            }
            Request::UpgradeLoader { loader } => {
                if fs::metadata(loader).is_err() {
                    sink("Opening loader failed, exiting upgrade loader!");
                    return Ok(1);
                }
                sink("Upgrading loader succeeded.");
                Ok(0)
            }
            Request::Reset => {
                sink("Reset Device OK.");
                self.state().connected = false;
                Ok(0)
            }
            Request::ReadLba {
                start,
                count,
                output,
            } => self.read_lba(*start, *count, output, sink, cancel, deadline),
            Request::WriteLba { start, input } => {
                self.write_lba(*start, None, input, sink, cancel, deadline)
            }
            Request::WritePartition { name, input } => {
                let part = self.state().partitions.get(name).cloned();
                match part {
                    Some(part) => {
                        self.write_lba(part.start_lba, part.size_lba, input, sink, cancel, deadline)
                    }
                    None => {
                        sink(&format!("Not found the partition: {}", name));
                        Ok(1)
                    }
                }
            }
            Request::EraseFlash => {
                self.progress("Erasing flash", sink, cancel, deadline)?;
                self.state().flash.clear();
                sink("Erase flash OK.");
                Ok(0)
            }
            Request::TestDevice => {
                sink("Test Device OK.");
                Ok(0)
            }
            Request::ChangeStorage { code } => {
                if self.config.supported_storage.contains(code) {
                    self.state().storage = *code;
                    sink("Change Storage OK.");
                    Ok(0)
                } else {
                    sink("Change Storage Fail!");
                    Ok(1)
                }
            }
            Request::Pack { output } => match fs::write(output, b"RKBOOT\0dummy") {
                Ok(()) => {
                    sink("Pack boot OK.");
                    Ok(0)
                }
                Err(_) => {
                    sink(OPEN_FAILED);
                    Ok(1)
                }
            },
            Request::Unpack { input } => self.consume_file(input, "Unpack boot OK.", sink),
            Request::TagSpl { spl, .. } => self.consume_file(spl, "Tag spl OK.", sink),
            Request::WriteGpt { file } => self.write_table(file, PartitionSource::Gpt, "gpt", sink),
            Request::WriteParameter { file } => {
                self.write_table(file, PartitionSource::Parameter, "parameter", sink)
            }
        }
    }

    fn list_devices(&self, mode: DeviceMode, sink: &mut dyn FnMut(&str)) -> Exec {
        let word = match mode {
            DeviceMode::Maskrom => "Maskrom",
            DeviceMode::Loader => "Loader",
            DeviceMode::Msc => "MSC",
            DeviceMode::Unknown => "Unknown",
        };
        for i in 1..=self.config.devices {
            sink(&format!(
                "DevNo={}\tVid=0x{:04x},Pid=0x{:04x},LocationID={}\t{}",
                i,
                ROCKCHIP_VID,
                self.config.pid,
                100 + i,
                word
            ));
        }
        Ok(0)
    }

    fn chip_info(&self, sink: &mut dyn FnMut(&str)) -> Exec {
        let mut bytes: Vec<u8> = self.config.chip_signature.bytes().collect();
        bytes.resize(16, 0);
        let dump: Vec<String> = bytes.iter().map(|b| format!("{:02X}", b)).collect();
        sink(&format!("Chip Info:  {}", dump.join(" ")));
        Ok(0)
    }

    fn flash_info(&self, sink: &mut dyn FnMut(&str)) -> Exec {
        let capacity = self.config.capacity;
        let manufacturer = match self.storage() {
            9 => "WINBOND",
            _ => "SAMSUNG",
        };
        sink("Flash Info:");
        sink(&format!("\tManufacturer: {}, value=00", manufacturer));
        sink(&format!("\tFlash Size: {} MB", capacity / (1024 * 1024)));
        sink(&format!("\tFlash Size: {} Sectors", capacity / SECTOR_SIZE));
        sink("\tBlock Size: 512 KB");
        sink("\tPage Size: 2 KB");
        sink("\tECC Bits: 0");
        sink("\tAccess Time: 40");
        sink("\tFlash CS: Flash<0>");
        Ok(0)
    }

    fn flash_id(&self, sink: &mut dyn FnMut(&str)) -> Exec {
        let bytes: Vec<u8> = match self.storage() {
            9 => vec![0xEF, 0x40, self.config.capacity.max(1).ilog2() as u8],
            2 => b"SD   ".to_vec(),
            _ => b"EMMC ".to_vec(),
        };
        let hex: Vec<String> = bytes.iter().map(|b| format!("{:02X}", b)).collect();
        sink(&format!("Flash ID: {}", hex.join(" ")));
        Ok(0)
    }

    fn print_partitions(&self, sink: &mut dyn FnMut(&str)) -> Exec {
        let table = self.partitions();
        let banner = match table.source {
            PartitionSource::Parameter => "parameter",
            _ => "GPT",
        };
        sink(&format!("**********Partition Info({})**********", banner));
        sink("NO  LBA       Name                ");
        for (i, part) in table.iter().enumerate() {
            sink(&format!("{:02}  {:08X}  {}", i, part.start_lba, part.name));
        }
        Ok(0)
    }

    fn read_lba(
        &self,
        start: u64,
        count: u64,
        output: &Path,
        sink: &mut dyn FnMut(&str),
        cancel: &CancelToken,
        deadline: Option<(Instant, Duration)>,
    ) -> Exec {
        let len = count * SECTOR_SIZE;
        if !self.in_range(start, len) {
            sink("Read LBA failed, out of range!");
            return Ok(1);
        }
        self.progress("Read LBA to file", sink, cancel, deadline)?;
        let data = self.read_flash(start * SECTOR_SIZE, len as usize);
        if fs::write(output, data).is_err() {
            sink(OPEN_FAILED);
            return Ok(1);
        }
        Ok(0)
    }

    fn write_lba(
        &self,
        start: u64,
        limit_lba: Option<u64>,
        input: &Path,
        sink: &mut dyn FnMut(&str),
        cancel: &CancelToken,
        deadline: Option<(Instant, Duration)>,
    ) -> Exec {
        let Ok(data) = fs::read(input) else {
            sink(OPEN_FAILED);
            return Ok(1);
        };
        let len = data.len() as u64;
        if !self.in_range(start, len) || limit_lba.is_some_and(|l| len > l * SECTOR_SIZE) {
            sink("Write LBA failed, image too large!");
            return Ok(1);
        }
        self.progress("Write LBA from file", sink, cancel, deadline)?;
        self.write_flash(start * SECTOR_SIZE, &data);
        Ok(0)
    }

    fn consume_file(&self, path: &Path, done: &str, sink: &mut dyn FnMut(&str)) -> Exec {
        if fs::metadata(path).is_err() {
            sink(OPEN_FAILED);
            return Ok(1);
        }
        sink(done);
        Ok(0)
    }

    fn write_table(
        &self,
        file: &Path,
        source: PartitionSource,
        what: &str,
        sink: &mut dyn FnMut(&str),
    ) -> Exec {
        let Ok(param) = ParameterFile::load(file) else {
            sink(OPEN_FAILED);
            return Ok(1);
        };
        if param.partitions.is_empty() {
            sink(&format!("Write {} failed, no partitions in file!", what));
            return Ok(1);
        }
        let mut table = param.partitions;
        table.source = source;
        self.state().partitions = table;
        sink(&format!("Write {} ok.", what));
        Ok(0)
    }
}

/// Requests a boot ROM cannot serve without a loader running
fn needs_loader(request: &Request) -> bool {
    matches!(
        request,
        Request::Capability
            | Request::FlashInfo
            | Request::FlashId
            | Request::PartitionTable
            | Request::UpgradeLoader { .. }
            | Request::ReadLba { .. }
            | Request::WriteLba { .. }
            | Request::WritePartition { .. }
            | Request::EraseFlash
            | Request::ChangeStorage { .. }
            | Request::WriteGpt { .. }
            | Request::WriteParameter { .. }
    )
}

impl Backend for DummyTool {
    fn name(&self) -> &str {
        "dummy"
    }

    fn stream(
        &self,
        request: &Request,
        sink: &mut dyn FnMut(&str),
        cancel: &CancelToken,
    ) -> Result<i32, BackendError> {
        self.execute(request, sink, cancel, None)
    }

    fn capture(
        &self,
        request: &Request,
        timeout: Option<Duration>,
    ) -> Result<Output, BackendError> {
        let deadline = timeout.map(|t| (Instant::now() + t, t));
        let mut text = String::new();
        let exit_code = self.execute(
            request,
            &mut |line| {
                text.push_str(line);
                text.push('\n');
            },
            &CancelToken::new(),
            deadline,
        )?;
        Ok(Output { exit_code, text })
    }
}
