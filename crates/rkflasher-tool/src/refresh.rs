//! Partition table refresh worker
//!
//! Reading the partition table is requested from several places: a device
//! showing up, a storage switch, a `gpt`/`prm` write. A single worker thread
//! serves them through a one-slot mailbox. A request while a read is in
//! flight is remembered and causes exactly one more read once the current
//! one finishes, however many requests arrived in between.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rkflasher_core::backend::{Backend, Output, Request};
use rkflasher_core::partition::PartitionTable;

use crate::error::{Result, ToolError};

/// Default bound on one `ppt` invocation
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// What [`PartitionRefresher::request`] did with a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRequest {
    /// A read was started
    Started,
    /// A read is in flight; one more will follow it
    Coalesced,
}

/// Turn `ppt` output into a table, treating a non-zero exit as failure
pub fn table_from_output(out: Output) -> Result<PartitionTable> {
    if !out.success() {
        return Err(ToolError::CommandFailed {
            code: out.exit_code,
            output: out.text,
        });
    }
    let table = PartitionTable::from_ppt(&out.text);
    log::debug!("Read {} partitions ({})", table.len(), table.source);
    Ok(table)
}

#[derive(Debug, Default)]
struct State {
    /// A read is queued or running
    busy: bool,
    /// The worker has not picked up the queued read yet
    queued: bool,
    /// Another read was requested while busy
    pending: bool,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Partition table refresh worker
pub struct PartitionRefresher {
    shared: Arc<Shared>,
    results: Receiver<Result<PartitionTable>>,
    thread: Option<JoinHandle<()>>,
}

impl PartitionRefresher {
    /// Start the worker thread
    pub fn spawn(backend: Arc<dyn Backend>, timeout: Duration) -> std::io::Result<Self> {
        let shared = Arc::new(Shared::default());
        let (tx, rx) = mpsc::channel();
        let worker_shared = shared.clone();
        let thread = thread::Builder::new()
            .name("partition-refresh".into())
            .spawn(move || worker(backend, timeout, worker_shared, tx))?;
        Ok(Self {
            shared,
            results: rx,
            thread: Some(thread),
        })
    }

    /// Ask for a fresh partition table
    pub fn request(&self) -> RefreshRequest {
        let mut state = self.shared.lock();
        if state.busy {
            state.pending = true;
            log::debug!("Partition refresh coalesced");
            RefreshRequest::Coalesced
        } else {
            state.busy = true;
            state.queued = true;
            self.shared.wake.notify_one();
            RefreshRequest::Started
        }
    }

    /// Whether a read is queued or running
    pub fn is_busy(&self) -> bool {
        self.shared.lock().busy
    }

    /// Channel the results arrive on, one per read
    pub fn results(&self) -> &Receiver<Result<PartitionTable>> {
        &self.results
    }
}

impl Drop for PartitionRefresher {
    fn drop(&mut self) {
        self.shared.lock().shutdown = true;
        self.shared.wake.notify_one();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn worker(
    backend: Arc<dyn Backend>,
    timeout: Duration,
    shared: Arc<Shared>,
    tx: Sender<Result<PartitionTable>>,
) {
    loop {
        {
            let mut state = shared.lock();
            while !state.queued && !state.shutdown {
                state = shared.wake.wait(state).unwrap_or_else(|e| e.into_inner());
            }
            if state.shutdown {
                return;
            }
            state.queued = false;
        }

        let result = backend
            .capture(&Request::PartitionTable, Some(timeout))
            .map_err(ToolError::from)
            .and_then(table_from_output);
        if let Err(e) = &result {
            log::debug!("Partition refresh failed: {}", e);
        }

        // The receiver must see the settled state once it has the result
        {
            let mut state = shared.lock();
            state.queued = state.pending;
            state.busy = state.pending;
            state.pending = false;
        }
        if tx.send(result).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rkflasher_dummy::{default_partitions, DummyConfig, DummyTool};

    const WAIT: Duration = Duration::from_secs(2);

    #[test]
    fn test_single_request() {
        let refresher =
            PartitionRefresher::spawn(Arc::new(DummyTool::new_default()), DEFAULT_REFRESH_TIMEOUT)
                .unwrap();
        assert_eq!(refresher.request(), RefreshRequest::Started);
        let table = refresher.results().recv_timeout(WAIT).unwrap().unwrap();
        assert_eq!(table, default_partitions());
    }

    #[test]
    fn test_requests_coalesce() {
        let tool = Arc::new(DummyTool::new(DummyConfig {
            latency: Duration::from_millis(50),
            ..Default::default()
        }));
        let refresher = PartitionRefresher::spawn(tool.clone(), DEFAULT_REFRESH_TIMEOUT).unwrap();

        assert_eq!(refresher.request(), RefreshRequest::Started);
        assert_eq!(refresher.request(), RefreshRequest::Coalesced);
        assert_eq!(refresher.request(), RefreshRequest::Coalesced);

        assert!(refresher.results().recv_timeout(WAIT).unwrap().is_ok());
        assert!(refresher.results().recv_timeout(WAIT).unwrap().is_ok());
        assert!(refresher
            .results()
            .recv_timeout(Duration::from_millis(300))
            .is_err());
        assert_eq!(tool.history(), vec!["ppt", "ppt"]);
        assert!(!refresher.is_busy());
    }

    #[test]
    fn test_failure_is_reported() {
        let tool = DummyTool::new_default();
        tool.fail_command("ppt");
        let refresher = PartitionRefresher::spawn(Arc::new(tool), DEFAULT_REFRESH_TIMEOUT).unwrap();
        refresher.request();
        let err = refresher.results().recv_timeout(WAIT).unwrap().unwrap_err();
        assert!(matches!(err, ToolError::CommandFailed { code: 1, .. }));

        // Idle again after a failure
        assert_eq!(refresher.request(), RefreshRequest::Started);
    }
}
