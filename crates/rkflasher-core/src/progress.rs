//! Progress extraction from streamed tool output
//!
//! Long-running commands (`rl`, `wl`, `wlx`, `db`) print lines such as
//! `Write LBA from file (45%)`. The last `<digits>%` token on a line is the
//! current percentage. The tracker never reports 100 while the process is
//! still running; only the exit status decides between 100 and 0.

use once_cell::sync::Lazy;
use regex::Regex;

static PERCENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)%").unwrap());

/// Highest value reported before the process exits
pub const RUNNING_CAP: u8 = 99;

/// Extract the last `<digits>%` token of a line, clamped to 100
pub fn extract_percent(line: &str) -> Option<u8> {
    PERCENT
        .captures_iter(line)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().parse::<u64>().ok())
        .last()
        .map(|value| value.min(100) as u8)
}

/// Tracks progress for one command run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressTracker {
    percent: u8,
    finished: bool,
}

impl ProgressTracker {
    /// Create a tracker at 0%
    pub fn new() -> Self {
        Self::default()
    }

    /// Current percentage
    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Feed one output line. Returns the new percentage if the line carried one.
    pub fn observe_line(&mut self, line: &str) -> Option<u8> {
        if self.finished {
            return None;
        }
        let value = extract_percent(line)?.min(RUNNING_CAP);
        self.percent = value;
        Some(value)
    }

    /// Record the process exit and return the final percentage
    pub fn finish(&mut self, success: bool) -> u8 {
        self.finished = true;
        self.percent = if success { 100 } else { 0 };
        self.percent
    }
}
