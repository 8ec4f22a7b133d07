//! Terminal progress for streamed commands

use indicatif::{ProgressBar, ProgressStyle};
use rkflasher_core::backend::Request;
use rkflasher_core::progress::extract_percent;
use rkflasher_tool::{RunObserver, RunReport};
use std::time::Duration;

/// Create the percentage bar style
fn create_progress_bar_style() -> Result<ProgressStyle, Box<dyn std::error::Error>> {
    Ok(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")?
        .progress_chars("#>-"))
}

/// Shows one progress bar per command and prints the tool's other output
/// above it
#[derive(Default)]
pub struct BarObserver {
    bar: Option<ProgressBar>,
    message: String,
}

impl BarObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunObserver for BarObserver {
    fn on_start(&mut self, _request: &Request, description: &str) {
        let pb = ProgressBar::new(100);
        pb.set_style(create_progress_bar_style().unwrap_or_else(|_| ProgressStyle::default_bar()));
        pb.set_message(description.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        self.message = description.to_string();
        self.bar = Some(pb);
    }

    fn on_line(&mut self, line: &str) {
        // Progress redraws only move the bar
        if extract_percent(line).is_some() {
            return;
        }
        match &self.bar {
            Some(pb) => pb.println(line),
            None => println!("{}", line),
        }
    }

    fn on_progress(&mut self, percent: u8) {
        if let Some(pb) = &self.bar {
            pb.set_position(u64::from(percent));
        }
    }

    fn on_finish(&mut self, report: &RunReport) {
        if let Some(pb) = self.bar.take() {
            if report.success {
                pb.finish_with_message(format!("{} OK", self.message));
            } else {
                pb.abandon_with_message(format!(
                    "{} (exit code {})",
                    self.message, report.exit_code
                ));
            }
        }
    }
}

impl Drop for BarObserver {
    fn drop(&mut self) {
        // Cancelled or failed to spawn: no on_finish
        if let Some(pb) = self.bar.take() {
            pb.abandon();
        }
    }
}
