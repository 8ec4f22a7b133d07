//! rkdeveloptool process backend
//!
//! Each request spawns the tool with piped stdout/stderr. Two reader threads
//! split the output into lines and forward them over a channel while the
//! calling thread polls the child for exit, cancellation and timeout.

use std::env;
use std::ffi::{OsStr, OsString};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rkflasher_core::backend::{Backend, BackendError, CancelToken, Output, Request};

/// Binary name looked up on `PATH`
pub const TOOL_NAME: &str = "rkdeveloptool";

/// How often the child is polled for exit and cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Timeout for the `--version` startup check
const VERSION_TIMEOUT: Duration = Duration::from_secs(3);

/// Splits a byte stream into lines on `\n` and on `\r`.
///
/// rkdeveloptool redraws progress with bare carriage returns, so a transfer
/// prints `... (10%)\r... (20%)\r` with no newline until it finishes.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    /// Create an empty splitter
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, emitting every completed non-empty line
    pub fn push(&mut self, chunk: &[u8], emit: &mut dyn FnMut(String)) {
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                self.flush(emit);
            } else {
                self.pending.push(byte);
            }
        }
    }

    /// Emit whatever is left after the stream ended
    pub fn finish(mut self, emit: &mut dyn FnMut(String)) {
        self.flush(emit);
    }

    fn flush(&mut self, emit: &mut dyn FnMut(String)) {
        let line = String::from_utf8_lossy(&self.pending).trim_end().to_string();
        self.pending.clear();
        if !line.trim().is_empty() {
            emit(line);
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut reader: R, tx: Sender<String>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut splitter = LineSplitter::new();
        let mut buf = [0u8; 4096];
        let mut send = |line: String| {
            let _ = tx.send(line);
        };
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => splitter.push(&buf[..n], &mut send),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        splitter.finish(&mut send);
    })
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Run `program args...`, streaming output lines to `sink`
fn run_child(
    program: &Path,
    args: &[OsString],
    sink: &mut dyn FnMut(&str),
    cancel: &CancelToken,
    timeout: Option<Duration>,
) -> Result<i32, BackendError> {
    log::debug!(
        "Running {} {}",
        program.display(),
        args.iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                BackendError::NotFound(program.display().to_string())
            } else {
                BackendError::Spawn {
                    program: program.display().to_string(),
                    source,
                }
            }
        })?;

    let (tx, rx) = mpsc::channel();
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, tx.clone()));
    }
    drop(tx);

    // On kill the readers are left to finish on their own: a grandchild
    // may still hold the pipes open.
    let started = Instant::now();
    let status = loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => sink(&line),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => thread::sleep(POLL_INTERVAL),
        }

        if cancel.is_cancelled() {
            log::debug!("Cancelling {}", program.display());
            kill(&mut child);
            return Err(BackendError::Cancelled);
        }
        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                log::debug!("{} timed out after {:?}", program.display(), limit);
                kill(&mut child);
                return Err(BackendError::Timeout(limit));
            }
        }
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => {
                kill(&mut child);
                return Err(BackendError::Io(e));
            }
        }
    };

    // The readers end at EOF, which closes the channel
    for line in rx {
        sink(&line);
    }
    for reader in readers {
        let _ = reader.join();
    }

    let code = status.code().unwrap_or(-1);
    log::debug!("{} exited with code {}", program.display(), code);
    Ok(code)
}

/// Search `PATH` for an executable
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let candidates: Vec<OsString> = if cfg!(windows) {
        vec![format!("{}.exe", name).into(), name.into()]
    } else {
        vec![name.into()]
    };
    let path = env::var_os("PATH")?;
    env::split_paths(&path).find_map(|dir| {
        candidates
            .iter()
            .map(|c| dir.join(c))
            .find(|p| p.is_file())
    })
}

/// Backend that runs the real rkdeveloptool binary
#[derive(Debug, Clone)]
pub struct RkDevelopTool {
    program: PathBuf,
    version: Option<String>,
}

impl RkDevelopTool {
    /// Locate the tool and check that it starts.
    ///
    /// `explicit` overrides the `PATH` search. The tool only has to start:
    /// a non-zero exit from `--version` is accepted, since some builds do not
    /// know the flag.
    pub fn locate(explicit: Option<&Path>) -> Result<Self, BackendError> {
        let program = match explicit {
            Some(path) => path.to_path_buf(),
            None => find_in_path(TOOL_NAME)
                .ok_or_else(|| BackendError::NotFound(format!("{} not in PATH", TOOL_NAME)))?,
        };
        Self::with_program(program)
    }

    /// Use a specific binary, checking that it starts
    pub fn with_program(program: PathBuf) -> Result<Self, BackendError> {
        let mut first_line = None;
        let args = [OsString::from("--version")];
        run_child(
            &program,
            &args,
            &mut |line| {
                if first_line.is_none() {
                    first_line = Some(line.trim().to_string());
                }
            },
            &CancelToken::new(),
            Some(VERSION_TIMEOUT),
        )?;
        log::debug!(
            "Using {} ({})",
            program.display(),
            first_line.as_deref().unwrap_or("version unknown")
        );
        Ok(Self {
            program,
            version: first_line,
        })
    }

    /// Path of the binary
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// First line of `--version` output
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

impl Backend for RkDevelopTool {
    fn name(&self) -> &str {
        self.program
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or(TOOL_NAME)
    }

    fn stream(
        &self,
        request: &Request,
        sink: &mut dyn FnMut(&str),
        cancel: &CancelToken,
    ) -> Result<i32, BackendError> {
        run_child(&self.program, &request.args(), sink, cancel, None)
    }

    fn capture(
        &self,
        request: &Request,
        timeout: Option<Duration>,
    ) -> Result<Output, BackendError> {
        let mut text = String::new();
        let exit_code = run_child(
            &self.program,
            &request.args(),
            &mut |line| {
                text.push_str(line);
                text.push('\n');
            },
            &CancelToken::new(),
            timeout,
        )?;
        Ok(Output { exit_code, text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(chunks: &[&[u8]]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut splitter = LineSplitter::new();
        for chunk in chunks {
            splitter.push(chunk, &mut |l| lines.push(l));
        }
        splitter.finish(&mut |l| lines.push(l));
        lines
    }

    #[test]
    fn test_split_carriage_returns() {
        let lines = split(&[b"Write LBA from file (10%)\rWrite LBA from file (20%)\r\n"]);
        assert_eq!(
            lines,
            vec!["Write LBA from file (10%)", "Write LBA from file (20%)"]
        );
    }

    #[test]
    fn test_split_across_chunks() {
        let lines = split(&[b"Flash Si", b"ze: 128MB\nNO  LBA", b"  Name"]);
        assert_eq!(lines, vec!["Flash Size: 128MB", "NO  LBA  Name"]);
    }

    #[test]
    fn test_split_skips_blank() {
        assert!(split(&[b"\r\n\r\n  \n"]).is_empty());
    }

    #[test]
    fn test_locate_missing_binary() {
        let err = RkDevelopTool::locate(Some(Path::new("/nonexistent/rkdeveloptool"))).unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_child_collects_both_streams() {
        let args: Vec<OsString> = vec!["-c".into(), "echo out; echo err 1>&2; exit 3".into()];
        let mut lines = Vec::new();
        let code = run_child(
            Path::new("/bin/sh"),
            &args,
            &mut |l| lines.push(l.to_string()),
            &CancelToken::new(),
            None,
        )
        .unwrap();
        assert_eq!(code, 3);
        lines.sort();
        assert_eq!(lines, vec!["err", "out"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_child_timeout_kills() {
        let args: Vec<OsString> = vec!["-c".into(), "exec sleep 5".into()];
        let started = Instant::now();
        let err = run_child(
            Path::new("/bin/sh"),
            &args,
            &mut |_| {},
            &CancelToken::new(),
            Some(Duration::from_millis(100)),
        )
        .unwrap_err();
        assert!(matches!(err, BackendError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
