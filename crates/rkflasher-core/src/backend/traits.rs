//! Backend trait definitions

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::Request;

/// Errors from running a request on a backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The tool binary could not be found
    #[error("rkdeveloptool not found: {0}")]
    NotFound(String),

    /// The tool could not be started
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying error
        source: io::Error,
    },

    /// Reading the tool's output failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The tool did not finish in time and was killed
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The request was cancelled and the tool was killed
    #[error("cancelled")]
    Cancelled,
}

/// Exit status and combined stdout/stderr text of one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    /// Process exit code; -1 when killed by a signal
    pub exit_code: i32,
    /// Combined output, one line per `\n`
    pub text: String,
}

impl Output {
    /// Whether the tool exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Something that can execute rkdeveloptool requests
///
/// The production implementation spawns the real binary. Test and demo
/// implementations answer from in-memory state. Implementations must be
/// usable from several threads at once: the device poller, the partition
/// refresher and batch workers all share one backend.
pub trait Backend: Send + Sync {
    /// Short name for logs ("rkdeveloptool", "dummy")
    fn name(&self) -> &str;

    /// Run a request and stream its output.
    ///
    /// `sink` receives each output line as soon as it is available, with
    /// `\r`-separated progress redraws delivered as separate lines. Returns
    /// the exit code. When `cancel` is set the tool is killed and
    /// [`BackendError::Cancelled`] is returned.
    fn stream(
        &self,
        request: &Request,
        sink: &mut dyn FnMut(&str),
        cancel: &CancelToken,
    ) -> Result<i32, BackendError>;

    /// Run a request to completion and collect its output.
    ///
    /// With a timeout the tool is killed once it elapses and
    /// [`BackendError::Timeout`] is returned.
    fn capture(&self, request: &Request, timeout: Option<Duration>) -> Result<Output, BackendError>;
}

impl<B: Backend + ?Sized> Backend for Arc<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn stream(
        &self,
        request: &Request,
        sink: &mut dyn FnMut(&str),
        cancel: &CancelToken,
    ) -> Result<i32, BackendError> {
        (**self).stream(request, sink, cancel)
    }

    fn capture(
        &self,
        request: &Request,
        timeout: Option<Duration>,
    ) -> Result<Output, BackendError> {
        (**self).capture(request, timeout)
    }
}

/// Helper for implementing [`Backend::capture`] on top of [`Backend::stream`]
/// for backends that cannot overrun a timeout.
pub fn capture_via_stream<B: Backend + ?Sized>(
    backend: &B,
    request: &Request,
) -> Result<Output, BackendError> {
    let mut text = String::new();
    let exit_code = backend.stream(
        request,
        &mut |line| {
            text.push_str(line);
            text.push('\n');
        },
        &CancelToken::new(),
    )?;
    Ok(Output { exit_code, text })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl Backend for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn stream(
            &self,
            request: &Request,
            sink: &mut dyn FnMut(&str),
            cancel: &CancelToken,
        ) -> Result<i32, BackendError> {
            if cancel.is_cancelled() {
                return Err(BackendError::Cancelled);
            }
            sink(request.command());
            sink("done");
            Ok(0)
        }

        fn capture(
            &self,
            request: &Request,
            _timeout: Option<Duration>,
        ) -> Result<Output, BackendError> {
            capture_via_stream(self, request)
        }
    }

    #[test]
    fn test_capture_via_stream() {
        let out = Echo.capture(&Request::FlashId, None).unwrap();
        assert!(out.success());
        assert_eq!(out.text, "rid\ndone\n");
    }

    #[test]
    fn test_arc_backend_and_cancel() {
        let backend: Arc<dyn Backend> = Arc::new(Echo);
        assert_eq!(backend.name(), "echo");

        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        let err = backend
            .stream(&Request::Reset, &mut |_| {}, &token)
            .unwrap_err();
        assert!(matches!(err, BackendError::Cancelled));
    }
}
