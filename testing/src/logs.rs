//! Log capture for assertions on `tracing` output.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Formatted log output collected by [`capture_logs`].
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    /// Everything captured so far
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    /// Whether any captured line contains `needle`
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.contents().contains(needle)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Writer handed out per event by [`CapturedLogs`].
#[derive(Debug)]
pub struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

/// Capture every event emitted on the current thread until the guard drops.
///
/// The subscriber is thread-local, so async tests should run on a
/// current-thread runtime for events from spawned tasks to be captured.
///
/// ```ignore
/// #[tokio::test(flavor = "current_thread")]
/// async fn test_logs_panics() {
///     let (logs, _guard) = capture_logs();
///     // ...
///     assert!(logs.contains("handler panicked"));
/// }
/// ```
#[must_use]
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .finish();

    (logs, tracing::subscriber::set_default(subscriber))
}

/// Install a global test subscriber honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_sees_structured_fields() {
        let (logs, guard) = capture_logs();
        tracing::warn!(topic = "orders", "dropping message");
        drop(guard);
        tracing::warn!("not captured");

        let contents = logs.contents();
        assert!(contents.contains("dropping message"));
        assert!(contents.contains("topic=\"orders\""));
        assert!(!contents.contains("not captured"));
    }
}
