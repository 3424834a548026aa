//! Output tee - fans one stream of bytes out to every registered sink
//!
//! Subprocess output cannot be intercepted synchronously by the thread that
//! is blocked waiting on the child, so process steps write into a shared
//! channel and a background consumer task replicates each chunk, verbatim, to
//! every sink (console, log file). Informational messages from the engine
//! itself are written synchronously via [`Tee::write_direct`], with console
//! sinks optionally excluded when the content was already echoed there.
//!
//! Ordering is relative-order-preserving per path (direct vs. channel-fed),
//! not a strict total order across both.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

/// How long the consumer blocks waiting for data before re-checking the stop
/// flag. Bounds how late a stop request can be observed.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A single output destination.
#[derive(Debug)]
pub enum Sink {
    /// The process's own stderr stream
    Stderr,
    /// An append-mode log file
    File { path: PathBuf, file: std::fs::File },
    /// Shared in-memory capture, for tests and embedders
    Buffer(Arc<Mutex<Vec<u8>>>),
}

impl Sink {
    /// Open `path` in append mode (created if missing) as a log sink.
    pub fn append_file(path: impl AsRef<Path>) -> io::Result<Sink> {
        let path = path.as_ref().to_path_buf();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Sink::File { path, file })
    }

    /// Create an in-memory sink plus a handle for reading it back.
    pub fn buffer() -> (Sink, Arc<Mutex<Vec<u8>>>) {
        let shared = Arc::new(Mutex::new(Vec::new()));
        (Sink::Buffer(shared.clone()), shared)
    }

    /// Console sinks are "identity" duplicates of what the main thread may
    /// already have printed synchronously; logical writes can exclude them to
    /// avoid double-printing.
    pub fn is_console(&self) -> bool {
        matches!(self, Sink::Stderr)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            Sink::Stderr => {
                let mut err = io::stderr().lock();
                err.write_all(bytes)?;
                err.flush()
            }
            Sink::File { file, .. } => {
                file.write_all(bytes)?;
                file.flush()
            }
            Sink::Buffer(shared) => {
                let mut buf = shared
                    .lock()
                    .map_err(|_| io::Error::new(io::ErrorKind::Other, "buffer sink poisoned"))?;
                buf.extend_from_slice(bytes);
                Ok(())
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            Sink::Stderr => "stderr".to_string(),
            Sink::File { path, .. } => path.display().to_string(),
            Sink::Buffer(_) => "buffer".to_string(),
        }
    }
}

/// Cloneable write endpoint feeding the tee's channel.
///
/// Handed to subprocess pump tasks and callable steps. Writes issued after
/// the consumer has exited are dropped; delivery after a stop request is
/// best-effort by contract.
#[derive(Debug, Clone)]
pub struct TeeWriter {
    tx: UnboundedSender<Vec<u8>>,
}

impl TeeWriter {
    pub fn write(&self, bytes: &[u8]) {
        if !bytes.is_empty() {
            let _ = self.tx.send(bytes.to_vec());
        }
    }

    pub fn write_str(&self, text: &str) {
        self.write(text.as_bytes());
    }
}

/// The output multiplexer: a write endpoint, a sink set, and a background
/// consumer draining one into the other.
#[derive(Debug)]
pub struct Tee {
    tx: UnboundedSender<Vec<u8>>,
    sinks: Arc<Mutex<Vec<Sink>>>,
    stop: Arc<AtomicBool>,
    consumer: Option<JoinHandle<()>>,
}

impl Tee {
    /// Start the tee over the given sinks. The consumer task runs
    /// immediately.
    pub fn spawn(sinks: Vec<Sink>) -> Tee {
        let (tx, rx) = mpsc::unbounded_channel();
        let sinks = Arc::new(Mutex::new(sinks));
        let stop = Arc::new(AtomicBool::new(false));
        let consumer = tokio::spawn(consume(rx, sinks.clone(), stop.clone()));

        Tee {
            tx,
            sinks,
            stop,
            consumer: Some(consumer),
        }
    }

    /// A fresh write endpoint for the channel-fed path.
    pub fn writer(&self) -> TeeWriter {
        TeeWriter {
            tx: self.tx.clone(),
        }
    }

    /// Synchronously replicate `text` to every sink from the calling task.
    ///
    /// With `exclude_console` set, console sinks are skipped because the
    /// content was already echoed there (e.g. the interactive prompt).
    pub fn write_direct(&self, text: &str, exclude_console: bool) {
        fan_out(&self.sinks, text.as_bytes(), exclude_console);
    }

    /// Timestamped informational line, fanned out to every sink.
    pub fn info(&self, msg: &str) {
        self.write_direct(&format_message("INFO", msg), false);
    }

    pub fn warn(&self, msg: &str) {
        self.write_direct(&format_message("WARN", msg), false);
    }

    pub fn error(&self, msg: &str) {
        self.write_direct(&format_message("ERROR", msg), false);
    }

    /// Stop the consumer. Idempotent.
    ///
    /// Bytes written to the endpoint before this call are still flushed to
    /// every sink; bytes written afterward are not guaranteed delivery.
    pub async fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        // zero-length wake sentinel so the consumer notices the flag without
        // waiting out a full poll interval
        let _ = self.tx.send(Vec::new());
        if let Some(consumer) = self.consumer.take() {
            if consumer.await.is_err() {
                warn!("tee consumer task panicked");
            }
        }
    }
}

/// Format a user-visible pipeline message in the fixed
/// `LEVEL[timestamp]: msg` shape shared by the engine and the steps.
pub fn format_message(level: &str, msg: &str) -> String {
    format!(
        "{}[{}]: {}\n",
        level,
        chrono::Utc::now().format("%Y/%m/%d-%H:%M:%S"),
        msg
    )
}

/// Write `bytes` once to every sink, dropping any sink whose write fails.
fn fan_out(sinks: &Mutex<Vec<Sink>>, bytes: &[u8], exclude_console: bool) {
    let mut sinks = match sinks.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    sinks.retain_mut(|sink| {
        if exclude_console && sink.is_console() {
            return true;
        }
        match sink.write_all(bytes) {
            Ok(()) => true,
            Err(e) => {
                warn!("dropping output sink {}: {}", sink.describe(), e);
                false
            }
        }
    });
}

async fn consume(
    mut rx: UnboundedReceiver<Vec<u8>>,
    sinks: Arc<Mutex<Vec<Sink>>>,
    stop: Arc<AtomicBool>,
) {
    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }
        match timeout(POLL_INTERVAL, rx.recv()).await {
            Ok(Some(chunk)) => {
                // drain everything immediately available into one write
                let mut buf = chunk;
                while let Ok(more) = rx.try_recv() {
                    buf.extend_from_slice(&more);
                }
                if !buf.is_empty() {
                    fan_out(&sinks, &buf, false);
                }
            }
            // all write endpoints dropped
            Ok(None) => break,
            // poll timeout, re-check the stop flag
            Err(_) => {}
        }
    }

    // a stop request must not truncate output already in the channel
    let mut buf = Vec::new();
    while let Ok(more) = rx.try_recv() {
        buf.extend_from_slice(&more);
    }
    if !buf.is_empty() {
        fan_out(&sinks, &buf, false);
    }
    debug!("tee consumer exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writer_content_reaches_every_sink() {
        let (sink_a, buf_a) = Sink::buffer();
        let (sink_b, buf_b) = Sink::buffer();
        let mut tee = Tee::spawn(vec![sink_a, sink_b]);

        let writer = tee.writer();
        writer.write_str("hello from a step\n");
        tee.stop().await;

        let a = buf_a.lock().unwrap().clone();
        let b = buf_b.lock().unwrap().clone();
        assert_eq!(a, b"hello from a step\n");
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_stop_flushes_pending_chunks() {
        let (sink, buf) = Sink::buffer();
        let mut tee = Tee::spawn(vec![sink]);

        // write and stop immediately, without yielding to the consumer
        let writer = tee.writer();
        writer.write_str("first ");
        writer.write_str("second");
        tee.stop().await;

        assert_eq!(buf.lock().unwrap().as_slice(), b"first second");
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (sink, buf) = Sink::buffer();
        let mut tee = Tee::spawn(vec![sink]);

        tee.writer().write_str("once\n");
        tee.stop().await;
        tee.stop().await;

        assert_eq!(buf.lock().unwrap().as_slice(), b"once\n");
    }

    #[tokio::test]
    async fn test_write_direct_is_synchronous() {
        let (sink, buf) = Sink::buffer();
        let mut tee = Tee::spawn(vec![sink]);

        tee.write_direct("direct message\n", false);
        // visible before the consumer ever wakes
        assert_eq!(buf.lock().unwrap().as_slice(), b"direct message\n");
        tee.stop().await;
    }

    #[tokio::test]
    async fn test_exclude_console_skips_console_sinks_only() {
        let (sink, buf) = Sink::buffer();
        let mut tee = Tee::spawn(vec![Sink::Stderr, sink]);

        tee.write_direct("echoed elsewhere\n", true);
        assert_eq!(buf.lock().unwrap().as_slice(), b"echoed elsewhere\n");
        tee.stop().await;
    }

    #[tokio::test]
    async fn test_writes_after_stop_are_dropped_silently() {
        let (sink, buf) = Sink::buffer();
        let mut tee = Tee::spawn(vec![sink]);
        let writer = tee.writer();

        tee.stop().await;
        writer.write_str("too late");

        assert!(buf.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_sink_is_isolated_not_fatal() {
        let (good, good_buf) = Sink::buffer();
        let (bad, bad_buf) = Sink::buffer();

        // poison the bad sink's mutex so every write to it fails
        let poison = bad_buf.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poison.lock().unwrap();
            panic!("poison");
        })
        .join();

        let mut tee = Tee::spawn(vec![bad, good]);
        tee.write_direct("survives\n", false);
        tee.write_direct("still going\n", false);
        tee.stop().await;

        let good = String::from_utf8_lossy(&good_buf.lock().unwrap()).into_owned();
        assert!(good.contains("survives"));
        assert!(good.contains("still going"));
    }

    #[test]
    fn test_console_sink_classification() {
        assert!(Sink::Stderr.is_console());
        let (sink, _) = Sink::buffer();
        assert!(!sink.is_console());
    }
}
