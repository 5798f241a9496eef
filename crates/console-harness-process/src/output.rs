//! Merged process output with a read cursor.

use tokio::{
    io::{AsyncRead, AsyncReadExt},
    sync::mpsc,
    task::JoinHandle,
    time::Instant,
};

const READ_CHUNK: usize = 4096;

/// Outcome of waiting for more output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// New bytes were appended to the pending buffer.
    Data,
    /// Every writer has closed its pipe; no more bytes will arrive.
    Closed,
    /// The deadline passed first.
    TimedOut,
}

/// The combined stdout/stderr of a session.
///
/// Bytes arrive from background pump tasks in the order they were read.
/// Consumed bytes are dropped, so the pending buffer always starts at the
/// cursor.
pub struct OutputStream {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    pending: Vec<u8>,
    closed: bool,
}

impl OutputStream {
    /// Create a stream and the sender its pumps write into.
    #[must_use]
    pub fn channel() -> (mpsc::UnboundedSender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stream = Self {
            rx,
            pending: Vec::new(),
            closed: false,
        };
        (tx, stream)
    }

    /// Bytes received but not yet consumed.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Advance the cursor past `n` pending bytes.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.pending.len());
        self.pending.drain(..n);
    }

    /// Whether all pumps have finished.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Wait until more output arrives, the stream closes or `deadline` passes.
    pub async fn fill(&mut self, deadline: Instant) -> Fill {
        if self.closed {
            return Fill::Closed;
        }
        match tokio::time::timeout_at(deadline, self.rx.recv()).await {
            Ok(Some(chunk)) => {
                self.pending.extend_from_slice(&chunk);
                // Pick up anything else already queued.
                while let Ok(chunk) = self.rx.try_recv() {
                    self.pending.extend_from_slice(&chunk);
                }
                Fill::Data
            }
            Ok(None) => {
                self.closed = true;
                Fill::Closed
            }
            Err(_) => Fill::TimedOut,
        }
    }

    /// Consume everything until the stream closes or `deadline` passes.
    pub async fn read_to_end(&mut self, deadline: Instant) -> Vec<u8> {
        while self.fill(deadline).await == Fill::Data {}
        std::mem::take(&mut self.pending)
    }
}

/// Copy a pipe into the stream until EOF.
pub fn pump<R>(mut reader: R, tx: mpsc::UnboundedSender<Vec<u8>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(chunk[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::debug!(?err, "Output pipe read failed");
                    break;
                }
            }
        }
    })
}
