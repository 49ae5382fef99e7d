//! Cancellation plumbing for blocking inspection passes.

use datalint_core::{DatalintError, Result};
use std::io::{self, BufRead, Read};
use tokio_util::sync::CancellationToken;

const CANCELLED_MESSAGE: &str = "inspection cancelled";

/// Per-run context handed to the sniffer and validators.
///
/// Validators call [`checkpoint`](Self::checkpoint) between records and wrap
/// their readers with [`guard`](Self::guard), so a cancelled or timed-out run
/// stops at the next chunk boundary.
#[derive(Debug, Clone, Default)]
pub struct InspectionContext {
    cancel: CancellationToken,
}

impl InspectionContext {
    /// Creates a context that is never cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context tied to a cancellation token.
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// The underlying token.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fails with [`DatalintError::Cancelled`] once cancellation was requested.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(DatalintError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Wraps a reader so that reads fail once cancellation was requested.
    pub fn guard<R>(&self, inner: R) -> Guarded<R> {
        Guarded {
            inner,
            cancel: self.cancel.clone(),
        }
    }

    /// Maps an I/O failure to a read error, or to `Cancelled` when the
    /// failure came from a guarded reader.
    pub fn io_error(&self, artifact: &str, err: io::Error) -> DatalintError {
        if self.is_cancelled() {
            DatalintError::Cancelled
        } else {
            DatalintError::read(artifact, err)
        }
    }
}

/// Reader wrapper that checks a cancellation token on every refill.
#[derive(Debug)]
pub struct Guarded<R> {
    inner: R,
    cancel: CancellationToken,
}

impl<R> Guarded<R> {
    fn check(&self) -> io::Result<()> {
        if self.cancel.is_cancelled() {
            // Not `Interrupted`: std's read loops retry those forever.
            Err(io::Error::other(CANCELLED_MESSAGE))
        } else {
            Ok(())
        }
    }
}

impl<R: Read> Read for Guarded<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check()?;
        self.inner.read(buf)
    }
}

impl<R: BufRead> BufRead for Guarded<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.check()?;
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_after_cancel() {
        let token = CancellationToken::new();
        let ctx = InspectionContext::with_cancellation(token.clone());
        assert!(ctx.checkpoint().is_ok());

        token.cancel();
        assert!(matches!(ctx.checkpoint(), Err(DatalintError::Cancelled)));
    }

    #[test]
    fn test_guarded_reader_stops_after_cancel() {
        let token = CancellationToken::new();
        let ctx = InspectionContext::with_cancellation(token.clone());
        let mut reader = ctx.guard(&b"abcdef"[..]);

        let mut buf = [0u8; 3];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);

        token.cancel();
        let err = reader.read(&mut buf).unwrap_err();
        assert!(matches!(ctx.io_error("x", err), DatalintError::Cancelled));
    }
}
