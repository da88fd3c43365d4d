use crate::{Result, StoreBridgeError};
use tracing::warn;

/// Collects failures from a sequence of resource releases.
///
/// Every release is attempted regardless of earlier failures. Only the last
/// recorded failure is surfaced by [`ReleaseErrors::finish`]; earlier ones are
/// logged and counted, so callers can still tell that information was dropped.
#[derive(Debug, Default)]
pub struct ReleaseErrors {
    last: Option<(&'static str, StoreBridgeError)>,
    discarded: usize,
}

impl ReleaseErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of releasing `resource`
    pub fn record(&mut self, resource: &'static str, result: Result<()>) {
        let Err(err) = result else {
            return;
        };

        if let Some((previous, previous_err)) = self.last.take() {
            warn!("Discarding release failure of {}: {} (superseded by failure of {})", previous, previous_err, resource);
            self.discarded += 1;
        }
        self.last = Some((resource, err));
    }

    /// Number of failures that were superseded by a later one
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_none()
    }

    /// Surface the last recorded failure, if any
    pub fn finish(self) -> Result<()> {
        match self.last {
            Some((_, err)) => Err(err),
            None => Ok(()),
        }
    }
}

/// Wrap a driver error raised while talking to the store as a fatal error
pub fn fatal(context: &str, err: impl std::fmt::Display) -> StoreBridgeError {
    StoreBridgeError::Fatal(format!("{context}: {err}"))
}
