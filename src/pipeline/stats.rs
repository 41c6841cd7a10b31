// In: src/pipeline/stats.rs

use std::fmt;

/// Counters for one `OffloadSession::run`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub blocks_submitted: u64,
    pub blocks_drained: u64,
    /// Source bytes consumed, framing included.
    pub bytes_read: u64,
    /// Sink bytes written, framing included.
    pub bytes_written: u64,
    /// Submissions rejected with Busy before being accepted.
    pub submit_retries: u64,
    /// Completion polls that returned NotReady or Busy.
    pub completion_retries: u64,
    /// Most slots in flight at any one time.
    pub peak_in_flight: usize,
}

impl SessionStats {
    /// Output size as a fraction of input size.
    pub fn ratio(&self) -> f64 {
        if self.bytes_read == 0 {
            0.0
        } else {
            self.bytes_written as f64 / self.bytes_read as f64
        }
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} blocks, {} -> {} bytes ({:.3}), retries submit={} completion={}, peak in flight {}",
            self.blocks_drained,
            self.bytes_read,
            self.bytes_written,
            self.ratio(),
            self.submit_retries,
            self.completion_retries,
            self.peak_in_flight
        )
    }
}
