use tracing::{debug, error};

/// Tags overlapping listing fetches so that a response older than the last applied one is
/// dropped. A response carrying a sequence that was never issued is a bookkeeping fault: it is
/// logged and rejected.
#[derive(Debug, Default)]
pub struct SequenceGuard {
    issued: u64,
    applied: u64,
}

impl SequenceGuard {
    pub fn new() -> Self { Self::default() }

    pub fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Most recent sequence handed out; 0 before the first fetch.
    pub fn issued(&self) -> u64 { self.issued }

    /// Whether the response tagged `seq` may be applied. Accepting advances the watermark.
    pub fn admit(&mut self, seq: u64) -> bool {
        if seq > self.issued {
            error!(seq, issued = self.issued, "listing response with unissued sequence");
            return false;
        }
        if seq < self.applied {
            debug!(seq, applied = self.applied, "discarding stale listing response");
            return false;
        }
        self.applied = seq;
        true
    }
}
