/// Snapshot of background job progress published by the poller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressState {
    /// Last known number of unfinished server-side jobs
    pub pending_jobs: u64,
    /// Set once any job was seen; only an explicit reset clears it
    pub had_pending_jobs: bool,
    /// An interval is currently scheduled
    pub is_polling: bool,
}

impl ProgressState {
    pub fn has_pending_jobs(&self) -> bool {
        self.pending_jobs > 0
    }

    /// Record a new count. Returns true if anything observable changed.
    pub(crate) fn apply_count(&mut self, count: u64) -> bool {
        let before = *self;
        self.pending_jobs = count;
        if count > 0 {
            self.had_pending_jobs = true;
        }
        *self != before
    }
}
