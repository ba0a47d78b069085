use crate::optimizer::{IterationRecord, RunResult};

/// Observer for reporting progress while poison sets are optimized.
///
/// Restarts run in parallel, so callbacks arrive from worker threads and in no
/// particular restart order.
pub trait PoisonProgressObserver: Sync {
    fn on_iteration(&self, restart: usize, record: &IterationRecord) {
        let _ = (restart, record);
    }
    fn on_restart_finish(&self, restart: usize, result: &RunResult) {
        let _ = (restart, result);
    }
}

#[derive(Default)]
pub struct NoopPoisonProgress;

impl PoisonProgressObserver for NoopPoisonProgress {}
