//! Process-wide reconcile counters.
//!
//! Increments are silent; [`ReconcileMetrics::flush`] emits every counter as
//! one `info!` event at the end of a fleet pass.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: ReconcileMetrics = ReconcileMetrics::new();

pub struct ReconcileMetrics {
    instances_reconciled: AtomicU64,
    resources_submitted: AtomicU64,
    requeues: AtomicU64,
    failures: AtomicU64,
}

impl Default for ReconcileMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconcileMetrics {
    pub const fn new() -> Self {
        Self {
            instances_reconciled: AtomicU64::new(0),
            resources_submitted: AtomicU64::new(0),
            requeues: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn inc_instances_reconciled(&self) {
        self.instances_reconciled.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "instances_reconciled", "counter incremented");
    }

    /// One descriptor handed to the external reconciler.
    pub fn inc_resources_submitted(&self) {
        self.resources_submitted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "resources_submitted", "counter incremented");
    }

    pub fn inc_requeues(&self) {
        self.requeues.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "requeues", "counter incremented");
    }

    pub fn inc_failures(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "failures", "counter incremented");
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            instances_reconciled = self.instances_reconciled(),
            resources_submitted = self.resources_submitted(),
            requeues = self.requeues(),
            failures = self.failures(),
        );
    }

    pub fn instances_reconciled(&self) -> u64 {
        self.instances_reconciled.load(Ordering::Relaxed)
    }

    pub fn resources_submitted(&self) -> u64 {
        self.resources_submitted.load(Ordering::Relaxed)
    }

    pub fn requeues(&self) -> u64 {
        self.requeues.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Zero every counter. Tests only; the global is shared.
    pub fn reset(&self) {
        self.instances_reconciled.store(0, Ordering::Relaxed);
        self.resources_submitted.store(0, Ordering::Relaxed);
        self.requeues.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = ReconcileMetrics::new();
        m.inc_instances_reconciled();
        m.inc_resources_submitted();
        m.inc_resources_submitted();
        m.inc_requeues();
        assert_eq!(m.instances_reconciled(), 1);
        assert_eq!(m.resources_submitted(), 2);
        assert_eq!(m.requeues(), 1);
        assert_eq!(m.failures(), 0);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = ReconcileMetrics::new();
        m.inc_failures();
        m.inc_requeues();
        m.reset();
        assert_eq!(m.failures(), 0);
        assert_eq!(m.requeues(), 0);
    }
}
