//! Single-slot staging between caller threads and the cycle boundary.

use crossbeam_channel::{Receiver, Sender, bounded};
use ps_core::{SignalKey, Value};
use ps_project::Diff;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::DiffRejected;

/// What an accepted diff changed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiffSummary {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
    /// Period stored for the next start; the running timer is unchanged.
    pub cycle_time_recorded: Option<f64>,
}

/// Final word on a submitted diff.
#[derive(Debug, Clone, PartialEq)]
pub enum DiffOutcome {
    /// Applied after the given cycle (cycles completed).
    Applied { cycle: u64, summary: DiffSummary },
    Rejected(DiffRejected),
    /// A newer diff replaced this one before it was consumed.
    Superseded,
    /// The scheduler stopped before consuming it.
    Abandoned,
}

/// Caller's handle on a submitted diff.
#[derive(Debug)]
pub struct DiffTicket {
    id: Uuid,
    rx: Receiver<DiffOutcome>,
}

impl DiffTicket {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Block until the diff is resolved or `timeout` passes.
    pub fn wait(&self, timeout: Duration) -> Option<DiffOutcome> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn try_outcome(&self) -> Option<DiffOutcome> {
        self.rx.try_recv().ok()
    }
}

pub(crate) struct StagedDiff {
    pub id: Uuid,
    pub diff: Diff,
    reply: Sender<DiffOutcome>,
}

impl StagedDiff {
    pub fn resolve(self, outcome: DiffOutcome) {
        // The caller may have dropped its ticket.
        let _ = self.reply.send(outcome);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// At most one pending diff. Staging replaces whatever is there.
#[derive(Default)]
pub(crate) struct PendingSlot {
    inner: Mutex<Option<StagedDiff>>,
}

impl PendingSlot {
    pub fn stage(&self, diff: Diff) -> DiffTicket {
        let (reply, rx) = bounded(1);
        let id = Uuid::new_v4();
        let previous = lock(&self.inner).replace(StagedDiff { id, diff, reply });
        if let Some(old) = previous {
            warn!(superseded = %old.id, by = %id, "pending diff replaced");
            old.resolve(DiffOutcome::Superseded);
        } else {
            debug!(diff = %id, "diff staged");
        }
        DiffTicket { id, rx }
    }

    pub fn take(&self) -> Option<StagedDiff> {
        lock(&self.inner).take()
    }

    pub fn abandon(&self) {
        if let Some(staged) = self.take() {
            debug!(diff = %staged.id, "pending diff abandoned");
            staged.resolve(DiffOutcome::Abandoned);
        }
    }
}

/// External tag writes waiting for the next cycle.
#[derive(Default)]
pub(crate) struct WriteQueue {
    inner: Mutex<Vec<(SignalKey, Value)>>,
}

impl WriteQueue {
    pub fn push(&self, key: SignalKey, value: Value) {
        lock(&self.inner).push((key, value));
    }

    pub fn drain(&self) -> Vec<(SignalKey, Value)> {
        std::mem::take(&mut *lock(&self.inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ps_graph::ValidationError;

    #[test]
    fn newer_diff_supersedes_pending() {
        let slot = PendingSlot::default();
        let first = slot.stage(Diff::default().remove_instance("a"));
        let second = slot.stage(Diff::default().remove_instance("b"));
        assert_eq!(first.try_outcome(), Some(DiffOutcome::Superseded));
        assert_eq!(second.try_outcome(), None);

        let staged = slot.take().unwrap();
        assert_eq!(staged.id, second.id());
        assert_eq!(staged.diff.removed, ["b"]);
        assert!(slot.take().is_none());
    }

    #[test]
    fn resolve_reaches_ticket() {
        let slot = PendingSlot::default();
        let ticket = slot.stage(Diff::default());
        let rejected = DiffRejected::Invalid(ValidationError::NotFound { name: "x".into() });
        slot.take()
            .unwrap()
            .resolve(DiffOutcome::Rejected(rejected.clone()));
        assert_eq!(
            ticket.wait(Duration::from_millis(10)),
            Some(DiffOutcome::Rejected(rejected))
        );
    }

    #[test]
    fn abandon_notifies_and_empties() {
        let slot = PendingSlot::default();
        let ticket = slot.stage(Diff::default());
        slot.abandon();
        assert_eq!(ticket.try_outcome(), Some(DiffOutcome::Abandoned));
        slot.abandon();
        assert!(slot.take().is_none());
    }

    #[test]
    fn dropped_ticket_does_not_block_resolve() {
        let slot = PendingSlot::default();
        drop(slot.stage(Diff::default()));
        slot.take().unwrap().resolve(DiffOutcome::Abandoned);
    }

    #[test]
    fn write_queue_drains_in_order() {
        let q = WriteQueue::default();
        q.push(SignalKey::new("pid1", "sv"), Value::Float(1.0));
        q.push(SignalKey::new("pid1", "sv"), Value::Float(2.0));
        let drained = q.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[1].1, Value::Float(2.0));
        assert!(q.drain().is_empty());
    }
}
