//! The plan scheduler.
//!
//! A plan is a one-shot, time-stamped action executed exactly once by the
//! run loop, or removed before execution via its key. Plans at equal times
//! execute in insertion order: the queue orders on the pair
//! `(time, insertion sequence)`, where the sequence is a monotonically
//! increasing counter assigned at schedule time. That strict tie-break is
//! half of the determinism contract (the scenario RNG is the other half).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::context::Context;
use crate::error::{ContractError, KairosResult};
use crate::time::Time;

/// A plan's executable payload.
pub type PlanAction = Box<dyn FnOnce(&mut Context) -> KairosResult<()>>;

/// Identifier of a scheduled plan, unique within one scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlanId(u64);

/// Cancellation key for a keyed plan.
///
/// The namespace identifies the owner (typically the scheduling data
/// manager or actor); the id distinguishes that owner's plans. At most one
/// pending plan exists per key: scheduling again under a live key replaces
/// and cancels the previous plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlanKey {
    /// Owner namespace, e.g. `"infection"`.
    pub namespace: &'static str,
    /// Owner-scoped discriminator, e.g. an entity index.
    pub id: u64,
}

impl PlanKey {
    /// Creates a key.
    #[must_use]
    pub const fn new(namespace: &'static str, id: u64) -> Self {
        Self { namespace, id }
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct QueueSlot {
    time: Time,
    sequence: u64,
    id: PlanId,
}

struct PlanRecord {
    action: PlanAction,
    key: Option<PlanKey>,
}

/// Time-ordered, cancellable plan queue plus the current-time cursor.
///
/// The run loop itself lives on [`crate::Simulation`]; the scheduler only
/// decides *which* plan is next and *what* the current time is.
pub(crate) struct Scheduler {
    queue: BinaryHeap<Reverse<QueueSlot>>,
    records: HashMap<PlanId, PlanRecord>,
    keyed: HashMap<PlanKey, PlanId>,
    now: Time,
    next_sequence: u64,
    halt_requested: bool,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            records: HashMap::new(),
            keyed: HashMap::new(),
            now: Time::START,
            next_sequence: 0,
            halt_requested: false,
        }
    }

    pub(crate) const fn now(&self) -> Time {
        self.now
    }

    /// Enqueues a one-shot plan.
    pub(crate) fn schedule(
        &mut self,
        time: Time,
        action: PlanAction,
    ) -> Result<PlanId, ContractError> {
        self.insert(time, action, None)
    }

    /// Enqueues a keyed plan, silently replacing (and cancelling) any plan
    /// already pending under the same key.
    pub(crate) fn schedule_keyed(
        &mut self,
        time: Time,
        key: PlanKey,
        action: PlanAction,
    ) -> Result<PlanId, ContractError> {
        // Validate before cancelling, so a past-time schedule leaves the
        // existing keyed plan untouched.
        if time < self.now {
            return Err(ContractError::PastTime {
                scheduled: time,
                current: self.now,
            });
        }
        self.cancel(key);
        self.insert(time, action, Some(key))
    }

    fn insert(
        &mut self,
        time: Time,
        action: PlanAction,
        key: Option<PlanKey>,
    ) -> Result<PlanId, ContractError> {
        if time < self.now {
            return Err(ContractError::PastTime {
                scheduled: time,
                current: self.now,
            });
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let id = PlanId(sequence);

        self.records.insert(id, PlanRecord { action, key });
        if let Some(key) = key {
            self.keyed.insert(key, id);
        }
        self.queue.push(Reverse(QueueSlot { time, sequence, id }));
        Ok(id)
    }

    /// Removes a pending keyed plan. No-op if the key has no pending plan.
    /// Returns the cancelled plan's id, if any.
    pub(crate) fn cancel(&mut self, key: PlanKey) -> Option<PlanId> {
        let id = self.keyed.remove(&key)?;
        // The heap slot stays behind as a tombstone; pop_next skips it.
        self.records.remove(&id);
        Some(id)
    }

    /// Pops the earliest pending plan, skipping cancelled tombstones.
    pub(crate) fn pop_next(&mut self) -> Option<(Time, PlanAction)> {
        while let Some(Reverse(slot)) = self.queue.pop() {
            if let Some(record) = self.records.remove(&slot.id) {
                if let Some(key) = record.key {
                    // Only unlink the key if it still points at this plan;
                    // a replace may have re-bound it to a newer one.
                    if self.keyed.get(&key) == Some(&slot.id) {
                        self.keyed.remove(&key);
                    }
                }
                return Some((slot.time, record.action));
            }
        }
        None
    }

    /// Time of the earliest pending plan, if any.
    pub(crate) fn peek_time(&mut self) -> Option<Time> {
        loop {
            let slot = &self.queue.peek()?.0;
            if self.records.contains_key(&slot.id) {
                return Some(slot.time);
            }
            self.queue.pop();
        }
    }

    /// Advances the current-time cursor; never moves backward.
    pub(crate) fn advance_to(&mut self, time: Time) {
        self.now = self.now.max(time);
    }

    /// Requests the run loop to stop after the current timestamp's batch.
    pub(crate) fn request_halt(&mut self) {
        self.halt_requested = true;
    }

    pub(crate) const fn is_halt_requested(&self) -> bool {
        self.halt_requested
    }

    /// Number of pending (not yet executed or cancelled) plans.
    pub(crate) fn pending_len(&self) -> usize {
        self.records.len()
    }
}
