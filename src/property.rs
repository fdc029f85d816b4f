//! Indexed property storage.
//!
//! Per-entity typed values backed by a flat vector: every index reads as the
//! property's default until assigned, removal resets to the default without
//! shrinking, and capacity grows geometrically so slots can be reused for
//! new entities without reallocation churn under high turnover.
//!
//! One generic implementation covers both primitive-packed and boxed
//! payloads; monomorphisation makes the representation choice a storage
//! detail, not a behavioral difference.

use crate::error::ContractError;
use crate::time::Time;

/// Whether a store records the simulation time of each assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeTracking {
    /// Assignment times are not recorded; querying them is an error.
    Off,
    /// Every `set` records the current simulation time for that index.
    On,
}

/// Immutable description of a property, fixed at store construction.
#[derive(Debug, Clone)]
pub struct PropertyDefinition<T: Clone> {
    default: T,
    mutable: bool,
    tracking: TimeTracking,
}

impl<T: Clone> PropertyDefinition<T> {
    /// Creates a mutable, untracked definition with the given default.
    #[must_use]
    pub const fn new(default: T) -> Self {
        Self {
            default,
            mutable: true,
            tracking: TimeTracking::Off,
        }
    }

    /// Marks the property immutable: each index may be assigned once.
    #[must_use]
    pub const fn immutable(mut self) -> Self {
        self.mutable = false;
        self
    }

    /// Enables assignment-time tracking.
    #[must_use]
    pub const fn track_assignment_times(mut self) -> Self {
        self.tracking = TimeTracking::On;
        self
    }

    /// The default value returned for never-assigned indices.
    #[must_use]
    pub const fn default_value(&self) -> &T {
        &self.default
    }

    /// Whether indices may be re-assigned.
    #[must_use]
    pub const fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// The tracking policy.
    #[must_use]
    pub const fn tracking(&self) -> TimeTracking {
        self.tracking
    }
}

/// Array-backed typed storage keyed by entity index.
///
/// # Examples
///
/// ```
/// use kairos::{IndexedPropertyStore, PropertyDefinition, Time};
///
/// let def = PropertyDefinition::new("YELLOW");
/// let mut store = IndexedPropertyStore::new(def);
///
/// assert_eq!(*store.get(5), "YELLOW");
/// store.set(5, "BLUE", Time::START).unwrap();
/// assert_eq!(*store.get(5), "BLUE");
/// store.remove(5);
/// assert_eq!(*store.get(5), "YELLOW");
/// ```
#[derive(Debug)]
pub struct IndexedPropertyStore<T: Clone> {
    definition: PropertyDefinition<T>,
    slots: Vec<Option<T>>,
    times: Vec<Option<Time>>,
}

impl<T: Clone> IndexedPropertyStore<T> {
    /// Creates an empty store from a definition.
    #[must_use]
    pub const fn new(definition: PropertyDefinition<T>) -> Self {
        Self {
            definition,
            slots: Vec::new(),
            times: Vec::new(),
        }
    }

    /// The definition this store was constructed with.
    #[must_use]
    pub const fn definition(&self) -> &PropertyDefinition<T> {
        &self.definition
    }

    /// Returns the stored value, or the default if the index was never
    /// assigned (or was removed). Never fails.
    #[must_use]
    pub fn get(&self, index: usize) -> &T {
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .unwrap_or(&self.definition.default)
    }

    /// Returns true if the index currently holds an assigned value.
    #[must_use]
    pub fn is_assigned(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(Option::is_some)
    }

    /// Stores a value at the index, growing backing storage as needed.
    ///
    /// When time tracking is enabled, `now` is recorded as the assignment
    /// time for the index.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::ImmutableProperty` when re-assigning an
    /// index of an immutable property.
    pub fn set(&mut self, index: usize, value: T, now: Time) -> Result<(), ContractError> {
        if !self.definition.mutable && self.is_assigned(index) {
            return Err(ContractError::ImmutableProperty { index });
        }
        self.grow_to(index + 1);
        self.slots[index] = Some(value);
        if self.definition.tracking == TimeTracking::On {
            self.times[index] = Some(now);
        }
        Ok(())
    }

    /// Returns when the index was last assigned, or `None` if it never was.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::TimeTrackingOff` if tracking was not enabled
    /// at construction.
    pub fn assignment_time(&self, index: usize) -> Result<Option<Time>, ContractError> {
        if self.definition.tracking == TimeTracking::Off {
            return Err(ContractError::TimeTrackingOff);
        }
        Ok(self.times.get(index).copied().flatten())
    }

    /// Logically resets the index to the default value.
    ///
    /// Backing storage is never shrunk; the slot is reused by whichever
    /// entity next receives this index.
    pub fn remove(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = None;
        }
        if let Some(slot) = self.times.get_mut(index) {
            *slot = None;
        }
    }

    /// Pre-grows backing storage for an anticipated bulk insertion of `n`
    /// additional indices.
    pub fn reserve(&mut self, n: usize) {
        self.slots.reserve(n);
        if self.definition.tracking == TimeTracking::On {
            self.times.reserve(n);
        }
    }

    /// Current backing length (highest grown index plus one).
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if backing storage has never grown.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    // Grows to at least `required`, expanding by a quarter of the current
    // length to amortize repeated single-index growth.
    fn grow_to(&mut self, required: usize) {
        if required <= self.slots.len() {
            return;
        }
        let target = required.max(self.slots.len() + self.slots.len() / 4);
        self.slots.resize_with(target, || None);
        if self.definition.tracking == TimeTracking::On {
            self.times.resize_with(target, || None);
        }
    }
}
