//! Structured events, labels, and labelers.
//!
//! An event is an immutable, typed message describing something that
//! happened — a value, not a command. Subscription is either coarse (every
//! event of a kind) or fine (only events whose computed label equals a
//! subscription label). Labels are ordinary structural keys, so fine
//! subscription needs no per-handler filtering logic.

mod router;

pub(crate) use router::{ErasedHandler, ErasedLabeler, EventRouter};

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

/// Marker trait for event types.
///
/// An event's kind is its concrete Rust type; dispatch matches on the
/// type's discriminant (`TypeId`), not on runtime class inspection.
///
/// # Examples
///
/// ```
/// use kairos::{EntityId, Event};
///
/// #[derive(Clone, Debug)]
/// struct StatusChanged {
///     entity: EntityId,
///     infectious: bool,
/// }
///
/// impl Event for StatusChanged {}
/// ```
pub trait Event: Any {}

/// Identifier of a labeler, unique per event kind.
pub type LabelerId = &'static str;

/// One component of a label's ordered key tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum KeyPart {
    Bool(bool),
    Int(i64),
    Str(String),
    Entity(EntityId),
}

impl From<bool> for KeyPart {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for KeyPart {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for KeyPart {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<EntityId> for KeyPart {
    fn from(v: EntityId) -> Self {
        Self::Entity(v)
    }
}

/// An ordered tuple of key parts, usable directly as a map key.
///
/// Two keys are equal iff all parts are equal, in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LabelKey(Vec<KeyPart>);

impl LabelKey {
    /// The empty key (a partition with no dimensions uses it as its sole
    /// bucket).
    #[must_use]
    pub const fn unit() -> Self {
        Self(Vec::new())
    }

    /// Builds a key from parts.
    #[must_use]
    pub fn of(parts: impl IntoIterator<Item = KeyPart>) -> Self {
        Self(parts.into_iter().collect())
    }

    /// The ordered parts.
    #[must_use]
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }
}

impl<P: Into<KeyPart>> FromIterator<P> for LabelKey {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// A fine-grained subscription key: event kind (the type parameter), the
/// labeler that derives it, and the ordered key tuple.
///
/// A label constructed directly from an event's fields must equal the label
/// the registered labeler computes from that event (labeler/label
/// consistency).
pub struct EventLabel<E: Event> {
    labeler_id: LabelerId,
    key: LabelKey,
    _kind: PhantomData<fn(E)>,
}

impl<E: Event> EventLabel<E> {
    /// Creates a label under the given labeler.
    #[must_use]
    pub const fn new(labeler_id: LabelerId, key: LabelKey) -> Self {
        Self {
            labeler_id,
            key,
            _kind: PhantomData,
        }
    }

    /// The labeler this label belongs to.
    #[must_use]
    pub const fn labeler_id(&self) -> LabelerId {
        self.labeler_id
    }

    /// The ordered key tuple.
    #[must_use]
    pub const fn key(&self) -> &LabelKey {
        &self.key
    }
}

// Manual impls: the event kind is phantom, so no bounds on `E` are needed.
impl<E: Event> Clone for EventLabel<E> {
    fn clone(&self) -> Self {
        Self {
            labeler_id: self.labeler_id,
            key: self.key.clone(),
            _kind: PhantomData,
        }
    }
}

impl<E: Event> PartialEq for EventLabel<E> {
    fn eq(&self, other: &Self) -> bool {
        self.labeler_id == other.labeler_id && self.key == other.key
    }
}

impl<E: Event> Eq for EventLabel<E> {}

impl<E: Event> Hash for EventLabel<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.labeler_id.hash(state);
        self.key.hash(state);
    }
}

impl<E: Event> fmt::Debug for EventLabel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLabel")
            .field("kind", &std::any::type_name::<E>())
            .field("labeler_id", &self.labeler_id)
            .field("key", &self.key)
            .finish()
    }
}

/// A label pre-validated against the labeler registry.
///
/// Data managers hand these out so callers avoid re-deriving and
/// re-validating the same label per subscription. Obtained from
/// [`crate::Context::event_filter`].
#[derive(Debug, Clone)]
pub struct EventFilter<E: Event> {
    label: EventLabel<E>,
}

impl<E: Event> EventFilter<E> {
    pub(crate) const fn pre_validated(label: EventLabel<E>) -> Self {
        Self { label }
    }

    /// The wrapped label.
    #[must_use]
    pub const fn label(&self) -> &EventLabel<E> {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug)]
    struct Ping;
    impl Event for Ping {}

    #[test]
    fn label_keys_compare_structurally() {
        let a: LabelKey = ["north", "adult"].into_iter().collect();
        let b = LabelKey::of([KeyPart::from("north"), KeyPart::from("adult")]);
        let c: LabelKey = ["south", "adult"].into_iter().collect();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, LabelKey::unit());
    }

    #[test]
    fn key_part_conversions() {
        assert_eq!(KeyPart::from(true), KeyPart::Bool(true));
        assert_eq!(KeyPart::from(3i64), KeyPart::Int(3));
        assert_eq!(KeyPart::from(EntityId(4)), KeyPart::Entity(EntityId(4)));
    }

    #[test]
    fn labels_equal_iff_all_fields_equal() {
        let a = EventLabel::<Ping>::new("by-region", ["north"].into_iter().collect());
        let b = EventLabel::<Ping>::new("by-region", ["north"].into_iter().collect());
        let c = EventLabel::<Ping>::new("by-region", ["south"].into_iter().collect());
        let d = EventLabel::<Ping>::new("by-age", ["north"].into_iter().collect());

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn labels_hash_consistently() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(EventLabel::<Ping>::new("l", ["x"].into_iter().collect()));
        assert!(set.contains(&EventLabel::<Ping>::new("l", ["x"].into_iter().collect())));
        assert!(!set.contains(&EventLabel::<Ping>::new("l", ["y"].into_iter().collect())));
    }
}
