//! Live, incrementally-maintained entity partitions.
//!
//! A partition is an index over the entities matching a filter, optionally
//! bucketed by one or more dimension labelers. It is built once by a full
//! scan, then kept current entity-by-entity via the event subscriptions the
//! filter's sensitivities declare — never by rescanning. The central
//! correctness property: at every observable point, the maintained index
//! equals what a brute-force re-scan of the predicate would produce.
//!
//! Buckets use swap-remove vectors plus position maps, so membership
//! updates and uniform sampling are O(1) per bucket.

mod filter;

pub use filter::{Filter, FilterSensitivity};

use std::collections::HashMap;
use std::fmt;

use crate::context::Context;
use crate::entity::EntityId;
use crate::event::{KeyPart, LabelKey};

/// Identifier of a partition within one scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionId(pub(crate) u64);

impl PartitionId {
    /// The raw id.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A bucketing dimension: a labeler from entity to one key part.
pub struct PartitionDimension {
    compute: Box<dyn Fn(&Context, EntityId) -> KeyPart>,
}

impl PartitionDimension {
    /// Wraps a dimension labeler.
    #[must_use]
    pub fn new(compute: impl Fn(&Context, EntityId) -> KeyPart + 'static) -> Self {
        Self {
            compute: Box::new(compute),
        }
    }
}

#[derive(Default)]
struct Bucket {
    members: Vec<EntityId>,
    positions: HashMap<EntityId, usize>,
}

impl Bucket {
    fn insert(&mut self, entity: EntityId) {
        self.positions.insert(entity, self.members.len());
        self.members.push(entity);
    }

    fn remove(&mut self, entity: EntityId) {
        let Some(position) = self.positions.remove(&entity) else {
            return;
        };
        self.members.swap_remove(position);
        if let Some(&moved) = self.members.get(position) {
            self.positions.insert(moved, position);
        }
    }
}

/// The maintained index: filter, dimensions, and bucketed membership.
pub(crate) struct Partition {
    filter: Box<dyn Filter>,
    dimensions: Vec<PartitionDimension>,
    buckets: HashMap<LabelKey, Bucket>,
    members: HashMap<EntityId, LabelKey>,
}

impl Partition {
    pub(crate) fn new(filter: Box<dyn Filter>, dimensions: Vec<PartitionDimension>) -> Self {
        Self {
            filter,
            dimensions,
            buckets: HashMap::new(),
            members: HashMap::new(),
        }
    }

    fn bucket_key(&self, ctx: &Context, entity: EntityId) -> LabelKey {
        LabelKey::of(
            self.dimensions
                .iter()
                .map(|dimension| (dimension.compute)(ctx, entity)),
        )
    }

    /// Re-evaluates one entity's membership and bucket assignment.
    pub(crate) fn refresh(&mut self, ctx: &Context, entity: EntityId) {
        let qualifies = ctx.is_alive(entity) && self.filter.evaluate(ctx, entity);
        if !qualifies {
            self.evict(entity);
            return;
        }

        let key = self.bucket_key(ctx, entity);
        match self.members.get(&entity) {
            Some(current) if *current == key => {}
            Some(current) => {
                let current = current.clone();
                self.remove_from_bucket(&current, entity);
                self.buckets.entry(key.clone()).or_default().insert(entity);
                self.members.insert(entity, key);
            }
            None => {
                self.buckets.entry(key.clone()).or_default().insert(entity);
                self.members.insert(entity, key);
            }
        }
    }

    /// Drops an entity without re-evaluating the filter (entity removal).
    pub(crate) fn evict(&mut self, entity: EntityId) {
        if let Some(key) = self.members.remove(&entity) {
            self.remove_from_bucket(&key, entity);
        }
    }

    fn remove_from_bucket(&mut self, key: &LabelKey, entity: EntityId) {
        if let Some(bucket) = self.buckets.get_mut(key) {
            bucket.remove(entity);
            if bucket.members.is_empty() {
                self.buckets.remove(key);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.members.len()
    }

    pub(crate) fn contains(&self, entity: EntityId) -> bool {
        self.members.contains_key(&entity)
    }

    pub(crate) fn bucket_len(&self, key: &LabelKey) -> usize {
        self.buckets.get(key).map_or(0, |bucket| bucket.members.len())
    }

    pub(crate) fn bucket_member_at(&self, key: &LabelKey, index: usize) -> Option<EntityId> {
        self.buckets
            .get(key)
            .and_then(|bucket| bucket.members.get(index))
            .copied()
    }

    /// All members, in ascending entity order (deterministic for reports
    /// and equivalence checks).
    pub(crate) fn members_sorted(&self) -> Vec<EntityId> {
        let mut out: Vec<EntityId> = self.members.keys().copied().collect();
        out.sort_unstable();
        out
    }

    /// Members of one bucket, in ascending entity order.
    pub(crate) fn bucket_members_sorted(&self, key: &LabelKey) -> Vec<EntityId> {
        let mut out = self
            .buckets
            .get(key)
            .map(|bucket| bucket.members.clone())
            .unwrap_or_default();
        out.sort_unstable();
        out
    }
}
