//! Filters and their declared sensitivities.

use crate::context::Context;
use crate::entity::EntityId;
use crate::error::KairosResult;
use crate::event::Event;

use super::PartitionId;

/// A predicate over live entities, plus the declared set of event kinds
/// that can change its result.
///
/// The sensitivity list is the filter's contract with the partition engine:
/// any event kind that can flip `evaluate` for some entity must be
/// declared, with a rule naming which entity to re-evaluate. An undeclared
/// mutation path silently leaves partitions stale — it is the filter
/// author's responsibility to declare them all.
pub trait Filter: 'static {
    /// Evaluates the predicate for one entity.
    fn evaluate(&self, ctx: &Context, entity: EntityId) -> bool;

    /// Validates the filter against the context (e.g. that the properties
    /// it reads exist). Called once, before the initial scan.
    fn validate(&self, ctx: &Context) -> KairosResult<()> {
        let _ = ctx;
        Ok(())
    }

    /// The event kinds that can change this filter's result.
    fn sensitivities(&self) -> Vec<FilterSensitivity>;
}

/// One `(event kind, refresh rule)` pair.
///
/// The rule maps an event instance to "no refresh needed" (`None`) or
/// "entity X must be re-evaluated" (`Some(x)`).
pub struct FilterSensitivity {
    pub(crate) register: Box<dyn FnOnce(&mut Context, PartitionId)>,
}

impl FilterSensitivity {
    /// Declares that events of kind `E` may change the filter's result for
    /// the entity named by `rule`.
    #[must_use]
    pub fn on_event<E: Event>(rule: impl Fn(&E) -> Option<EntityId> + 'static) -> Self {
        Self {
            register: Box::new(move |ctx, partition| {
                ctx.subscribe::<E>(move |ctx, event| match rule(event) {
                    Some(entity) => ctx.refresh_partition(partition, entity),
                    None => Ok(()),
                });
            }),
        }
    }
}
