//! Subscription storage and handler lookup.
//!
//! The router owns every subscription and labeler registration; dispatch
//! itself happens on [`crate::Context`], which holds the mutable state
//! handlers need. Handler lists are kept in subscription order, labelers in
//! registration order, so dispatch order is fully deterministic.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::rc::Rc;

use crate::context::Context;
use crate::error::{ContractError, KairosResult};

use super::{LabelKey, LabelerId};

/// Type-erased coarse or fine handler. The wrapper closure created at
/// subscription time downcasts the event back to its concrete type.
pub(crate) type ErasedHandler = Rc<dyn Fn(&mut Context, &dyn Any) -> KairosResult<()>>;

/// Type-erased labeler: a pure function of the context and event.
pub(crate) type ErasedLabeler = Rc<dyn Fn(&Context, &dyn Any) -> LabelKey>;

struct LabelerEntry {
    id: LabelerId,
    compute: ErasedLabeler,
}

#[derive(Default)]
pub(crate) struct EventRouter {
    coarse: HashMap<TypeId, Vec<ErasedHandler>>,
    labelers: HashMap<TypeId, Vec<LabelerEntry>>,
    fine: HashMap<(TypeId, LabelerId), HashMap<LabelKey, Vec<ErasedHandler>>>,
}

impl EventRouter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe_coarse(&mut self, kind: TypeId, handler: ErasedHandler) {
        self.coarse.entry(kind).or_default().push(handler);
    }

    pub(crate) fn register_labeler(
        &mut self,
        kind: TypeId,
        kind_name: &'static str,
        id: LabelerId,
        compute: ErasedLabeler,
    ) -> Result<(), ContractError> {
        let entries = self.labelers.entry(kind).or_default();
        if entries.iter().any(|entry| entry.id == id) {
            return Err(ContractError::DuplicateLabeler {
                event: kind_name,
                labeler_id: id,
            });
        }
        entries.push(LabelerEntry { id, compute });
        Ok(())
    }

    pub(crate) fn has_labeler(&self, kind: TypeId, id: LabelerId) -> bool {
        self.labelers
            .get(&kind)
            .is_some_and(|entries| entries.iter().any(|entry| entry.id == id))
    }

    pub(crate) fn subscribe_fine(
        &mut self,
        kind: TypeId,
        kind_name: &'static str,
        id: LabelerId,
        key: LabelKey,
        handler: ErasedHandler,
    ) -> Result<(), ContractError> {
        if !self.has_labeler(kind, id) {
            return Err(ContractError::UnknownLabeler {
                event: kind_name,
                labeler_id: id,
            });
        }
        self.fine
            .entry((kind, id))
            .or_default()
            .entry(key)
            .or_default()
            .push(handler);
        Ok(())
    }

    /// Coarse handlers for a kind, cloned so dispatch can run while new
    /// subscriptions are added from inside handlers.
    pub(crate) fn coarse_handlers(&self, kind: TypeId) -> Vec<ErasedHandler> {
        self.coarse.get(&kind).cloned().unwrap_or_default()
    }

    /// Registered labelers for a kind, in registration order.
    pub(crate) fn labelers_for(&self, kind: TypeId) -> Vec<(LabelerId, ErasedLabeler)> {
        self.labelers
            .get(&kind)
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| (entry.id, Rc::clone(&entry.compute)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Fine handlers subscribed on exactly this label.
    pub(crate) fn fine_handlers(
        &self,
        kind: TypeId,
        id: LabelerId,
        key: &LabelKey,
    ) -> Vec<ErasedHandler> {
        self.fine
            .get(&(kind, id))
            .and_then(|by_key| by_key.get(key))
            .cloned()
            .unwrap_or_default()
    }
}
