//! Data managers, actors, reports, and the type-indexed registry.
//!
//! A data manager is a per-scenario singleton capability module holding
//! domain state and logic. The registry maps the manager's concrete type to
//! a single shared instance and is owned by the `Context`, never by a
//! global — which is what makes running independent scenarios on parallel
//! worker threads safe.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::context::Context;
use crate::error::{ConfigurationError, ContractError, KairosResult};
use crate::output::OutputValue;

/// A stateful capability module, one instance per concrete type per
/// scenario.
///
/// Managers are registered during plugin initialization (phase 2); their
/// `init` hooks run afterwards (phase 3), at which point every other
/// manager is already registered and can be looked up regardless of plugin
/// declaration order.
pub trait DataManager: Any {
    /// Phase-3 hook: wire subscriptions, read plugin data, look up sibling
    /// managers.
    fn init(&mut self, ctx: &mut Context) -> KairosResult<()> {
        let _ = ctx;
        Ok(())
    }

    /// Emits a value representing this manager's reconstructable
    /// configuration, asked for on simulation close when a state recording
    /// is pending for this manager.
    fn state_record(&self, ctx: &Context) -> Option<OutputValue> {
        let _ = ctx;
        None
    }

    /// Upcast for downcasting to the concrete manager type.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete manager type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// An orchestration module whose init hook subscribes to events and
/// schedules initial plans. Durable state belongs in data managers.
pub trait Actor: Any {
    /// Phase-4 hook.
    fn init(&mut self, ctx: &mut Context) -> KairosResult<()>;
}

/// Like an [`Actor`], but conventionally write-only: reports observe events
/// and release output, they do not steer the simulation.
pub trait Report: Any {
    /// Phase-4 hook.
    fn init(&mut self, ctx: &mut Context) -> KairosResult<()>;
}

pub(crate) type SharedManager = Rc<RefCell<Box<dyn DataManager>>>;

/// Type-indexed table of data-manager singletons.
///
/// Instances sit behind `Rc<RefCell<…>>` so a manager method can receive
/// `&mut Context` while the manager itself is borrowed; genuine re-entrant
/// access to the same manager is caught at runtime and surfaced as a
/// contract error rather than silent aliasing.
#[derive(Default)]
pub(crate) struct ManagerRegistry {
    managers: HashMap<TypeId, SharedManager>,
    names: HashMap<TypeId, &'static str>,
    registration_order: Vec<TypeId>,
}

impl ManagerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add<M: DataManager>(&mut self, manager: M) -> Result<(), ConfigurationError> {
        let type_id = TypeId::of::<M>();
        let type_name = std::any::type_name::<M>();
        if self.managers.contains_key(&type_id) {
            return Err(ConfigurationError::DuplicateDataManager { type_name });
        }
        self.managers
            .insert(type_id, Rc::new(RefCell::new(Box::new(manager))));
        self.names.insert(type_id, type_name);
        self.registration_order.push(type_id);
        Ok(())
    }

    pub(crate) fn shared<M: DataManager>(&self) -> Result<SharedManager, ContractError> {
        self.shared_by_id(TypeId::of::<M>(), std::any::type_name::<M>())
    }

    pub(crate) fn shared_by_id(
        &self,
        type_id: TypeId,
        type_name: &'static str,
    ) -> Result<SharedManager, ContractError> {
        self.managers
            .get(&type_id)
            .map(Rc::clone)
            .ok_or(ContractError::UnknownDataManager { type_name })
    }

    pub(crate) fn name_of(&self, type_id: TypeId) -> &'static str {
        self.names.get(&type_id).copied().unwrap_or("<unknown>")
    }

    pub(crate) fn contains(&self, type_id: TypeId) -> bool {
        self.managers.contains_key(&type_id)
    }

    /// Type ids in registration order (phase-3 iteration order).
    pub(crate) fn registration_order(&self) -> Vec<TypeId> {
        self.registration_order.clone()
    }
}
