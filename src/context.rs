//! The runtime hub of one scenario.
//!
//! A `Context` owns everything a running scenario touches: the plan
//! scheduler, the event router, the data-manager registry, the entity
//! allocator, live partitions, the scenario RNG, and the output consumer.
//! There is no global state anywhere in the kernel — independent scenarios
//! own independent contexts and may run on parallel worker threads.
//!
//! Execution is single-threaded and cooperative within one scenario: every
//! plan action, event dispatch, and handler invocation runs to completion
//! before the next is considered. A handler that wants to defer work
//! schedules a future plan rather than yielding control.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::entity::{EntityAllocator, EntityId};
use crate::error::{ContractError, KairosError, KairosResult};
use crate::event::{
    ErasedHandler, ErasedLabeler, Event, EventFilter, EventLabel, EventRouter, LabelKey, LabelerId,
};
use crate::manager::{Actor, DataManager, ManagerRegistry, Report};
use crate::output::{DiscardConsumer, OutputConsumer, OutputValue};
use crate::partition::{Filter, Partition, PartitionDimension, PartitionId};
use crate::plugin::PluginData;
use crate::rng::{RngState, Well44497};
use crate::scheduler::{PlanId, PlanKey, Scheduler};
use crate::time::Time;

/// Runtime state of one simulation scenario.
pub struct Context {
    scheduler: Scheduler,
    router: EventRouter,
    managers: ManagerRegistry,
    plugin_data: HashMap<TypeId, Box<dyn PluginData>>,
    entities: EntityAllocator,
    partitions: HashMap<u64, Partition>,
    next_partition: u64,
    rng: Well44497,
    output: Box<dyn OutputConsumer>,
    actors: Vec<Rc<RefCell<dyn Actor>>>,
    reports: Vec<Rc<RefCell<dyn Report>>>,
    pending_recordings: Vec<TypeId>,
    rng_recording: bool,
}

impl Context {
    pub(crate) fn new(seed: u64) -> Self {
        Self::with_output(seed, Box::new(DiscardConsumer))
    }

    pub(crate) fn with_output(seed: u64, output: Box<dyn OutputConsumer>) -> Self {
        Self {
            scheduler: Scheduler::new(),
            router: EventRouter::new(),
            managers: ManagerRegistry::new(),
            plugin_data: HashMap::new(),
            entities: EntityAllocator::new(),
            partitions: HashMap::new(),
            next_partition: 0,
            rng: Well44497::seeded(seed),
            output,
            actors: Vec::new(),
            reports: Vec::new(),
            pending_recordings: Vec::new(),
            rng_recording: false,
        }
    }

    // ------------------------------------------------------------------
    // Time and plans
    // ------------------------------------------------------------------

    /// Current simulation time.
    #[must_use]
    pub const fn now(&self) -> Time {
        self.scheduler.now()
    }

    /// Schedules a one-shot plan.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::PastTime` if `time` precedes the current
    /// simulation time.
    pub fn schedule(
        &mut self,
        time: Time,
        action: impl FnOnce(&mut Context) -> KairosResult<()> + 'static,
    ) -> KairosResult<PlanId> {
        Ok(self.scheduler.schedule(time, Box::new(action))?)
    }

    /// Schedules a keyed plan, replacing (and cancelling) any plan already
    /// pending under the same key.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::PastTime` if `time` precedes the current
    /// simulation time; the previously pending plan is left untouched.
    pub fn schedule_keyed(
        &mut self,
        time: Time,
        key: PlanKey,
        action: impl FnOnce(&mut Context) -> KairosResult<()> + 'static,
    ) -> KairosResult<PlanId> {
        Ok(self.scheduler.schedule_keyed(time, key, Box::new(action))?)
    }

    /// Removes a pending keyed plan; no-op if the key has none.
    pub fn cancel_plan(&mut self, key: PlanKey) {
        self.scheduler.cancel(key);
    }

    /// Number of pending plans.
    #[must_use]
    pub fn pending_plans(&self) -> usize {
        self.scheduler.pending_len()
    }

    /// Time of the earliest pending plan, if any.
    pub fn next_plan_time(&mut self) -> Option<Time> {
        self.scheduler.peek_time()
    }

    /// Requests the run loop to stop once the current timestamp's batch of
    /// plans has drained. A plan already executing is never aborted.
    pub fn request_halt(&mut self) {
        self.scheduler.request_halt();
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    /// Allocates an entity handle, reusing a removed index when available.
    pub fn create_entity(&mut self) -> EntityId {
        self.entities.create()
    }

    /// Removes a live entity: evicts it from every partition, then returns
    /// its index to the free list.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::EntityNotAlive` for a non-live handle.
    pub fn remove_entity(&mut self, entity: EntityId) -> KairosResult<()> {
        if !self.entities.is_alive(entity) {
            return Err(ContractError::EntityNotAlive { id: entity }.into());
        }
        for partition in self.partitions.values_mut() {
            partition.evict(entity);
        }
        self.entities.remove(entity)?;
        Ok(())
    }

    /// Returns true if the handle refers to a live entity.
    #[must_use]
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entities.is_alive(entity)
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Live entities in ascending index order.
    #[must_use]
    pub fn live_entities(&self) -> Vec<EntityId> {
        self.entities.iter_live().collect()
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Registers a coarse handler invoked for every published event of
    /// kind `E`, in subscription order.
    pub fn subscribe<E: Event>(
        &mut self,
        handler: impl Fn(&mut Context, &E) -> KairosResult<()> + 'static,
    ) {
        let erased: ErasedHandler = Rc::new(move |ctx, any| match any.downcast_ref::<E>() {
            Some(event) => handler(ctx, event),
            // Handlers are stored under E's TypeId; a mismatch cannot occur.
            None => Ok(()),
        });
        self.router.subscribe_coarse(TypeId::of::<E>(), erased);
    }

    /// Registers a labeler for events of kind `E`.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::DuplicateLabeler` if a labeler with this id
    /// already exists for `E`.
    pub fn register_labeler<E: Event>(
        &mut self,
        labeler_id: LabelerId,
        compute: impl Fn(&Context, &E) -> LabelKey + 'static,
    ) -> KairosResult<()> {
        let erased: ErasedLabeler = Rc::new(move |ctx, any| {
            any.downcast_ref::<E>()
                .map_or_else(LabelKey::unit, |event| compute(ctx, event))
        });
        self.router.register_labeler(
            TypeId::of::<E>(),
            std::any::type_name::<E>(),
            labeler_id,
            erased,
        )?;
        Ok(())
    }

    /// Registers a fine handler invoked only for events whose computed
    /// label equals `label`.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::UnknownLabeler` if no labeler with the
    /// label's id is registered for `E`.
    pub fn subscribe_to_label<E: Event>(
        &mut self,
        label: &EventLabel<E>,
        handler: impl Fn(&mut Context, &E) -> KairosResult<()> + 'static,
    ) -> KairosResult<()> {
        let erased: ErasedHandler = Rc::new(move |ctx, any| match any.downcast_ref::<E>() {
            Some(event) => handler(ctx, event),
            None => Ok(()),
        });
        self.router.subscribe_fine(
            TypeId::of::<E>(),
            std::any::type_name::<E>(),
            label.labeler_id(),
            label.key().clone(),
            erased,
        )?;
        Ok(())
    }

    /// Validates a label against the labeler registry and wraps it for
    /// repeated subscription without re-validation.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::UnknownLabeler` if the label's labeler is
    /// not registered for `E`.
    pub fn event_filter<E: Event>(&self, label: EventLabel<E>) -> KairosResult<EventFilter<E>> {
        if !self.router.has_labeler(TypeId::of::<E>(), label.labeler_id()) {
            return Err(ContractError::UnknownLabeler {
                event: std::any::type_name::<E>(),
                labeler_id: label.labeler_id(),
            }
            .into());
        }
        Ok(EventFilter::pre_validated(label))
    }

    /// Subscribes through a pre-validated filter.
    pub fn subscribe_filtered<E: Event>(
        &mut self,
        filter: &EventFilter<E>,
        handler: impl Fn(&mut Context, &E) -> KairosResult<()> + 'static,
    ) {
        // The filter was validated at creation; re-validation cannot fail
        // because labelers are never unregistered.
        let _ = self.subscribe_to_label(filter.label(), handler);
    }

    /// Publishes an event, dispatching synchronously: first to all coarse
    /// subscribers of its kind (in subscription order), then, per
    /// registered labeler (in registration order), to the subscribers of
    /// the computed label (in subscription order).
    ///
    /// Publishing from inside a handler recurses immediately, so the
    /// events an event provokes are fully drained before control returns
    /// to the outer dispatch.
    ///
    /// # Errors
    ///
    /// The first handler error aborts the remaining dispatch and
    /// propagates (and, from inside the run loop, aborts the run).
    pub fn publish<E: Event>(&mut self, event: &E) -> KairosResult<()> {
        let kind = TypeId::of::<E>();
        let any: &dyn Any = event;

        for handler in self.router.coarse_handlers(kind) {
            handler(self, any)?;
        }

        for (labeler_id, compute) in self.router.labelers_for(kind) {
            let key = compute(self, any);
            for handler in self.router.fine_handlers(kind, labeler_id, &key) {
                handler(self, any)?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Data managers, actors, reports
    // ------------------------------------------------------------------

    /// Registers a data manager (phase 2). At most one instance per
    /// concrete type may exist.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::DuplicateDataManager` on a repeat
    /// registration of the same type.
    pub fn add_data_manager<M: DataManager>(&mut self, manager: M) -> KairosResult<()> {
        self.managers.add(manager)?;
        Ok(())
    }

    /// Runs `f` with shared access to the manager of type `M`.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::UnknownDataManager` if `M` was never
    /// registered, or `ContractError::DataManagerInUse` on re-entrant
    /// access.
    pub fn with_data_manager<M: DataManager, R>(
        &self,
        f: impl FnOnce(&M, &Context) -> R,
    ) -> KairosResult<R> {
        let shared = self.managers.shared::<M>()?;
        let guard = shared.try_borrow().map_err(|_| ContractError::DataManagerInUse {
            type_name: std::any::type_name::<M>(),
        })?;
        let manager = guard
            .as_any()
            .downcast_ref::<M>()
            .ok_or_else(|| KairosError::internal("registry entry has mismatched type"))?;
        Ok(f(manager, self))
    }

    /// Runs `f` with exclusive access to the manager of type `M` and
    /// mutable access to the rest of the context.
    ///
    /// # Errors
    ///
    /// Same as [`Context::with_data_manager`], plus whatever `f` returns.
    pub fn with_data_manager_mut<M: DataManager, R>(
        &mut self,
        f: impl FnOnce(&mut M, &mut Context) -> KairosResult<R>,
    ) -> KairosResult<R> {
        let shared = self.managers.shared::<M>()?;
        let mut guard = shared
            .try_borrow_mut()
            .map_err(|_| ContractError::DataManagerInUse {
                type_name: std::any::type_name::<M>(),
            })?;
        let manager = guard
            .as_any_mut()
            .downcast_mut::<M>()
            .ok_or_else(|| KairosError::internal("registry entry has mismatched type"))?;
        f(manager, self)
    }

    /// Registers an actor (phase 2); its init hook runs in phase 4. The
    /// returned handle lets registering code wire the actor into closures.
    pub fn add_actor<A: Actor>(&mut self, actor: A) -> Rc<RefCell<A>> {
        let shared = Rc::new(RefCell::new(actor));
        self.actors.push(shared.clone());
        shared
    }

    /// Registers a report (phase 2); its init hook runs in phase 4, after
    /// every actor's.
    pub fn add_report<R: Report>(&mut self, report: R) -> Rc<RefCell<R>> {
        let shared = Rc::new(RefCell::new(report));
        self.reports.push(shared.clone());
        shared
    }

    // ------------------------------------------------------------------
    // Plugin data
    // ------------------------------------------------------------------

    pub(crate) fn insert_plugin_data(&mut self, data: Box<dyn PluginData>) -> KairosResult<()> {
        let type_id = data.as_any().type_id();
        if self.plugin_data.contains_key(&type_id) {
            return Err(crate::error::ConfigurationError::DuplicatePluginData {
                payload: format!("{data:?}"),
            }
            .into());
        }
        self.plugin_data.insert(type_id, data);
        Ok(())
    }

    /// Returns the plugin data payload of type `T`.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::UnknownPluginData` if no plugin contributed
    /// a payload of this type.
    pub fn plugin_data<T: PluginData>(&self) -> KairosResult<&T> {
        self.plugin_data
            .get(&TypeId::of::<T>())
            .and_then(|data| data.as_any().downcast_ref::<T>())
            .ok_or_else(|| {
                ContractError::UnknownPluginData {
                    type_name: std::any::type_name::<T>(),
                }
                .into()
            })
    }

    // ------------------------------------------------------------------
    // Partitions
    // ------------------------------------------------------------------

    /// Builds a partition: validates the filter, performs one full scan of
    /// live entities, then subscribes one refresh hook per declared
    /// sensitivity. After construction the partition is maintained
    /// entity-by-entity, never rescanned.
    ///
    /// # Errors
    ///
    /// Propagates filter validation failures.
    pub fn add_partition(
        &mut self,
        filter: impl Filter,
        dimensions: Vec<PartitionDimension>,
    ) -> KairosResult<PartitionId> {
        filter.validate(self)?;
        let sensitivities = filter.sensitivities();
        let mut partition = Partition::new(Box::new(filter), dimensions);

        for entity in self.entities.iter_live().collect::<Vec<_>>() {
            partition.refresh(self, entity);
        }

        let id = PartitionId(self.next_partition);
        self.next_partition += 1;
        self.partitions.insert(id.0, partition);

        for sensitivity in sensitivities {
            (sensitivity.register)(self, id);
        }
        Ok(id)
    }

    /// Re-evaluates one entity's membership in one partition.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::UnknownPartition` for a stale id.
    pub fn refresh_partition(
        &mut self,
        partition: PartitionId,
        entity: EntityId,
    ) -> KairosResult<()> {
        // Take the partition out so its filter can read the context while
        // the membership tables are being rewritten.
        let mut taken = self
            .partitions
            .remove(&partition.0)
            .ok_or(ContractError::UnknownPartition { id: partition.0 })?;
        taken.refresh(self, entity);
        self.partitions.insert(partition.0, taken);
        Ok(())
    }

    /// Number of entities currently matching the partition's filter.
    pub fn partition_len(&self, partition: PartitionId) -> KairosResult<usize> {
        Ok(self.partition(partition)?.len())
    }

    /// Returns true if the entity is currently a member.
    pub fn partition_contains(
        &self,
        partition: PartitionId,
        entity: EntityId,
    ) -> KairosResult<bool> {
        Ok(self.partition(partition)?.contains(entity))
    }

    /// Current size of one dimension bucket.
    pub fn bucket_len(&self, partition: PartitionId, bucket: &LabelKey) -> KairosResult<usize> {
        Ok(self.partition(partition)?.bucket_len(bucket))
    }

    /// Draws a uniformly random member of one bucket, or `None` if the
    /// bucket is empty. O(1) per draw.
    pub fn sample_bucket(
        &mut self,
        partition: PartitionId,
        bucket: &LabelKey,
    ) -> KairosResult<Option<EntityId>> {
        let partition = self
            .partitions
            .get(&partition.0)
            .ok_or(ContractError::UnknownPartition { id: partition.0 })?;
        let len = partition.bucket_len(bucket);
        if len == 0 {
            return Ok(None);
        }
        let index = self.rng.sample_index(len);
        Ok(partition.bucket_member_at(bucket, index))
    }

    /// All members in ascending entity order.
    pub fn partition_members(&self, partition: PartitionId) -> KairosResult<Vec<EntityId>> {
        Ok(self.partition(partition)?.members_sorted())
    }

    /// Members of one bucket in ascending entity order.
    pub fn bucket_members(
        &self,
        partition: PartitionId,
        bucket: &LabelKey,
    ) -> KairosResult<Vec<EntityId>> {
        Ok(self.partition(partition)?.bucket_members_sorted(bucket))
    }

    fn partition(&self, id: PartitionId) -> Result<&Partition, ContractError> {
        self.partitions
            .get(&id.0)
            .ok_or(ContractError::UnknownPartition { id: id.0 })
    }

    // ------------------------------------------------------------------
    // RNG
    // ------------------------------------------------------------------

    /// Exclusive access to the scenario RNG.
    pub fn rng(&mut self) -> &mut Well44497 {
        &mut self.rng
    }

    /// Snapshots the scenario RNG state.
    #[must_use]
    pub fn rng_state(&self) -> RngState {
        self.rng.state()
    }

    /// Restores the scenario RNG from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::InvalidRngState` for a malformed snapshot.
    pub fn restore_rng(&mut self, state: RngState) -> KairosResult<()> {
        self.rng = Well44497::restore(state)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Output and state recording
    // ------------------------------------------------------------------

    /// Forwards a value to the external output consumer.
    pub fn release_output(&mut self, value: OutputValue) {
        self.output.on_output(value);
    }

    /// Declares that manager `M` has a scheduled state recording pending:
    /// on simulation close it will be asked to emit its reconstructable
    /// configuration through the output boundary.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::UnknownDataManager` if `M` was never
    /// registered.
    pub fn request_state_recording<M: DataManager>(&mut self) -> KairosResult<()> {
        let type_id = TypeId::of::<M>();
        if !self.managers.contains(type_id) {
            return Err(ContractError::UnknownDataManager {
                type_name: std::any::type_name::<M>(),
            }
            .into());
        }
        if !self.pending_recordings.contains(&type_id) {
            self.pending_recordings.push(type_id);
        }
        Ok(())
    }

    /// Declares that the RNG state should be emitted on close.
    pub fn request_rng_state_recording(&mut self) {
        self.rng_recording = true;
    }

    // ------------------------------------------------------------------
    // Crate-internal lifecycle plumbing
    // ------------------------------------------------------------------

    pub(crate) fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub(crate) fn manager_order(&self) -> Vec<TypeId> {
        self.managers.registration_order()
    }

    pub(crate) fn init_manager(&mut self, type_id: TypeId) -> KairosResult<()> {
        let name = self.managers.name_of(type_id);
        let shared = self.managers.shared_by_id(type_id, name)?;
        let mut guard = shared
            .try_borrow_mut()
            .map_err(|_| ContractError::DataManagerInUse { type_name: name })?;
        guard.init(self)
    }

    pub(crate) fn actor_handles(&self) -> Vec<Rc<RefCell<dyn Actor>>> {
        self.actors.clone()
    }

    pub(crate) fn report_handles(&self) -> Vec<Rc<RefCell<dyn Report>>> {
        self.reports.clone()
    }

    /// Emits pending state recordings (request order), then the RNG state
    /// if requested.
    pub(crate) fn emit_state_records(&mut self) -> KairosResult<()> {
        for type_id in std::mem::take(&mut self.pending_recordings) {
            let name = self.managers.name_of(type_id);
            let shared = self.managers.shared_by_id(type_id, name)?;
            let guard = shared
                .try_borrow()
                .map_err(|_| ContractError::DataManagerInUse { type_name: name })?;
            let record = guard.state_record(self);
            drop(guard);
            if let Some(record) = record {
                self.output.on_output(record);
            }
        }
        if self.rng_recording {
            let state = self.rng.state();
            self.output.on_output(Box::new(state));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::KeyPart;

    #[derive(Debug)]
    struct ColorChanged {
        entity: EntityId,
        color: &'static str,
    }
    impl Event for ColorChanged {}

    #[derive(Debug)]
    struct Ping(u32);
    impl Event for Ping {}

    #[test]
    fn coarse_dispatch_runs_in_subscription_order() {
        let mut ctx = Context::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            ctx.subscribe::<Ping>(move |_, _| {
                seen.borrow_mut().push(tag);
                Ok(())
            });
        }

        ctx.publish(&Ping(1)).unwrap();
        assert_eq!(*seen.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn publish_without_subscribers_is_a_noop() {
        let mut ctx = Context::new(0);
        ctx.publish(&Ping(0)).unwrap();
    }

    #[test]
    fn fine_dispatch_matches_computed_label_only() {
        let mut ctx = Context::new(0);
        ctx.register_labeler::<ColorChanged>("by-color", |_, event| {
            [event.color].into_iter().collect()
        })
        .unwrap();

        let blue_hits = Rc::new(RefCell::new(0));
        {
            let blue_hits = blue_hits.clone();
            let label = EventLabel::new("by-color", ["BLUE"].into_iter().collect());
            ctx.subscribe_to_label::<ColorChanged>(&label, move |_, _| {
                *blue_hits.borrow_mut() += 1;
                Ok(())
            })
            .unwrap();
        }

        ctx.publish(&ColorChanged { entity: EntityId(0), color: "BLUE" }).unwrap();
        ctx.publish(&ColorChanged { entity: EntityId(0), color: "RED" }).unwrap();
        assert_eq!(*blue_hits.borrow(), 1);
    }

    #[test]
    fn labeler_output_matches_directly_constructed_label() {
        let mut ctx = Context::new(0);
        ctx.register_labeler::<ColorChanged>("by-color", |_, event| {
            LabelKey::of([KeyPart::from(event.color), KeyPart::from(event.entity)])
        })
        .unwrap();

        // Subscribe on a label built directly from the event's fields; the
        // handler fires iff the registered labeler derives the same label.
        let direct = EventLabel::<ColorChanged>::new(
            "by-color",
            LabelKey::of([KeyPart::from("GREEN"), KeyPart::from(EntityId(3))]),
        );
        let hits = Rc::new(RefCell::new(0));
        {
            let hits = hits.clone();
            ctx.subscribe_to_label(&direct, move |_, _| {
                *hits.borrow_mut() += 1;
                Ok(())
            })
            .unwrap();
        }

        ctx.publish(&ColorChanged { entity: EntityId(3), color: "GREEN" }).unwrap();
        assert_eq!(*hits.borrow(), 1);

        // A different entity derives a different label.
        ctx.publish(&ColorChanged { entity: EntityId(4), color: "GREEN" }).unwrap();
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn coarse_runs_before_fine() {
        let mut ctx = Context::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));

        ctx.register_labeler::<Ping>("any", |_, _| LabelKey::unit()).unwrap();
        {
            let seen = seen.clone();
            let label = EventLabel::new("any", LabelKey::unit());
            ctx.subscribe_to_label::<Ping>(&label, move |_, _| {
                seen.borrow_mut().push("fine");
                Ok(())
            })
            .unwrap();
        }
        {
            let seen = seen.clone();
            ctx.subscribe::<Ping>(move |_, _| {
                seen.borrow_mut().push("coarse");
                Ok(())
            });
        }

        ctx.publish(&Ping(0)).unwrap();
        assert_eq!(*seen.borrow(), vec!["coarse", "fine"]);
    }

    #[test]
    fn nested_publish_drains_depth_first() {
        let mut ctx = Context::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));

        {
            let seen = seen.clone();
            ctx.subscribe::<Ping>(move |ctx, event| {
                seen.borrow_mut().push(format!("ping-{}", event.0));
                if event.0 == 0 {
                    ctx.publish(&ColorChanged { entity: EntityId(0), color: "X" })?;
                    seen.borrow_mut().push("after-nested".to_string());
                }
                Ok(())
            });
        }
        {
            let seen = seen.clone();
            ctx.subscribe::<ColorChanged>(move |_, _| {
                seen.borrow_mut().push("color".to_string());
                Ok(())
            });
        }

        ctx.publish(&Ping(0)).unwrap();
        assert_eq!(
            *seen.borrow(),
            vec!["ping-0", "color", "after-nested"]
        );
    }

    #[test]
    fn handler_error_aborts_dispatch() {
        let mut ctx = Context::new(0);
        let later_ran = Rc::new(RefCell::new(false));

        ctx.subscribe::<Ping>(|_, _| Err(KairosError::internal("boom")));
        {
            let later_ran = later_ran.clone();
            ctx.subscribe::<Ping>(move |_, _| {
                *later_ran.borrow_mut() = true;
                Ok(())
            });
        }

        assert!(ctx.publish(&Ping(0)).is_err());
        assert!(!*later_ran.borrow());
    }

    #[test]
    fn event_filter_requires_registered_labeler() {
        let mut ctx = Context::new(0);
        let label = EventLabel::<Ping>::new("missing", LabelKey::unit());
        assert!(ctx.event_filter(label.clone()).is_err());

        ctx.register_labeler::<Ping>("missing", |_, _| LabelKey::unit()).unwrap();
        let filter = ctx.event_filter(label).unwrap();
        let hits = Rc::new(RefCell::new(0));
        {
            let hits = hits.clone();
            ctx.subscribe_filtered(&filter, move |_, _: &Ping| {
                *hits.borrow_mut() += 1;
                Ok(())
            });
        }
        ctx.publish(&Ping(0)).unwrap();
        assert_eq!(*hits.borrow(), 1);
    }

    struct Counter {
        value: i64,
    }

    impl DataManager for Counter {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn data_manager_round_trip() {
        let mut ctx = Context::new(0);
        ctx.add_data_manager(Counter { value: 1 }).unwrap();

        ctx.with_data_manager_mut::<Counter, _>(|counter, _| {
            counter.value += 41;
            Ok(())
        })
        .unwrap();

        let value = ctx.with_data_manager::<Counter, _>(|counter, _| counter.value).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn unknown_data_manager_is_an_error() {
        let ctx = Context::new(0);
        let err = ctx.with_data_manager::<Counter, _>(|_, _| ()).unwrap_err();
        assert!(err.is_contract());
    }

    #[test]
    fn reentrant_manager_access_is_caught() {
        let mut ctx = Context::new(0);
        ctx.add_data_manager(Counter { value: 0 }).unwrap();

        let err = ctx
            .with_data_manager_mut::<Counter, _>(|_, ctx| {
                ctx.with_data_manager::<Counter, _>(|_, _| ()).map(|()| ())
            })
            .unwrap_err();
        assert!(matches!(
            err,
            KairosError::Contract(ContractError::DataManagerInUse { .. })
        ));
    }

    #[test]
    fn removing_an_entity_evicts_it_from_partitions() {
        struct All;
        impl Filter for All {
            fn evaluate(&self, _: &Context, _: EntityId) -> bool {
                true
            }
            fn sensitivities(&self) -> Vec<crate::partition::FilterSensitivity> {
                Vec::new()
            }
        }

        let mut ctx = Context::new(0);
        let a = ctx.create_entity();
        let b = ctx.create_entity();
        let partition = ctx.add_partition(All, Vec::new()).unwrap();
        assert_eq!(ctx.partition_len(partition).unwrap(), 2);

        ctx.remove_entity(a).unwrap();
        assert_eq!(ctx.partition_len(partition).unwrap(), 1);
        assert!(ctx.partition_contains(partition, b).unwrap());
        assert!(ctx.remove_entity(a).is_err());
    }

    #[test]
    fn identical_seeds_give_identical_draws() {
        let mut a = Context::new(77);
        let mut b = Context::new(77);
        for _ in 0..100 {
            assert_eq!(a.rng().next_u64(), b.rng().next_u64());
        }
    }
}
