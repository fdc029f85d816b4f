//! Partition maintenance end-to-end: the incrementally-maintained index
//! must equal a brute-force re-scan of the predicate at every observable
//! point, across interleaved mutation bursts.

use std::any::Any;

use kairos::{
    Context, DataManager, EntityId, Event, Filter, FilterSensitivity, IndexedPropertyStore,
    KairosResult, KeyPart, LabelKey, PartitionDimension, PartitionId, PropertyDefinition,
    Simulation,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Status {
    Susceptible,
    Infectious,
    Recovered,
}

struct HealthManager {
    status: IndexedPropertyStore<Status>,
    region: IndexedPropertyStore<i64>,
}

impl HealthManager {
    fn new() -> Self {
        Self {
            status: IndexedPropertyStore::new(PropertyDefinition::new(Status::Susceptible)),
            region: IndexedPropertyStore::new(PropertyDefinition::new(0i64)),
        }
    }
}

impl DataManager for HealthManager {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Clone, Debug)]
struct StatusChanged {
    entity: EntityId,
}
impl Event for StatusChanged {}

#[derive(Clone, Debug)]
struct RegionChanged {
    entity: EntityId,
}
impl Event for RegionChanged {}

/// Matches infectious entities; sensitive to status changes (membership)
/// and region changes (bucket placement).
struct InfectiousFilter;

impl Filter for InfectiousFilter {
    fn evaluate(&self, ctx: &Context, entity: EntityId) -> bool {
        ctx.with_data_manager::<HealthManager, _>(|m, _| {
            *m.status.get(entity.index()) == Status::Infectious
        })
        .unwrap_or(false)
    }

    fn sensitivities(&self) -> Vec<FilterSensitivity> {
        vec![
            FilterSensitivity::on_event::<StatusChanged>(|e| Some(e.entity)),
            FilterSensitivity::on_event::<RegionChanged>(|e| Some(e.entity)),
        ]
    }
}

fn region_dimension() -> PartitionDimension {
    PartitionDimension::new(|ctx, entity| {
        let region = ctx
            .with_data_manager::<HealthManager, _>(|m, _| *m.region.get(entity.index()))
            .unwrap_or(0);
        KeyPart::Int(region)
    })
}

fn set_status(ctx: &mut Context, entity: EntityId, status: Status) -> KairosResult<()> {
    let now = ctx.now();
    ctx.with_data_manager_mut::<HealthManager, _>(|m, _| {
        m.status.set(entity.index(), status, now)?;
        Ok(())
    })?;
    ctx.publish(&StatusChanged { entity })
}

fn set_region(ctx: &mut Context, entity: EntityId, region: i64) -> KairosResult<()> {
    let now = ctx.now();
    ctx.with_data_manager_mut::<HealthManager, _>(|m, _| {
        m.region.set(entity.index(), region, now)?;
        Ok(())
    })?;
    ctx.publish(&RegionChanged { entity })
}

fn brute_force_members(ctx: &Context) -> Vec<EntityId> {
    ctx.live_entities()
        .into_iter()
        .filter(|&entity| InfectiousFilter.evaluate(ctx, entity))
        .collect()
}

fn assert_matches_brute_force(ctx: &Context, partition: PartitionId) {
    let expected = brute_force_members(ctx);
    assert_eq!(ctx.partition_members(partition).unwrap(), expected);

    for region in 0..3i64 {
        let bucket = LabelKey::of([KeyPart::Int(region)]);
        let expected_bucket: Vec<EntityId> = expected
            .iter()
            .copied()
            .filter(|&entity| {
                ctx.with_data_manager::<HealthManager, _>(|m, _| {
                    *m.region.get(entity.index()) == region
                })
                .unwrap()
            })
            .collect();
        assert_eq!(ctx.bucket_members(partition, &bucket).unwrap(), expected_bucket);
        assert_eq!(ctx.bucket_len(partition, &bucket).unwrap(), expected_bucket.len());
    }
}

fn scenario(seed: u64) -> (Simulation, PartitionId, Vec<EntityId>) {
    let mut sim = Simulation::builder().with_seed(seed).build().unwrap();
    let ctx = sim.context_mut();
    ctx.add_data_manager(HealthManager::new()).unwrap();

    let mut entities = Vec::new();
    for i in 0..30i64 {
        let entity = ctx.create_entity();
        set_region(ctx, entity, i % 3).unwrap();
        entities.push(entity);
    }
    // Pre-seed a few infections so the initial scan has matches.
    for &entity in &entities[0..4] {
        set_status(ctx, entity, Status::Infectious).unwrap();
    }

    let partition = ctx
        .add_partition(InfectiousFilter, vec![region_dimension()])
        .unwrap();
    (sim, partition, entities)
}

#[test]
fn initial_scan_indexes_existing_matches() {
    let (sim, partition, entities) = scenario(1);
    let ctx = sim.context();

    assert_eq!(ctx.partition_len(partition).unwrap(), 4);
    assert!(ctx.partition_contains(partition, entities[0]).unwrap());
    assert!(!ctx.partition_contains(partition, entities[10]).unwrap());
    assert_matches_brute_force(ctx, partition);
}

#[test]
fn incremental_maintenance_matches_brute_force_under_bursts() {
    let (mut sim, partition, mut entities) = scenario(2);
    let ctx = sim.context_mut();

    // Burst 1: infect a spread of entities.
    for &entity in &[entities[5], entities[11], entities[17], entities[23]] {
        set_status(ctx, entity, Status::Infectious).unwrap();
    }
    assert_matches_brute_force(ctx, partition);

    // Burst 2: recover some of the originals, move one across regions.
    set_status(ctx, entities[0], Status::Recovered).unwrap();
    set_status(ctx, entities[1], Status::Recovered).unwrap();
    set_region(ctx, entities[5], 2).unwrap();
    assert_matches_brute_force(ctx, partition);

    // Burst 3: remove a member and a non-member outright.
    ctx.remove_entity(entities[11]).unwrap();
    ctx.remove_entity(entities[12]).unwrap();
    assert_matches_brute_force(ctx, partition);

    // Burst 4: newly created entities join only once they qualify. Index
    // recycling must not resurrect the removed member's membership.
    let newcomer = ctx.create_entity();
    entities.push(newcomer);
    assert!(!ctx.partition_contains(partition, newcomer).unwrap());
    set_region(ctx, newcomer, 1).unwrap();
    set_status(ctx, newcomer, Status::Infectious).unwrap();
    assert_matches_brute_force(ctx, partition);

    // Burst 5: no-op refresh (status set to its current value).
    set_status(ctx, newcomer, Status::Infectious).unwrap();
    assert_matches_brute_force(ctx, partition);
}

#[test]
fn sampling_draws_only_bucket_members() {
    let (mut sim, partition, _entities) = scenario(3);
    let ctx = sim.context_mut();

    let bucket = LabelKey::of([KeyPart::Int(0)]);
    let members = ctx.bucket_members(partition, &bucket).unwrap();
    assert!(!members.is_empty());

    for _ in 0..200 {
        let drawn = ctx.sample_bucket(partition, &bucket).unwrap().unwrap();
        assert!(members.contains(&drawn));
    }

    let empty = LabelKey::of([KeyPart::Int(99)]);
    assert_eq!(ctx.sample_bucket(partition, &empty).unwrap(), None);
}

#[test]
fn sampling_is_deterministic_per_seed() {
    let draws = |seed| {
        let (mut sim, partition, _) = scenario(seed);
        let ctx = sim.context_mut();
        let bucket = LabelKey::of([KeyPart::Int(1)]);
        (0..50)
            .map(|_| ctx.sample_bucket(partition, &bucket).unwrap())
            .collect::<Vec<_>>()
    };
    assert_eq!(draws(9), draws(9));
}

#[test]
fn partition_ids_are_scoped_to_their_scenario() {
    let (sim, partition, _entities) = scenario(4);
    drop(sim);

    // The copied id means nothing to a scenario that never built it.
    let mut other = Simulation::builder().build().unwrap();
    let ctx = other.context_mut();
    let entity = ctx.create_entity();
    let err = ctx.refresh_partition(partition, entity).unwrap_err();
    assert!(err.is_contract());
    assert!(ctx.partition_len(partition).is_err());
}
