//! Two runs with the same plugins and the same seed must produce identical
//! output sequences; the seed is the only source of variation.

use std::any::Any;

use kairos::{
    CollectingConsumer, Context, DataManager, Event, KairosResult, Plugin, Simulation, Time,
};

#[derive(Clone, Debug)]
struct Transmission {
    source: usize,
    target: usize,
}
impl Event for Transmission {}

/// Tracks which entities are infectious.
struct InfectionManager {
    infectious: Vec<usize>,
}

impl DataManager for InfectionManager {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A toy transmission process: at each step an infectious entity picks a
/// random live entity, infects it, emits a record, and reschedules itself
/// while any susceptibles remain.
fn step(ctx: &mut Context) -> KairosResult<()> {
    let population = ctx.entity_count();
    let source = ctx.with_data_manager::<InfectionManager, _>(|m, _| m.infectious[0])?;
    let target = ctx.rng().sample_index(population);

    let newly = ctx.with_data_manager_mut::<InfectionManager, _>(|m, _| {
        if m.infectious.contains(&target) {
            Ok(false)
        } else {
            m.infectious.push(target);
            Ok(true)
        }
    })?;
    if newly {
        ctx.publish(&Transmission { source, target })?;
    }

    let done = ctx.with_data_manager::<InfectionManager, _>(|m, ctx| {
        m.infectious.len() == ctx.entity_count()
    })?;
    if !done {
        ctx.schedule(ctx.now() + 1.0, step)?;
    }
    Ok(())
}

fn epidemic_plugin(population: usize) -> Plugin {
    Plugin::builder("epidemic")
        .on_init(move |ctx| {
            for _ in 0..population {
                ctx.create_entity();
            }
            let seed_case = ctx.rng().sample_index(population);
            ctx.add_data_manager(InfectionManager {
                infectious: vec![seed_case],
            })?;
            ctx.subscribe::<Transmission>(|ctx, event| {
                let at = ctx.now();
                ctx.release_output(Box::new((at, event.source, event.target)));
                Ok(())
            });
            ctx.schedule(Time::new(1.0).unwrap(), step)?;
            Ok(())
        })
        .build()
        .unwrap()
}

fn run(seed: u64) -> Vec<(Time, usize, usize)> {
    let (consumer, log) = CollectingConsumer::new();
    let mut sim = Simulation::builder()
        .with_seed(seed)
        .with_output(consumer)
        .add_plugin(epidemic_plugin(40))
        .build()
        .unwrap();
    sim.execute().unwrap();
    sim.close().unwrap();
    log.extract::<(Time, usize, usize)>()
}

#[test]
fn identical_seeds_replay_bit_identically() {
    let first = run(2024);
    let second = run(2024);
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn run_infects_everyone_exactly_once() {
    let records = run(7);
    // 40 entities, one seed case: 39 transmission records.
    assert_eq!(records.len(), 39);
    let mut targets: Vec<usize> = records.iter().map(|r| r.2).collect();
    targets.sort_unstable();
    targets.dedup();
    assert_eq!(targets.len(), 39);
}

#[test]
fn different_seeds_diverge() {
    let a = run(1);
    let b = run(2);
    // Lengths match (everyone ends infected) but the transmission chains
    // should differ.
    assert_ne!(a, b);
}
