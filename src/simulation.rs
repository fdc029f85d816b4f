//! Simulation construction and the run loop.
//!
//! `SimulationBuilder` collects plugins and produces a runnable
//! `Simulation` through a strictly ordered construction sequence:
//!
//! 1. deterministic topological sort of the plugins (declaration order
//!    breaks ties, so construction is reproducible),
//! 2. plugin data insertion, then plugin initializers, in dependency order,
//! 3. every data manager's `init` hook, in registration order — at this
//!    point all managers exist, so mutual lookup works regardless of
//!    plugin declaration order,
//! 4. every actor's `init` hook, then every report's, in registration
//!    order.
//!
//! Configuration faults (duplicate ids, missing dependencies, cycles) are
//! fatal and detected before any simulation time elapses.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::context::Context;
use crate::error::{ConfigurationError, KairosError, KairosResult};
use crate::output::{DiscardConsumer, OutputConsumer};
use crate::plugin::{Plugin, PluginId};

/// Builder for [`Simulation`].
pub struct SimulationBuilder {
    seed: u64,
    plugins: Vec<Plugin>,
    output: Box<dyn OutputConsumer>,
}

impl SimulationBuilder {
    fn new() -> Self {
        Self {
            seed: 0,
            plugins: Vec::new(),
            output: Box::new(DiscardConsumer),
        }
    }

    /// Sets the scenario RNG seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Adds a plugin. Order of addition is the tie-break order for the
    /// dependency sort.
    #[must_use]
    pub fn add_plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Sets the consumer that receives everything released through
    /// [`Context::release_output`]. Defaults to discarding.
    #[must_use]
    pub fn with_output(mut self, output: impl OutputConsumer + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    /// Runs the four construction phases and returns a runnable
    /// simulation.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` for duplicate plugin ids, missing
    /// dependencies, or dependency cycles; propagates any error from a
    /// plugin initializer or an `init` hook.
    pub fn build(self) -> KairosResult<Simulation> {
        let order = dependency_order(&self.plugins)?;
        let mut ctx = Context::with_output(self.seed, self.output);

        // Phase 1+2: data first, so an initializer can read any plugin's
        // payloads, then the initializers themselves.
        let mut plugins: Vec<Option<Plugin>> = self.plugins.into_iter().map(Some).collect();
        let mut inits = Vec::with_capacity(order.len());
        for &index in &order {
            let Some(plugin) = plugins[index].take() else {
                return Err(KairosError::internal("plugin order visited an index twice"));
            };
            for data in plugin.data {
                ctx.insert_plugin_data(data)?;
            }
            if let Some(init) = plugin.init {
                inits.push(init);
            }
        }
        for init in inits {
            init(&mut ctx)?;
        }

        // Phase 3.
        for type_id in ctx.manager_order() {
            ctx.init_manager(type_id)?;
        }

        // Phase 4: actors, then reports.
        for actor in ctx.actor_handles() {
            borrow_hook(&actor)?.init(&mut ctx)?;
        }
        for report in ctx.report_handles() {
            borrow_hook(&report)?.init(&mut ctx)?;
        }

        Ok(Simulation { ctx })
    }
}

fn borrow_hook<T: ?Sized>(cell: &Rc<RefCell<T>>) -> KairosResult<std::cell::RefMut<'_, T>> {
    cell.try_borrow_mut()
        .map_err(|_| KairosError::internal("init hook target is already borrowed"))
}

/// Indices into `plugins` in a valid dependency order, deterministic for a
/// given declaration order: among the plugins whose dependencies are all
/// satisfied, the earliest-declared runs first.
fn dependency_order(plugins: &[Plugin]) -> Result<Vec<usize>, ConfigurationError> {
    let mut index_of: HashMap<&PluginId, usize> = HashMap::new();
    for (index, plugin) in plugins.iter().enumerate() {
        if index_of.insert(plugin.id(), index).is_some() {
            return Err(ConfigurationError::DuplicatePluginId {
                id: plugin.id().as_str().to_string(),
            });
        }
    }

    let mut remaining_deps: Vec<usize> = vec![0; plugins.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); plugins.len()];
    for (index, plugin) in plugins.iter().enumerate() {
        for dependency in plugin.dependencies() {
            let Some(&dep_index) = index_of.get(dependency) else {
                return Err(ConfigurationError::MissingDependency {
                    plugin: plugin.id().as_str().to_string(),
                    dependency: dependency.as_str().to_string(),
                });
            };
            remaining_deps[index] += 1;
            dependents[dep_index].push(index);
        }
    }

    // Kahn's algorithm over a sorted ready set keeps the order a pure
    // function of the declaration list.
    let mut ready: Vec<usize> = (0..plugins.len())
        .filter(|&index| remaining_deps[index] == 0)
        .collect();
    let mut order = Vec::with_capacity(plugins.len());
    while let Some(&next) = ready.first() {
        ready.remove(0);
        order.push(next);
        for &dependent in &dependents[next] {
            remaining_deps[dependent] -= 1;
            if remaining_deps[dependent] == 0 {
                let position = ready
                    .binary_search(&dependent)
                    .unwrap_or_else(|insert_at| insert_at);
                ready.insert(position, dependent);
            }
        }
    }

    if order.len() < plugins.len() {
        let mut ids: Vec<String> = (0..plugins.len())
            .filter(|&index| !order.contains(&index))
            .map(|index| plugins[index].id().as_str().to_string())
            .collect();
        ids.sort_unstable();
        return Err(ConfigurationError::DependencyCycle { ids });
    }
    Ok(order)
}

/// A fully constructed scenario, ready to run.
pub struct Simulation {
    ctx: Context,
}

impl Simulation {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> SimulationBuilder {
        SimulationBuilder::new()
    }

    /// Shared access to the runtime state.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Exclusive access to the runtime state, e.g. to seed plans or
    /// inspect results between runs.
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    /// Executes plans in `(time, insertion order)` order until the queue
    /// drains or a requested halt takes effect. A halt lets the current
    /// timestamp's batch finish; plans at strictly later times stay
    /// pending.
    ///
    /// # Errors
    ///
    /// The first error returned by a plan action (or a handler it
    /// published to) aborts the run; the failing plan counts as executed.
    pub fn execute(&mut self) -> KairosResult<()> {
        loop {
            if self.ctx.scheduler_mut().is_halt_requested() {
                let now = self.ctx.now();
                match self.ctx.scheduler_mut().peek_time() {
                    Some(time) if time <= now => {}
                    _ => break,
                }
            }
            let Some((time, action)) = self.ctx.scheduler_mut().pop_next() else {
                break;
            };
            self.ctx.scheduler_mut().advance_to(time);
            action(&mut self.ctx)?;
        }
        Ok(())
    }

    /// Closes the scenario: emits every pending data-manager state record
    /// (in request order) and then, if requested, the RNG state record.
    ///
    /// # Errors
    ///
    /// Propagates manager-access failures while records are produced.
    pub fn close(mut self) -> KairosResult<()> {
        self.ctx.emit_state_records()
    }
}
