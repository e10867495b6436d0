use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::graph::ExecutionGraph;
use crate::component::ComponentId;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::registry::{Registry, SystemId, SystemInfo};
use crate::system::{Factory, System, TemporarySystem};
use crate::tracer::{self, Thread, Tracer};
use crate::World;

/// Runs a sorted set of systems against a world, stage by stage.
pub struct Pipeline {
    registry:          Arc<Registry>,
    stages:            Vec<Stage>,
    temporaries:       Vec<TemporaryEntry>,
    /// Components written by temporary systems.
    temporary_written: Vec<ComponentId>,
    thread_pool:       Option<rayon::ThreadPool>,
    concurrency:       usize,
}

struct Stage {
    systems:       Vec<Entry>,
    written:       Vec<ComponentId>,
    written_names: Vec<&'static str>,
}

struct Entry {
    name:   String,
    active: bool,
    system: Mutex<Box<dyn System>>,
}

impl Entry {
    fn run(&mut self, world: &World, tracer: &impl Tracer) {
        let thread = match rayon::current_thread_index() {
            Some(index) => Thread::Worker(index),
            None => Thread::Main,
        };

        tracer.start_system(thread, &self.name);
        let start = Instant::now();
        self.system.get_mut().run(world);
        tracer.end_system(thread, &self.name, start.elapsed());
    }
}

struct TemporaryEntry {
    name:   String,
    active: bool,
    system: Mutex<Box<dyn TemporarySystem>>,
}

impl Pipeline {
    /// Instantiates the systems of a graph.
    ///
    /// A `concurrency` of `None` uses the number of available CPUs.
    /// A concurrency of 1 or less runs every system on the calling thread.
    pub fn new(graph: ExecutionGraph, config: &PipelineConfig) -> Self {
        let ExecutionGraph { registry, sorted, stages, .. } = graph;
        let info = |index: usize| {
            registry.system(SystemId(index as u32)).expect("graph node without system")
        };

        let stages = stages
            .iter()
            .map(|indices| {
                let systems: Vec<Entry> = indices
                    .iter()
                    .map(|&index| {
                        let info = info(index);
                        let system = match &info.descriptor().factory {
                            Factory::Regular(factory) => factory(&registry),
                            Factory::Temporary(_) => {
                                panic!("Temporary system {} cannot be staged", info.name())
                            }
                        };
                        Entry {
                            name:   info.name().to_string(),
                            active: true,
                            system: Mutex::new(system),
                        }
                    })
                    .collect();
                let written = written_components(indices.iter().map(|&index| info(index)));
                let written_names = written
                    .iter()
                    .map(|&component| {
                        registry
                            .component(component)
                            .expect("access to unregistered component")
                            .name()
                    })
                    .collect();
                Stage { systems, written, written_names }
            })
            .collect();

        let temporary_indices: Vec<usize> = sorted
            .iter()
            .copied()
            .filter(|&index| info(index).descriptor().is_temporary())
            .collect();
        let temporaries = temporary_indices
            .iter()
            .filter_map(|&index| {
                let info = info(index);
                match &info.descriptor().factory {
                    Factory::Temporary(factory) => Some(TemporaryEntry {
                        name:   info.name().to_string(),
                        active: true,
                        system: Mutex::new(factory(&registry)),
                    }),
                    Factory::Regular(_) => None,
                }
            })
            .collect();
        let temporary_written =
            written_components(temporary_indices.iter().map(|&index| info(index)));

        let concurrency = config.concurrency.unwrap_or_else(|| {
            match std::thread::available_parallelism() {
                Ok(concurrency) => concurrency.get(),
                Err(err) => {
                    log::error!("Cannot detect number of CPUs ({err}), parallelism disabled");
                    1
                }
            }
        });
        let thread_pool = (concurrency > 1).then(|| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(concurrency)
                .thread_name(|i| format!("tessera executor #{}", i))
                .build()
                .expect("Failed to create thread pool")
        });

        Self { registry, stages, temporaries, temporary_written, thread_pool, concurrency }
    }

    /// The registry this pipeline was built from.
    pub fn registry(&self) -> &Arc<Registry> { &self.registry }

    /// The number of worker threads.
    pub fn concurrency(&self) -> usize { self.concurrency }

    /// The names of the systems in each stage.
    pub fn stages(&self) -> Vec<Vec<&str>> {
        self.stages
            .iter()
            .map(|stage| stage.systems.iter().map(|entry| entry.name.as_str()).collect())
            .collect()
    }

    /// The names of the temporary systems that have not completed yet.
    pub fn temporary_systems(&self) -> Vec<&str> {
        self.temporaries.iter().map(|entry| entry.name.as_str()).collect()
    }

    /// Enables or disables a system. Disabled systems are skipped by [`dispatch`](Self::dispatch).
    pub fn set_active(&mut self, name: &str, active: bool) -> Result<(), PipelineError> {
        for entry in self.stages.iter_mut().flat_map(|stage| &mut stage.systems) {
            if entry.name == name {
                entry.active = active;
                return Ok(());
            }
        }
        for entry in &mut self.temporaries {
            if entry.name == name {
                entry.active = active;
                return Ok(());
            }
        }
        Err(PipelineError::UnknownSystem(name.to_string()))
    }

    /// Creates the storages and databags declared by the systems of this pipeline,
    /// and resets change tracing.
    ///
    /// Storages watched by any system trace changes,
    /// with all of their existing entities marked as changed.
    ///
    /// # Panics
    /// Panics if `world` was created from another registry.
    pub fn prepare(&self, world: &mut World) {
        self.assert_registry(world);

        let systems: Vec<&SystemInfo> = self.system_infos().collect();
        for info in &systems {
            for component in info.access().components().chain(info.watched().iter().copied()) {
                world.create_storage_dyn(component);
            }
            for databag in info.access().databags() {
                world.create_databag_dyn(databag);
            }
        }

        for component in self.registry.components() {
            let watched = systems.iter().any(|info| info.watched().contains(&component.id()));
            let traced = watched || world.config().storage(component.name()).trace_changes;

            if let Some(mut storage) = world.storage_dyn_mut(component.id()) {
                let entities = if watched { storage.entities().to_vec() } else { Vec::new() };

                let changes = storage.changes_mut();
                changes.reset();
                changes.set_tracing(traced);
                for entity in entities {
                    changes.notify_changed(entity);
                }
            }
        }

        log::debug!(
            "Prepared world for {} systems in {} stages",
            systems.len(),
            self.stages.len()
        );
    }

    /// Runs one frame without tracing.
    pub fn dispatch(&mut self, world: &mut World) { self.dispatch_with(world, &tracer::Noop) }

    /// Runs one frame.
    ///
    /// The hierarchy is flushed first, then the temporary systems run on the calling thread,
    /// then each stage runs and releases the storages it writes.
    /// Change marks are cleared at the end of the frame.
    ///
    /// # Panics
    /// Panics if `world` was created from another registry,
    /// or propagates the panic of a system.
    pub fn dispatch_with(&mut self, world: &mut World, tracer: &impl Tracer) {
        self.assert_registry(world);
        let world: &World = world;

        let start = Instant::now();
        tracer.start_dispatch();

        world.flush_hierarchy();
        self.run_temporaries(world, tracer);

        for (index, stage) in self.stages.iter_mut().enumerate() {
            let stage_start = Instant::now();
            tracer.start_stage(index, stage.systems.len());

            let active = stage.systems.iter().filter(|entry| entry.active).count();
            match &self.thread_pool {
                Some(pool) if active > 1 => pool.in_place_scope(|scope| {
                    for entry in stage.systems.iter_mut().filter(|entry| entry.active) {
                        scope.spawn(move |_| entry.run(world, tracer));
                    }
                }),
                _ => {
                    for entry in stage.systems.iter_mut().filter(|entry| entry.active) {
                        entry.run(world, tracer);
                    }
                }
            }

            tracer.end_stage(index, stage_start.elapsed());
            tracer.release_storages(index, &stage.written_names);
            world.release(&stage.written);
        }

        world.flush_changes();
        tracer.end_dispatch(start.elapsed());
    }

    fn run_temporaries(&mut self, world: &World, tracer: &impl Tracer) {
        if self.temporaries.is_empty() {
            return;
        }

        self.temporaries.retain_mut(|entry| {
            if !entry.active {
                return true;
            }

            tracer.start_system(Thread::Main, &entry.name);
            let start = Instant::now();
            let done = entry.system.get_mut().run(world);
            tracer.end_system(Thread::Main, &entry.name, start.elapsed());

            if done {
                log::debug!("Temporary system {} is done", entry.name);
                tracer.temporary_system_done(&entry.name);
            }
            !done
        });

        world.release(&self.temporary_written);
    }

    fn system_infos(&self) -> impl Iterator<Item = &SystemInfo> {
        self.stages
            .iter()
            .flat_map(|stage| &stage.systems)
            .map(|entry| entry.name.as_str())
            .chain(self.temporaries.iter().map(|entry| entry.name.as_str()))
            .map(|name| self.registry.system_by_name(name).expect("pipeline system is registered"))
    }

    fn assert_registry(&self, world: &World) {
        assert!(
            Arc::ptr_eq(&self.registry, world.registry()),
            "The world was created from a different registry than the pipeline"
        );
    }
}

fn written_components<'a>(systems: impl Iterator<Item = &'a SystemInfo>) -> Vec<ComponentId> {
    let mut written: Vec<ComponentId> =
        systems.flat_map(|info| info.access().written_components()).collect();
    written.sort_unstable();
    written.dedup();
    written
}
