use crate::api::Mapper;
use crate::emit::{Emitter, FatalSlot};
use crate::error::{EngineError, Phase};
use crate::partition::Partitioner;
use crate::stats::{MapStats, MapWorkerStats};
use crate::store::PartitionTable;
use crate::utils::lock;
use std::sync::Mutex;
use std::thread;
use std::time::Instant;
use tracing::{debug, info};

/// Pull queue over the input units: a single counter behind a dedicated
/// lock. Units are handed out in the order supplied.
pub(crate) struct WorkQueue<'a> {
    units: &'a [String],
    next: Mutex<usize>,
}

impl<'a> WorkQueue<'a> {
    pub(crate) fn new(units: &'a [String]) -> Self {
        Self { units, next: Mutex::new(0) }
    }

    pub(crate) fn claim(&self) -> Option<(usize, &'a str)> {
        let mut next = lock(&self.next);
        let index = *next;
        let unit = self.units.get(index)?;
        *next += 1;
        Some((index, unit.as_str()))
    }

    /// Marks every remaining unit as claimed.
    pub(crate) fn close(&self) {
        *lock(&self.next) = self.units.len();
    }

    pub(crate) fn remaining(&self) -> usize {
        self.units.len().saturating_sub(*lock(&self.next))
    }
}

fn map_worker<M: Mapper + ?Sized>(
    worker: usize,
    queue: &WorkQueue<'_>,
    mapper: &M,
    emitter: &Emitter<'_>,
    fatal: &FatalSlot,
) -> MapWorkerStats {
    let started = Instant::now();
    let mut units = 0u64;
    while !fatal.is_tripped() {
        let Some((index, unit)) = queue.claim() else { break };
        debug!(worker, index, unit, "map worker claimed unit");
        mapper.map(unit, emitter);
        units += 1;
    }
    MapWorkerStats {
        worker,
        units,
        emits: emitter.emitted(),
        bytes: emitter.bytes_emitted(),
        wall_ms: started.elapsed().as_millis() as u64,
    }
}

/// Runs `num_mappers` workers over `units` until the queue is drained, then
/// joins every one of them. Returning from here is the barrier after which
/// no emit into `table` can still be in flight.
pub(crate) fn run_map_phase<M: Mapper + ?Sized>(
    units: &[String],
    mapper: &M,
    num_mappers: usize,
    table: &PartitionTable,
    partitioner: &dyn Partitioner,
    fatal: &FatalSlot,
) -> MapStats {
    let phase_start = Instant::now();
    let queue = WorkQueue::new(units);
    let per_worker = thread::scope(|s| {
        let mut handles = Vec::with_capacity(num_mappers);
        for worker in 0..num_mappers {
            let queue = &queue;
            let spawned = thread::Builder::new()
                .name(format!("mrkit-map-{worker}"))
                .spawn_scoped(s, move || {
                    let emitter = Emitter::new(table, partitioner, fatal);
                    map_worker(worker, queue, mapper, &emitter, fatal)
                });
            match spawned {
                Ok(handle) => handles.push((worker, handle)),
                Err(source) => {
                    queue.close();
                    fatal.trip(EngineError::WorkerSpawn { phase: Phase::Map, worker, source });
                    break;
                }
            }
        }
        let mut per_worker = Vec::with_capacity(handles.len());
        for (worker, handle) in handles {
            match handle.join() {
                Ok(stats) => {
                    debug!(worker, units = stats.units, emits = stats.emits, "map worker done");
                    per_worker.push(stats);
                }
                Err(_) => fatal.trip(EngineError::WorkerPanicked { phase: Phase::Map, worker }),
            }
        }
        per_worker
    });

    let stats = MapStats::from_workers(&per_worker, phase_start.elapsed().as_millis() as u64);
    info!(
        phase = "map",
        workers = stats.workers,
        units = stats.units,
        unclaimed = queue.remaining(),
        total_emits = stats.total_emits,
        total_bytes = stats.total_bytes,
        min_task_ms = stats.min_worker_ms,
        max_task_ms = stats.max_worker_ms,
        wall_ms = stats.wall_ms,
        "Map phase complete"
    );
    stats
}
