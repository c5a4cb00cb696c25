use crate::api::{Mapper, Reducer};
use crate::config::EngineConfig;
use crate::emit::{Emitter, FatalSlot};
use crate::error::{EngineError, Result};
use crate::partition::{HashPartitioner, Partitioner};
use crate::reduce::{run_reduce_phase, Values};
use crate::scheduler::run_map_phase;
use crate::sort::sort_partitions;
use crate::stats::RunStats;
use crate::store::PartitionTable;
use crate::utils::{read, write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{info, warn};

/// State that exists only while a run is in its map phase.
struct ActiveRun {
    table: PartitionTable,
    fatal: FatalSlot,
    // entries stored through Engine::emit rather than a worker's Emitter
    direct_emits: AtomicU64,
    direct_bytes: AtomicU64,
}

/// A map/sort/reduce engine.
///
/// Each call to [`Engine::run`] builds a fresh partition table, drives the
/// map, sort and reduce phases to completion and tears the table down
/// before returning. One engine runs one job at a time; separate engines
/// are fully independent.
pub struct Engine<P = HashPartitioner> {
    config: EngineConfig,
    partitioner: P,
    running: AtomicBool,
    active: RwLock<Option<Arc<ActiveRun>>>,
}

impl Default for Engine<HashPartitioner> {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine<HashPartitioner> {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_partitioner(config, HashPartitioner)
    }
}

impl<P: Partitioner> Engine<P> {
    pub fn with_partitioner(config: EngineConfig, partitioner: P) -> Self {
        Self { config, partitioner, running: AtomicBool::new(false), active: RwLock::new(None) }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Emits into the run currently in its map phase. Outside of one the
    /// entry is dropped with a warning.
    pub fn emit(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) {
        let active = read(&self.active);
        match active.as_deref() {
            Some(run) => {
                let emitter = Emitter::new(&run.table, &self.partitioner, &run.fatal);
                emitter.emit(key, value);
                run.direct_emits.fetch_add(emitter.emitted(), Ordering::Relaxed);
                run.direct_bytes.fetch_add(emitter.bytes_emitted(), Ordering::Relaxed);
            }
            None => warn!(key_len = key.as_ref().len(), "emit called without an active map phase; entry dropped"),
        }
    }

    /// Runs the full pipeline over `units` and blocks until it finishes.
    ///
    /// Every unit is passed to `mapper` by one of `num_mappers` workers. Once
    /// all of them have joined, each of the `num_reducers` partitions is
    /// sorted by key and handed to its own reduce worker, which calls
    /// `reducer` once per distinct key.
    pub fn run<M, R>(&self, units: &[String], mapper: &M, reducer: &R) -> Result<RunStats>
    where
        M: Mapper + ?Sized,
        R: Reducer + ?Sized,
    {
        self.config.validate()?;
        if units.is_empty() {
            return Err(EngineError::NoInput);
        }
        let _running = RunningGuard::acquire(&self.running)?;

        let run_start = Instant::now();
        let num_partitions = self.config.num_partitions();
        let run = Arc::new(ActiveRun {
            table: PartitionTable::new(num_partitions, self.config.initial_partition_capacity),
            fatal: FatalSlot::new(self.config.fatal_policy),
            direct_emits: AtomicU64::new(0),
            direct_bytes: AtomicU64::new(0),
        });
        if run.table.len() != self.config.num_reducers {
            return Err(EngineError::InvalidConfig(format!(
                "{} partitions for {} reducers",
                run.table.len(),
                self.config.num_reducers
            )));
        }
        info!(
            units = units.len(),
            num_mappers = self.config.num_mappers,
            num_reducers = self.config.num_reducers,
            "mrkit starting map phase"
        );

        *write(&self.active) = Some(Arc::clone(&run));
        let mut map = run_map_phase(units, mapper, self.config.num_mappers, &run.table, &self.partitioner, &run.fatal);
        write(&self.active).take();
        map.add_direct(run.direct_emits.load(Ordering::Relaxed), run.direct_bytes.load(Ordering::Relaxed));
        if let Some(err) = run.fatal.take() {
            return Err(err);
        }

        let (sorted, sort) = sort_partitions(&run.table);
        let reduce = run_reduce_phase(&sorted, reducer, &run.fatal);
        if let Some(err) = run.fatal.take() {
            return Err(err);
        }
        drop(sorted);

        let stats = RunStats { map, sort, reduce, wall_ms: run_start.elapsed().as_millis() as u64 };
        info!(
            total_emits = stats.map.total_emits,
            total_groups = stats.reduce.total_groups,
            wall_ms = stats.wall_ms,
            "mrkit run complete"
        );
        Ok(stats)
    }
}

/// Holds the engine's single-run flag; released on every exit path.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| EngineError::RunInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One-shot form of [`Engine::run`] taking closures directly.
///
/// ```no_run
/// let units = vec!["a.txt".to_string(), "b.txt".to_string()];
/// mrkit::run(
///     &units,
///     |unit, emitter| {
///         for word in std::fs::read_to_string(unit).unwrap_or_default().split_whitespace() {
///             emitter.emit(word, "1");
///         }
///     },
///     2,
///     |key, values, _partition| println!("{} {}", String::from_utf8_lossy(key), values.count()),
///     1,
///     mrkit::HashPartitioner,
/// )
/// .unwrap();
/// ```
pub fn run<M, R, P>(
    units: &[String],
    mapper: M,
    num_mappers: usize,
    reducer: R,
    num_reducers: usize,
    partitioner: P,
) -> Result<RunStats>
where
    M: Fn(&str, &Emitter<'_>) + Sync,
    R: Fn(&[u8], &mut Values<'_>, usize) + Sync,
    P: Partitioner,
{
    let config = EngineConfig::new(num_mappers, num_reducers);
    Engine::with_partitioner(config, partitioner).run(units, &mapper, &reducer)
}
