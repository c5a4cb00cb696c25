use crate::api::Reducer;
use crate::emit::FatalSlot;
use crate::error::{EngineError, Phase};
use crate::stats::{ReduceStats, ReduceWorkerStats};
use crate::store::SortedPartition;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Pull cursor over the values of one key group in one sorted partition.
///
/// A fresh cursor is built for every key group and is private to the reduce
/// worker that owns the partition. It is also an [`Iterator`] over the
/// current key's values; the sequence is finite and cannot be restarted
/// except by asking [`Values::get_next`] for a different key.
pub struct Values<'a> {
    partition: &'a SortedPartition,
    current: Option<&'a [u8]>,
    next: usize,
    read: u64,
}

impl<'a> Values<'a> {
    /// Cursor positioned at `start`, which must be the first entry of a group.
    pub(crate) fn at_group(partition: &'a SortedPartition, start: usize) -> Self {
        let current = partition.entries().get(start).map(|e| e.key());
        Self { partition, current, next: start, read: 0 }
    }

    pub fn key(&self) -> Option<&'a [u8]> {
        self.current
    }

    /// Index of the partition this cursor reads.
    pub fn partition_index(&self) -> usize {
        self.partition.index()
    }

    /// Values handed out so far.
    pub fn read(&self) -> u64 {
        self.read
    }

    /// Next value stored for `key` in `partition`, `None` once the key's run
    /// ends. Asking for a different key moves the cursor to the start of
    /// that key's run. Partitions owned by other workers always yield `None`.
    pub fn get_next(&mut self, key: &[u8], partition: usize) -> Option<&'a [u8]> {
        if partition != self.partition.index() {
            warn!(
                requested = partition,
                owned = self.partition.index(),
                "getter asked for a partition this worker does not own"
            );
            return None;
        }
        if self.current != Some(key) {
            self.reset(key);
        }
        let current = self.current?;
        let entry = self.partition.entries().get(self.next)?;
        if entry.key() != current {
            return None;
        }
        self.next += 1;
        self.read += 1;
        Some(entry.value())
    }

    fn reset(&mut self, key: &[u8]) {
        let start = self.partition.group_start(key);
        self.next = start;
        self.current = self
            .partition
            .entries()
            .get(start)
            .map(|e| e.key())
            .filter(|found| *found == key);
    }
}

impl<'a> Iterator for Values<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.current?;
        self.get_next(key, self.partition.index())
    }
}

/// Scans one sorted partition left to right, invoking the reducer once per
/// key group. Unread values of a group are skipped.
pub(crate) fn reduce_partition<R: Reducer + ?Sized>(partition: &SortedPartition, reducer: &R) -> ReduceWorkerStats {
    let started = Instant::now();
    let mut stats = ReduceWorkerStats { partition: partition.index(), ..Default::default() };
    let entries = partition.entries();
    let mut start = 0;
    while let Some(first) = entries.get(start) {
        let mut values = Values::at_group(partition, start);
        reducer.reduce(first.key(), &mut values, partition.index());
        stats.groups += 1;
        stats.values_read += values.read();
        start = partition.group_end(start);
    }
    stats.wall_ms = started.elapsed().as_millis() as u64;
    stats
}

/// Spawns one reduce worker per partition and joins them all. Spawn failures
/// and worker panics are reported through `fatal`.
pub(crate) fn run_reduce_phase<R: Reducer + ?Sized>(
    partitions: &[SortedPartition],
    reducer: &R,
    fatal: &FatalSlot,
) -> ReduceStats {
    let phase_start = Instant::now();
    let per_worker = thread::scope(|s| {
        let mut handles = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let spawned = thread::Builder::new()
                .name(format!("mrkit-reduce-{}", partition.index()))
                .spawn_scoped(s, move || reduce_partition(partition, reducer));
            match spawned {
                Ok(handle) => handles.push((partition.index(), handle)),
                Err(source) => {
                    fatal.trip(EngineError::WorkerSpawn { phase: Phase::Reduce, worker: partition.index(), source });
                    break;
                }
            }
        }
        let mut per_worker = Vec::with_capacity(handles.len());
        for (worker, handle) in handles {
            match handle.join() {
                Ok(stats) => {
                    debug!(partition = worker, groups = stats.groups, values = stats.values_read, "reduce worker done");
                    per_worker.push(stats);
                }
                Err(_) => fatal.trip(EngineError::WorkerPanicked { phase: Phase::Reduce, worker }),
            }
        }
        per_worker
    });

    let stats = ReduceStats::from_workers(&per_worker, partitions.len(), phase_start.elapsed().as_millis() as u64);
    info!(
        phase = "reduce",
        reducers = stats.workers,
        total_groups = stats.total_groups,
        total_values_read = stats.total_values_read,
        min_reducer_ms = stats.min_worker_ms,
        max_reducer_ms = stats.max_worker_ms,
        wall_ms = stats.wall_ms,
        "Reduce phase complete"
    );
    stats
}
