use crate::stats::SortStats;
use crate::store::{PartitionTable, SortedPartition};
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info};

/// Moves every partition's entries out of the table and orders them by key.
///
/// Must only run once all map workers have joined. Partitions are disjoint,
/// so they are sorted in parallel, each one on a single thread. The sort is
/// unstable: the relative order of entries sharing a key is unspecified and
/// may differ between runs.
pub fn sort_partitions(table: &PartitionTable) -> (Vec<SortedPartition>, SortStats) {
    let phase_start = Instant::now();
    let sorted: Vec<SortedPartition> = table
        .partitions()
        .par_iter()
        .map(|partition| {
            let started = Instant::now();
            let sorted = SortedPartition::sort(partition.index(), partition.take_entries());
            debug!(
                partition = sorted.index(),
                entries = sorted.len(),
                sort_ms = started.elapsed().as_millis() as u64,
                "partition sorted"
            );
            sorted
        })
        .collect();

    let stats = SortStats {
        partitions: sorted.len(),
        entries: sorted.iter().map(|p| p.len() as u64).sum(),
        bytes: sorted.iter().map(|p| p.size_bytes() as u64).sum(),
        largest_partition: sorted.iter().map(|p| p.len() as u64).max().unwrap_or(0),
        empty_partitions: sorted.iter().filter(|p| p.is_empty()).count(),
        wall_ms: phase_start.elapsed().as_millis() as u64,
    };
    info!(
        phase = "sort",
        partitions = stats.partitions,
        total_entries = stats.entries,
        total_bytes = stats.bytes,
        largest_partition = stats.largest_partition,
        empty_partitions = stats.empty_partitions,
        wall_ms = stats.wall_ms,
        "Sort phase complete"
    );
    (sorted, stats)
}
