use serde::Serialize;

#[derive(Default, Clone, Debug, Serialize)]
pub struct MapWorkerStats {
    pub worker: usize,
    pub units: u64,
    pub emits: u64,
    pub bytes: u64,
    pub wall_ms: u64,
}

#[derive(Default, Clone, Debug, Serialize)]
pub struct MapStats {
    pub workers: usize,
    pub units: u64,
    pub total_emits: u64,
    pub total_bytes: u64,
    pub min_worker_units: u64,
    pub max_worker_units: u64,
    pub min_worker_ms: u64,
    pub max_worker_ms: u64,
    pub wall_ms: u64,
}

impl MapStats {
    pub fn from_workers(per_worker: &[MapWorkerStats], wall_ms: u64) -> Self {
        Self {
            workers: per_worker.len(),
            units: per_worker.iter().map(|w| w.units).sum(),
            total_emits: per_worker.iter().map(|w| w.emits).sum(),
            total_bytes: per_worker.iter().map(|w| w.bytes).sum(),
            min_worker_units: per_worker.iter().map(|w| w.units).min().unwrap_or(0),
            max_worker_units: per_worker.iter().map(|w| w.units).max().unwrap_or(0),
            min_worker_ms: per_worker.iter().map(|w| w.wall_ms).min().unwrap_or(0),
            max_worker_ms: per_worker.iter().map(|w| w.wall_ms).max().unwrap_or(0),
            wall_ms,
        }
    }

    /// Folds in entries emitted outside any worker's handle.
    pub fn add_direct(&mut self, emits: u64, bytes: u64) {
        self.total_emits += emits;
        self.total_bytes += bytes;
    }
}

#[derive(Default, Clone, Debug, Serialize)]
pub struct SortStats {
    pub partitions: usize,
    pub entries: u64,
    pub bytes: u64,
    pub largest_partition: u64,
    pub empty_partitions: usize,
    pub wall_ms: u64,
}

#[derive(Default, Clone, Debug, Serialize)]
pub struct ReduceWorkerStats {
    pub partition: usize,
    pub groups: u64,
    pub values_read: u64,
    pub wall_ms: u64,
}

#[derive(Default, Clone, Debug, Serialize)]
pub struct ReduceStats {
    pub workers: usize,
    pub total_groups: u64,
    pub total_values_read: u64,
    /// Groups seen per partition, indexed by partition.
    pub groups_per_partition: Vec<u64>,
    pub min_worker_ms: u64,
    pub max_worker_ms: u64,
    pub wall_ms: u64,
}

impl ReduceStats {
    pub fn from_workers(per_worker: &[ReduceWorkerStats], num_partitions: usize, wall_ms: u64) -> Self {
        let mut groups_per_partition = vec![0; num_partitions];
        for w in per_worker {
            if let Some(slot) = groups_per_partition.get_mut(w.partition) {
                *slot = w.groups;
            }
        }
        Self {
            workers: per_worker.len(),
            total_groups: per_worker.iter().map(|w| w.groups).sum(),
            total_values_read: per_worker.iter().map(|w| w.values_read).sum(),
            groups_per_partition,
            min_worker_ms: per_worker.iter().map(|w| w.wall_ms).min().unwrap_or(0),
            max_worker_ms: per_worker.iter().map(|w| w.wall_ms).max().unwrap_or(0),
            wall_ms,
        }
    }
}

/// Everything a completed run reports back.
#[derive(Default, Clone, Debug, Serialize)]
pub struct RunStats {
    pub map: MapStats,
    pub sort: SortStats,
    pub reduce: ReduceStats,
    pub wall_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_aggregate() {
        let workers = vec![
            MapWorkerStats { worker: 0, units: 3, emits: 10, bytes: 40, wall_ms: 5 },
            MapWorkerStats { worker: 1, units: 1, emits: 2, bytes: 8, wall_ms: 9 },
        ];
        let agg = MapStats::from_workers(&workers, 12);
        assert_eq!(agg.workers, 2);
        assert_eq!(agg.units, 4);
        assert_eq!(agg.total_emits, 12);
        assert_eq!(agg.total_bytes, 48);
        assert_eq!((agg.min_worker_units, agg.max_worker_units), (1, 3));
        assert_eq!((agg.min_worker_ms, agg.max_worker_ms), (5, 9));
    }

    #[test]
    fn reduce_aggregate_indexes_by_partition() {
        let workers = vec![
            ReduceWorkerStats { partition: 1, groups: 4, values_read: 9, wall_ms: 1 },
            ReduceWorkerStats { partition: 0, groups: 0, values_read: 0, wall_ms: 0 },
        ];
        let agg = ReduceStats::from_workers(&workers, 3, 2);
        assert_eq!(agg.groups_per_partition, vec![0, 4, 0]);
        assert_eq!(agg.total_groups, 4);
        assert_eq!(agg.total_values_read, 9);
    }

    #[test]
    fn empty_aggregates_are_zero() {
        let agg = MapStats::from_workers(&[], 0);
        assert_eq!(agg.workers, 0);
        assert_eq!(agg.min_worker_units, 0);
    }
}
