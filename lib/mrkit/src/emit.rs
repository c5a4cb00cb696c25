use crate::config::FatalPolicy;
use crate::constants::FATAL_EXIT_CODE;
use crate::error::EngineError;
use crate::partition::Partitioner;
use crate::store::{Entry, PartitionTable};
use crate::utils::lock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::error;

/// First unrecoverable error of a run. Once tripped, workers stop claiming
/// input and emits are dropped.
pub(crate) struct FatalSlot {
    policy: FatalPolicy,
    tripped: AtomicBool,
    error: Mutex<Option<EngineError>>,
}

impl FatalSlot {
    pub(crate) fn new(policy: FatalPolicy) -> Self {
        Self { policy, tripped: AtomicBool::new(false), error: Mutex::new(None) }
    }

    pub(crate) fn trip(&self, err: EngineError) {
        match self.policy {
            FatalPolicy::Abort => {
                error!(error = %err, "fatal engine error, terminating process");
                std::process::exit(FATAL_EXIT_CODE);
            }
            FatalPolicy::ReturnError => {
                error!(error = %err, "fatal engine error, abandoning run");
                let mut slot = lock(&self.error);
                if slot.is_none() {
                    *slot = Some(err);
                }
                self.tripped.store(true, Ordering::Release);
            }
        }
    }

    pub(crate) fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    pub(crate) fn take(&self) -> Option<EngineError> {
        lock(&self.error).take()
    }
}

/// Thread-safe write handle into the partition table of an active run.
///
/// Handed to map callbacks; each call routes the key through the run's
/// partitioner, locks only the target partition and appends an owned copy.
pub struct Emitter<'a> {
    table: &'a PartitionTable,
    partitioner: &'a dyn Partitioner,
    fatal: &'a FatalSlot,
    emits: AtomicU64,
    bytes: AtomicU64,
}

impl<'a> Emitter<'a> {
    pub(crate) fn new(table: &'a PartitionTable, partitioner: &'a dyn Partitioner, fatal: &'a FatalSlot) -> Self {
        Self { table, partitioner, fatal, emits: AtomicU64::new(0), bytes: AtomicU64::new(0) }
    }

    pub fn emit(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) {
        if self.fatal.is_tripped() {
            return;
        }
        let (key, value) = (key.as_ref(), value.as_ref());
        let num_partitions = self.table.len();
        let index = self.partitioner.partition(key, num_partitions);
        let Some(partition) = self.table.get(index) else {
            self.fatal.trip(EngineError::PartitionOutOfRange { index, num_partitions });
            return;
        };
        let bytes = key.len() + value.len();
        let stored = Entry::copy_from(key, value).and_then(|entry| partition.push(entry));
        if let Err(source) = stored {
            self.fatal.trip(EngineError::Allocation { partition: index, bytes, source });
            return;
        }
        self.emits.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn num_partitions(&self) -> usize {
        self.table.len()
    }

    /// Entries stored through this handle so far.
    pub fn emitted(&self) -> u64 {
        self.emits.load(Ordering::Relaxed)
    }

    pub(crate) fn bytes_emitted(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::HashPartitioner;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn emit_routes_through_the_partitioner() {
        let table = PartitionTable::new(4, 16);
        let fatal = FatalSlot::new(FatalPolicy::ReturnError);
        let emitter = Emitter::new(&table, &HashPartitioner, &fatal);
        emitter.emit("a", "1");
        emitter.emit("c", "1");
        emitter.emit("e", "1");
        assert_eq!(table.get(2).unwrap().len(), 2);
        assert_eq!(table.get(0).unwrap().len(), 1);
        assert_eq!(emitter.emitted(), 3);
        assert_eq!(emitter.bytes_emitted(), 6);
    }

    #[test]
    fn concurrent_emits_are_all_stored() {
        let table = Arc::new(PartitionTable::new(3, 1));
        let fatal = Arc::new(FatalSlot::new(FatalPolicy::ReturnError));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let table = Arc::clone(&table);
                let fatal = Arc::clone(&fatal);
                thread::spawn(move || {
                    let emitter = Emitter::new(&table, &HashPartitioner, &fatal);
                    for i in 0..500 {
                        emitter.emit(format!("key-{}", i % 37), format!("{t}:{i}"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(table.total_entries(), 8 * 500);
        assert!(!fatal.is_tripped());
    }

    #[test]
    fn out_of_range_partition_trips_the_run() {
        let table = PartitionTable::new(2, 16);
        let fatal = FatalSlot::new(FatalPolicy::ReturnError);
        let bad = |_: &[u8], n: usize| n;
        let emitter = Emitter::new(&table, &bad, &fatal);
        emitter.emit("k", "v");
        emitter.emit("k", "v");
        assert!(fatal.is_tripped());
        assert_eq!(table.total_entries(), 0);
        assert!(matches!(
            fatal.take(),
            Some(EngineError::PartitionOutOfRange { index: 2, num_partitions: 2 })
        ));
    }

    const ABORT_CHILD_ENV: &str = "MRKIT_TEST_ABORT_CHILD";

    // Re-runs this test in a child process, where tripping the slot exits.
    #[test]
    fn abort_policy_exits_the_process() {
        if std::env::var_os(ABORT_CHILD_ENV).is_some() {
            let fatal = FatalSlot::new(FatalPolicy::Abort);
            fatal.trip(EngineError::NoInput);
            unreachable!("abort policy returned from trip");
        }
        let status = std::process::Command::new(std::env::current_exe().unwrap())
            .args(["--exact", "emit::tests::abort_policy_exits_the_process", "--nocapture", "--test-threads=1"])
            .env(ABORT_CHILD_ENV, "1")
            .status()
            .unwrap();
        assert_eq!(status.code(), Some(FATAL_EXIT_CODE));
    }

    #[test]
    fn first_fatal_error_wins() {
        let fatal = FatalSlot::new(FatalPolicy::ReturnError);
        fatal.trip(EngineError::NoInput);
        fatal.trip(EngineError::RunInProgress);
        assert!(matches!(fatal.take(), Some(EngineError::NoInput)));
        assert!(fatal.take().is_none());
        assert!(fatal.is_tripped());
    }
}
