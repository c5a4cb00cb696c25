//! The intermediate key/value store: one mutex-guarded growable buffer per
//! partition while mapping, then sorted lock-free partitions for reduction.

use crate::utils::lock;
use std::collections::TryReserveError;
use std::sync::Mutex;

/// An owned key/value pair. Both halves are copied out of the caller's
/// buffers on emit, so the caller may reuse them immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    key: Box<[u8]>,
    value: Box<[u8]>,
}

impl Entry {
    pub(crate) fn copy_from(key: &[u8], value: &[u8]) -> Result<Self, TryReserveError> {
        Ok(Self { key: copy_bytes(key)?, value: copy_bytes(value)? })
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn size_bytes(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

fn copy_bytes(src: &[u8]) -> Result<Box<[u8]>, TryReserveError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(src.len())?;
    buf.extend_from_slice(src);
    Ok(buf.into_boxed_slice())
}

pub struct Partition {
    index: usize,
    initial_capacity: usize,
    entries: Mutex<Vec<Entry>>,
}

impl Partition {
    fn new(index: usize, initial_capacity: usize) -> Self {
        Self { index, initial_capacity, entries: Mutex::new(Vec::new()) }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends under this partition's lock only. A full buffer grows to
    /// `initial_capacity` first and doubles afterwards.
    pub(crate) fn push(&self, entry: Entry) -> Result<(), TryReserveError> {
        let mut entries = lock(&self.entries);
        if entries.len() == entries.capacity() {
            let additional = entries.capacity().max(self.initial_capacity);
            entries.try_reserve_exact(additional)?;
        }
        entries.push(entry);
        Ok(())
    }

    pub(crate) fn take_entries(&self) -> Vec<Entry> {
        std::mem::take(&mut *lock(&self.entries))
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        lock(&self.entries).capacity()
    }
}

/// Fixed-size table of partitions, sized once per run.
pub struct PartitionTable {
    partitions: Vec<Partition>,
}

impl PartitionTable {
    pub fn new(num_partitions: usize, initial_capacity: usize) -> Self {
        let partitions = (0..num_partitions).map(|i| Partition::new(i, initial_capacity)).collect();
        Self { partitions }
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Partition> {
        self.partitions.get(index)
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn total_entries(&self) -> usize {
        self.partitions.iter().map(Partition::len).sum()
    }
}

/// A partition after the sort stage: entries ordered by key, owned
/// exclusively by one reduce worker, read without locking.
#[derive(Debug)]
pub struct SortedPartition {
    index: usize,
    entries: Vec<Entry>,
}

impl SortedPartition {
    /// Orders entries by key bytes. The sort is unstable: entries with equal
    /// keys end up contiguous but in no particular order.
    pub(crate) fn sort(index: usize, mut entries: Vec<Entry>) -> Self {
        entries.sort_unstable_by(|a, b| a.key.cmp(&b.key));
        Self { index, entries }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.entries.iter().map(Entry::size_bytes).sum()
    }

    /// First index of `key`'s run, or the insertion point if absent.
    pub fn group_start(&self, key: &[u8]) -> usize {
        self.entries.partition_point(|e| e.key() < key)
    }

    /// One past the last entry sharing the key at `start`.
    pub fn group_end(&self, start: usize) -> usize {
        match self.entries.get(start) {
            Some(first) => {
                start + self.entries[start..].iter().take_while(|e| e.key == first.key).count()
            }
            None => self.entries.len(),
        }
    }

    /// Number of distinct keys.
    pub fn groups(&self) -> usize {
        let mut count = 0;
        let mut start = 0;
        while start < self.entries.len() {
            start = self.group_end(start);
            count += 1;
        }
        count
    }
}
