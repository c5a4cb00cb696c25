/// Routes a key to a partition index in `[0, num_partitions)`.
///
/// Implementations must be deterministic and total for the duration of a run:
/// grouping relies on every emission of a key landing in the same partition.
pub trait Partitioner: Send + Sync {
    fn partition(&self, key: &[u8], num_partitions: usize) -> usize;
}

impl<F> Partitioner for F
where
    F: Fn(&[u8], usize) -> usize + Send + Sync,
{
    fn partition(&self, key: &[u8], num_partitions: usize) -> usize {
        self(key, num_partitions)
    }
}

/// The default partitioner, see [`default_hash_partition`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HashPartitioner;

impl Partitioner for HashPartitioner {
    fn partition(&self, key: &[u8], num_partitions: usize) -> usize {
        default_hash_partition(key, num_partitions)
    }
}

const HASH_SEED: u64 = 5381;
const HASH_MULTIPLIER: u64 = 33;

/// Additive polynomial hash: seed 5381, `hash * 33 + byte` per byte,
/// wrapping on overflow.
pub fn additive_hash(key: &[u8]) -> u64 {
    key.iter().fold(HASH_SEED, |hash, &b| {
        hash.wrapping_mul(HASH_MULTIPLIER).wrapping_add(u64::from(b))
    })
}

pub fn default_hash_partition(key: &[u8], num_partitions: usize) -> usize {
    (additive_hash(key) % num_partitions as u64) as usize
}
