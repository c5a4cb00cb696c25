use crate::emit::Emitter;
use crate::reduce::Values;

// ========== Core MapReduce traits ==========

/// Per-unit transform. Called once per input unit by whichever map worker
/// claims it; emits zero or more key/value pairs.
pub trait Mapper: Sync {
    fn map(&self, unit: &str, emitter: &Emitter<'_>);
}

/// Per-key aggregation. Called once per distinct key in a partition, with a
/// cursor over that key's values. Value order within a key is unspecified.
pub trait Reducer: Sync {
    fn reduce(&self, key: &[u8], values: &mut Values<'_>, partition: usize);
}

impl<F> Mapper for F
where
    F: Fn(&str, &Emitter<'_>) + Sync,
{
    fn map(&self, unit: &str, emitter: &Emitter<'_>) {
        self(unit, emitter)
    }
}

impl<F> Reducer for F
where
    F: Fn(&[u8], &mut Values<'_>, usize) + Sync,
{
    fn reduce(&self, key: &[u8], values: &mut Values<'_>, partition: usize) {
        self(key, values, partition)
    }
}

/// Pins a closure to the [`Mapper`] signature so its argument lifetimes are
/// inferred correctly.
pub fn map_fn<F>(f: F) -> F
where
    F: Fn(&str, &Emitter<'_>) + Sync,
{
    f
}

/// Pins a closure to the [`Reducer`] signature.
pub fn reduce_fn<F>(f: F) -> F
where
    F: Fn(&[u8], &mut Values<'_>, usize) + Sync,
{
    f
}
