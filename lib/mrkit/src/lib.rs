pub mod api;
pub mod config;
pub mod constants;
pub mod emit;
pub mod error;
pub mod io;
pub mod partition;
pub mod reduce;
pub mod runtime;
mod scheduler;
pub mod sort;
pub mod stats;
pub mod store;
pub mod utils;

pub use api::{map_fn, reduce_fn, Mapper, Reducer};
pub use config::{EngineConfig, FatalPolicy};
pub use emit::Emitter;
pub use error::{EngineError, Phase, Result};
pub use partition::{default_hash_partition, HashPartitioner, Partitioner};
pub use reduce::Values;
pub use runtime::{run, Engine};
pub use stats::RunStats;
