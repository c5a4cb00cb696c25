use std::collections::TryReserveError;
use std::fmt;
use thiserror::Error;

/// Pipeline stage a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Map,
    Sort,
    Reduce,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Map => "map",
            Phase::Sort => "sort",
            Phase::Reduce => "reduce",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no input units supplied")]
    NoInput,

    #[error("a run is already in progress on this engine")]
    RunInProgress,

    #[error("failed to spawn {phase} worker {worker}: {source}")]
    WorkerSpawn {
        phase: Phase,
        worker: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("{phase} worker {worker} panicked")]
    WorkerPanicked { phase: Phase, worker: usize },

    #[error("allocation of {bytes} bytes for partition {partition} failed: {source}")]
    Allocation {
        partition: usize,
        bytes: usize,
        #[source]
        source: TryReserveError,
    },

    #[error("partitioner returned index {index} for {num_partitions} partitions")]
    PartitionOutOfRange { index: usize, num_partitions: usize },

    #[error("reading config {path}: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether the error leaves the run without a usable result, as opposed
    /// to being rejected before any worker started.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::WorkerSpawn { .. }
                | EngineError::WorkerPanicked { .. }
                | EngineError::Allocation { .. }
                | EngineError::PartitionOutOfRange { .. }
        )
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
