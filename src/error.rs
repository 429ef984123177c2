//! Error types for the deduplication pipeline.

use std::fmt;

/// Pipeline stage, used to attribute runtime failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Signature,
    Grouping,
    Convergence,
    Filter,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Signature => "signature",
            Stage::Grouping => "grouping",
            Stage::Convergence => "convergence",
            Stage::Filter => "filter",
        };
        f.write_str(name)
    }
}

/// Failure talking to a union-find shard actor.
#[derive(Debug, thiserror::Error)]
pub enum ShardError {
    #[error("shard {shard} is not accepting requests")]
    Unavailable { shard: usize },
    #[error("shard {shard} dropped the request before replying")]
    Dropped { shard: usize },
    #[error("no shard with id {shard} (directory has {count})")]
    UnknownShard { shard: usize, count: usize },
}

/// Failure inside a stage, before it is attributed to that stage.
#[derive(Debug, thiserror::Error)]
pub enum StageFailure {
    #[error(transparent)]
    Shard(#[from] ShardError),
    #[error("record {index} has no string field `{key}`")]
    MissingText { index: usize, key: String },
    #[error("tokenizer failed: {0}")]
    Tokenizer(String),
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    /// Rejected configuration. Raised eagerly, never retried.
    #[error("configuration error in `{param}`: {message}")]
    Config { param: &'static str, message: String },

    /// Fatal failure during a pipeline stage.
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: StageFailure,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DedupError {
    pub fn config(param: &'static str, message: impl Into<String>) -> Self {
        DedupError::Config {
            param,
            message: message.into(),
        }
    }

    pub fn stage(stage: Stage, source: impl Into<StageFailure>) -> Self {
        DedupError::Stage {
            stage,
            source: source.into(),
        }
    }

    /// The stage a runtime failure originated in, if any.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            DedupError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T, E = DedupError> = std::result::Result<T, E>;
