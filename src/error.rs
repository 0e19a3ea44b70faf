use thiserror::Error;
use uuid::Uuid;

/// Domain faults callers are expected to branch on. Infrastructure errors
/// (connection failures, constraint violations) stay as plain sqlx errors and
/// propagate through `anyhow::Result` untouched.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown challenge code: {0}")]
    UnknownChallenge(String),

    #[error("challenge {0} references a missing definition")]
    DefinitionMissing(Uuid),
}
