//! Error types for SYLLAB operations

use crate::EntityId;
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: EntityId },

    #[error("Insert failed for {entity}: {reason}")]
    InsertFailed { entity: &'static str, reason: String },

    #[error("Update failed for {entity} with id {id}: {reason}")]
    UpdateFailed {
        entity: &'static str,
        id: EntityId,
        reason: String,
    },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Invalid row data for {entity}: {reason}")]
    InvalidRow { entity: &'static str, reason: String },
}

/// Content generation errors, thrown by provider implementations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenError {
    #[error("Generator request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Generator returned invalid content: {reason}")]
    InvalidContent { reason: String },

    #[error("Generator rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: i64 },

    #[error("No generator configured for {capability}")]
    NotConfigured { capability: &'static str },
}

/// Orchestration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Job {job_id} is already running")]
    AlreadyRunning { job_id: EntityId },

    #[error("Job {job_id} is already finished")]
    AlreadyFinished { job_id: EntityId },

    #[error("Job {job_id} has an invalid input profile: {reason}")]
    InvalidProfile { job_id: EntityId, reason: String },

    #[error("Job {job_id} has an invalid stored blueprint: {reason}")]
    InvalidBlueprint { job_id: EntityId, reason: String },

    #[error("Module record not found for program {program_id} index {index}")]
    ModuleMissing { program_id: EntityId, index: i32 },

    #[error("Build canceled")]
    Canceled,
}

/// Master error type for all SYLLAB errors.
#[derive(Debug, Clone, Error)]
pub enum SyllabError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Generation error: {0}")]
    Gen(#[from] GenError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Result type alias for SYLLAB operations.
pub type SyllabResult<T> = Result<T, SyllabError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_store_error_display_not_found() {
        let err = StoreError::NotFound {
            entity: "build_job",
            id: Uuid::nil(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Entity not found"));
        assert!(msg.contains("build_job"));
        assert!(msg.contains("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn test_gen_error_display_rate_limited() {
        let err = GenError::RateLimited {
            retry_after_ms: 1500,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("rate limited"));
        assert!(msg.contains("1500"));
    }

    #[test]
    fn test_engine_error_display_module_missing() {
        let err = EngineError::ModuleMissing {
            program_id: Uuid::nil(),
            index: 3,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Module record not found"));
        assert!(msg.contains('3'));
    }

    #[test]
    fn test_syllab_error_from_variants() {
        let store = SyllabError::from(StoreError::TransactionFailed {
            reason: "deadlock".to_string(),
        });
        assert!(matches!(store, SyllabError::Store(_)));

        let gen = SyllabError::from(GenError::NotConfigured {
            capability: "planner",
        });
        assert!(matches!(gen, SyllabError::Gen(_)));

        let engine = SyllabError::from(EngineError::Canceled);
        assert!(matches!(engine, SyllabError::Engine(_)));
    }
}
