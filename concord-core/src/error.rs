//! Error types for Concord operations

use crate::EntityId;
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Store unreachable: {reason}")]
    Unreachable { reason: String },

    #[error("Record not found: {memory_id}")]
    RecordNotFound { memory_id: String },

    #[error("Apply failed for {memory_id}: {reason}")]
    ApplyFailed { memory_id: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("TTL out of range for {key}: {ttl_ms}ms")]
    InvalidTtl { key: String, ttl_ms: u128 },
}

/// Validation errors. Raised before any lock or conflict state is touched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Unknown agent: {agent_id}")]
    UnknownAgent { agent_id: String },

    #[error("Unknown operation: {operation}")]
    UnknownOperation { operation: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Lock acquisition errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("Lock unavailable for {memory_id} after {attempts} attempts (sync {sync_id})")]
    Unavailable {
        memory_id: String,
        sync_id: EntityId,
        attempts: u32,
    },

    #[error("Malformed lock value for {key}: {value}")]
    MalformedValue { key: String, value: String },
}

/// Conflict resolution errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConflictError {
    #[error("Conflict {conflict_id} unresolved for sync {sync_id}: {reason}")]
    Unresolved {
        conflict_id: EntityId,
        sync_id: EntityId,
        reason: String,
    },

    #[error("Conflict not found: {conflict_id}")]
    NotFound { conflict_id: EntityId },

    #[error("Conflict {conflict_id} already resolved")]
    AlreadyResolved { conflict_id: EntityId },

    #[error("Malformed operation {operation_id}: {reason}")]
    MalformedOperation { operation_id: EntityId, reason: String },
}

/// Content merge errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("Merge produced empty content")]
    EmptyOutput,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Concord errors.
#[derive(Debug, Clone, Error)]
pub enum ConcordError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Conflict error: {0}")]
    Conflict(#[from] ConflictError),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sync operation not found: {sync_id}")]
    SyncNotFound { sync_id: EntityId },
}

impl ConcordError {
    /// Category of the error as reported to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            ConcordError::Validation(_) => "validation_error",
            ConcordError::Lock(LockError::Unavailable { .. }) => "lock_unavailable",
            ConcordError::Lock(LockError::MalformedValue { .. }) => "storage_error",
            ConcordError::Storage(StorageError::Unreachable { .. }) => "lock_unavailable",
            ConcordError::Storage(_) => "storage_error",
            ConcordError::Conflict(ConflictError::NotFound { .. }) => "not_found",
            ConcordError::Conflict(_) => "conflict_unresolved",
            ConcordError::Merge(_) => "merge_failure",
            ConcordError::Config(_) => "configuration_error",
            ConcordError::SyncNotFound { .. } => "not_found",
        }
    }

    /// Sync operation the error refers to, if any.
    pub fn sync_id(&self) -> Option<EntityId> {
        match self {
            ConcordError::Lock(LockError::Unavailable { sync_id, .. }) => Some(*sync_id),
            ConcordError::Conflict(ConflictError::Unresolved { sync_id, .. }) => Some(*sync_id),
            ConcordError::Conflict(ConflictError::MalformedOperation { operation_id, .. }) => {
                Some(*operation_id)
            }
            ConcordError::SyncNotFound { sync_id } => Some(*sync_id),
            _ => None,
        }
    }

    /// Conflict the error refers to, if any.
    pub fn conflict_id(&self) -> Option<EntityId> {
        match self {
            ConcordError::Conflict(ConflictError::Unresolved { conflict_id, .. })
            | ConcordError::Conflict(ConflictError::NotFound { conflict_id })
            | ConcordError::Conflict(ConflictError::AlreadyResolved { conflict_id }) => {
                Some(*conflict_id)
            }
            _ => None,
        }
    }

    /// Whether the caller may safely resubmit the same request.
    pub fn is_retryable(&self) -> bool {
        self.kind() == "lock_unavailable"
    }
}

/// Result type alias for Concord operations.
pub type ConcordResult<T> = Result<T, ConcordError>;

// =============================================================================
// TESTS
// =============================================================================
