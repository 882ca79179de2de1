//! Concord Agents - Multi-Agent Write Coordination
//!
//! Coordinates concurrent writes from the four agents to shared memory records:
//! - Conflict detection against in-flight operations
//! - Per-memory distributed locks with bounded retry
//! - Ordered policy chain resolution
//! - Sentence-level content merging
//! - Manual resolution and forced recovery
//! - Engine metrics

pub mod detector;
pub mod lock_manager;
pub mod merge;
pub mod metrics;
pub mod orchestrator;
pub mod policy;
pub mod registry;

pub use detector::ActiveOperations;
pub use lock_manager::LockManager;
pub use merge::{length_ratio, similarity, split_sentences, MergeEngine};
pub use metrics::{Gauges, MetricsSnapshot, SyncMetrics};
pub use orchestrator::{ManualResolution, SyncOrchestrator, SyncOutcome, SyncStatistics};
pub use policy::{ChainOutcome, Policy, PolicyChain, Verdict};
pub use registry::{ConflictRegistry, ConflictSummary, OperationHistory};
