//! Policy chain resolver.
//!
//! A fixed, ordered list of independent policies. Each policy looks at the
//! incoming and the existing operation and either decides or defers. The
//! chain stops at the first decision; the last policy always decides.
//!
//! Policies are pure: they read only the two operations and the immutable
//! [`ResolverConfig`], never the clock, so the same pair always resolves the
//! same way.

use crate::merge::{length_ratio, similarity, MergeEngine};
use concord_core::{
    AgentId, ConflictError, Decision, OperationKind, PolicyKind, ResolutionResult, ResolverConfig,
    SyncOperation,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::warn;

// ============================================================================
// VERDICT
// ============================================================================

/// What a single policy concluded.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub decision: Decision,
    pub reason: String,
    pub metadata: Map<String, Value>,
    pub merged_content: Option<String>,
    /// Recorded when a policy had to defer because something went wrong
    pub note: Option<String>,
}

impl Verdict {
    pub fn decide(decision: Decision, reason: &str) -> Self {
        Self {
            decision,
            reason: reason.to_string(),
            metadata: Map::new(),
            merged_content: None,
            note: None,
        }
    }

    pub fn defer() -> Self {
        Self::decide(Decision::Continue, "continue")
    }

    pub fn defer_with_note(note: impl Into<String>) -> Self {
        Self {
            note: Some(note.into()),
            ..Self::defer()
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn is_final(&self) -> bool {
        self.decision != Decision::Continue
    }
}

/// One rule of the chain.
pub trait Policy: Send + Sync {
    fn kind(&self) -> PolicyKind;

    fn evaluate(&self, incoming: &SyncOperation, existing: &SyncOperation) -> Verdict;
}

/// Lower number wins; `None` on a tie.
fn lower_wins<T: PartialOrd>(incoming: T, existing: T) -> Option<Decision> {
    if incoming < existing {
        Some(Decision::New)
    } else if existing < incoming {
        Some(Decision::Existing)
    } else {
        None
    }
}

// ============================================================================
// POLICIES
// ============================================================================

/// Security agent writes carrying a security tag are protected.
pub struct SecurityOverride {
    config: Arc<ResolverConfig>,
}

impl Policy for SecurityOverride {
    fn kind(&self) -> PolicyKind {
        PolicyKind::SecurityOverride
    }

    fn evaluate(&self, incoming: &SyncOperation, existing: &SyncOperation) -> Verdict {
        let tags = &self.config.tags;
        let guarded = |op: &SyncOperation| {
            op.agent_id == AgentId::Security && tags.has_security_tag(&op.tags)
        };

        if guarded(incoming) {
            return Verdict::decide(Decision::New, "security_override")
                .with("agent", incoming.agent_id.as_str());
        }
        if guarded(existing) && incoming.agent_id != existing.agent_id {
            return Verdict::decide(Decision::Existing, "security_protection")
                .with("protected_agent", existing.agent_id.as_str())
                .with("challenger", incoming.agent_id.as_str());
        }
        Verdict::defer()
    }
}

/// Emergency tags outrank operations without one, regardless of agent.
pub struct EmergencyOverride {
    config: Arc<ResolverConfig>,
}

impl Policy for EmergencyOverride {
    fn kind(&self) -> PolicyKind {
        PolicyKind::EmergencyOverride
    }

    fn evaluate(&self, incoming: &SyncOperation, existing: &SyncOperation) -> Verdict {
        let tags = &self.config.tags;
        match (
            tags.has_emergency_tag(&incoming.tags),
            tags.has_emergency_tag(&existing.tags),
        ) {
            (true, false) => Verdict::decide(Decision::New, "emergency_override")
                .with("emergency_side", "new"),
            (false, true) => Verdict::decide(Decision::Existing, "emergency_override")
                .with("emergency_side", "existing"),
            _ => Verdict::defer(),
        }
    }
}

/// Strictly more authoritative agent wins.
pub struct AgentPriority {
    config: Arc<ResolverConfig>,
}

impl AgentPriority {
    fn priority(&self, op: &SyncOperation) -> i32 {
        op.priority_override
            .unwrap_or_else(|| self.config.priorities.priority(op.agent_id))
    }
}

impl Policy for AgentPriority {
    fn kind(&self) -> PolicyKind {
        PolicyKind::AgentPriority
    }

    fn evaluate(&self, incoming: &SyncOperation, existing: &SyncOperation) -> Verdict {
        let new_priority = self.priority(incoming);
        let existing_priority = self.priority(existing);
        match lower_wins(new_priority, existing_priority) {
            Some(decision) => Verdict::decide(decision, "agent_priority")
                .with("new_priority", new_priority)
                .with("existing_priority", existing_priority),
            None => Verdict::defer(),
        }
    }
}

/// Best-ranked tag wins; an operation without ranked tags ranks last.
pub struct TagHierarchy {
    config: Arc<ResolverConfig>,
}

impl Policy for TagHierarchy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::TagHierarchy
    }

    fn evaluate(&self, incoming: &SyncOperation, existing: &SyncOperation) -> Verdict {
        let new_rank = self.config.tags.best_rank(&incoming.tags);
        let existing_rank = self.config.tags.best_rank(&existing.tags);
        let as_key = |rank: Option<u32>| rank.map(u64::from).unwrap_or(u64::MAX);

        match lower_wins(as_key(new_rank), as_key(existing_rank)) {
            Some(decision) => Verdict::decide(decision, "tag_hierarchy")
                .with("new_rank", json!(new_rank))
                .with("existing_rank", json!(existing_rank)),
            None => Verdict::defer(),
        }
    }
}

/// An operation arriving shortly after the existing one supersedes it.
pub struct RecencyBias {
    config: Arc<ResolverConfig>,
}

impl Policy for RecencyBias {
    fn kind(&self) -> PolicyKind {
        PolicyKind::RecencyBias
    }

    fn evaluate(&self, incoming: &SyncOperation, existing: &SyncOperation) -> Verdict {
        let delta = incoming.timestamp - existing.timestamp;
        let window = chrono::Duration::from_std(self.config.recency_window)
            .unwrap_or(chrono::Duration::MAX);
        if delta > chrono::Duration::zero() && delta <= window {
            return Verdict::decide(Decision::New, "recency_bias")
                .with("delta_ms", delta.num_milliseconds())
                .with("window_ms", window.num_milliseconds());
        }
        Verdict::defer()
    }
}

/// Strictly newer timestamp wins.
pub struct TimestampOrder;

impl Policy for TimestampOrder {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Timestamp
    }

    fn evaluate(&self, incoming: &SyncOperation, existing: &SyncOperation) -> Verdict {
        // Newer wins, so compare reversed.
        match lower_wins(existing.timestamp, incoming.timestamp) {
            Some(decision) => Verdict::decide(decision, "timestamp").with(
                "delta_ms",
                (incoming.timestamp - existing.timestamp).num_milliseconds(),
            ),
            None => Verdict::defer(),
        }
    }
}

/// Importance scaled by agent weight, decided only beyond a margin.
pub struct WeightedImportance {
    config: Arc<ResolverConfig>,
}

impl Policy for WeightedImportance {
    fn kind(&self) -> PolicyKind {
        PolicyKind::WeightedImportance
    }

    fn evaluate(&self, incoming: &SyncOperation, existing: &SyncOperation) -> Verdict {
        let weights = &self.config.weights;
        let new_score = incoming.importance * weights.weight(incoming.agent_id);
        let existing_score = existing.importance * weights.weight(existing.agent_id);
        let diff = new_score - existing_score;

        if diff.abs() <= self.config.importance_margin {
            return Verdict::defer();
        }
        let decision = if diff > 0.0 {
            Decision::New
        } else {
            Decision::Existing
        };
        Verdict::decide(decision, "weighted_importance")
            .with("new_score", new_score)
            .with("existing_score", existing_score)
    }
}

/// Same session: the later write in that session wins.
pub struct SessionContinuity;

impl Policy for SessionContinuity {
    fn kind(&self) -> PolicyKind {
        PolicyKind::SessionContinuity
    }

    fn evaluate(&self, incoming: &SyncOperation, existing: &SyncOperation) -> Verdict {
        match (&incoming.session_id, &existing.session_id) {
            (Some(new_session), Some(existing_session)) if new_session == existing_session => {
                Verdict::decide(Decision::New, "session_continuity")
                    .with("session_id", new_session.as_str())
            }
            _ => Verdict::defer(),
        }
    }
}

/// Compatible contents are merged.
pub struct ContentMerge {
    engine: MergeEngine,
}

impl Policy for ContentMerge {
    fn kind(&self) -> PolicyKind {
        PolicyKind::ContentMerge
    }

    fn evaluate(&self, incoming: &SyncOperation, existing: &SyncOperation) -> Verdict {
        if incoming.kind == OperationKind::Delete || existing.kind == OperationKind::Delete {
            return Verdict::defer();
        }
        let (Some(existing_content), Some(new_content)) = (&existing.content, &incoming.content)
        else {
            return Verdict::defer();
        };
        if !self.engine.can_merge(existing_content, new_content) {
            return Verdict::defer();
        }

        match self.engine.merge(existing_content, new_content) {
            Ok(merged) => {
                let mut verdict = Verdict::decide(Decision::Merge, "content_merge")
                    .with("similarity", similarity(existing_content, new_content))
                    .with("length_ratio", length_ratio(existing_content, new_content))
                    .with("merged_length", merged.chars().count() as u64)
                    .with(
                        "sources",
                        json!([existing.agent_id.as_str(), incoming.agent_id.as_str()]),
                    );
                verdict.merged_content = Some(merged);
                verdict
            }
            Err(err) => {
                warn!(
                    memory_id = %incoming.memory_id,
                    error = %err,
                    "content merge failed, deferring to stability fallback"
                );
                Verdict::defer_with_note(format!("merge_failure: {}", err))
            }
        }
    }
}

/// Terminal rule: keep what is already there.
pub struct StabilityFallback;

impl Policy for StabilityFallback {
    fn kind(&self) -> PolicyKind {
        PolicyKind::StabilityFallback
    }

    fn evaluate(&self, _incoming: &SyncOperation, _existing: &SyncOperation) -> Verdict {
        Verdict::decide(Decision::Existing, "stability_preference")
    }
}

// ============================================================================
// CHAIN
// ============================================================================

/// Outcome of running the chain, including whether a merge failed on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    pub result: ResolutionResult,
    pub merge_failed: bool,
}

/// The ordered policy chain.
pub struct PolicyChain {
    policies: Vec<Box<dyn Policy>>,
}

impl std::fmt::Debug for PolicyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.policies.iter().map(|p| p.kind()))
            .finish()
    }
}

impl PolicyChain {
    /// The production chain, in order.
    pub fn standard(config: Arc<ResolverConfig>) -> Self {
        let engine = MergeEngine::new(config.similarity_threshold, config.min_length_ratio);
        Self {
            policies: vec![
                Box::new(SecurityOverride {
                    config: Arc::clone(&config),
                }),
                Box::new(EmergencyOverride {
                    config: Arc::clone(&config),
                }),
                Box::new(AgentPriority {
                    config: Arc::clone(&config),
                }),
                Box::new(TagHierarchy {
                    config: Arc::clone(&config),
                }),
                Box::new(RecencyBias {
                    config: Arc::clone(&config),
                }),
                Box::new(TimestampOrder),
                Box::new(WeightedImportance { config }),
                Box::new(SessionContinuity),
                Box::new(ContentMerge { engine }),
                Box::new(StabilityFallback),
            ],
        }
    }

    pub fn kinds(&self) -> Vec<PolicyKind> {
        self.policies.iter().map(|p| p.kind()).collect()
    }

    /// Resolve `incoming` against the in-flight `existing` operation.
    ///
    /// Fails only when an operation is malformed and no policy can be
    /// evaluated meaningfully.
    pub fn resolve(
        &self,
        incoming: &SyncOperation,
        existing: &SyncOperation,
    ) -> Result<ChainOutcome, ConflictError> {
        for op in [incoming, existing] {
            op.check_well_formed()
                .map_err(|err| ConflictError::MalformedOperation {
                    operation_id: op.operation_id,
                    reason: err.to_string(),
                })?;
        }
        if incoming.memory_id != existing.memory_id {
            return Err(ConflictError::MalformedOperation {
                operation_id: incoming.operation_id,
                reason: format!(
                    "memory id {} does not match {}",
                    incoming.memory_id, existing.memory_id
                ),
            });
        }

        let mut notes: Vec<String> = Vec::new();
        for policy in &self.policies {
            let verdict = policy.evaluate(incoming, existing);
            if let Some(note) = verdict.note {
                notes.push(note);
            }
            let Some(winner) = verdict.decision.winner() else {
                continue;
            };

            let merge_failed = notes.iter().any(|n| n.starts_with("merge_failure"));
            let mut result = ResolutionResult::automatic(winner, policy.kind(), verdict.reason);
            result.metadata = verdict.metadata;
            result.merged_content = verdict.merged_content;
            if !notes.is_empty() {
                result = result.with_metadata("notes", json!(notes));
            }
            return Ok(ChainOutcome {
                result,
                merge_failed,
            });
        }

        // Unreachable with the standard chain: stability fallback always decides.
        Err(ConflictError::MalformedOperation {
            operation_id: incoming.operation_id,
            reason: "policy chain produced no decision".to_string(),
        })
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn arb_agent() -> impl Strategy<Value = AgentId> {
        prop_oneof![
            Just(AgentId::Security),
            Just(AgentId::Primary),
            Just(AgentId::Analysis),
            Just(AgentId::Persona),
        ]
    }

    fn arb_tags() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(
            prop_oneof![
                Just("security_incident".to_string()),
                Just("system_alert".to_string()),
                Just("user_preference".to_string()),
                Just("task".to_string()),
                Just("untracked".to_string()),
            ],
            0..3,
        )
    }

    prop_compose! {
        fn arb_operation()(
            agent in arb_agent(),
            tags in arb_tags(),
            offset in 0i64..900,
            importance in 0.0f64..=1.0,
            session in prop::option::of(prop_oneof![Just("s-1"), Just("s-2")]),
            content in prop::option::of("[A-Z][a-z]{2,6}( [a-z]{2,6}){1,4}\\."),
        ) -> SyncOperation {
            let mut op = SyncOperation::new(agent, "mem-1", OperationKind::Update)
                .with_tags(tags)
                .with_importance(importance)
                .with_timestamp(Utc.timestamp_opt(1_700_000_000 + offset, 0).single().unwrap());
            op.session_id = session.map(String::from);
            op.content = content;
            op
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Identical inputs resolve identically.
        #[test]
        fn prop_chain_is_deterministic(incoming in arb_operation(), existing in arb_operation()) {
            let chain = PolicyChain::standard(Arc::new(ResolverConfig::default()));
            let first = chain.resolve(&incoming, &existing).unwrap();
            let second = chain.resolve(&incoming, &existing).unwrap();
            prop_assert_eq!(first, second);
        }

        /// Every well-formed pair gets a decision from some chain policy.
        #[test]
        fn prop_chain_always_terminates(incoming in arb_operation(), existing in arb_operation()) {
            let chain = PolicyChain::standard(Arc::new(ResolverConfig::default()));
            let outcome = chain.resolve(&incoming, &existing).unwrap();
            prop_assert!(PolicyKind::CHAIN.contains(&outcome.result.policy));
            if outcome.result.merged_content.is_some() {
                prop_assert_eq!(outcome.result.policy, PolicyKind::ContentMerge);
            }
        }
    }
}
