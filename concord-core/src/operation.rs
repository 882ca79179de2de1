//! Sync operations: the incoming request and the validated operation record.

use crate::{
    compute_content_hash, new_entity_id, AgentId, EntityId, OperationKind, SyncStatus,
    Timestamp, ValidationError,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Importance assigned when a request does not carry one.
pub const DEFAULT_IMPORTANCE: f64 = 0.5;

/// Tag added to records produced by a content merge.
pub const MERGED_TAG: &str = "merged";

// ============================================================================
// SYNC REQUEST (wire input)
// ============================================================================

/// Raw sync request as submitted by an external caller.
///
/// Fields are unvalidated strings; [`SyncOperation::from_request`] turns a
/// request into an operation or rejects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub agent_id: String,
    pub memory_id: String,
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

// ============================================================================
// SYNC OPERATION
// ============================================================================

/// One validated request to mutate a memory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub operation_id: EntityId,
    pub agent_id: AgentId,
    pub memory_id: String,
    pub kind: OperationKind,
    pub content: Option<String>,
    pub importance: f64,
    pub tags: BTreeSet<String>,
    pub session_id: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub timestamp: Timestamp,
    pub status: SyncStatus,
    /// Set only by administrative force syncs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_override: Option<i32>,
    /// Agents whose writes this operation carries; more than one after a merge
    pub sources: Vec<AgentId>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl SyncOperation {
    /// Create a pending operation stamped with the current time.
    pub fn new(agent_id: AgentId, memory_id: impl Into<String>, kind: OperationKind) -> Self {
        let now = Utc::now();
        Self {
            operation_id: new_entity_id(),
            agent_id,
            memory_id: memory_id.into(),
            kind,
            content: None,
            importance: DEFAULT_IMPORTANCE,
            tags: BTreeSet::new(),
            session_id: None,
            timestamp: now,
            status: SyncStatus::Pending,
            priority_override: None,
            sources: vec![agent_id],
            updated_at: now,
        }
    }

    /// Validate a raw request and build the pending operation it describes.
    pub fn from_request(request: &SyncRequest) -> Result<Self, ValidationError> {
        if request.agent_id.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "agentId".to_string(),
            });
        }
        let agent_id =
            AgentId::parse(&request.agent_id).map_err(|_| ValidationError::UnknownAgent {
                agent_id: request.agent_id.clone(),
            })?;

        let kind = OperationKind::parse(&request.operation).map_err(|_| {
            ValidationError::UnknownOperation {
                operation: request.operation.clone(),
            }
        })?;

        let memory_id = request.memory_id.trim();
        if memory_id.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "memoryId".to_string(),
            });
        }

        let importance = request.importance.unwrap_or(DEFAULT_IMPORTANCE);
        check_importance(importance)?;

        let mut operation = Self::new(agent_id, memory_id, kind);
        operation.content = request.content.clone();
        operation.importance = importance;
        operation.session_id = request
            .session_id
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if let Some(tags) = &request.tags {
            operation.tags = normalize_tags(tags);
        }
        Ok(operation)
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = normalize_tags(tags);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self.updated_at = timestamp;
        self
    }

    pub fn with_priority_override(mut self, priority: i32) -> Self {
        self.priority_override = Some(priority);
        self
    }

    /// Build the record produced by merging `existing` and `incoming`.
    ///
    /// The merged operation keeps the incoming operation's identity and
    /// session, unions both tag sets, adds the merged tag and takes the
    /// higher importance.
    pub fn merged(existing: &SyncOperation, incoming: &SyncOperation, content: String) -> Self {
        let mut merged = incoming.clone();
        merged.content = Some(content);
        merged.importance = existing.importance.max(incoming.importance);
        merged.tags = existing.tags.union(&incoming.tags).cloned().collect();
        merged.tags.insert(MERGED_TAG.to_string());
        merged.sources = Vec::new();
        for agent in existing.sources.iter().chain(incoming.sources.iter()) {
            if !merged.sources.contains(agent) {
                merged.sources.push(*agent);
            }
        }
        merged.updated_at = Utc::now();
        merged
    }

    /// Move to a new lifecycle status.
    pub fn set_status(&mut self, status: SyncStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn is_in_flight(&self) -> bool {
        self.status.is_in_flight()
    }

    /// SHA-256 hex digest of the content, if any.
    pub fn content_hash(&self) -> Option<String> {
        self.content
            .as_ref()
            .map(|c| compute_content_hash(c.as_bytes()))
    }

    pub fn content_str(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Age of the operation relative to `now`, zero if stamped in the future.
    pub fn age(&self, now: Timestamp) -> std::time::Duration {
        (now - self.timestamp).to_std().unwrap_or_default()
    }

    /// Check the invariants the resolver relies on.
    pub fn check_well_formed(&self) -> Result<(), ValidationError> {
        if self.memory_id.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "memoryId".to_string(),
            });
        }
        check_importance(self.importance)?;
        if self.sources.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "sources".to_string(),
                reason: "an operation must carry at least one source agent".to_string(),
            });
        }
        Ok(())
    }
}

fn check_importance(importance: f64) -> Result<(), ValidationError> {
    if !importance.is_finite() || !(0.0..=1.0).contains(&importance) {
        return Err(ValidationError::InvalidValue {
            field: "importance".to_string(),
            reason: format!("{} is not within 0.0..=1.0", importance),
        });
    }
    Ok(())
}

/// Trim, lowercase and drop empty tags.
pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SyncRequest {
        SyncRequest {
            agent_id: "security-agent".to_string(),
            memory_id: "mem-1".to_string(),
            operation: "update".to_string(),
            content: Some("Intrusion attempt blocked.".to_string()),
            importance: Some(0.9),
            tags: Some(vec!["Security_Incident".to_string(), " ".to_string()]),
            session_id: Some("s-1".to_string()),
        }
    }

    #[test]
    fn test_from_request_builds_pending_operation() {
        let op = SyncOperation::from_request(&request()).unwrap();
        assert_eq!(op.agent_id, AgentId::Security);
        assert_eq!(op.kind, OperationKind::Update);
        assert_eq!(op.status, SyncStatus::Pending);
        assert_eq!(op.importance, 0.9);
        assert_eq!(op.tags.len(), 1);
        assert!(op.tags.contains("security_incident"));
        assert_eq!(op.sources, vec![AgentId::Security]);
    }

    #[test]
    fn test_from_request_defaults_importance() {
        let mut req = request();
        req.importance = None;
        let op = SyncOperation::from_request(&req).unwrap();
        assert_eq!(op.importance, DEFAULT_IMPORTANCE);
    }

    #[test]
    fn test_from_request_rejects_unknown_agent() {
        let mut req = request();
        req.agent_id = "rogue-agent".to_string();
        assert_eq!(
            SyncOperation::from_request(&req),
            Err(ValidationError::UnknownAgent {
                agent_id: "rogue-agent".to_string()
            })
        );
    }

    #[test]
    fn test_from_request_rejects_unknown_operation() {
        let mut req = request();
        req.operation = "upsert".to_string();
        assert!(matches!(
            SyncOperation::from_request(&req),
            Err(ValidationError::UnknownOperation { .. })
        ));
    }

    #[test]
    fn test_from_request_rejects_blank_memory_id() {
        let mut req = request();
        req.memory_id = "   ".to_string();
        assert!(matches!(
            SyncOperation::from_request(&req),
            Err(ValidationError::RequiredFieldMissing { .. })
        ));
    }

    #[test]
    fn test_from_request_rejects_out_of_range_importance() {
        let mut req = request();
        req.importance = Some(1.5);
        assert!(matches!(
            SyncOperation::from_request(&req),
            Err(ValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_request_deserializes_camel_case() {
        let json = r#"{"agentId":"alden","memoryId":"m","operation":"create","sessionId":"s"}"#;
        let req: SyncRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.agent_id, "alden");
        assert_eq!(req.session_id.as_deref(), Some("s"));
        assert!(req.tags.is_none());
    }

    #[test]
    fn test_merged_carries_provenance_of_both_agents() {
        let existing = SyncOperation::new(AgentId::Analysis, "m", OperationKind::Update)
            .with_tags(["fact"])
            .with_importance(0.4);
        let incoming = SyncOperation::new(AgentId::Persona, "m", OperationKind::Update)
            .with_tags(["style"])
            .with_importance(0.7);
        let merged = SyncOperation::merged(&existing, &incoming, "A. B.".to_string());
        assert_eq!(merged.sources, vec![AgentId::Analysis, AgentId::Persona]);
        assert!(merged.tags.contains(MERGED_TAG));
        assert!(merged.tags.contains("fact"));
        assert!(merged.tags.contains("style"));
        assert_eq!(merged.importance, 0.7);
        assert_eq!(merged.operation_id, incoming.operation_id);
    }

    #[test]
    fn test_check_well_formed_rejects_nan_importance() {
        let op = SyncOperation::new(AgentId::Primary, "m", OperationKind::Update)
            .with_importance(f64::NAN);
        assert!(op.check_well_formed().is_err());
    }

    #[test]
    fn test_content_hash_tracks_content() {
        let a = SyncOperation::new(AgentId::Primary, "m", OperationKind::Update).with_content("x");
        let b = SyncOperation::new(AgentId::Analysis, "m", OperationKind::Update).with_content("x");
        assert_eq!(a.content_hash(), b.content_hash());
        let empty = SyncOperation::new(AgentId::Primary, "m", OperationKind::Delete);
        assert_eq!(empty.content_hash(), None);
    }
}
