//! Agent identity for the fixed set of memory writers.
//!
//! The set of agents is closed and defined at deployment time. Each agent
//! carries a static trust priority and importance weight, both of which are
//! looked up through the tables in [`crate::config`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// AGENT ID
// ============================================================================

/// One of the known autonomous writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum AgentId {
    /// Security monitoring agent
    #[serde(rename = "security-agent", alias = "sentry")]
    Security,
    /// Primary assistant agent
    #[serde(rename = "primary-agent", alias = "alden")]
    Primary,
    /// Analysis agent
    #[serde(rename = "analysis-agent", alias = "alice")]
    Analysis,
    /// Persona adaptation agent
    #[serde(rename = "persona-agent", alias = "mimic")]
    Persona,
}

impl AgentId {
    /// Every known agent, most authoritative first.
    pub const ALL: [AgentId; 4] = [
        AgentId::Security,
        AgentId::Primary,
        AgentId::Analysis,
        AgentId::Persona,
    ];

    /// Wire identifier of the agent.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentId::Security => "security-agent",
            AgentId::Primary => "primary-agent",
            AgentId::Analysis => "analysis-agent",
            AgentId::Persona => "persona-agent",
        }
    }

    /// Stable dense index, used for per-agent counters.
    pub fn index(&self) -> usize {
        match self {
            AgentId::Security => 0,
            AgentId::Primary => 1,
            AgentId::Analysis => 2,
            AgentId::Persona => 3,
        }
    }

    /// Parse an agent identifier. Deployment aliases of the agents are accepted.
    pub fn parse(s: &str) -> Result<Self, AgentIdParseError> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "security-agent" | "security" | "sentry" => Ok(AgentId::Security),
            "primary-agent" | "primary" | "alden" => Ok(AgentId::Primary),
            "analysis-agent" | "analysis" | "alice" => Ok(AgentId::Analysis),
            "persona-agent" | "persona" | "mimic" => Ok(AgentId::Persona),
            _ => Err(AgentIdParseError(s.to_string())),
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AgentId {
    type Err = AgentIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Error when parsing an unknown agent identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdParseError(pub String);

impl fmt::Display for AgentIdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown agent: {}", self.0)
    }
}

impl std::error::Error for AgentIdParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_parse_canonical_names() {
        for agent in AgentId::ALL {
            assert_eq!(AgentId::parse(agent.as_str()), Ok(agent));
        }
    }

    #[test]
    fn test_agent_parse_aliases() {
        assert_eq!("sentry".parse::<AgentId>(), Ok(AgentId::Security));
        assert_eq!("Alden".parse::<AgentId>(), Ok(AgentId::Primary));
        assert_eq!("alice".parse::<AgentId>(), Ok(AgentId::Analysis));
        assert_eq!("persona_agent".parse::<AgentId>(), Ok(AgentId::Persona));
    }

    #[test]
    fn test_agent_parse_unknown() {
        let err = AgentId::parse("rogue-agent").unwrap_err();
        assert!(err.to_string().contains("rogue-agent"));
    }

    #[test]
    fn test_agent_serde_uses_wire_names() {
        let json = serde_json::to_string(&AgentId::Analysis).unwrap();
        assert_eq!(json, "\"analysis-agent\"");
        let parsed: AgentId = serde_json::from_str("\"mimic\"").unwrap();
        assert_eq!(parsed, AgentId::Persona);
    }

    #[test]
    fn test_agent_indices_are_dense() {
        let mut seen: Vec<usize> = AgentId::ALL.iter().map(|a| a.index()).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }
}
