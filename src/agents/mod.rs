//! Agent System
//!
//! Agents are descriptors: instructions, tool schemas and handler closures,
//! plus routing keywords and an optional forced model. Handlers speak the
//! sentinel string protocol at the AI-tool boundary; the manager parses the
//! sentinels into typed outcomes immediately and never forwards them.

mod main_agent;
mod manager;
mod registry;
mod security;

pub use main_agent::{main_agent, SpecialistInfo};
pub use manager::{
    AgentManager, HangupCause, ToolOutcome, GLOBAL_TOOL_HANGUP, GLOBAL_TOOL_SWITCH_MODEL,
};
pub use registry::{AgentInfo, AgentRegistry};
pub use security::{security_agent, SECURITY_AGENT_NAME};

use std::sync::atomic::AtomicU32;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::ai::ModelChoice;

/// Name of the central dispatcher agent
pub const MAIN_AGENT_NAME: &str = "main_agent";

/// Sentinel returns consumed by the agent manager
pub const SENTINEL_SWITCH_PREFIX: &str = "__SWITCH__:";
pub const SENTINEL_MODEL_PREFIX: &str = "__MODEL_SWITCH__:";
pub const SENTINEL_BEEP: &str = "__BEEP__";
pub const SENTINEL_HANGUP: &str = "__HANGUP__";
pub const SENTINEL_BLOCKED: &str = "__BLOCKED__";

/// Per-call scratch shared with tool handlers
pub struct CallScratch {
    pub caller_id: String,
    /// Wrong unlock codes seen in this call
    pub unlock_failures: AtomicU32,
}

impl CallScratch {
    pub fn new(caller_id: String) -> Arc<Self> {
        Arc::new(Self {
            caller_id,
            unlock_failures: AtomicU32::new(0),
        })
    }
}

/// Async tool handler: JSON arguments in, raw result string (possibly a
/// sentinel) out
pub type ToolHandler =
    Arc<dyn Fn(Arc<CallScratch>, serde_json::Value) -> BoxFuture<'static, String> + Send + Sync>;

/// One callable tool of an agent
pub struct ToolDef {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: serde_json::Value,
    pub handler: ToolHandler,
}

impl ToolDef {
    /// Realtime API function definition
    pub fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters,
        })
    }
}

/// Immutable description of one agent
pub struct AgentDescriptor {
    pub name: String,
    pub display_name: String,
    pub description: String,
    /// Intent-routing keywords; empty means unreachable by routing
    pub keywords: Vec<String>,
    /// Model this agent forces while active; None follows the caller's choice
    pub preferred_model: Option<ModelChoice>,
    /// Spoken greeting; None for the silent security gate
    pub greeting: Option<String>,
    pub instructions: String,
    pub tools: Vec<ToolDef>,
}

impl AgentDescriptor {
    /// Keyword score of a transcript against this agent, 0.0..=1.0
    pub fn matches_intent(&self, text: &str) -> f32 {
        let text = text.to_lowercase();
        let mut score: f32 = 0.0;
        for keyword in &self.keywords {
            if text.contains(&keyword.to_lowercase()) {
                score += 0.3;
            }
        }
        score.min(1.0)
    }

    pub fn tool(&self, name: &str) -> Option<&ToolDef> {
        self.tools.iter().find(|t| t.name == name)
    }
}

impl std::fmt::Debug for AgentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentDescriptor")
            .field("name", &self.name)
            .field("tools", &self.tools.iter().map(|t| &t.name).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(keywords: Vec<&str>) -> AgentDescriptor {
        AgentDescriptor {
            name: "test".into(),
            display_name: "Test".into(),
            description: String::new(),
            keywords: keywords.into_iter().map(String::from).collect(),
            preferred_model: None,
            greeting: None,
            instructions: String::new(),
            tools: vec![],
        }
    }

    #[test]
    fn test_intent_scoring() {
        let agent = descriptor(vec!["idee", "notiz"]);
        assert_eq!(agent.matches_intent("ich habe keine Ahnung"), 0.0);
        assert!((agent.matches_intent("Ich habe eine IDEE") - 0.3).abs() < 1e-6);
        assert!((agent.matches_intent("eine idee als notiz") - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_empty_keywords_never_match() {
        let agent = descriptor(vec![]);
        assert_eq!(agent.matches_intent("security zugang code"), 0.0);
    }

    #[test]
    fn test_tool_schema_shape() {
        let tool = ToolDef {
            name: "unlock".into(),
            description: "check the code".into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
            handler: Arc::new(|_, _| Box::pin(async { String::new() })),
        };
        let schema = tool.schema();
        assert_eq!(schema["type"], "function");
        assert_eq!(schema["name"], "unlock");
        assert!(schema["parameters"].is_object());
    }
}
