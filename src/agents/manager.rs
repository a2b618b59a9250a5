//! Agent Manager
//!
//! Per-call owner of the active agent and the unlock gate. Executes tool
//! calls, appends the global tools, and converts sentinel return strings to
//! typed outcomes before anything reaches the AI again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::ai::ModelChoice;

use super::{
    AgentDescriptor, AgentRegistry, CallScratch, SECURITY_AGENT_NAME, SENTINEL_BEEP,
    SENTINEL_BLOCKED, SENTINEL_HANGUP, SENTINEL_MODEL_PREFIX, SENTINEL_SWITCH_PREFIX,
};

/// Global tool: caller wants to end the call
pub const GLOBAL_TOOL_HANGUP: &str = "hang_up";
/// Global tool: caller chooses the model tier (hidden for forced-model agents)
pub const GLOBAL_TOOL_SWITCH_MODEL: &str = "switch_model";

/// Why a tool asked for the call to end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HangupCause {
    /// The security gate gave up on the caller
    SecurityFailed,
    /// The caller asked to hang up
    UserRequested,
}

/// Typed result of a tool execution; sentinels never leave this module as
/// strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    /// Plain text forwarded back to the AI
    Reply(String),
    /// Switch the active agent
    Switch(String),
    /// Switch the model tier
    SwitchModel(ModelChoice),
    /// Wrong unlock code: play the beep, keep the gate
    Beep,
    /// Tear the call down
    Hangup(HangupCause),
    /// Tool execution refused while the call is locked
    Blocked,
}

/// Parse a handler's raw return string
fn parse_outcome(raw: String, from_gate: bool) -> ToolOutcome {
    if let Some(target) = raw.strip_prefix(SENTINEL_SWITCH_PREFIX) {
        return ToolOutcome::Switch(target.to_string());
    }
    if let Some(choice) = raw.strip_prefix(SENTINEL_MODEL_PREFIX) {
        return match ModelChoice::parse(choice) {
            Some(model) => ToolOutcome::SwitchModel(model),
            None => ToolOutcome::Reply(format!("Unbekanntes Modell: {}", choice)),
        };
    }
    match raw.as_str() {
        SENTINEL_BEEP => ToolOutcome::Beep,
        SENTINEL_BLOCKED => ToolOutcome::Blocked,
        SENTINEL_HANGUP => {
            if from_gate {
                ToolOutcome::Hangup(HangupCause::SecurityFailed)
            } else {
                ToolOutcome::Hangup(HangupCause::UserRequested)
            }
        }
        _ => ToolOutcome::Reply(raw),
    }
}

/// Manages the active agent for one call
pub struct AgentManager {
    registry: Arc<AgentRegistry>,
    active: RwLock<Option<Arc<AgentDescriptor>>>,
    call_unlocked: AtomicBool,
    scratch: RwLock<Option<Arc<CallScratch>>>,
}

impl AgentManager {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self {
            registry,
            active: RwLock::new(None),
            call_unlocked: AtomicBool::new(false),
            scratch: RwLock::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Begin a call on the given agent. Every call starts locked.
    pub async fn start_call(&self, caller_id: &str, agent_name: &str) -> Result<(), String> {
        let agent = self
            .registry
            .get(agent_name)
            .ok_or_else(|| format!("agent '{}' not registered", agent_name))?;

        self.call_unlocked.store(false, Ordering::SeqCst);
        *self.scratch.write().await = Some(CallScratch::new(caller_id.to_string()));
        *self.active.write().await = Some(agent.clone());

        tracing::info!("call started: {} -> agent {}", caller_id, agent.name);
        Ok(())
    }

    /// Clear all per-call state
    pub async fn end_call(&self) {
        if let Some(agent) = self.active.write().await.take() {
            tracing::info!("call ended on agent {}", agent.name);
        }
        *self.scratch.write().await = None;
        self.call_unlocked.store(false, Ordering::SeqCst);
    }

    pub async fn active(&self) -> Option<Arc<AgentDescriptor>> {
        self.active.read().await.clone()
    }

    pub async fn active_name(&self) -> Option<String> {
        self.active.read().await.as_ref().map(|a| a.name.clone())
    }

    pub fn is_unlocked(&self) -> bool {
        self.call_unlocked.load(Ordering::SeqCst)
    }

    pub fn set_unlocked(&self, unlocked: bool) {
        self.call_unlocked.store(unlocked, Ordering::SeqCst);
        tracing::info!("call unlock status: {}", unlocked);
    }

    /// Switch the active agent; returns (old, new) names.
    /// Never touches the SIP dialog or the websocket.
    pub async fn switch_agent(&self, agent_name: &str) -> Result<(String, String), String> {
        let new_agent = self
            .registry
            .get(agent_name)
            .ok_or_else(|| format!("agent '{}' not registered", agent_name))?;

        let mut active = self.active.write().await;
        let old_name = active
            .as_ref()
            .map(|a| a.name.clone())
            .unwrap_or_else(|| "none".to_string());

        if old_name == agent_name {
            return Ok((old_name.clone(), old_name));
        }

        *active = Some(new_agent);
        tracing::info!("agent switched: {} -> {}", old_name, agent_name);
        Ok((old_name, agent_name.to_string()))
    }

    /// Tool schemas of the active agent plus the global tools
    pub async fn tools(&self) -> Vec<serde_json::Value> {
        let active = self.active.read().await;
        let Some(agent) = active.as_ref() else {
            return vec![];
        };

        let mut tools: Vec<serde_json::Value> = agent.tools.iter().map(|t| t.schema()).collect();

        tools.push(serde_json::json!({
            "type": "function",
            "name": GLOBAL_TOOL_HANGUP,
            "description": "Beendet das Telefonat. Verwende dieses Tool wenn der Anrufer \
                            auflegen moechte, sich verabschiedet oder 'leg auf' sagt.",
            "parameters": {"type": "object", "properties": {}, "required": []},
        }));

        if agent.preferred_model.is_none() {
            tools.push(serde_json::json!({
                "type": "function",
                "name": GLOBAL_TOOL_SWITCH_MODEL,
                "description": "Wechselt das AI-Modell. Verwende wenn der Anrufer \
                                'model premium' oder 'model mini' sagt.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "model": {
                            "type": "string",
                            "enum": ["mini", "premium"],
                            "description": "mini = guenstig/schnell, premium = teuer/gruendlich"
                        }
                    },
                    "required": ["model"],
                },
            }));
        }

        tools
    }

    pub async fn instructions(&self) -> String {
        self.active
            .read()
            .await
            .as_ref()
            .map(|a| a.instructions.clone())
            .unwrap_or_default()
    }

    /// Execute a tool of the active agent, enforcing the unlock gate
    pub async fn execute_tool(&self, name: &str, args: serde_json::Value) -> ToolOutcome {
        let Some(agent) = self.active().await else {
            return ToolOutcome::Reply("Fehler: Kein Agent aktiv.".to_string());
        };

        // Global tools work in every agent, the gate included
        if name == GLOBAL_TOOL_HANGUP {
            tracing::info!("caller requested hangup via tool");
            return ToolOutcome::Hangup(HangupCause::UserRequested);
        }
        if name == GLOBAL_TOOL_SWITCH_MODEL {
            let choice = args.get("model").and_then(|m| m.as_str()).unwrap_or("");
            return match ModelChoice::parse(choice) {
                Some(model) => ToolOutcome::SwitchModel(model),
                None => ToolOutcome::Reply(format!("Unbekanntes Modell: {}", choice)),
            };
        }

        let from_gate = agent.name == SECURITY_AGENT_NAME;
        if !self.is_unlocked() && !from_gate {
            tracing::warn!("tool '{}' blocked, call not unlocked", name);
            return ToolOutcome::Blocked;
        }

        let Some(tool) = agent.tool(name) else {
            return ToolOutcome::Reply(format!("Unbekannte Funktion: {}", name));
        };

        let scratch = {
            let guard = self.scratch.read().await;
            match guard.as_ref() {
                Some(scratch) => scratch.clone(),
                None => return ToolOutcome::Reply("Fehler: Kein Anruf aktiv.".to_string()),
            }
        };

        let raw = (tool.handler)(scratch, args).await;
        parse_outcome(raw, from_gate)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{main_agent, security_agent, MAIN_AGENT_NAME, SECURITY_AGENT_NAME};
    use super::*;

    fn manager() -> AgentManager {
        let mut registry = AgentRegistry::new();
        registry.register(security_agent("7234".into()));
        registry.register(main_agent(&[]));
        AgentManager::new(Arc::new(registry))
    }

    #[test]
    fn test_parse_outcome_variants() {
        assert_eq!(
            parse_outcome("__SWITCH__:main_agent".into(), true),
            ToolOutcome::Switch("main_agent".into())
        );
        assert_eq!(
            parse_outcome("__MODEL_SWITCH__:premium".into(), false),
            ToolOutcome::SwitchModel(ModelChoice::Premium)
        );
        assert_eq!(parse_outcome("__BEEP__".into(), true), ToolOutcome::Beep);
        assert_eq!(
            parse_outcome("__HANGUP__".into(), true),
            ToolOutcome::Hangup(HangupCause::SecurityFailed)
        );
        assert_eq!(
            parse_outcome("__HANGUP__".into(), false),
            ToolOutcome::Hangup(HangupCause::UserRequested)
        );
        assert_eq!(
            parse_outcome("hello".into(), false),
            ToolOutcome::Reply("hello".into())
        );
    }

    #[tokio::test]
    async fn test_call_starts_locked_on_gate() {
        let manager = manager();
        manager
            .start_call("015901969502", SECURITY_AGENT_NAME)
            .await
            .unwrap();

        assert!(!manager.is_unlocked());
        assert_eq!(
            manager.active_name().await.as_deref(),
            Some(SECURITY_AGENT_NAME)
        );
    }

    #[tokio::test]
    async fn test_locked_call_blocks_non_gate_tools() {
        let manager = manager();
        manager
            .start_call("caller", SECURITY_AGENT_NAME)
            .await
            .unwrap();

        // Force main agent while still locked (as if switched by dashboard)
        manager.switch_agent(MAIN_AGENT_NAME).await.unwrap();

        let outcome = manager
            .execute_tool("list_options", serde_json::json!({}))
            .await;
        assert_eq!(outcome, ToolOutcome::Blocked);

        // The gate's own tools always run
        manager.switch_agent(SECURITY_AGENT_NAME).await.unwrap();
        let outcome = manager
            .execute_tool("unlock", serde_json::json!({"code": "7234"}))
            .await;
        assert_eq!(outcome, ToolOutcome::Switch(MAIN_AGENT_NAME.into()));
    }

    #[tokio::test]
    async fn test_unlock_flow_after_correct_code() {
        let manager = manager();
        manager
            .start_call("caller", SECURITY_AGENT_NAME)
            .await
            .unwrap();

        let outcome = manager
            .execute_tool("unlock", serde_json::json!({"code": "7234"}))
            .await;
        assert_eq!(outcome, ToolOutcome::Switch(MAIN_AGENT_NAME.into()));

        manager.switch_agent(MAIN_AGENT_NAME).await.unwrap();
        manager.set_unlocked(true);

        let outcome = manager
            .execute_tool("list_options", serde_json::json!({}))
            .await;
        assert!(matches!(outcome, ToolOutcome::Reply(_)));
    }

    #[tokio::test]
    async fn test_three_wrong_codes_hang_up() {
        let manager = manager();
        manager
            .start_call("caller", SECURITY_AGENT_NAME)
            .await
            .unwrap();

        for code in ["0000", "1111"] {
            let outcome = manager
                .execute_tool("unlock", serde_json::json!({"code": code}))
                .await;
            assert_eq!(outcome, ToolOutcome::Beep);
        }
        let outcome = manager
            .execute_tool("unlock", serde_json::json!({"code": "2222"}))
            .await;
        assert_eq!(outcome, ToolOutcome::Hangup(HangupCause::SecurityFailed));
    }

    #[tokio::test]
    async fn test_global_tools_work_in_gate() {
        let manager = manager();
        manager
            .start_call("caller", SECURITY_AGENT_NAME)
            .await
            .unwrap();

        let outcome = manager.execute_tool(GLOBAL_TOOL_HANGUP, serde_json::json!({})).await;
        assert_eq!(outcome, ToolOutcome::Hangup(HangupCause::UserRequested));

        let outcome = manager
            .execute_tool(GLOBAL_TOOL_SWITCH_MODEL, serde_json::json!({"model": "premium"}))
            .await;
        assert_eq!(outcome, ToolOutcome::SwitchModel(ModelChoice::Premium));
    }

    #[tokio::test]
    async fn test_tools_include_globals_and_model_switch_visibility() {
        let manager = manager();
        manager
            .start_call("caller", SECURITY_AGENT_NAME)
            .await
            .unwrap();

        let tools = manager.tools().await;
        let names: Vec<&str> = tools
            .iter()
            .filter_map(|t| t.get("name").and_then(|n| n.as_str()))
            .collect();
        assert!(names.contains(&"unlock"));
        assert!(names.contains(&GLOBAL_TOOL_HANGUP));
        assert!(names.contains(&GLOBAL_TOOL_SWITCH_MODEL));
    }

    #[tokio::test]
    async fn test_switch_to_same_agent_is_noop() {
        let manager = manager();
        manager
            .start_call("caller", SECURITY_AGENT_NAME)
            .await
            .unwrap();

        let (old, new) = manager.switch_agent(SECURITY_AGENT_NAME).await.unwrap();
        assert_eq!(old, new);
    }
}
