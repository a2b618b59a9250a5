//! Dashboard Event Types
//!
//! The JSON messages fanned out to every connected dashboard client.

use serde::Serialize;

/// Coarse state of the AI leg, for the dashboard's activity indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AiStateKind {
    Idle,
    Listening,
    UserSpeaking,
    Thinking,
    Speaking,
}

/// Server -> dashboard messages
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardEvent {
    Status {
        sip_registered: bool,
        call_active: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        caller_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        active_agent: Option<String>,
        available_agents: Vec<String>,
        current_model: String,
    },
    CallIncoming {
        caller_id: String,
    },
    CallActive {
        caller_id: String,
        agent: String,
    },
    CallEnded {
        reason: String,
    },
    CallRejected {
        caller_id: String,
        reason: String,
    },
    Transcript {
        role: String,
        text: String,
        is_final: bool,
    },
    FunctionCall {
        name: String,
        args: serde_json::Value,
    },
    FunctionResult {
        name: String,
        result: String,
    },
    AgentChanged {
        old_agent: String,
        new_agent: String,
    },
    AiState {
        state: AiStateKind,
    },
    CallCost {
        cost_cents: f64,
    },
    ModelChanged {
        model: String,
    },
    BlacklistUpdated {},
    WhitelistUpdated {},
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_serialize_with_type_tag() {
        let event = DashboardEvent::CallRejected {
            caller_id: "015901969502".into(),
            reason: "blacklist:auto".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "call_rejected");
        assert_eq!(json["reason"], "blacklist:auto");

        let event = DashboardEvent::AiState {
            state: AiStateKind::UserSpeaking,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ai_state");
        assert_eq!(json["state"], "user_speaking");
    }

    #[test]
    fn test_status_omits_empty_fields() {
        let event = DashboardEvent::Status {
            sip_registered: true,
            call_active: false,
            caller_id: None,
            active_agent: None,
            available_agents: vec!["main_agent".into()],
            current_model: "mini".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("caller_id").is_none());
        assert_eq!(json["available_agents"][0], "main_agent");
    }
}
