//! Main Dispatcher Agent
//!
//! The central agent callers land on after the gate. Explains what is
//! available and forwards to specialist agents via the switch sentinel.

use std::sync::Arc;

use super::{AgentDescriptor, ToolDef, MAIN_AGENT_NAME, SENTINEL_SWITCH_PREFIX};

const INSTRUCTIONS: &str = "\
Du bist die Zentrale der VoiceGate Plattform.

=== DEIN STIL ===
- Professionell, praezise und effizient
- Antworte IMMER so kurz wie moeglich, maximal 1-2 Saetze
- Wiederhole NIEMALS was der Anrufer gesagt hat
- Kein Geplaenkel, kein Fuelltext, kein Smalltalk

=== BEGRUESSUNG ===
\"Willkommen zurueck.\"

=== WEITERLEITUNG ===
Sobald klar ist wohin der Anrufer moechte:
- Sage kurz: \"Alles klar, ich verbinde dich.\"
- Nutze dann SOFORT das Tool 'switch_to_agent'
Wenn der Anrufer fragt was du kannst, nutze 'list_options'.

=== REGELN ===
- Wenn unklar: frage kurz und direkt nach
- Leite so schnell wie moeglich zum richtigen Agenten weiter";

/// Name/display/description triple of a registered specialist
#[derive(Debug, Clone)]
pub struct SpecialistInfo {
    pub name: String,
    pub display_name: String,
    pub description: String,
}

/// Build the dispatcher descriptor.
///
/// `specialists` is the list of reachable target agents (never the gate or
/// the dispatcher itself); it feeds both the tool enum and the instruction
/// text so the model knows what exists.
pub fn main_agent(specialists: &[SpecialistInfo]) -> AgentDescriptor {
    let names: Vec<String> = specialists.iter().map(|s| s.name.clone()).collect();

    let mut instructions = INSTRUCTIONS.to_string();
    if !specialists.is_empty() {
        instructions.push_str("\n\n=== VERFUEGBARE AGENTEN ===");
        for s in specialists {
            instructions.push_str(&format!(
                "\n- {} ({}): {}",
                s.display_name, s.name, s.description
            ));
        }
    }

    let switch_names = Arc::new(names.clone());
    let switch_to_agent = ToolDef {
        name: "switch_to_agent".to_string(),
        description: "Wechselt zum gewuenschten Fachagenten. \
                      Nutze dies sobald klar ist wohin der Anrufer moechte."
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "agent_name": {
                    "type": "string",
                    "enum": names,
                    "description": "Name des Ziel-Agenten"
                }
            },
            "required": ["agent_name"]
        }),
        handler: Arc::new(move |_scratch, args| {
            let known = switch_names.clone();
            Box::pin(async move {
                let target = args
                    .get("agent_name")
                    .and_then(|a| a.as_str())
                    .unwrap_or("")
                    .to_string();

                if target.is_empty() {
                    return "Fehler: Kein Agent angegeben.".to_string();
                }
                if !known.contains(&target) {
                    return format!(
                        "Agent '{}' nicht gefunden. Verfuegbar: {}",
                        target,
                        known.join(", ")
                    );
                }
                format!("{}{}", SENTINEL_SWITCH_PREFIX, target)
            })
        }),
    };

    let list_infos: Arc<Vec<SpecialistInfo>> = Arc::new(specialists.to_vec());
    let list_options = ToolDef {
        name: "list_options".to_string(),
        description: "Listet alle verfuegbaren Fachagenten mit Beschreibung auf.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        }),
        handler: Arc::new(move |_scratch, _args| {
            let infos = list_infos.clone();
            Box::pin(async move {
                if infos.is_empty() {
                    return "Aktuell sind keine Fachagenten verfuegbar.".to_string();
                }
                let mut lines = vec![format!("=== {} Fachagenten verfuegbar ===", infos.len())];
                for info in infos.iter() {
                    lines.push(format!("- {}: {}", info.display_name, info.description));
                }
                lines.push("Sage einfach den Namen des Agenten.".to_string());
                lines.join("\n")
            })
        }),
    };

    AgentDescriptor {
        name: MAIN_AGENT_NAME.to_string(),
        display_name: "Zentrale".to_string(),
        description: "Begruesst Anrufer und leitet zum passenden Fachagenten weiter.".to_string(),
        keywords: vec![
            "zentrale".into(),
            "hauptmenue".into(),
            "menue".into(),
            "zurueck".into(),
            "optionen".into(),
            "was kannst du".into(),
            "hilfe".into(),
            "start".into(),
        ],
        preferred_model: None,
        greeting: Some("Willkommen zurueck.".to_string()),
        instructions,
        tools: vec![switch_to_agent, list_options],
    }
}
