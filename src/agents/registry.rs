//! Agent Registry
//!
//! All available agents, populated by an explicit registration table at
//! process startup and immutable afterwards.

use std::sync::Arc;

use serde::Serialize;

use super::AgentDescriptor;

/// Registry of all agents known to the process
#[derive(Default)]
pub struct AgentRegistry {
    agents: Vec<Arc<AgentDescriptor>>,
}

/// Agent info for the API and dashboard
#[derive(Debug, Clone, Serialize)]
pub struct AgentInfo {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub tools_count: usize,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent: AgentDescriptor) {
        if self.get(&agent.name).is_some() {
            tracing::warn!("agent '{}' registered twice, replacing", agent.name);
            self.agents.retain(|a| a.name != agent.name);
        }
        tracing::info!("agent registered: {} ({})", agent.name, agent.display_name);
        self.agents.push(Arc::new(agent));
    }

    pub fn get(&self, name: &str) -> Option<Arc<AgentDescriptor>> {
        self.agents.iter().find(|a| a.name == name).cloned()
    }

    pub fn all(&self) -> &[Arc<AgentDescriptor>] {
        &self.agents
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name.clone()).collect()
    }

    pub fn infos(&self) -> Vec<AgentInfo> {
        self.agents
            .iter()
            .map(|a| AgentInfo {
                name: a.name.clone(),
                display_name: a.display_name.clone(),
                description: a.description.clone(),
                keywords: a.keywords.clone(),
                tools_count: a.tools.len(),
            })
            .collect()
    }

    /// Best keyword match for a transcript, if any agent scores above zero
    pub fn find_for_intent(&self, text: &str) -> Option<Arc<AgentDescriptor>> {
        let mut best: Option<(f32, &Arc<AgentDescriptor>)> = None;
        for agent in &self.agents {
            let score = agent.matches_intent(text);
            if score > 0.0 && best.map_or(true, |(s, _)| score > s) {
                best = Some((score, agent));
            }
        }
        best.map(|(score, agent)| {
            tracing::info!("intent match: '{}' -> {} ({:.2})", text, agent.name, score);
            agent.clone()
        })
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
