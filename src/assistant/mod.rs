//! Assistant definitions and the lookup tables injected into the engine.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ParleyError, Result};
use crate::hooks::AssistantHooks;
use crate::types::{AssistantMeta, Options, Role};

/// A system prompt configured on an assistant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prompt {
    #[serde(default = "system_role")]
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

fn system_role() -> Role {
    Role::System
}

impl Prompt {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            name: None,
        }
    }
}

/// Tool schemas offered to the model, plus extra prompts describing them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolSet {
    #[serde(default)]
    pub tools: Vec<Value>,
    #[serde(default)]
    pub prompts: Vec<Prompt>,
}

/// A configured assistant.
#[derive(Debug, Clone, Builder)]
pub struct Assistant {
    #[builder(into)]
    pub id: String,
    #[builder(into)]
    pub name: String,
    #[builder(into)]
    pub avatar: Option<String>,
    /// Name of the connector (model endpoint) this assistant talks to.
    #[builder(into)]
    pub connector: String,
    #[builder(default)]
    pub options: Options,
    #[builder(default)]
    pub prompts: Vec<Prompt>,
    pub tools: Option<ToolSet>,
    #[builder(default)]
    pub vision: bool,
    #[builder(default)]
    pub hooks: AssistantHooks,
}

impl Assistant {
    pub fn meta(&self) -> AssistantMeta {
        AssistantMeta {
            id: self.id.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
        }
    }

    /// Non-empty tool list, if any.
    pub fn tool_set(&self) -> Option<&ToolSet> {
        self.tools.as_ref().filter(|set| !set.tools.is_empty())
    }
}

/// Capability flags of a connector.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectorSettings {
    /// The endpoint accepts a native `tools` request option.
    #[serde(default)]
    pub tools: bool,
}

/// Assistant id to definition. Populated at startup, replaced on reload.
#[derive(Debug, Clone, Default)]
pub struct AssistantRegistry {
    assistants: Arc<RwLock<HashMap<String, Arc<Assistant>>>>,
}

impl AssistantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, assistant: Assistant) -> Arc<Assistant> {
        let assistant = Arc::new(assistant);
        self.assistants
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(assistant.id.clone(), assistant.clone());
        assistant
    }

    pub fn get(&self, id: &str) -> Result<Arc<Assistant>> {
        self.assistants
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .ok_or_else(|| ParleyError::AssistantNotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.assistants.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace every definition at once.
    pub fn reload(&self, assistants: impl IntoIterator<Item = Assistant>) {
        let fresh: HashMap<_, _> = assistants
            .into_iter()
            .map(|a| (a.id.clone(), Arc::new(a)))
            .collect();
        tracing::debug!(count = fresh.len(), "reloading assistants");
        *self.assistants.write().unwrap_or_else(|e| e.into_inner()) = fresh;
    }

    /// Default assistant for a bare connector, created on first use as
    /// `connector:<name>`.
    pub fn get_or_insert_connector(&self, connector: &str) -> Arc<Assistant> {
        let id = format!("connector:{connector}");
        let mut assistants = self.assistants.write().unwrap_or_else(|e| e.into_inner());
        assistants
            .entry(id.clone())
            .or_insert_with(|| {
                Arc::new(
                    Assistant::builder()
                        .id(id)
                        .name(connector)
                        .connector(connector)
                        .build(),
                )
            })
            .clone()
    }
}

/// Connector name to capability flags.
#[derive(Debug, Clone, Default)]
pub struct ConnectorRegistry {
    connectors: Arc<RwLock<HashMap<String, ConnectorSettings>>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: HashMap<String, ConnectorSettings>) -> Self {
        Self {
            connectors: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn insert(&self, name: impl Into<String>, settings: ConnectorSettings) {
        self.connectors
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.into(), settings);
    }

    pub fn get(&self, name: &str) -> Option<ConnectorSettings> {
        self.connectors
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .copied()
    }

    /// Unknown connectors are assumed to lack native tool calls.
    pub fn supports_tools(&self, name: &str) -> bool {
        self.get(name).is_some_and(|settings| settings.tools)
    }

    pub fn reload(&self, settings: HashMap<String, ConnectorSettings>) {
        *self.connectors.write().unwrap_or_else(|e| e.into_inner()) = settings;
    }
}
