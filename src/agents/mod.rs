//! Agent registry: flat-file agent configurations and their tool allow-lists.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::bridge::policy::AgentPolicySource;
use crate::error::{BridgeError, Result};

pub const DEFAULT_AGENTS_PATH: &str = "data/agents.json";
pub const DEFAULT_MODEL: &str = "gpt-4o";

fn default_model() -> String {
    DEFAULT_MODEL.to_owned()
}

/// A configured agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "new_agent_id")]
    pub id: String,
    pub name: String,
    pub system_prompt: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Capability names this agent may use. Empty means none.
    #[serde(default)]
    pub enabled_tools: Vec<String>,
    #[serde(default = "Utc::now", deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", deserialize_with = "timestamp::deserialize")]
    pub updated_at: DateTime<Utc>,
}

fn new_agent_id() -> String {
    Uuid::new_v4().to_string()
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_agent_id(),
            name: name.into(),
            system_prompt: system_prompt.into(),
            model: default_model(),
            enabled_tools: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_enabled_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled_tools = tools.into_iter().map(Into::into).collect();
        self
    }
}

/// Timestamps are written as RFC 3339; offset-less local times are also read.
mod timestamp {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer};

    pub(super) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        let naive = raw.parse::<NaiveDateTime>().ok()?;
        Some(
            Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|local| local.with_timezone(&Utc))
                .unwrap_or_else(|| naive.and_utc()),
        )
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
    }
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_tools: Option<Vec<String>>,
}

impl AgentUpdate {
    fn apply(self, agent: &mut AgentConfig) {
        if let Some(name) = self.name {
            agent.name = name;
        }
        if let Some(system_prompt) = self.system_prompt {
            agent.system_prompt = system_prompt;
        }
        if let Some(model) = self.model {
            agent.model = model;
        }
        if let Some(enabled_tools) = self.enabled_tools {
            agent.enabled_tools = enabled_tools;
        }
        agent.updated_at = Utc::now();
    }
}

/// What was read from the agent file.
#[derive(Debug, Clone, Default)]
struct Registry {
    agents: Vec<AgentConfig>,
    /// Records that did not parse, written back untouched.
    unreadable: Vec<Value>,
    /// The file was not a JSON array at all.
    corrupt: bool,
}

impl Registry {
    fn unreadable_ids(&self) -> impl Iterator<Item = &str> {
        self.unreadable
            .iter()
            .filter_map(|record| record.get("id").and_then(Value::as_str))
    }
}

/// JSON-file agent store with an in-memory copy.
///
/// Reads never touch the file; every write goes to disk before the
/// in-memory copy changes. Records that fail to parse are kept verbatim on
/// every write, and their agents are denied every capability. A file that
/// is not a JSON array is never overwritten.
#[derive(Debug)]
pub struct AgentStore {
    path: PathBuf,
    registry: RwLock<Registry>,
}

impl AgentStore {
    /// Open the store, creating an empty file if none exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            write_records(&path, Vec::new())?;
        }
        let registry = read_registry(&path)?;
        tracing::debug!(
            path = %path.display(),
            agents = registry.agents.len(),
            unreadable = registry.unreadable.len(),
            "opened agent store"
        );
        Ok(Self {
            path,
            registry: RwLock::new(registry),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn list(&self) -> Vec<AgentConfig> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .agents
            .clone()
    }

    pub fn get(&self, id: &str) -> Option<AgentConfig> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .agents
            .iter()
            .find(|agent| agent.id == id)
            .cloned()
    }

    pub fn create(&self, agent: AgentConfig) -> Result<AgentConfig> {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if registry.agents.iter().any(|existing| existing.id == agent.id)
            || registry.unreadable_ids().any(|id| id == agent.id)
        {
            return Err(BridgeError::Configuration(format!(
                "agent '{}' already exists",
                agent.id
            )));
        }
        let mut next = registry.agents.clone();
        next.push(agent.clone());
        self.persist(&registry, &next)?;
        registry.agents = next;
        Ok(agent)
    }

    /// Returns `None` if no agent has this id.
    pub fn update(&self, id: &str, update: AgentUpdate) -> Result<Option<AgentConfig>> {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        let Some(position) = registry.agents.iter().position(|agent| agent.id == id) else {
            return Ok(None);
        };
        let mut next = registry.agents.clone();
        update.apply(&mut next[position]);
        let updated = next[position].clone();
        self.persist(&registry, &next)?;
        registry.agents = next;
        Ok(Some(updated))
    }

    /// Returns whether an agent was removed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        let next: Vec<AgentConfig> = registry
            .agents
            .iter()
            .filter(|agent| agent.id != id)
            .cloned()
            .collect();
        if next.len() == registry.agents.len() {
            return Ok(false);
        }
        self.persist(&registry, &next)?;
        registry.agents = next;
        Ok(true)
    }

    fn persist(&self, registry: &Registry, agents: &[AgentConfig]) -> Result<()> {
        if registry.corrupt {
            return Err(BridgeError::Configuration(format!(
                "agent file {} is not a JSON array; refusing to overwrite it",
                self.path.display()
            )));
        }
        let mut records = agents
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        records.extend(registry.unreadable.iter().cloned());
        write_records(&self.path, records)
    }
}

impl AgentPolicySource for AgentStore {
    /// Unknown agents get no restriction; known agents get exactly their `enabled_tools`.
    ///
    /// Agents whose record could not be read, and every agent when the file
    /// itself is corrupt, get an empty allow-list.
    fn allowed_tool_names_for(&self, agent_id: &str) -> Option<HashSet<String>> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        if registry.corrupt || registry.unreadable_ids().any(|id| id == agent_id) {
            return Some(HashSet::new());
        }
        registry
            .agents
            .iter()
            .find(|agent| agent.id == agent_id)
            .map(|agent| agent.enabled_tools.iter().cloned().collect())
    }
}

fn read_registry(path: &Path) -> Result<Registry> {
    let raw = std::fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(Registry::default());
    }
    let records = match serde_json::from_str::<Vec<Value>>(&raw) {
        Ok(records) => records,
        Err(error) => {
            tracing::warn!(path = %path.display(), error = %error, "agent file is malformed; opening read-only");
            return Ok(Registry {
                corrupt: true,
                ..Registry::default()
            });
        }
    };

    let mut registry = Registry::default();
    for record in records {
        match serde_json::from_value::<AgentConfig>(record.clone()) {
            Ok(agent) => registry.agents.push(agent),
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    id = record.get("id").and_then(serde_json::Value::as_str).unwrap_or("?"),
                    error = %error,
                    "skipping unreadable agent record"
                );
                registry.unreadable.push(record);
            }
        }
    }
    Ok(registry)
}

fn write_records(path: &Path, records: Vec<Value>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let body = serde_json::to_string_pretty(&Value::Array(records))?;
    let staging = path.with_extension("json.tmp");
    std::fs::write(&staging, body)?;
    std::fs::rename(&staging, path)?;
    Ok(())
}
