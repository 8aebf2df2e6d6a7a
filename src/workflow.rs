//! # Workflow Configuration Module
//!
//! Typed view of the YAML project configuration consumed by the platform.
//! Only the parts this tool reads are modelled: the utility agent catalog
//! and the agent list of the first super agent. Every other key is ignored
//! by serde, so real project files parse without listing their full schema.
//!
//! ```yaml
//! utility_agents:
//!   - agent_class: SearchAgent
//!     agent_name: Search Agent
//! super_agents:
//!   - agent_class: FlowSuperAgent
//!     agent_name: Flow Agent
//!     config:
//!       agent_list:
//!         - agent_name: Search Agent
//!           next_step: [Writer Agent]
//!         - agent_name: Writer Agent
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// =============================================================================
// ERRORS
// =============================================================================
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid workflow configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}

// =============================================================================
// CONFIGURATION TYPES
// =============================================================================
/// Root of a project configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WorkflowConfig {
    /// Catalog of every agent the project can call, with its class.
    #[serde(default)]
    pub utility_agents: Vec<UtilityAgent>,

    /// Orchestrating agents. Only the first one drives the diagram.
    #[serde(default)]
    pub super_agents: Vec<SuperAgent>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UtilityAgent {
    pub agent_name: String,
    pub agent_class: String,
}

/// An orchestrating agent. Its class and description are left to the platform.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SuperAgent {
    #[serde(default)]
    pub agent_name: Option<String>,

    #[serde(default)]
    pub config: SuperAgentConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SuperAgentConfig {
    /// The flow agent list, in workflow order.
    #[serde(default)]
    pub agent_list: Vec<FlowAgent>,
}

/// One step of the orchestrated workflow.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FlowAgent {
    pub agent_name: String,

    /// Names of the agents that run after this one.
    #[serde(default)]
    pub next_step: Vec<String>,
}

impl WorkflowConfig {
    /// Parse a configuration from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = read_config_text(path)?;
        Self::from_yaml_str(&text)
    }

    /// The flow agent list of the first super agent, or an empty slice when
    /// the project declares no super agents.
    pub fn flow_agents(&self) -> &[FlowAgent] {
        self.super_agents
            .first()
            .map(|agent| agent.config.agent_list.as_slice())
            .unwrap_or(&[])
    }
}

/// Read a configuration file as raw text.
///
/// The platform receives the file verbatim, so callers that upload it keep
/// the original text instead of re-serializing the parsed form.
pub fn read_config_text(path: impl AsRef<Path>) -> Result<String, ConfigError> {
    let path = path.as_ref();
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}
