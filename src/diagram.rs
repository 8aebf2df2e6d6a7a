//! # Diagram Module
//!
//! Turns a workflow configuration into a Mermaid flowchart and hands it to a
//! renderer. It demonstrates:
//! - Pure string building with iterators and `HashMap`
//! - Trait objects for swappable collaborators (the renderer)
//! - Downgrading a failure to a warning instead of propagating it
//!
//! The generated text looks like:
//! ```text
//! graph TD
//!     classDef search fill:#cde4ff,stroke:#333,stroke-width:2px;
//!     classDef author fill:#ffdfb3,stroke:#333,stroke-width:2px;
//!     SearchAgent["Search Agent"]:::search
//!     SearchAgent --> WriterAgent
//!     WriterAgent["Writer Agent"]:::author
//! ```

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::workflow::WorkflowConfig;

/// Agent class that gets the `search` style.
pub const SEARCH_AGENT_CLASS: &str = "SearchAgent";

/// Graph declaration plus the two style classes every diagram uses.
const HEADER: [&str; 3] = [
    "graph TD",
    "    classDef search fill:#cde4ff,stroke:#333,stroke-width:2px;",
    "    classDef author fill:#ffdfb3,stroke:#333,stroke-width:2px;",
];

// =============================================================================
// STYLE CLASSES
// =============================================================================
/// Visual style applied to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleClass {
    Search,
    Author,
}

impl StyleClass {
    /// Pick the style for an agent's declared class. Unknown agents (no
    /// declared class) fall back to `Author`.
    pub fn for_agent_class(agent_class: Option<&str>) -> Self {
        match agent_class {
            Some(SEARCH_AGENT_CLASS) => Self::Search,
            _ => Self::Author,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Author => "author",
        }
    }
}

/// Graph-safe node id for an agent name: the name with its spaces removed.
pub fn sanitize_id(agent_name: &str) -> String {
    agent_name.replace(' ', "")
}

// =============================================================================
// TEXT GENERATION
// =============================================================================
/// Build the Mermaid flowchart for the first super agent's flow.
///
/// Nodes are emitted in flow order, each followed by its outgoing edges.
/// A `next_step` naming an agent outside the flow list is skipped.
///
/// Two names that sanitize to the same id share one node id in the output;
/// the later flow entry owns the id map slot.
pub fn generate_diagram_text(config: &WorkflowConfig) -> String {
    let mut lines: Vec<String> = HEADER.iter().map(|line| line.to_string()).collect();

    let agent_classes: HashMap<&str, &str> = config
        .utility_agents
        .iter()
        .map(|agent| (agent.agent_name.as_str(), agent.agent_class.as_str()))
        .collect();

    let flow_agents = config.flow_agents();

    let ids: HashMap<&str, String> = flow_agents
        .iter()
        .map(|agent| (agent.agent_name.as_str(), sanitize_id(&agent.agent_name)))
        .collect();

    for agent in flow_agents {
        let name = agent.agent_name.as_str();
        let id = &ids[name];

        let style = StyleClass::for_agent_class(agent_classes.get(name).copied());
        lines.push(format!("    {}[\"{}\"]:::{}", id, name, style.as_str()));

        for next in &agent.next_step {
            match ids.get(next.as_str()) {
                Some(next_id) => lines.push(format!("    {} --> {}", id, next_id)),
                None => debug!(from = %name, to = %next, "Skipping edge to agent outside the flow"),
            }
        }
    }

    lines.join("\n")
}

// =============================================================================
// RENDERING
// =============================================================================
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Renderer request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Renderer returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
}

/// A rendered diagram artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDiagram {
    pub svg: String,
}

/// Anything that can turn Mermaid text into an image.
#[async_trait]
pub trait DiagramRenderer: Send + Sync {
    async fn render(&self, mermaid: &str) -> Result<RenderedDiagram, RenderError>;
}

/// Renders through the public mermaid.ink service.
pub struct MermaidInkRenderer {
    client: reqwest::Client,
    base_url: String,
}

impl MermaidInkRenderer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RenderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn svg_url(&self, mermaid: &str) -> String {
        format!("{}/svg/{}", self.base_url, URL_SAFE.encode(mermaid))
    }
}

#[async_trait]
impl DiagramRenderer for MermaidInkRenderer {
    async fn render(&self, mermaid: &str) -> Result<RenderedDiagram, RenderError> {
        let url = self.svg_url(mermaid);
        debug!(url = %url, "Requesting diagram render");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RenderError::Http {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(RenderedDiagram { svg: body })
    }
}

/// Generate the workflow diagram and render it.
///
/// Rendering failures are not fatal: the error and the generated syntax are
/// printed so the diagram can be pasted elsewhere, and `None` is returned.
pub async fn display_workflow_diagram(
    config: &WorkflowConfig,
    renderer: &dyn DiagramRenderer,
) -> Option<RenderedDiagram> {
    info!("Visualizing the agent workflow...");

    let mermaid = generate_diagram_text(config);

    match renderer.render(&mermaid).await {
        Ok(diagram) => {
            info!(bytes = diagram.svg.len(), "Diagram rendered");
            Some(diagram)
        }
        Err(e) => {
            warn!(error = %e, "Could not generate diagram");
            eprintln!("❌ Could not generate diagram: {}", e);
            println!("--- Generated Mermaid Syntax ---");
            println!("{}", mermaid);
            println!("--------------------------------");
            None
        }
    }
}
