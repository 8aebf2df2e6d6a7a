//! # AIR Utils
//!
//! Small command-line helpers for AI Refinery agent projects.
//!
//! This application provides:
//! - `login`: load credentials from the environment or `.env` (or prompt
//!   for them) and log in
//! - `init`: create/bind a project from a YAML configuration file
//! - `diagram`: draw the project's agent workflow as a Mermaid flowchart
//!
//! ## Quick Start
//! ```bash
//! cargo run -- diagram --config example.yaml --no-render
//! ```

// =============================================================================
// MODULE DECLARATIONS
// =============================================================================

/// Tool settings from the environment
mod config;

/// Credential store, prompting and login
mod credentials;

/// Mermaid generation and rendering
mod diagram;

/// Platform client: login and project creation
mod platform;

/// Typed project configuration
mod workflow;

// =============================================================================
// IMPORTS
// =============================================================================
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::Config;
use crate::credentials::{secure_login, CredentialStore, TerminalPrompter};
use crate::diagram::{display_workflow_diagram, generate_diagram_text, MermaidInkRenderer};
use crate::platform::{initialize_client, PlatformClient, Session};
use crate::workflow::WorkflowConfig;

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
/// # Rust Concept: Subcommands with Clap
///
/// `#[command(subcommand)]` turns an enum into `git`-style subcommands.
/// Flags marked `global = true` are accepted before or after the
/// subcommand name.
#[derive(Parser, Debug)]
#[command(
    name = "air-utils",
    version,
    about = "Credential bootstrap, project setup and workflow diagrams for AI Refinery",
    long_about = r#"
AIR Utils - helpers around an AI Refinery agent project.

Credentials are read from the environment or a .env file (ACCOUNT and
API_KEY). When either is missing you are asked for both, and they are saved
to the .env file for the next run.

EXAMPLES:
  # Log in (prompts on first use)
  air-utils login

  # Create or bind a project from its configuration
  air-utils init --config example.yaml --project research_demo

  # Print the workflow diagram as Mermaid text
  air-utils diagram --config example.yaml --no-render

  # Render the diagram to SVG through mermaid.ink
  air-utils diagram --config example.yaml --output workflow.svg
"#
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Credential store path (overrides AIR_ENV_FILE)
    #[arg(long = "env-file", global = true, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// Platform base URL (overrides AIR_BASE_URL)
    #[arg(long = "base-url", global = true, value_name = "URL")]
    base_url: Option<String>,

    /// Verbose output (debug logging)
    #[arg(
        short = 'v',
        long = "verbose",
        global = true,
        help = "Enable verbose/debug logging",
        default_value = "false"
    )]
    verbose: bool,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Resolve credentials and log in
    Login,

    /// Log in, then create or bind a project
    Init {
        /// Path to the project's YAML configuration
        #[arg(short = 'c', long = "config", value_name = "PATH")]
        config: PathBuf,

        /// Name of the project to create or use
        #[arg(short = 'p', long = "project", value_name = "NAME")]
        project: String,
    },

    /// Generate the agent workflow diagram
    Diagram {
        /// Path to the project's YAML configuration
        #[arg(short = 'c', long = "config", value_name = "PATH")]
        config: PathBuf,

        /// Only print the Mermaid text, don't call the renderer
        #[arg(long = "no-render", default_value = "false")]
        no_render: bool,

        /// Write the result here instead of stdout
        #[arg(short = 'o', long = "output", value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

// =============================================================================
// MAIN FUNCTION
// =============================================================================
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose)?;

    let mut config = Config::from_env()?;

    if let Some(env_file) = args.env_file {
        config.env_file = env_file;
    }
    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
    }

    config.validate()?;

    info!(
        base_url = %config.base_url,
        env_file = %config.env_file.display(),
        "Configuration loaded"
    );

    match args.command {
        Command::Login => {
            let client = PlatformClient::from_config(&config)?;
            let session = login(&client, &config).await?;
            println!("✅ Logged in as {}", session.account());
        }
        Command::Init {
            config: config_path,
            project,
        } => {
            let client = PlatformClient::from_config(&config)?;
            let session = login(&client, &config).await?;
            let handle = initialize_client(&client, &session, &config_path, &project).await?;
            println!(
                "✅ Project '{}' ready for {} (config: {})",
                handle.project,
                handle.account,
                handle.config_path.display()
            );
        }
        Command::Diagram {
            config: config_path,
            no_render,
            output,
        } => {
            run_diagram(&config, &config_path, no_render, output).await?;
        }
    }

    Ok(())
}

/// Resolve credentials from the configured store and log in.
async fn login(client: &PlatformClient, config: &Config) -> Result<Session> {
    let store = CredentialStore::new(&config.env_file);
    let session = secure_login(client, &store, &TerminalPrompter).await?;
    Ok(session)
}

async fn run_diagram(
    config: &Config,
    config_path: &Path,
    no_render: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let workflow = WorkflowConfig::from_file(config_path)
        .with_context(|| format!("Could not load {}", config_path.display()))?;

    info!(
        super_agent = workflow
            .super_agents
            .first()
            .and_then(|agent| agent.agent_name.as_deref())
            .unwrap_or("<none>"),
        flow_agents = workflow.flow_agents().len(),
        "Workflow configuration loaded"
    );

    let content = if no_render {
        generate_diagram_text(&workflow)
    } else {
        let renderer = MermaidInkRenderer::new(
            config.mermaid_ink_url.as_str(),
            Duration::from_secs(config.timeout_secs),
        )?;

        match display_workflow_diagram(&workflow, &renderer).await {
            Some(diagram) => diagram.svg,
            // Failure already reported along with the raw syntax
            None => return Ok(()),
        }
    };

    match output {
        Some(path) => {
            fs::write(&path, content)
                .with_context(|| format!("Could not write {}", path.display()))?;
            println!("✅ Diagram written to {}", path.display());
        }
        None => println!("{}", content),
    }

    Ok(())
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================
/// Initialize the tracing subscriber for structured logging.
///
/// Logs go to stderr so that `diagram` output on stdout stays pipeable.
fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
