//! # Platform Module
//!
//! Talks to the AI Refinery platform: login and project creation.
//! It demonstrates:
//! - Async traits (`async-trait`) as the seam between this tool and a
//!   remote service
//! - A reqwest client with a configurable base URL (so tests can point it
//!   at a mock server)
//! - Mapping HTTP status codes onto a thiserror enum

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::credentials::Credentials;
use crate::workflow::{self, ConfigError, WorkflowConfig};

const LOGIN_PATH: &str = "/authentication/validate";
const CREATE_PROJECT_PATH: &str = "/distiller/create";

// =============================================================================
// ERRORS
// =============================================================================
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Invalid account or API key")]
    InvalidCredentials,

    #[error("Platform returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// =============================================================================
// SESSION AND CLIENT HANDLE
// =============================================================================
/// Proof of a successful login, passed explicitly to later calls.
#[derive(Debug, Clone)]
pub struct Session {
    credentials: Credentials,
}

impl Session {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    pub fn account(&self) -> &str {
        &self.credentials.account
    }

    fn api_key(&self) -> &str {
        &self.credentials.api_key
    }
}

/// A client bound to one project on the platform.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub project: String,
    pub config_path: PathBuf,
    pub account: String,
}

// =============================================================================
// SERVICE TRAITS
// =============================================================================
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<Session, PlatformError>;
}

#[async_trait]
pub trait ProjectService: Send + Sync {
    /// Create (or rebind) `project` from the given configuration text.
    async fn create_project(
        &self,
        session: &Session,
        config_path: &Path,
        config_yaml: &str,
        project: &str,
    ) -> Result<ClientHandle, PlatformError>;
}

// =============================================================================
// HTTP CLIENT
// =============================================================================
#[derive(Serialize)]
struct LoginRequest<'a> {
    account: &'a str,
    api_key: &'a str,
}

#[derive(Serialize)]
struct CreateProjectRequest<'a> {
    project: &'a str,
    config: &'a str,
}

/// reqwest-backed implementation of both services.
#[derive(Debug, Clone)]
pub struct PlatformClient {
    client: Client,
    base_url: String,
}

impl PlatformClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PlatformError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, PlatformError> {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Turn a non-success response into a `PlatformError`.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(PlatformError::InvalidCredentials);
    }

    let message = response.text().await.unwrap_or_default();
    Err(PlatformError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl AuthService for PlatformClient {
    async fn login(&self, credentials: &Credentials) -> Result<Session, PlatformError> {
        debug!(account = %credentials.account, url = %self.url(LOGIN_PATH), "Sending login request");

        let response = self
            .client
            .post(self.url(LOGIN_PATH))
            .json(&LoginRequest {
                account: &credentials.account,
                api_key: &credentials.api_key,
            })
            .send()
            .await?;

        check_status(response).await?;

        info!(account = %credentials.account, "Logged in");
        Ok(Session::new(credentials.clone()))
    }
}

#[async_trait]
impl ProjectService for PlatformClient {
    async fn create_project(
        &self,
        session: &Session,
        config_path: &Path,
        config_yaml: &str,
        project: &str,
    ) -> Result<ClientHandle, PlatformError> {
        debug!(project = %project, url = %self.url(CREATE_PROJECT_PATH), "Creating project");

        let response = self
            .client
            .post(self.url(CREATE_PROJECT_PATH))
            .bearer_auth(session.api_key())
            .header("X-Account", session.account())
            .json(&CreateProjectRequest {
                project,
                config: config_yaml,
            })
            .send()
            .await?;

        check_status(response).await?;

        Ok(ClientHandle {
            project: project.to_string(),
            config_path: config_path.to_path_buf(),
            account: session.account().to_string(),
        })
    }
}

// =============================================================================
// CLIENT INITIALIZATION
// =============================================================================
/// Create a client scoped to `project_name` from the config at `config_path`.
///
/// The file is parsed locally first so a malformed config fails before any
/// request is made. Errors are reported here and then returned.
pub async fn initialize_client(
    service: &dyn ProjectService,
    session: &Session,
    config_path: impl AsRef<Path>,
    project_name: &str,
) -> Result<ClientHandle, PlatformError> {
    let config_path = config_path.as_ref();

    let result: Result<ClientHandle, PlatformError> = async {
        let config_yaml = workflow::read_config_text(config_path)?;
        let config = WorkflowConfig::from_yaml_str(&config_yaml)?;
        debug!(
            utility_agents = config.utility_agents.len(),
            flow_agents = config.flow_agents().len(),
            "Project configuration parsed"
        );

        service
            .create_project(session, config_path, &config_yaml, project_name)
            .await
    }
    .await;

    match result {
        Ok(handle) => {
            info!(project = %handle.project, "Client initialized");
            Ok(handle)
        }
        Err(e) => {
            error!(error = %e, project = %project_name, "Failed to initialize client");
            eprintln!("❌ Failed to initialize client: {}", e);
            Err(e)
        }
    }
}
