//! # Credentials Module
//!
//! Resolves the AI Refinery account and API key, then logs in with them.
//! It demonstrates:
//! - Reading a `.env` file with dotenvy *without* touching the process
//!   environment
//! - Small traits (`Prompter`) that let tests replace the terminal
//! - Keeping secrets out of `Debug` output
//!
//! Each value is looked up in the environment, then in a `.env` file. If
//! either is still missing the user is asked for both, and both are written
//! to the file so the next run is silent.

use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::platform::{AuthService, PlatformError, Session};

/// Key holding the account name in the credential store.
pub const ACCOUNT_KEY: &str = "ACCOUNT";

/// Key holding the API key in the credential store.
pub const API_KEY_KEY: &str = "API_KEY";

// =============================================================================
// ERRORS
// =============================================================================
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Failed to read credential store {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },

    #[error("Failed to write credential store {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read {field} from the terminal: {source}")]
    Prompt {
        field: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Everything that can stop `secure_login`.
#[derive(Error, Debug)]
pub enum LoginError {
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error("Login failed: {0}")]
    Auth(#[from] PlatformError),
}

// =============================================================================
// CREDENTIALS
// =============================================================================
/// An account / API key pair.
///
/// `Debug` is written by hand so the key never ends up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub account: String,
    pub api_key: String,
}

impl Credentials {
    pub fn new(account: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            api_key: api_key.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account", &self.account)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Where a resolved pair came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Both values were already set, in the environment or the store.
    Stored,
    /// The user typed them in; they have been saved since.
    Prompted,
}

// =============================================================================
// CREDENTIAL STORE
// =============================================================================
/// A `.env` file holding `ACCOUNT` and `API_KEY`.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the pair. `lookup` reads variables (the process environment in
    /// normal use) and takes precedence over the file for each key.
    ///
    /// Returns `None` unless both values are present and non-empty. A
    /// missing file is the same as an empty one.
    pub fn load_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Credentials>, CredentialError> {
        let (file_account, file_api_key) = self.read_file()?;

        let account = lookup(ACCOUNT_KEY).or(file_account);
        let api_key = lookup(API_KEY_KEY).or(file_api_key);

        match (account, api_key) {
            (Some(account), Some(api_key)) if !account.is_empty() && !api_key.is_empty() => {
                Ok(Some(Credentials { account, api_key }))
            }
            _ => Ok(None),
        }
    }

    /// Read `ACCOUNT` and `API_KEY` from the file without touching the
    /// process environment. Lines dotenvy can't parse are skipped.
    fn read_file(&self) -> Result<(Option<String>, Option<String>), CredentialError> {
        let iter = match dotenvy::from_path_iter(&self.path) {
            Ok(iter) => iter,
            Err(e) if e.not_found() => {
                debug!(path = %self.path.display(), "No credential store found");
                return Ok((None, None));
            }
            Err(source) => return Err(self.read_error(source)),
        };

        let mut account = None;
        let mut api_key = None;

        for item in iter {
            let (key, value) = match item {
                Ok(pair) => pair,
                Err(dotenvy::Error::LineParse(line, index)) => {
                    warn!(
                        path = %self.path.display(),
                        line = %line,
                        index,
                        "Skipping unparsable line in credential store"
                    );
                    continue;
                }
                Err(source) => return Err(self.read_error(source)),
            };

            match key.as_str() {
                ACCOUNT_KEY => account = Some(value),
                API_KEY_KEY => api_key = Some(value),
                _ => {}
            }
        }

        Ok((account, api_key))
    }

    /// Persist both values, creating the file if needed.
    pub fn save(&self, credentials: &Credentials) -> Result<(), CredentialError> {
        self.set_key(ACCOUNT_KEY, &credentials.account)?;
        self.set_key(API_KEY_KEY, &credentials.api_key)
    }

    /// Set one key in the file.
    ///
    /// The first existing assignment of `key` is replaced in place; otherwise
    /// a new line is appended. Every other line is kept as-is.
    pub fn set_key(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        let existing = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(source) => return Err(self.write_error(source)),
        };

        let assignment = format!("{}={}", key, quote_value(value));
        let mut replaced = false;

        let mut lines: Vec<String> = existing
            .lines()
            .map(|line| {
                if !replaced && assigns_key(line, key) {
                    replaced = true;
                    assignment.clone()
                } else {
                    line.to_string()
                }
            })
            .collect();

        if !replaced {
            lines.push(assignment);
        }

        let mut contents = lines.join("\n");
        contents.push('\n');

        fs::write(&self.path, contents).map_err(|source| self.write_error(source))
    }

    fn read_error(&self, source: dotenvy::Error) -> CredentialError {
        CredentialError::Read {
            path: self.path.clone(),
            source,
        }
    }

    fn write_error(&self, source: io::Error) -> CredentialError {
        CredentialError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

/// Does this `.env` line assign `key`? Accepts an optional `export ` prefix
/// and whitespace around `=`.
fn assigns_key(line: &str, key: &str) -> bool {
    let line = line.trim_start();
    let line = line.strip_prefix("export ").unwrap_or(line).trim_start();

    match line.strip_prefix(key) {
        Some(rest) => rest.trim_start().starts_with('='),
        None => false,
    }
}

/// Double-quote a value so dotenvy reads it back unchanged.
///
/// `$` is escaped too, since dotenvy expands variables in double quotes.
fn quote_value(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '\\' | '"' | '$' => {
                quoted.push('\\');
                quoted.push(c);
            }
            '\n' => quoted.push_str("\\n"),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

// =============================================================================
// PROMPTING
// =============================================================================
/// Source of interactively entered secrets.
pub trait Prompter {
    /// Read one line without echoing it.
    fn prompt_secret(&self, label: &str) -> io::Result<String>;
}

/// Reads from the controlling terminal with echo disabled.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn prompt_secret(&self, label: &str) -> io::Result<String> {
        rpassword::prompt_password(label)
    }
}

// =============================================================================
// RESOLUTION AND LOGIN
// =============================================================================
/// Find the credential pair: from the environment or the store if complete,
/// otherwise from the prompter (in which case both values are saved).
///
/// Nothing is written when both values were already available.
pub fn resolve_credentials(
    store: &CredentialStore,
    prompter: &dyn Prompter,
) -> Result<(Credentials, CredentialSource), CredentialError> {
    resolve_credentials_with(store, prompter, |key| env::var(key).ok())
}

/// `resolve_credentials` with an explicit variable lookup.
pub fn resolve_credentials_with(
    store: &CredentialStore,
    prompter: &dyn Prompter,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(Credentials, CredentialSource), CredentialError> {
    if let Some(credentials) = store.load_with(lookup)? {
        println!("✅ Credentials successfully loaded.");
        info!(account = %credentials.account, "Credentials loaded");
        return Ok((credentials, CredentialSource::Stored));
    }

    println!("AI Refinery credentials not found. Please enter them below.");

    let account = prompter
        .prompt_secret("Account: ")
        .map_err(|source| CredentialError::Prompt {
            field: ACCOUNT_KEY,
            source,
        })?;
    let api_key = prompter
        .prompt_secret("API Key: ")
        .map_err(|source| CredentialError::Prompt {
            field: API_KEY_KEY,
            source,
        })?;

    let credentials = Credentials::new(account, api_key);
    store.save(&credentials)?;

    println!("✅ Credentials saved to {} for future use.", store.path().display());
    info!(account = %credentials.account, "Credentials saved to store");

    Ok((credentials, CredentialSource::Prompted))
}

/// Resolve credentials and log in with them.
///
/// A failed login is reported here and then returned unchanged; there is
/// no retry.
pub async fn secure_login(
    auth: &dyn AuthService,
    store: &CredentialStore,
    prompter: &dyn Prompter,
) -> Result<Session, LoginError> {
    let (credentials, source) = resolve_credentials(store, prompter)?;
    debug!(?source, "Logging in");

    match auth.login(&credentials).await {
        Ok(session) => Ok(session),
        Err(e) => {
            error!(error = %e, account = %credentials.account, "Login failed");
            eprintln!("❌ Login failed: {}", e);
            Err(LoginError::Auth(e))
        }
    }
}

// =============================================================================
// UNIT TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::cell::RefCell;
    use std::sync::Mutex;

    /// Hands out scripted answers and remembers which labels were asked.
    struct ScriptedPrompter {
        answers: RefCell<Vec<&'static str>>,
        asked: RefCell<Vec<String>>,
    }

    impl ScriptedPrompter {
        fn new(answers: &[&'static str]) -> Self {
            Self {
                answers: RefCell::new(answers.iter().rev().copied().collect()),
                asked: RefCell::new(Vec::new()),
            }
        }
    }

    impl Prompter for ScriptedPrompter {
        fn prompt_secret(&self, label: &str) -> io::Result<String> {
            self.asked.borrow_mut().push(label.to_string());
            self.answers
                .borrow_mut()
                .pop()
                .map(str::to_string)
                .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no more input"))
        }
    }

    struct RecordingAuth {
        fail: bool,
        seen: Mutex<Vec<Credentials>>,
    }

    impl RecordingAuth {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AuthService for RecordingAuth {
        async fn login(&self, credentials: &Credentials) -> Result<Session, PlatformError> {
            self.seen.lock().unwrap().push(credentials.clone());
            if self.fail {
                Err(PlatformError::InvalidCredentials)
            } else {
                Ok(Session::new(credentials.clone()))
            }
        }
    }

    fn no_env(_key: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    fn store_with(contents: Option<&str>) -> (tempfile::TempDir, CredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        if let Some(contents) = contents {
            fs::write(&path, contents).unwrap();
        }
        (dir, CredentialStore::new(path))
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let creds = Credentials::new("acme", "sk-secret");
        let debug = format!("{:?}", creds);

        assert!(debug.contains("acme"));
        assert!(!debug.contains("sk-secret"));
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let (_dir, store) = store_with(None);
        assert!(store.load_with(no_env).unwrap().is_none());
    }

    #[test]
    fn test_load_complete_store() {
        let (_dir, store) = store_with(Some("ACCOUNT=acme\nAPI_KEY='sk-123'\nOTHER=1\n"));
        let creds = store.load_with(no_env).unwrap().unwrap();

        assert_eq!(creds, Credentials::new("acme", "sk-123"));
    }

    #[test]
    fn test_load_partial_store_is_none() {
        let (_dir, store) = store_with(Some("ACCOUNT=acme\n"));
        assert!(store.load_with(no_env).unwrap().is_none());

        let (_dir, store) = store_with(Some("ACCOUNT=\nAPI_KEY=sk-123\n"));
        assert!(store.load_with(no_env).unwrap().is_none());
    }

    #[test]
    fn test_load_does_not_touch_process_env() {
        let (_dir, store) = store_with(Some("ACCOUNT=acme\nAPI_KEY=sk-123\nAIR_UTILS_PROBE=1\n"));
        store.load_with(no_env).unwrap();

        assert!(std::env::var("AIR_UTILS_PROBE").is_err());
    }

    #[test]
    fn test_load_skips_unparsable_lines() {
        let (_dir, store) = store_with(Some("ACCOUNT=acme\nsome junk line\nAPI_KEY=sk\n"));
        let creds = store.load_with(no_env).unwrap().unwrap();

        assert_eq!(creds, Credentials::new("acme", "sk"));
    }

    #[test]
    fn test_load_env_takes_precedence_per_key() {
        let (_dir, store) = store_with(Some("ACCOUNT=file-acme\nAPI_KEY=file-key\n"));

        let creds = store.load_with(env_from(&[("ACCOUNT", "env-acme")])).unwrap().unwrap();
        assert_eq!(creds, Credentials::new("env-acme", "file-key"));

        // An empty exported value still shadows the file, and counts as missing
        let creds = store.load_with(env_from(&[("API_KEY", "")])).unwrap();
        assert!(creds.is_none());
    }

    #[test]
    fn test_resolve_from_env_skips_prompt_and_write() {
        let (_dir, store) = store_with(None);
        let prompter = ScriptedPrompter::new(&[]);
        let env = env_from(&[("ACCOUNT", "env-acme"), ("API_KEY", "env-key")]);

        let (creds, source) = resolve_credentials_with(&store, &prompter, env).unwrap();

        assert_eq!(source, CredentialSource::Stored);
        assert_eq!(creds, Credentials::new("env-acme", "env-key"));
        assert!(prompter.asked.borrow().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_set_key_replaces_in_place_and_keeps_other_lines() {
        let (_dir, store) = store_with(Some("# comment\nACCOUNT=old\nLOG=debug\n"));
        store.set_key(ACCOUNT_KEY, "new").unwrap();

        let text = fs::read_to_string(store.path()).unwrap();
        assert_eq!(text, "# comment\nACCOUNT=\"new\"\nLOG=debug\n");
    }

    #[test]
    fn test_set_key_appends_missing_key() {
        let (_dir, store) = store_with(Some("LOG=debug"));
        store.set_key(API_KEY_KEY, "sk-1").unwrap();

        let text = fs::read_to_string(store.path()).unwrap();
        assert_eq!(text, "LOG=debug\nAPI_KEY=\"sk-1\"\n");
    }

    #[test]
    fn test_assigns_key_matching() {
        assert!(assigns_key("ACCOUNT=x", "ACCOUNT"));
        assert!(assigns_key("  export ACCOUNT = x", "ACCOUNT"));
        assert!(!assigns_key("ACCOUNT_ID=x", "ACCOUNT"));
        assert!(!assigns_key("# ACCOUNT=x", "ACCOUNT"));
    }

    #[test]
    fn test_saved_values_read_back_unchanged() {
        let (_dir, store) = store_with(None);
        let creds = Credentials::new("team \"blue\"", "sk-$HOME\\x");

        store.save(&creds).unwrap();

        assert_eq!(store.load_with(no_env).unwrap(), Some(creds));
    }

    #[test]
    fn test_resolve_from_store_skips_prompt_and_write() {
        let original = "ACCOUNT=acme\nAPI_KEY=sk-123\n";
        let (_dir, store) = store_with(Some(original));
        let prompter = ScriptedPrompter::new(&[]);

        let (creds, source) = resolve_credentials_with(&store, &prompter, no_env).unwrap();

        assert_eq!(source, CredentialSource::Stored);
        assert_eq!(creds.account, "acme");
        assert!(prompter.asked.borrow().is_empty());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), original);
    }

    #[test]
    fn test_resolve_partial_store_prompts_for_both() {
        let (_dir, store) = store_with(Some("API_KEY=stale\n"));
        let prompter = ScriptedPrompter::new(&["acme", "sk-new"]);

        let (creds, source) = resolve_credentials_with(&store, &prompter, no_env).unwrap();

        assert_eq!(source, CredentialSource::Prompted);
        assert_eq!(creds, Credentials::new("acme", "sk-new"));
        assert_eq!(*prompter.asked.borrow(), vec!["Account: ", "API Key: "]);

        // Both values were written, the stale key replaced
        assert_eq!(store.load_with(no_env).unwrap(), Some(creds));
        let text = fs::read_to_string(store.path()).unwrap();
        assert_eq!(text.matches("API_KEY=").count(), 1);
    }

    #[test]
    fn test_resolve_creates_missing_store() {
        let (_dir, store) = store_with(None);
        let prompter = ScriptedPrompter::new(&["acme", "sk-new"]);

        resolve_credentials_with(&store, &prompter, no_env).unwrap();

        assert!(store.path().exists());
        assert!(store.load_with(no_env).unwrap().is_some());
    }

    #[test]
    fn test_resolve_prompt_failure() {
        let (_dir, store) = store_with(None);
        let prompter = ScriptedPrompter::new(&["acme"]);

        let err = resolve_credentials_with(&store, &prompter, no_env).unwrap_err();

        assert!(matches!(err, CredentialError::Prompt { field: API_KEY_KEY, .. }));
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_secure_login_uses_stored_credentials() {
        let (_dir, store) = store_with(Some("ACCOUNT=acme\nAPI_KEY=sk-123\n"));
        let auth = RecordingAuth::new(false);

        let session = secure_login(&auth, &store, &ScriptedPrompter::new(&[]))
            .await
            .unwrap();

        let seen = auth.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(session.account(), seen[0].account);
    }

    #[tokio::test]
    async fn test_secure_login_propagates_auth_failure() {
        let (_dir, store) = store_with(Some("ACCOUNT=acme\nAPI_KEY=wrong\n"));
        let auth = RecordingAuth::new(true);

        let err = secure_login(&auth, &store, &ScriptedPrompter::new(&[]))
            .await
            .unwrap_err();

        assert!(matches!(err, LoginError::Auth(PlatformError::InvalidCredentials)));
    }
}
