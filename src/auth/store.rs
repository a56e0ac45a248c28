use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session file name in the config directory
const SESSION_FILE: &str = "session.json";

/// Application name used for config directory paths
const APP_NAME: &str = "coursedeck";

/// Everything the client persists between process runs.
///
/// The renewal credential is the long-lived secret; `access_token` is a
/// short-lived cached copy kept only so startup can restore a session
/// without an immediate network round trip. All fields live and die
/// together: `clear()` removes the whole record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSession {
    pub refresh_token: String,
    pub user_id: i64,
    pub token_type: String,
    pub expires_in: Option<i64>,
    pub access_token: Option<String>,
    pub saved_at: DateTime<Utc>,
}

impl PersistedSession {
    pub fn new(
        refresh_token: String,
        user_id: i64,
        token_type: String,
        expires_in: Option<i64>,
        access_token: Option<String>,
    ) -> Self {
        Self {
            refresh_token,
            user_id,
            token_type,
            expires_in,
            access_token,
            saved_at: Utc::now(),
        }
    }
}

/// Durable storage for the session record.
///
/// The file-backed implementation is the production default; the in-memory
/// one backs tests and embedders that manage persistence themselves.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<PersistedSession>>;
    fn save(&self, session: &PersistedSession) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Default location: `<config dir>/coursedeck/session.json`
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(SESSION_FILE))
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<PersistedSession>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)
            .context("Failed to read session file")?;
        let session: PersistedSession =
            serde_json::from_str(&contents).context("Failed to parse session file")?;
        Ok(Some(session))
    }

    fn save(&self, session: &PersistedSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, contents).context("Failed to write session file")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    inner: Mutex<Option<PersistedSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: PersistedSession) -> Self {
        Self {
            inner: Mutex::new(Some(session)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<PersistedSession>> {
        Ok(self.inner.lock().expect("session store lock poisoned").clone())
    }

    fn save(&self, session: &PersistedSession) -> Result<()> {
        *self.inner.lock().expect("session store lock poisoned") = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.inner.lock().expect("session store lock poisoned") = None;
        Ok(())
    }
}
