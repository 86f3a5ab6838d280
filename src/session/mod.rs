//! Conversation history persistence.
//!
//! Sessions are single JSON files under a sessions directory. A blank
//! session id disables persistence entirely, so callers can thread the store
//! unconditionally.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SkiffError};
use crate::types::Message;

pub const DEFAULT_SESSIONS_DIR: &str = ".skiff/sessions";

/// Session ids become file names; restrict them before any path is built.
fn session_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,127}$").expect("session id pattern")
    })
}

/// History load/save seam.
pub trait SessionStore: Send + Sync {
    fn load(&self, session_id: &str) -> Result<Vec<Message>>;
    fn save(&self, session_id: &str, history: &[Message]) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionData {
    session_id: String,
    messages: Vec<Message>,
}

/// Stores each session as `<dir>/<id>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn session_path(&self, session_id: &str) -> Result<PathBuf> {
        if !session_id_pattern().is_match(session_id) {
            return Err(SkiffError::InvalidArgument(format!(
                "invalid session id '{session_id}'"
            )));
        }
        Ok(self.dir.join(format!("{session_id}.json")))
    }
}

impl Default for JsonFileStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSIONS_DIR)
    }
}

impl SessionStore for JsonFileStore {
    fn load(&self, session_id: &str) -> Result<Vec<Message>> {
        if session_id.trim().is_empty() {
            return Ok(Vec::new());
        }
        let path = self.session_path(session_id)?;

        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let data: SessionData = serde_json::from_str(&raw)?;
        Ok(data.messages)
    }

    fn save(&self, session_id: &str, history: &[Message]) -> Result<()> {
        if session_id.trim().is_empty() {
            return Ok(());
        }
        let path = self.session_path(session_id)?;

        std::fs::create_dir_all(&self.dir)?;
        restrict_permissions(&self.dir, 0o700)?;

        let data = SessionData {
            session_id: session_id.to_string(),
            messages: history.to_vec(),
        };
        std::fs::write(&path, serde_json::to_vec_pretty(&data)?)?;
        restrict_permissions(&path, 0o600)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Timestamp-derived id used when the caller asks for a session without
/// naming one.
pub fn default_session_id(now: chrono::DateTime<chrono::Local>) -> String {
    now.format("%Y%m%d-%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("sessions"));
        let history = vec![Message::user("hello"), Message::assistant("hi there")];

        store.save("run-1", &history).unwrap();
        let loaded = store.load("run-1").unwrap();
        assert_eq!(loaded, history);
    }

    #[test]
    fn missing_session_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.load("never-saved").unwrap().is_empty());
    }

    #[test]
    fn blank_id_disables_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("sessions"));

        store.save("", &[Message::user("hi")]).unwrap();
        assert!(store.load("  ").unwrap().is_empty());
        assert!(!dir.path().join("sessions").exists());
    }

    #[test]
    fn hostile_session_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        for id in ["../escape", "a/b", ".hidden", "-leading", "id with space"] {
            assert!(store.save(id, &[]).is_err(), "id {id:?} should be rejected");
        }
    }

    #[test]
    fn long_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let too_long = "a".repeat(129);
        assert!(store.save(&too_long, &[]).is_err());
        assert!(store.save(&"a".repeat(128), &[]).is_ok());
    }

    #[test]
    fn default_id_is_sortable_timestamp() {
        let now = chrono::Local::now();
        let id = default_session_id(now);
        assert_eq!(id.len(), 15);
        assert!(session_id_pattern().is_match(&id));
    }

    #[cfg(unix)]
    #[test]
    fn session_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("sessions"));
        store.save("run-1", &[Message::user("hi")]).unwrap();

        let path = dir.path().join("sessions").join("run-1.json");
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
