//! JSON session files on disk.
//!
//! One file per session under the sessions directory, pretty-printed so
//! the files are inspectable. The serialized form round-trips the full
//! message sequence including tool-role messages and call ids.

use std::path::PathBuf;

use agent_core::error::{AgentError, Result};
use agent_core::session::{Session, SessionId, SessionStore, SessionSummary};

/// Turn a user-supplied name into a safe file stem.
///
/// Everything outside `[a-zA-Z0-9_-]` becomes `_`; returns `None` when
/// nothing usable remains.
pub fn sanitize_session_name(name: &str) -> Option<String> {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.trim_matches('_').to_string();
    (!sanitized.is_empty()).then_some(sanitized)
}

/// Session store backed by a directory of JSON files
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn path_for(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl SessionStore for FileSessionStore {
    fn save(&self, session: &Session) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(session)?;
        std::fs::write(self.path_for(&session.id), json)?;
        Ok(())
    }

    fn load(&self, id: &SessionId) -> Result<Option<Session>> {
        let path = self.path_for(id);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let session = serde_json::from_str(&contents)
            .map_err(|e| AgentError::Session(format!("invalid session file: {e}")))?;
        Ok(Some(session))
    }

    fn delete(&self, id: &SessionId) -> Result<()> {
        let path = self.path_for(id);
        std::fs::remove_file(&path)
            .map_err(|e| AgentError::Session(format!("{}: {e}", path.display())))
    }

    fn list(&self) -> Result<Vec<SessionSummary>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut summaries = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            summaries.push(SessionSummary {
                id: SessionId::from_string(stem),
                size_bytes: entry.metadata().map(|m| m.len()).unwrap_or(0),
            });
        }
        summaries.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(summaries)
    }
}
