//! File-backed approval store and the interactive decision prompt.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use dialoguer::{Input, Select};

use agent_core::approval::{ApprovalDecision, ApprovalPrompt, ApprovalStore};
use agent_core::error::Result;

/// Allowlist persisted as one tool name per line.
///
/// Loaded once at startup; "allow always" decisions append immediately so
/// the grant survives the process.
pub struct FileApprovalStore {
    path: PathBuf,
    approved: RwLock<HashSet<String>>,
}

impl FileApprovalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let approved = load_allowlist(&path);
        Self {
            path,
            approved: RwLock::new(approved),
        }
    }
}

fn load_allowlist(path: &Path) -> HashSet<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
        Err(err) => {
            tracing::warn!(%err, path = %path.display(), "failed to read allowed tools file");
            HashSet::new()
        }
    }
}

impl ApprovalStore for FileApprovalStore {
    fn is_allowed(&self, name: &str) -> bool {
        self.approved.read().unwrap().contains(name)
    }

    fn allow(&self, name: &str) -> Result<()> {
        {
            let mut approved = self.approved.write().unwrap();
            if !approved.insert(name.to_string()) {
                return Ok(());
            }
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{name}")?;
        Ok(())
    }
}

/// Interactive y/n/always prompt on the terminal
pub struct ConsolePrompt;

#[async_trait]
impl ApprovalPrompt for ConsolePrompt {
    async fn prompt_decision(&self, tool_name: &str, arguments: &str) -> ApprovalDecision {
        let name = tool_name.to_string();
        let args = arguments.to_string();
        tokio::task::spawn_blocking(move || prompt_sync(&name, &args))
            .await
            .unwrap_or(ApprovalDecision::Deny { reason: None })
    }
}

fn prompt_sync(tool_name: &str, arguments: &str) -> ApprovalDecision {
    println!("Requested tool execution:");
    println!("  name: {tool_name}");
    println!("  args:");
    for line in arguments.lines() {
        println!("    {line}");
    }

    let selection = Select::new()
        .with_prompt("Allow this tool?")
        .items(&["allow once", "deny", "allow always"])
        .default(0)
        .interact();

    match selection {
        Ok(0) => ApprovalDecision::Once,
        Ok(2) => ApprovalDecision::Always,
        Ok(1) => {
            let reason: String = Input::new()
                .with_prompt("Optional reason for the model (enter to skip)")
                .allow_empty(true)
                .interact_text()
                .unwrap_or_default();
            let reason = reason.trim();
            ApprovalDecision::Deny {
                reason: (!reason.is_empty()).then(|| reason.to_string()),
            }
        }
        // prompt aborted (Esc, EOF): treat as denial
        _ => ApprovalDecision::Deny { reason: None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("allowed_tools");

        let store = FileApprovalStore::new(&path);
        assert!(!store.is_allowed("run_shell"));
        store.allow("run_shell").unwrap();
        store.allow("read_url").unwrap();
        // idempotent
        store.allow("run_shell").unwrap();

        let reloaded = FileApprovalStore::new(&path);
        assert!(reloaded.is_allowed("run_shell"));
        assert!(reloaded.is_allowed("read_url"));
        assert!(!reloaded.is_allowed("search_internet"));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileApprovalStore::new(dir.path().join("nope"));
        assert!(!store.is_allowed("anything"));
    }
}
