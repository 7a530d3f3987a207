//! Tool Approval Gate
//!
//! No tool executes without authorization: either a durable allowlist entry
//! or an explicit per-call decision from the user. The store and the prompt
//! are both injected so the gate can be exercised in tests with in-memory
//! fakes and no terminal I/O.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::RwLock;

use crate::error::Result;

/// Outcome of asking the user about a tool call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// Run the tool this one time
    Once,
    /// Run the tool and add it to the durable allowlist
    Always,
    /// Refuse the call, with an optional reason relayed to the model
    Deny { reason: Option<String> },
}

/// Durable set of tool names pre-authorized for unattended execution.
///
/// `allow` must persist before returning; `is_allowed` is queried on every
/// dispatch. Backed by a line-oriented file in production, by memory here.
pub trait ApprovalStore: Send + Sync {
    fn is_allowed(&self, name: &str) -> bool;

    fn allow(&self, name: &str) -> Result<()>;
}

/// In-memory approval store (for development/testing)
#[derive(Default)]
pub struct MemoryApprovalStore {
    allowed: RwLock<HashSet<String>>,
}

impl MemoryApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed an allowlist entry
    pub fn with_allowed(names: &[&str]) -> Self {
        let store = Self::new();
        {
            let mut allowed = store.allowed.write().unwrap();
            for name in names {
                allowed.insert((*name).to_string());
            }
        }
        store
    }
}

impl ApprovalStore for MemoryApprovalStore {
    fn is_allowed(&self, name: &str) -> bool {
        self.allowed.read().unwrap().contains(name)
    }

    fn allow(&self, name: &str) -> Result<()> {
        self.allowed.write().unwrap().insert(name.to_string());
        Ok(())
    }
}

/// Externally supplied decision hook; the core performs no terminal I/O
#[async_trait]
pub trait ApprovalPrompt: Send + Sync {
    /// Ask the user whether `tool_name` may run with the given arguments
    /// (already pretty-printed for display).
    async fn prompt_decision(&self, tool_name: &str, arguments: &str) -> ApprovalDecision;
}

/// Prompt that denies every request; the safe non-interactive default
pub struct DenyAllPrompt;

#[async_trait]
impl ApprovalPrompt for DenyAllPrompt {
    async fn prompt_decision(&self, _tool_name: &str, _arguments: &str) -> ApprovalDecision {
        ApprovalDecision::Deny { reason: None }
    }
}

/// Prompt that approves every request once (tests only)
pub struct AllowAllPrompt;

#[async_trait]
impl ApprovalPrompt for AllowAllPrompt {
    async fn prompt_decision(&self, _tool_name: &str, _arguments: &str) -> ApprovalDecision {
        ApprovalDecision::Once
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = MemoryApprovalStore::new();
        assert!(!store.is_allowed("run_shell"));

        store.allow("run_shell").unwrap();
        assert!(store.is_allowed("run_shell"));
        assert!(!store.is_allowed("read_url"));
    }

    #[test]
    fn test_pre_seeded_store() {
        let store = MemoryApprovalStore::with_allowed(&["read_url"]);
        assert!(store.is_allowed("read_url"));
    }
}
