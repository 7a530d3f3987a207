//! Concrete tools exposed to the model.

pub mod search;
pub mod shell;
pub mod web;

use std::time::Duration;

use agent_core::tool::ToolRegistry;

pub use search::SearchConfig;

/// Build the default tool set
pub fn build_tools(shell_timeout: Duration, search: SearchConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(shell::RunShellTool::new(shell_timeout));
    registry.register(web::ReadUrlTool::new());
    registry.register(search::SearchInternetTool::new(search));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tool_set() {
        let registry = build_tools(Duration::from_secs(60), SearchConfig::default());
        assert_eq!(
            registry.names(),
            vec!["read_url", "run_shell", "search_internet"]
        );
    }
}
