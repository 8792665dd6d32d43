//! Static tool registry.

use std::sync::Arc;

use tracing::warn;

use super::builtin::{self, BuiltinEndpoints};
use super::tool::Tool;
use crate::provider::ToolDefinition;

/// Ordered set of tools, looked up by name.
///
/// Built once per workflow from the static built-ins (plus any custom
/// tools) and read-only afterwards.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All built-in tools against their public endpoints.
    pub fn builtin() -> Self {
        Self::builtin_with(&BuiltinEndpoints::default())
    }

    pub fn builtin_with(endpoints: &BuiltinEndpoints) -> Self {
        let mut registry = Self::new();
        for tool in builtin::all_tools(endpoints) {
            registry.register(tool);
        }
        registry
    }

    /// Add a tool, replacing any tool with the same name in place.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(idx) => self.tools[idx] = tool,
            None => self.tools.push(tool),
        }
        self
    }

    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Lookup that tolerates display names such as "Web URL".
    pub fn find(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.get(name).or_else(|| {
            let wanted = normalize_name(name);
            self.tools.iter().find(|t| normalize_name(t.name()) == wanted)
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.iter()
    }

    /// Tool definitions in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Narrow to the tools named in `pre_tools`, in that order.
    ///
    /// An empty list keeps every tool. Names with no registered tool are
    /// logged and ignored; if none of the names resolve, every tool is kept.
    pub fn resolve(&self, pre_tools: &[String]) -> Self {
        if pre_tools.is_empty() {
            return self.clone();
        }
        let mut selected = Self::new();
        for name in pre_tools {
            match self.find(name) {
                Some(tool) => {
                    selected.register(tool.clone());
                }
                None => warn!(tool = %name, "pre-selected tool is not registered; ignoring"),
            }
        }
        if selected.is_empty() {
            warn!(requested = ?pre_tools, "no pre-selected tool resolved; using all tools");
            return self.clone();
        }
        selected
    }
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(registry: &ToolRegistry) -> Vec<String> {
        registry.names().into_iter().map(String::from).collect()
    }

    #[test]
    fn builtin_registry_has_all_tools_in_order() {
        let registry = ToolRegistry::builtin();
        assert_eq!(
            names(&registry),
            vec!["calculator", "web_url", "web_search", "wikipedia", "vector_db"]
        );
    }

    #[test]
    fn resolve_filters_and_orders_by_pre_tools() {
        let registry = ToolRegistry::builtin();
        let picked = registry.resolve(&["Wikipedia".to_string(), "Web URL".to_string()]);
        assert_eq!(names(&picked), vec!["wikipedia", "web_url"]);
    }

    #[test]
    fn resolve_ignores_unknown_names() {
        let registry = ToolRegistry::builtin();
        let picked = registry.resolve(&["calculator".to_string(), "teleport".to_string()]);
        assert_eq!(names(&picked), vec!["calculator"]);

        let fallback = registry.resolve(&["teleport".to_string()]);
        assert_eq!(fallback.len(), registry.len());
    }

    #[test]
    fn empty_pre_tools_keep_everything() {
        let registry = ToolRegistry::builtin();
        assert_eq!(registry.resolve(&[]).len(), 5);
        assert_eq!(registry.definitions().len(), 5);
    }
}
