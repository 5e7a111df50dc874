//! Tool registry implementation.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use vibebolt_core::{
    traits::{Tool, ToolRegistry},
    types::{ToolDefinition, ToolOutput, ToolRiskLevel},
    Error, Result,
};

/// Default tool registry using DashMap.
pub struct DefaultToolRegistry {
    /// Registered tools.
    tools: DashMap<String, Arc<dyn Tool>>,
}

impl DefaultToolRegistry {
    /// Create a new tool registry.
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
        }
    }

    /// Get the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn lookup(&self, name: &str) -> Option<Arc<dyn Tool>> {
        // Clone out so no map guard is held across an await
        self.tools.get(name).map(|entry| entry.value().clone())
    }
}

impl Default for DefaultToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolRegistry for DefaultToolRegistry {
    async fn register(&self, tool: Box<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        tracing::info!(tool = %name, risk = ?tool.risk_level(), "Registering tool");

        if self.tools.contains_key(&name) {
            return Err(Error::internal(format!(
                "Tool '{}' is already registered",
                name
            )));
        }

        self.tools.insert(name, Arc::from(tool));
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<Box<dyn Tool>>> {
        Ok(self
            .lookup(name)
            .map(|tool| Box::new(SharedTool { tool }) as Box<dyn Tool>))
    }

    async fn list(&self) -> Result<Vec<ToolDefinition>> {
        let mut definitions: Vec<_> = self
            .tools
            .iter()
            .map(|entry| ToolDefinition {
                name: entry.name().to_string(),
                description: entry.description().to_string(),
                parameters: entry.parameters(),
                risk_level: entry.risk_level(),
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(definitions)
    }

    async fn execute(&self, name: &str, args: serde_json::Value) -> Result<ToolOutput> {
        let tool = self.lookup(name).ok_or_else(|| Error::tool_not_found(name))?;

        tracing::debug!(tool = %name, "Executing tool");
        let output = tool.execute(args).await;
        match &output {
            Ok(out) => tracing::debug!(tool = %name, success = out.success, "Tool finished"),
            Err(e) => tracing::warn!(tool = %name, error = %e, "Tool failed"),
        }
        output
    }
}

/// Wrapper for Arc<dyn Tool> to allow returning Box<dyn Tool>
struct SharedTool {
    tool: Arc<dyn Tool>,
}

#[async_trait]
impl Tool for SharedTool {
    fn name(&self) -> &str {
        self.tool.name()
    }

    fn description(&self) -> &str {
        self.tool.description()
    }

    fn parameters(&self) -> serde_json::Value {
        self.tool.parameters()
    }

    fn risk_level(&self) -> ToolRiskLevel {
        self.tool.risk_level()
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput> {
        self.tool.execute(args).await
    }
}
