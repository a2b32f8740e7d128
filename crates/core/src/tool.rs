//! The tool trait and the registry a reasoning loop dispatches to.
//!
//! A tool receives the argument line of an `Action:` entry (its own name) and
//! the free-form body that followed it, and produces an observation string that
//! is fed back to the model.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result, ToolError};

/// The core Tool trait.
///
/// Tools are collected into a [`Toolbox`] once, when a reasoning loop is
/// built, and looked up by name on every `Action:` entry.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "python", "bash").
    fn name(&self) -> &str;

    /// A description of what this tool does (rendered into the system prompt).
    fn description(&self) -> &str;

    /// Human-readable description of the input the tool expects.
    fn input(&self) -> &str;

    /// Run the tool. The returned observation is what the model will see.
    async fn work(
        &self,
        cancel: &CancellationToken,
        argument: &str,
        content: &str,
    ) -> std::result::Result<String, ToolError>;
}

/// An immutable name → tool registry.
///
/// Built once. There is no way to register a tool afterwards.
#[derive(Clone, Default)]
pub struct Toolbox {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Toolbox {
    /// Build a toolbox. A later tool with the same name replaces an earlier one.
    pub fn new(tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        let tools = tools
            .into_iter()
            .map(|tool| (tool.name().to_string(), tool))
            .collect();
        Self { tools }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// All tools, sorted by name.
    pub fn tools(&self) -> Vec<&dyn Tool> {
        let mut tools: Vec<&dyn Tool> = self.tools.values().map(|t| t.as_ref()).collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatch `content` to the tool named `argument`.
    pub async fn work(
        &self,
        cancel: &CancellationToken,
        argument: &str,
        content: &str,
    ) -> Result<String> {
        if argument.is_empty() {
            return Err(Error::config("action names no tool"));
        }
        let tool = self
            .tools
            .get(argument)
            .ok_or_else(|| Error::UnknownTool(argument.to_string()))?;
        Ok(tool.work(cancel, argument, content).await?)
    }
}

impl std::fmt::Debug for Toolbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolbox")
            .field("tools", &self.tools().iter().map(|t| t.name()).collect::<Vec<_>>())
            .finish()
    }
}
