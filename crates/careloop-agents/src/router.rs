use careloop_common::{Error, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::tools::{
    SaveDizziness, SaveGlucose, SaveInsulin, SaveSleep, SaveStress, Tool, ToolContext, ToolDeps,
    ToolOutput, UpdateDizziness, UpdateGlucose, UpdateInsulin, UpdateSleep, UpdateStress,
};

/// Tool metadata in the shape conversational providers expect.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Dispatches tool invocations from the conversational layer to the
/// registered measurement tools.
pub struct ToolRouter {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRouter {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// A router carrying the full measurement tool set.
    pub fn with_default_tools(deps: ToolDeps) -> Self {
        let mut router = Self::new();
        router.register_tool(Box::new(SaveGlucose::new(deps.clone())));
        router.register_tool(Box::new(UpdateGlucose::new(deps.clone())));
        router.register_tool(Box::new(SaveInsulin::new(deps.clone())));
        router.register_tool(Box::new(UpdateInsulin::new(deps.clone())));
        router.register_tool(Box::new(SaveSleep::new(deps.clone())));
        router.register_tool(Box::new(UpdateSleep::new(deps.clone())));
        router.register_tool(Box::new(SaveStress::new(deps.clone())));
        router.register_tool(Box::new(UpdateStress::new(deps.clone())));
        router.register_tool(Box::new(SaveDizziness::new(deps.clone())));
        router.register_tool(Box::new(UpdateDizziness::new(deps)));
        router
    }

    pub fn register_tool(&mut self, tool: Box<dyn Tool>) {
        info!("registered tool: {}", tool.name());
        self.tools.push(tool);
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    fn find_tool(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Execute a named tool. Unknown names are a hard error; validation
    /// failures inside a tool surface as `Error::Validation` for the
    /// conversational layer to relay back to the model.
    pub async fn dispatch(
        &self,
        name: &str,
        context: &ToolContext,
        args: serde_json::Value,
    ) -> Result<ToolOutput> {
        let Some(tool) = self.find_tool(name) else {
            warn!(tool = name, "unknown tool requested");
            return Err(Error::Agent(format!("unknown tool: '{name}'")));
        };
        tool.execute(context, args).await
    }
}

impl Default for ToolRouter {
    fn default() -> Self {
        Self::new()
    }
}
