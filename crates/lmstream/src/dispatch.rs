use serde_json::{json, Value};

use crate::errors::{ToolError, ToolResult};
use crate::models::tool::{ToolCall, ToolOutput};
use crate::tool_schema::{RegisteredTool, ToolRegistry};

/// Result of running the finalized tool calls of a stream against the registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchOutcome {
    /// Values returned by local tools, in call order
    pub results: Vec<ToolOutput>,
    /// Calls with no local tool, left for the caller
    pub pending: Vec<ToolCall>,
}

/// Runs tool calls whose name matches a registered tool.
///
/// A tool that fails is dropped: it is logged, but neither retried nor reported as pending.
/// `surface_errors` reports the failure as a result carrying `{"error": ...}` instead.
pub struct ToolDispatcher<'a> {
    registry: &'a ToolRegistry,
    surface_errors: bool,
}

impl<'a> ToolDispatcher<'a> {
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self {
            registry,
            surface_errors: false,
        }
    }

    pub fn surface_errors(mut self, surface_errors: bool) -> Self {
        self.surface_errors = surface_errors;
        self
    }

    pub fn dispatch(&self, calls: Vec<ToolCall>) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        for call in calls {
            let Some(tool) = self.registry.get(&call.name) else {
                outcome.pending.push(call);
                continue;
            };

            match invoke(tool, &call) {
                Ok(result) => outcome.results.push(ToolOutput {
                    id: call.id,
                    name: call.name,
                    result,
                }),
                Err(e) => {
                    tracing::error!("Tool '{}' (call {}) failed: {}", call.name, call.id, e);
                    if self.surface_errors {
                        outcome.results.push(ToolOutput {
                            id: call.id,
                            name: call.name,
                            result: json!({ "error": e.to_string() }),
                        });
                    }
                }
            }
        }

        outcome
    }
}

/// Call the tool with the argument object, which must name exactly the declared parameters.
fn invoke(tool: &RegisteredTool, call: &ToolCall) -> ToolResult<Value> {
    let arguments = call.arguments.as_object().ok_or_else(|| {
        ToolError::InvalidParameters(format!(
            "arguments for '{}' must be a json object, got {}",
            call.name, call.arguments
        ))
    })?;

    if let Some(missing) = tool
        .parameters
        .iter()
        .find(|param| !arguments.contains_key(param.as_str()))
    {
        return Err(ToolError::InvalidParameters(format!(
            "missing argument '{}'",
            missing
        )));
    }
    if let Some(unexpected) = arguments.keys().find(|key| !tool.parameters.contains(key)) {
        return Err(ToolError::InvalidParameters(format!(
            "unexpected argument '{}'",
            unexpected
        )));
    }

    (tool.handler)(arguments)
}
