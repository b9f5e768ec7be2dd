use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::errors::ConfigurationError;
use crate::models::tool::{ParamType, Tool, ToolHandler, ToolSpec};

/// A tool that can be invoked locally when the model calls it.
#[derive(Clone)]
pub struct RegisteredTool {
    pub parameters: Vec<String>,
    pub handler: ToolHandler,
}

impl fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Maps function names to the tools that can run them.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Wire schemas for the request, plus the registry used to dispatch the resulting calls.
#[derive(Debug, Clone, Default)]
pub struct CompiledTools {
    pub schemas: Vec<Value>,
    pub registry: ToolRegistry,
}

/// Convert the tool list of a request into openai function schemas.
///
/// Function tools are compiled and registered; prebuilt schemas are copied unchanged and
/// left out of the registry so their calls always reach the caller.
pub fn compile_tools(tools: &[ToolSpec]) -> Result<CompiledTools, ConfigurationError> {
    let mut tool_names = HashSet::new();
    let mut compiled = CompiledTools::default();

    for spec in tools {
        match spec {
            ToolSpec::Function(tool) => {
                if !tool_names.insert(tool.name.clone()) {
                    return Err(ConfigurationError::DuplicateTool(tool.name.clone()));
                }
                compiled.schemas.push(tool_to_schema(tool)?);
                compiled.registry.tools.insert(
                    tool.name.clone(),
                    RegisteredTool {
                        parameters: tool.parameters.iter().map(|p| p.name.clone()).collect(),
                        handler: tool.handler.clone(),
                    },
                );
            }
            ToolSpec::Schema(schema) => {
                if let Some(name) = schema_name(schema) {
                    if !tool_names.insert(name.to_string()) {
                        return Err(ConfigurationError::DuplicateTool(name.to_string()));
                    }
                }
                compiled.schemas.push(schema.clone());
            }
        }
    }

    Ok(compiled)
}

fn tool_to_schema(tool: &Tool) -> Result<Value, ConfigurationError> {
    let description = tool.description.trim();
    if description.is_empty() {
        return Err(ConfigurationError::MissingToolDescription {
            tool: tool.name.clone(),
        });
    }

    let mut properties = Map::new();
    for param in &tool.parameters {
        let param_type = ParamType::from_str(param.type_name.trim()).map_err(|_| {
            ConfigurationError::UnsupportedParameterType {
                tool: tool.name.clone(),
                param: param.name.clone(),
                type_name: param.type_name.clone(),
            }
        })?;
        properties.insert(param.name.clone(), json!({ "type": param_type.as_ref() }));
    }

    // Optional parameters are not supported: everything declared is required.
    let required: Vec<&str> = tool.parameters.iter().map(|p| p.name.as_str()).collect();

    Ok(json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            }
        }
    }))
}

fn schema_name(schema: &Value) -> Option<&str> {
    schema
        .pointer("/function/name")
        .or_else(|| schema.get("name"))
        .and_then(Value::as_str)
}
