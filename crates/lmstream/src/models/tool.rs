use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

use crate::errors::ToolResult;

/// The primitive json types a tool parameter may be declared with.
///
/// Parsing also accepts the common annotation spellings (`str`, `int`, `float`, `bool`,
/// `list`, `dict`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumIter, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum ParamType {
    #[strum(to_string = "string", serialize = "str")]
    String,
    #[strum(to_string = "integer", serialize = "int")]
    Integer,
    #[strum(to_string = "number", serialize = "float")]
    Number,
    #[strum(to_string = "boolean", serialize = "bool")]
    Boolean,
    #[strum(to_string = "array", serialize = "list")]
    Array,
    #[strum(to_string = "object", serialize = "dict")]
    Object,
}

/// A declared parameter. The type is kept as written and checked when tools are compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolParameter {
    pub name: String,
    pub type_name: String,
}

/// Callable invoked with the parsed argument object of a tool call.
pub type ToolHandler = Arc<dyn Fn(&Map<String, Value>) -> ToolResult<Value> + Send + Sync>;

/// A locally callable tool: its name, description, ordered parameters and the function that
/// runs it. Every declared parameter is required.
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
    pub(crate) handler: ToolHandler,
}

impl Tool {
    pub fn new<N, D, F>(name: N, description: D, handler: F) -> Self
    where
        N: Into<String>,
        D: Into<String>,
        F: Fn(&Map<String, Value>) -> ToolResult<Value> + Send + Sync + 'static,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    /// Declare a parameter, e.g. `with_param("city", ParamType::String)` or
    /// `with_param("count", "int")`
    pub fn with_param<N, T>(mut self, name: N, type_name: T) -> Self
    where
        N: Into<String>,
        T: AsRef<str>,
    {
        self.parameters.push(ToolParameter {
            name: name.into(),
            type_name: type_name.as_ref().to_string(),
        });
        self
    }

    pub fn handler(&self) -> &ToolHandler {
        &self.handler
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Anything that can be offered to the model as a tool.
#[derive(Debug, Clone)]
pub enum ToolSpec {
    /// Compiled to a function schema and registered for dispatch
    Function(Tool),
    /// A ready-made wire schema, sent as-is and never dispatched locally
    Schema(Value),
}

impl From<Tool> for ToolSpec {
    fn from(tool: Tool) -> Self {
        ToolSpec::Function(tool)
    }
}

impl From<Value> for ToolSpec {
    fn from(schema: Value) -> Self {
        ToolSpec::Schema(schema)
    }
}

/// A completed tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new<I: Into<String>, N: Into<String>>(id: I, name: N, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// The value returned by a locally dispatched tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolOutput {
    pub id: String,
    pub name: String,
    pub result: Value,
}
