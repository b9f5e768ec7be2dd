use serde_json::{json, Value};

use crate::errors::LlmError;
use crate::models::message::Message;

/// Convert messages to the openai chat message specification, with content as a block list.
pub fn messages_to_openai_spec(messages: &[Message]) -> Result<Vec<Value>, LlmError> {
    messages
        .iter()
        .map(|message| {
            let content = serde_json::to_value(&message.content).map_err(|e| {
                LlmError::UnsupportedContent(format!("Could not serialize content: {}", e))
            })?;
            Ok(json!({
                "role": message.role,
                "content": content,
            }))
        })
        .collect()
}

/// Build the `response_format` request field from a caller schema.
///
/// A bare json schema is wrapped in the `json_schema` envelope; a value whose `type` is
/// already a response format type is sent unchanged.
pub fn response_format_spec(schema: &Value) -> Value {
    let format_type = schema.get("type").and_then(Value::as_str);
    if matches!(format_type, Some("json_schema" | "json_object" | "text")) {
        return schema.clone();
    }
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "response",
            "schema": schema,
        }
    })
}
