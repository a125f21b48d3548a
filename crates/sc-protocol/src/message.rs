//! Wire events and per-turn stream items.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Graph node that produced an `llm_token`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenNode {
    /// The model drafting its reply.
    Model,
    /// A tool node echoing its own output.
    Tools,
    /// Any node name this client does not know about.
    #[serde(other)]
    Other,
}

/// Arguments the model passed to a tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolInput {
    #[serde(default, deserialize_with = "lenient_string")]
    pub query: String,
}

/// Accept any JSON value where text is expected: `null` becomes empty and
/// non-string values keep their JSON rendering.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// One decoded `data:` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Event {
    /// An incremental text fragment.
    #[serde(rename = "llm_token")]
    Token {
        #[serde(default)]
        node: Option<TokenNode>,
        #[serde(default)]
        token: String,
    },

    /// The model invoked a tool.
    #[serde(rename = "tool_call")]
    ToolCall {
        tool_id: String,
        #[serde(default, deserialize_with = "lenient_string")]
        tool_name: String,
        #[serde(default)]
        tool_input: ToolInput,
    },

    /// A tool finished. `output` should be a JSON document carried as a
    /// string; anything else is kept as received and rejected by the reducer.
    #[serde(rename = "tool_output")]
    ToolOutput {
        tool_call_id: String,
        #[serde(default)]
        output: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
    },
}

impl Event {
    /// A token produced by the model node.
    pub fn model_token(token: impl Into<String>) -> Self {
        Event::Token {
            node: Some(TokenNode::Model),
            token: token.into(),
        }
    }

    pub fn tool_call(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Event::ToolCall {
            tool_id: tool_id.into(),
            tool_name: tool_name.into(),
            tool_input: ToolInput {
                query: query.into(),
            },
        }
    }

    pub fn tool_output(tool_call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Event::ToolOutput {
            tool_call_id: tool_call_id.into(),
            output: Value::String(output.into()),
            tool_name: None,
        }
    }

    /// The wire discriminant, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Token { .. } => "llm_token",
            Event::ToolCall { .. } => "tool_call",
            Event::ToolOutput { .. } => "tool_output",
        }
    }
}

/// Items produced by a backend while a turn is streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    /// A decoded wire event.
    Event(Event),

    /// The request or the byte stream failed. Nothing follows.
    Error(String),

    /// The byte stream ended normally.
    Done,
}
