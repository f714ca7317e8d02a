pub mod models;
pub mod providers;

use crate::config::LlmConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::error::Error;
use std::fmt;
use tracing::{debug, warn};

use models::{AiResponse, Translation};

#[derive(Debug)]
pub enum LlmError {
    ConnectionError(String),
    ResponseError(String),
    ConfigError(String),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::ConnectionError(msg) => write!(f, "LLM connection error: {}", msg),
            LlmError::ResponseError(msg) => write!(f, "LLM response error: {}", msg),
            LlmError::ConfigError(msg) => write!(f, "LLM configuration error: {}", msg),
        }
    }
}

impl Error for LlmError {}

/// What one completion round trip produced: free text, or a refusal from
/// the provider's safety layer.
#[derive(Debug)]
pub enum ProviderReply {
    Text(String),
    Blocked { reason: String },
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<ProviderReply, LlmError>;
}

pub struct LlmManager {
    provider: Box<dyn CompletionProvider + Send + Sync>,
    model: String,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let provider: Box<dyn CompletionProvider + Send + Sync> = match config.backend.as_str() {
            "gemini" => Box::new(providers::gemini::GeminiProvider::new(config)?),
            "remote" => Box::new(providers::remote::RemoteProvider::new(config)?),
            _ => {
                return Err(LlmError::ConfigError(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )));
            }
        };

        Ok(Self {
            provider,
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Translates a user question plus schema text into a structured
    /// AiResponse. Single round trip, no retries; transport failures
    /// propagate, refusals and garbage replies are folded into the
    /// Translation sum type.
    pub async fn translate(
        &self,
        question: &str,
        schema: &str,
    ) -> Result<Translation, LlmError> {
        let prompt = compose_prompt(question, schema);

        match self.provider.complete(&prompt).await? {
            ProviderReply::Blocked { reason } => {
                warn!("Provider blocked the prompt: {}", reason);
                Ok(Translation::Blocked { reason })
            }
            ProviderReply::Text(raw) => {
                debug!("Raw model reply ({} bytes)", raw.len());
                Ok(parse_reply(&raw))
            }
        }
    }

    /// One-shot liveness probe used by the AI health endpoint.
    pub async fn ping(&self) -> Result<bool, LlmError> {
        match self.provider.complete("ping").await? {
            ProviderReply::Text(text) => Ok(!text.trim().is_empty()),
            ProviderReply::Blocked { .. } => Ok(false),
        }
    }
}

fn compose_prompt(question: &str, schema: &str) -> String {
    format!(
        r#"You translate a business user's question into a single SQL query for PostgreSQL, and decide how the result should be visualized.

The database has the following schema. Use only these tables and columns:
{schema}

Rules:
- Generate SELECT statements only. Never use INSERT, UPDATE, DELETE, DROP, ALTER or CREATE.
- Pick exactly one visualization_type from: bar, pie, line, table, report, text, single_value.
- If the question asks for a downloadable file, use visualization_type "report" and set report_type to one of: csv, pdf, xlsx.
- If the question is conversational and needs no data, set sql_query to null and visualization_type to "text".

Answer with a short natural-language message for the user, followed by exactly one fenced JSON object:
```json
{{
  "message": "<short answer for the user>",
  "sql_query": "<SQL or null>",
  "visualization_type": "<one of the listed kinds or null>",
  "report_type": "<csv|pdf|xlsx, only when visualization_type is report>",
  "x_axis": "<column for the X axis, or null>",
  "y_axis": "<column for the Y axis, or null>",
  "label": "<label column for a pie chart, or null>",
  "value": "<value column for a pie chart, or null>"
}}
```

User question: '{question}'"#
    )
}

// Wire shape is forgiving about the message, strict about everything
// else; unknown visualization kinds are a typing violation.
#[derive(Debug, Deserialize)]
struct AiResponseWire {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    sql_query: Option<String>,
    #[serde(default)]
    visualization_type: Option<models::VisualizationType>,
    #[serde(default)]
    report_type: Option<String>,
    #[serde(default)]
    x_axis: Option<String>,
    #[serde(default)]
    y_axis: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

/// Splits a model reply into leading prose and the first fenced JSON
/// object, then decodes the JSON strictly. A reply with no usable JSON
/// becomes Malformed carrying the whole text as the message.
fn parse_reply(raw: &str) -> Translation {
    let (prefix, json_text) = match extract_fenced_json(raw) {
        Some(parts) => parts,
        None => {
            // Some models skip the fence and reply with bare JSON
            let trimmed = raw.trim();
            if trimmed.starts_with('{') {
                ("", trimmed)
            } else {
                return Translation::Malformed {
                    message: raw.trim().to_string(),
                    reason: "no JSON object found in reply".to_string(),
                };
            }
        }
    };

    let wire: AiResponseWire = match serde_json::from_str(json_text) {
        Ok(wire) => wire,
        Err(e) => {
            return Translation::Malformed {
                message: prefix.trim().to_string(),
                reason: format!("JSON decode failed: {}", e),
            };
        }
    };

    // Prose before the fence wins over the JSON's own message field
    let message = {
        let prefix = prefix.trim();
        if !prefix.is_empty() {
            prefix.to_string()
        } else {
            wire.message.unwrap_or_default()
        }
    };

    let sql_query = wire.sql_query.filter(|s| !s.trim().is_empty());

    Translation::Answered(
        AiResponse {
            message,
            sql_query,
            visualization_type: wire.visualization_type,
            report_type: wire.report_type,
            x_axis: wire.x_axis,
            y_axis: wire.y_axis,
            label: wire.label,
            value: wire.value,
        }
        .normalized(),
    )
}

/// Returns (text before the first fence, JSON inside it).
fn extract_fenced_json(raw: &str) -> Option<(&str, &str)> {
    let (fence, fence_len) = if let Some(idx) = raw.find("```json") {
        (idx, "```json".len())
    } else if let Some(idx) = raw.find("```") {
        (idx, "```".len())
    } else {
        return None;
    };

    let after = &raw[fence + fence_len..];
    let close = after.find("```")?;
    Some((&raw[..fence], after[..close].trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::models::VisualizationType;

    #[test]
    fn fenced_json_with_leading_prose_parses() {
        let raw = "Here are last month's sales.\n```json\n{\"sql_query\": \"SELECT 1\", \"visualization_type\": \"table\"}\n```";
        match parse_reply(raw) {
            Translation::Answered(r) => {
                assert_eq!(r.message, "Here are last month's sales.");
                assert_eq!(r.sql_query.as_deref(), Some("SELECT 1"));
                assert_eq!(r.visualization_type, Some(VisualizationType::Table));
            }
            other => panic!("expected Answered, got {:?}", other),
        }
    }

    #[test]
    fn json_message_is_used_when_no_prose_precedes_the_fence() {
        let raw = "```json\n{\"message\": \"All set\", \"sql_query\": \"SELECT 1\"}\n```";
        match parse_reply(raw) {
            Translation::Answered(r) => assert_eq!(r.message, "All set"),
            other => panic!("expected Answered, got {:?}", other),
        }
    }

    #[test]
    fn bare_json_without_fence_still_parses() {
        let raw = "{\"message\": \"ok\", \"sql_query\": \"SELECT 1\", \"visualization_type\": \"bar\", \"x_axis\": \"month\", \"y_axis\": \"total\"}";
        match parse_reply(raw) {
            Translation::Answered(r) => {
                assert_eq!(r.visualization_type, Some(VisualizationType::Bar));
                assert_eq!(r.x_axis.as_deref(), Some("month"));
            }
            other => panic!("expected Answered, got {:?}", other),
        }
    }

    #[test]
    fn plain_prose_reply_is_malformed_with_the_prose_as_message() {
        match parse_reply("Oi, tudo bem? Como posso ajudar?") {
            Translation::Malformed { message, .. } => {
                assert!(message.starts_with("Oi, tudo bem?"));
            }
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn bad_field_typing_is_malformed_not_coerced() {
        let raw = "```json\n{\"sql_query\": \"SELECT 1\", \"visualization_type\": \"hologram\"}\n```";
        match parse_reply(raw) {
            Translation::Malformed { reason, .. } => {
                assert!(reason.contains("JSON decode failed"));
            }
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn null_sql_answer_normalizes_to_text() {
        let raw = "```json\n{\"message\": \"Hello!\", \"sql_query\": null, \"visualization_type\": \"bar\", \"x_axis\": \"m\"}\n```";
        match parse_reply(raw) {
            Translation::Answered(r) => {
                assert!(r.sql_query.is_none());
                assert_eq!(r.visualization_type, Some(VisualizationType::Text));
                assert!(r.x_axis.is_none());
            }
            other => panic!("expected Answered, got {:?}", other),
        }
    }

    #[test]
    fn empty_sql_string_counts_as_no_query() {
        let raw = "```json\n{\"message\": \"Hi\", \"sql_query\": \"  \"}\n```";
        match parse_reply(raw) {
            Translation::Answered(r) => assert!(r.sql_query.is_none()),
            other => panic!("expected Answered, got {:?}", other),
        }
    }

    #[test]
    fn prompt_carries_schema_and_question() {
        let prompt = compose_prompt("total sales?", "Table: sales\n  - id: INTEGER\n");
        assert!(prompt.contains("Table: sales"));
        assert!(prompt.contains("total sales?"));
        assert!(prompt.contains("SELECT statements only"));
    }
}
