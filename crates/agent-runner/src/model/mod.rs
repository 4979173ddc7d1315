//! Chat model abstraction
//!
//! The agent loop talks to models through [`ChatModel`]; message types follow
//! the Gemini content/part layout since that is the only provider wired in.

mod gemini;
pub(crate) mod sse;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use dsa_core::model::ModelId;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub use gemini::{sanitize_schema, GeminiClient, GeminiProvider, DEFAULT_GEMINI_BASE_URL};

/// Author of a content block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[default]
    Model,
}

/// A function call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// The result of a function call, sent back to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: Value,
}

/// One part of a content block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Marks `text` as model thinking rather than answer content
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub thought: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn function_response(call: &FunctionCall, result: &str) -> Self {
        Self {
            function_response: Some(FunctionResponse {
                id: call.id.clone(),
                name: call.name.clone(),
                response: serde_json::json!({ "result": result }),
            }),
            ..Default::default()
        }
    }
}

/// A block of conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::text(text)],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::text(text)],
        }
    }
}

/// A tool the model may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub parameters: Value,
}

/// Input for one model turn
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub system_instruction: Option<String>,
    pub contents: Vec<Content>,
    pub tools: Vec<FunctionDeclaration>,
    /// Ask for a JSON document instead of prose
    pub json_output: bool,
}

/// A streamed slice of a model turn
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelChunk {
    pub parts: Vec<Part>,
    pub finish_reason: Option<String>,
}

/// A complete, non-streamed model turn
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelTurn {
    pub text: String,
    pub function_calls: Vec<FunctionCall>,
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ModelChunk>> + Send>>;

/// A chat model the agent can drive
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, e.g. `gemini-2.5-flash`
    fn id(&self) -> &str;

    /// Provider name, e.g. `Google`
    fn provider(&self) -> &str;

    /// Stream one model turn
    async fn stream(&self, request: GenerateRequest) -> Result<ChunkStream>;

    /// Run one model turn to completion
    async fn generate(&self, request: GenerateRequest) -> Result<ModelTurn> {
        let mut stream = self.stream(request).await?;
        let mut turn = ModelTurn::default();
        while let Some(chunk) = stream.next().await {
            for part in chunk?.parts {
                if let Some(call) = part.function_call {
                    turn.function_calls.push(call);
                } else if let (Some(text), false) = (part.text, part.thought) {
                    turn.text.push_str(&text);
                }
            }
        }
        Ok(turn)
    }
}

/// Creates chat models for a run
pub trait ModelProvider: Send + Sync {
    fn create(&self, model: ModelId, api_key: &str) -> Result<Arc<dyn ChatModel>>;
}
