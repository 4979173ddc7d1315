//! Google Gemini client
//!
//! Streams `streamGenerateContent?alt=sse` responses into [`ModelChunk`]s.

use std::sync::Arc;

use async_trait::async_trait;
use dsa_core::model::ModelId;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use super::sse::SseDecoder;
use super::{
    ChatModel, ChunkStream, Content, FunctionDeclaration, GenerateRequest, ModelChunk,
    ModelProvider, ModelTurn, Part,
};
use crate::error::{AgentError, Result};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDeclarations>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclarations {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    include_thoughts: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

impl GenerateContentResponse {
    fn into_chunk(self) -> Result<ModelChunk> {
        if let Some(error) = self.error {
            return Err(AgentError::model(error.message));
        }
        let mut chunk = ModelChunk::default();
        if let Some(candidate) = self.candidates.into_iter().next() {
            if let Some(content) = candidate.content {
                chunk.parts = content.parts;
            }
            chunk.finish_reason = candidate.finish_reason;
        }
        Ok(chunk)
    }
}

/// Remove schema keywords the Gemini function-declaration dialect rejects
pub fn sanitize_schema(schema: &mut Value) {
    match schema {
        Value::Object(map) => {
            map.remove("$schema");
            map.remove("additionalProperties");
            for value in map.values_mut() {
                sanitize_schema(value);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(sanitize_schema),
        _ => {}
    }
}

/// Client for one Gemini model
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: ModelId,
}

impl GeminiClient {
    pub fn new(model: ModelId, api_key: impl Into<String>) -> Self {
        Self::with_base_url(model, api_key, DEFAULT_GEMINI_BASE_URL)
    }

    pub fn with_base_url(
        model: ModelId,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model,
        }
    }

    fn body<'a>(&self, request: &'a GenerateRequest) -> GenerateContentRequest<'a> {
        let tools = if request.tools.is_empty() {
            Vec::new()
        } else {
            let function_declarations = request
                .tools
                .iter()
                .cloned()
                .map(|mut decl| {
                    sanitize_schema(&mut decl.parameters);
                    decl
                })
                .collect();
            vec![ToolDeclarations {
                function_declarations,
            }]
        };

        GenerateContentRequest {
            contents: &request.contents,
            system_instruction: request.system_instruction.as_ref().map(|text| {
                SystemInstruction {
                    parts: vec![Part::text(text.clone())],
                }
            }),
            tools,
            generation_config: if request.json_output {
                GenerationConfig {
                    thinking_config: None,
                    response_mime_type: Some("application/json"),
                }
            } else {
                GenerationConfig {
                    thinking_config: Some(ThinkingConfig {
                        include_thoughts: true,
                    }),
                    response_mime_type: None,
                }
            },
        }
    }

    async fn post(&self, method: &str, query: &str, request: &GenerateRequest) -> Result<reqwest::Response> {
        let url = format!(
            "{}/models/{}:{}{}",
            self.base_url,
            self.model.as_str(),
            method,
            query
        );
        debug!("POST {} ({} contents)", url, request.contents.len());

        let res = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| AgentError::model(format!("Failed to reach model API: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let error_text = res.text().await.unwrap_or_default();
            return Err(AgentError::model(format!("HTTP {}: {}", status, error_text)));
        }
        Ok(res)
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    fn id(&self) -> &str {
        self.model.as_str()
    }

    fn provider(&self) -> &str {
        self.model.provider()
    }

    async fn stream(&self, request: GenerateRequest) -> Result<ChunkStream> {
        let res = self
            .post("streamGenerateContent", "?alt=sse", &request)
            .await?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut stream = res.bytes_stream();
            let mut decoder = SseDecoder::new();

            while let Some(item) = stream.next().await {
                let chunk: bytes::Bytes = match item {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx
                            .send(Err(AgentError::model(format!("Stream error: {}", e))))
                            .await;
                        return;
                    }
                };
                for data in decoder.push(&chunk) {
                    if !forward(&tx, &data).await {
                        return;
                    }
                }
            }
            if let Some(data) = decoder.finish() {
                forward(&tx, &data).await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn generate(&self, request: GenerateRequest) -> Result<ModelTurn> {
        let res = self.post("generateContent", "", &request).await?;
        let body: GenerateContentResponse = res
            .json()
            .await
            .map_err(|e| AgentError::model(format!("Invalid model response: {}", e)))?;

        let mut turn = ModelTurn::default();
        for part in body.into_chunk()?.parts {
            if let Some(call) = part.function_call {
                turn.function_calls.push(call);
            } else if let (Some(text), false) = (part.text, part.thought) {
                turn.text.push_str(&text);
            }
        }
        Ok(turn)
    }
}

/// Parse one SSE payload and send it on; `false` once the receiver is gone
async fn forward(tx: &mpsc::Sender<Result<ModelChunk>>, data: &str) -> bool {
    let item = match serde_json::from_str::<GenerateContentResponse>(data) {
        Ok(response) => response.into_chunk(),
        Err(e) => {
            warn!("Skipping malformed model frame: {}", e);
            return true;
        }
    };
    tx.send(item).await.is_ok()
}

/// Creates [`GeminiClient`]s
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    base_url: String,
}

impl GeminiProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Default for GeminiProvider {
    fn default() -> Self {
        Self::new(DEFAULT_GEMINI_BASE_URL)
    }
}

impl ModelProvider for GeminiProvider {
    fn create(&self, model: ModelId, api_key: &str) -> Result<Arc<dyn ChatModel>> {
        if api_key.trim().is_empty() {
            return Err(AgentError::Config("Gemini API key is required".to_string()));
        }
        Ok(Arc::new(GeminiClient::with_base_url(
            model,
            api_key,
            self.base_url.clone(),
        )))
    }
}
