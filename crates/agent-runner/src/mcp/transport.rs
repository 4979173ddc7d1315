use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use reqwest::{header, Client, StatusCode};
use tracing::debug;

use super::jsonrpc::{JsonRpcId, JsonRpcRequest, JsonRpcResponse};
use crate::error::{AgentError, Result};
use crate::model::sse::SseDecoder;

const SESSION_HEADER: &str = "mcp-session-id";

/// Streamable HTTP transport for MCP (2025-03-26 revision)
///
/// Requests and notifications are POSTed to one URL. The server answers with
/// plain JSON or an SSE stream carrying the response. A session id handed out
/// on `initialize` is sent back on every later request.
pub struct StreamableHttpTransport {
    client: Client,
    url: String,
    request_id: AtomicI64,
    session_id: Mutex<Option<String>>,
}

impl StreamableHttpTransport {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json, text/event-stream"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| AgentError::mcp(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            request_id: AtomicI64::new(1),
            session_id: Mutex::new(None),
        })
    }

    fn next_id(&self) -> i64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().ok().and_then(|guard| guard.clone())
    }

    fn post(&self, body: String) -> reqwest::RequestBuilder {
        let builder = self.client.post(&self.url).body(body);
        match self.session_id() {
            Some(id) => builder.header(SESSION_HEADER, id),
            None => builder,
        }
    }

    fn remember_session(&self, response: &reqwest::Response) {
        let id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok());
        if let (Some(id), Ok(mut guard)) = (id, self.session_id.lock()) {
            *guard = Some(id.to_string());
        }
    }

    pub async fn request(&self, mut request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        let id = JsonRpcId::Number(self.next_id());
        request.id = Some(id.clone());
        debug!("MCP request {} ({:?})", request.method, id);

        let body = serde_json::to_string(&request)?;
        let response = self
            .post(body)
            .send()
            .await
            .map_err(|e| AgentError::mcp(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::mcp(format!("HTTP error {}: {}", status, text)));
        }
        self.remember_session(&response);

        let is_sse = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/event-stream"));

        let text = response
            .text()
            .await
            .map_err(|e| AgentError::mcp(format!("Failed to read response body: {}", e)))?;

        if is_sse {
            let mut decoder = SseDecoder::new();
            let mut payloads = decoder.push(text.as_bytes());
            payloads.extend(decoder.finish());
            payloads
                .iter()
                .filter_map(|data| serde_json::from_str::<JsonRpcResponse>(data).ok())
                .find(|message| message.is_response() && message.id.as_ref() == Some(&id))
                .ok_or_else(|| AgentError::mcp("No JSON-RPC response in SSE stream"))
        } else {
            serde_json::from_str(&text).map_err(|e| {
                AgentError::mcp(format!("Failed to parse response: {}, body: {}", e, text))
            })
        }
    }

    pub async fn notify(&self, notification: JsonRpcRequest) -> Result<()> {
        let body = serde_json::to_string(&notification)?;
        let response = self
            .post(body)
            .send()
            .await
            .map_err(|e| AgentError::mcp(format!("HTTP notification failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::mcp(format!(
                "HTTP notification error {}: {}",
                status, text
            )));
        }
        Ok(())
    }

    /// End the server-side session, if one was opened
    pub async fn close(&self) -> Result<()> {
        let Some(id) = self.session_id.lock().ok().and_then(|mut guard| guard.take()) else {
            return Ok(());
        };

        let response = self
            .client
            .delete(&self.url)
            .header(SESSION_HEADER, id)
            .send()
            .await
            .map_err(|e| AgentError::mcp(format!("Failed to close session: {}", e)))?;

        // Servers may refuse client-initiated termination.
        if response.status().is_success() || response.status() == StatusCode::METHOD_NOT_ALLOWED {
            Ok(())
        } else {
            Err(AgentError::mcp(format!(
                "Session close returned {}",
                response.status()
            )))
        }
    }
}
