//! Thin wrapper over the genai client shared by the model-backed analyzer
//! and executor.

use std::time::Duration;

use futures::StreamExt;
use genai::Client;
use genai::chat::{ChatOptions, ChatRequest, ChatStreamEvent};

/// Model endpoint settings.
#[derive(Clone, Debug)]
pub struct LlmSettings {
    /// Model name; non-prefixed names resolve to Ollama.
    pub model: String,
    pub temperature: f64,
    /// Base URL probed by [`probe_endpoint`].
    pub base_url: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "llama3.2".to_string(),
            temperature: 0.1,
            base_url: "http://localhost:11434/".to_string(),
        }
    }
}

/// Stream a chat completion and return the full reply text.
pub async fn complete(
    client: &Client,
    settings: &LlmSettings,
    request: ChatRequest,
) -> Result<String, String> {
    let options = ChatOptions::default()
        .with_temperature(settings.temperature)
        .with_capture_content(true);

    let stream_res = client
        .exec_chat_stream(&settings.model, request, Some(&options))
        .await
        .map_err(|e| format!("LLM stream error: {e}"))?;

    let mut stream = stream_res.stream;
    let mut streamed = String::new();
    let mut captured: Option<String> = None;

    while let Some(event) = stream.next().await {
        match event {
            Ok(ChatStreamEvent::Chunk(chunk)) => streamed.push_str(&chunk.content),
            Ok(ChatStreamEvent::End(end)) => {
                if let Some(text) = end.captured_first_text() {
                    captured = Some(text.to_string());
                }
            }
            Ok(_) => {}
            Err(e) => return Err(format!("LLM stream error: {e}")),
        }
    }

    Ok(captured.unwrap_or(streamed))
}

/// Check that the model endpoint answers at all.
pub async fn probe_endpoint(base_url: &str) -> bool {
    let http = reqwest::Client::new();
    match http
        .get(base_url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(e) => {
            tracing::debug!(url = %base_url, error = %e, "Model endpoint unreachable");
            false
        }
    }
}
