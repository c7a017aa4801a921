// SPDX-License-Identifier: MIT

//! Ollama Model - local chat API implementation

use super::{ChunkStream, GenerationConfig, Message, Model};
use crate::adk::error::ModelError;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Chat model served by an Ollama-compatible endpoint
#[derive(Debug, Clone)]
pub struct OllamaModel {
    client: Client,
    model_name: String,
    base_url: String,
    timeout: Duration,
}

impl OllamaModel {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            model_name: model_name.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Default request timeout, used when the call config sets none
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    fn request_body(&self, messages: &[Message], config: &GenerationConfig, stream: bool) -> Value {
        let mut body = json!({
            "model": config.model.as_deref().unwrap_or(&self.model_name),
            "messages": messages,
            "stream": stream,
        });

        let mut options = serde_json::Map::new();
        if let Some(temp) = config.temperature {
            options.insert("temperature".to_string(), json!(temp));
        }
        if let Some(max_tokens) = config.max_output_tokens {
            options.insert("num_predict".to_string(), json!(max_tokens));
        }
        if !options.is_empty() {
            body["options"] = Value::Object(options);
        }

        body
    }

    async fn send(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
        stream: bool,
    ) -> Result<reqwest::Response, ModelError> {
        config.validate()?;

        let url = self.endpoint();
        let timeout = config.timeout.unwrap_or(self.timeout);
        let body = self.request_body(messages, config, stream);

        log::debug!(
            "Ollama request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let request = self.client.post(&url).json(&body);
        let sent = if stream {
            // only the wait for the response head is bounded; chunks may
            // keep arriving past the deadline
            tokio::time::timeout(timeout, request.send())
                .await
                .map_err(|_| ModelError::Timeout { after: timeout })?
        } else {
            request.timeout(timeout).send().await
        };

        let resp = match sent {
            Ok(resp) => resp,
            Err(err) => return Err(ModelError::from_reqwest(err, &url, timeout)),
        };

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(ModelError::Http { status, body: text });
        }

        Ok(resp)
    }
}

/// Pull `message.content` out of a chat response object
fn parse_message_content(value: &Value) -> Result<String, ModelError> {
    if let Some(err) = value["error"].as_str() {
        return Err(ModelError::InvalidResponse(err.to_string()));
    }
    value["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ModelError::InvalidResponse(format!("no message content in {}", value)))
}

/// Decode one NDJSON line of a streamed response
///
/// Returns the chunk text and whether the server marked the stream done.
fn parse_stream_line(line: &[u8]) -> Result<(String, bool), ModelError> {
    let value: Value = serde_json::from_slice(line)
        .map_err(|e| ModelError::InvalidResponse(format!("bad stream chunk: {}", e)))?;
    let done = value["done"].as_bool().unwrap_or(false);
    let text = if done && value["message"].is_null() {
        String::new()
    } else {
        parse_message_content(&value)?
    };
    Ok((text, done))
}

fn trim_line(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &line[start..end]
}

struct StreamState<S> {
    bytes: S,
    buffer: Vec<u8>,
    done: bool,
}

#[async_trait]
impl Model for OllamaModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn complete(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<String, ModelError> {
        let resp = self.send(messages, config, false).await?;
        let resp_json: Value = resp
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;
        log::debug!("Ollama response: {}", resp_json);

        parse_message_content(&resp_json)
    }

    async fn stream(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<ChunkStream, ModelError> {
        let resp = self.send(messages, config, true).await?;
        let url = self.endpoint();
        let timeout = config.timeout.unwrap_or(self.timeout);

        let state = StreamState {
            bytes: resp.bytes_stream().boxed(),
            buffer: Vec::new(),
            done: false,
        };

        let chunks = stream::unfold(state, move |mut state| {
            let url = url.clone();
            async move {
                loop {
                    if state.done {
                        return None;
                    }

                    if let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                        let line = trim_line(&line);
                        if line.is_empty() {
                            continue;
                        }
                        match parse_stream_line(line) {
                            Ok((text, done)) => {
                                state.done = done;
                                if text.is_empty() {
                                    continue;
                                }
                                return Some((Ok(text), state));
                            }
                            Err(err) => {
                                state.done = true;
                                return Some((Err(err), state));
                            }
                        }
                    }

                    match state.bytes.next().await {
                        Some(Ok(bytes)) => state.buffer.extend_from_slice(&bytes),
                        Some(Err(err)) => {
                            state.done = true;
                            return Some((Err(ModelError::from_reqwest(err, &url, timeout)), state));
                        }
                        None => {
                            state.done = true;
                            // trailing line without a newline
                            let rest = std::mem::take(&mut state.buffer);
                            let rest = trim_line(&rest);
                            if rest.is_empty() {
                                return None;
                            }
                            return match parse_stream_line(rest) {
                                Ok((text, _)) if text.is_empty() => None,
                                Ok((text, _)) => Some((Ok(text), state)),
                                Err(err) => Some((Err(err), state)),
                            };
                        }
                    }
                }
            }
        });

        Ok(chunks.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let model = OllamaModel::new("llama3-groq-tool-use");
        let config = GenerationConfig::default().with_temperature(0.3);
        let body = model.request_body(&[Message::user("Hello")], &config, false);

        assert_eq!(body["model"], "llama3-groq-tool-use");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Hello");
        assert!((body["options"]["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_request_body_model_override() {
        let model = OllamaModel::new("llama3-groq-tool-use");
        let config = GenerationConfig::default().with_model("deepseek-r1:8b");
        let body = model.request_body(&[], &config, true);
        assert_eq!(body["model"], "deepseek-r1:8b");
        assert_eq!(body["stream"], true);
        assert!(body.get("options").is_none());
    }

    #[test]
    fn test_parse_message_content() {
        let resp = json!({"message": {"role": "assistant", "content": "Paris"}, "done": true});
        assert_eq!(parse_message_content(&resp).unwrap(), "Paris");

        let resp = json!({"error": "model not found"});
        assert!(matches!(
            parse_message_content(&resp),
            Err(ModelError::InvalidResponse(ref m)) if m == "model not found"
        ));
    }

    #[test]
    fn test_parse_stream_line() {
        let (text, done) =
            parse_stream_line(br#"{"message":{"role":"assistant","content":"Hel"},"done":false}"#)
                .unwrap();
        assert_eq!(text, "Hel");
        assert!(!done);

        let (text, done) = parse_stream_line(br#"{"done":true}"#).unwrap();
        assert!(text.is_empty());
        assert!(done);

        assert!(parse_stream_line(b"not json").is_err());
    }

    #[test]
    fn test_trim_line() {
        assert_eq!(trim_line(b"  {}\r\n"), b"{}");
        assert!(trim_line(b" \n").is_empty());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let model = OllamaModel::new("m").with_base_url("http://ollama:11434/");
        assert_eq!(model.endpoint(), "http://ollama:11434/api/chat");
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let model = OllamaModel::new("m")
            .with_base_url("http://127.0.0.1:9")
            .with_timeout(Duration::from_secs(2));
        let err = model
            .complete(&[Message::user("hi")], &GenerationConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ModelError::Unavailable { .. } | ModelError::Timeout { .. }
        ));
    }

    #[tokio::test]
    async fn test_stream_waits_for_response_head_until_deadline() {
        // accepts the connection but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let model = OllamaModel::new("m").with_base_url(format!("http://{}", addr));
        let config = GenerationConfig::default().with_timeout(Duration::from_millis(200));
        let result = model.stream(&[Message::user("hi")], &config).await;
        assert!(matches!(result, Err(ModelError::Timeout { .. })));
        server.abort();
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_request() {
        let model = OllamaModel::new("m").with_base_url("http://127.0.0.1:9");
        let config = GenerationConfig::default().with_temperature(3.0);
        assert!(matches!(
            model.complete(&[], &config).await,
            Err(ModelError::InvalidConfig(_))
        ));
    }
}
