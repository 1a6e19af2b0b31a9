//! Ollama `/api/generate` streaming client.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::io::config::NutConfig;
use crate::io::provider::{FragmentStream, ModelProvider, ModelRequest};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_ctx: u32,
}

/// One line of the newline-delimited JSON reply.
#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

/// Provider backed by a local or remote Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: reqwest::Client,
    generate_url: String,
    num_ctx: u32,
}

impl OllamaProvider {
    pub fn new(config: &NutConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .read_timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            generate_url: format!("{}/api/generate", config.ollama_url.trim_end_matches('/')),
            num_ctx: config.num_ctx,
        })
    }
}

impl ModelProvider for OllamaProvider {
    #[instrument(skip_all, fields(model = %request.model, url = %self.generate_url))]
    fn stream(&self, request: &ModelRequest) -> FragmentStream {
        let client = self.client.clone();
        let url = self.generate_url.clone();
        let body = serde_json::to_vec(&GenerateRequest {
            model: &request.model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            stream: true,
            options: GenerateOptions {
                num_ctx: self.num_ctx,
            },
        });

        Box::pin(generate(client, url, body))
    }
}

fn generate(
    client: reqwest::Client,
    url: String,
    body: serde_json::Result<Vec<u8>>,
) -> impl Stream<Item = Result<String>> + Send + 'static {
    async_stream::try_stream! {
        let body = body.context("serialize generate request")?;
        debug!(bytes = body.len(), "posting generate request");
        let response = client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            Err::<(), _>(status_error(status, &detail))?;
            return;
        }

        let mut chunks = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.context("read ollama response body")?;
            pending.extend_from_slice(&chunk);
            while let Some(newline) = pending.iter().position(|byte| *byte == b'\n') {
                let line: Vec<u8> = pending.drain(..=newline).collect();
                if let Some(fragment) = decode_line(&line)? {
                    yield fragment;
                }
            }
        }
        if let Some(fragment) = decode_line(&pending)? {
            yield fragment;
        }
    }
}

/// Error for a non-success reply. Ollama puts the reason in an `error` field;
/// other bodies are flattened onto one line.
fn status_error(status: reqwest::StatusCode, body: &str) -> anyhow::Error {
    let detail = serde_json::from_str::<GenerateChunk>(body)
        .ok()
        .and_then(|chunk| chunk.error)
        .unwrap_or_else(|| body.split_whitespace().collect::<Vec<_>>().join(" "));
    anyhow!("ollama returned {status}: {detail}")
}

/// Decode one reply line into a fragment. Blank lines and empty deltas yield `None`.
///
/// Lines are split on raw bytes before decoding, so a multi-byte character cut
/// across network chunks is reassembled before it reaches the JSON parser.
fn decode_line(line: &[u8]) -> Result<Option<String>> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let chunk: GenerateChunk =
        serde_json::from_slice(line).context("parse ollama response line")?;
    if let Some(error) = chunk.error {
        return Err(anyhow!("ollama error: {error}"));
    }
    if chunk.done {
        debug!("ollama stream done");
    }
    Ok((!chunk.response.is_empty()).then_some(chunk.response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_response_deltas() {
        let line = br#"{"model":"llama3.1","response":"fn main","done":false}"#;
        assert_eq!(decode_line(line).expect("decode").as_deref(), Some("fn main"));
    }

    #[test]
    fn final_chunk_without_text_is_skipped() {
        let line = br#"{"model":"llama3.1","response":"","done":true,"eval_count":12}"#;
        assert_eq!(decode_line(line).expect("decode"), None);
        assert_eq!(decode_line(b"  \n").expect("blank"), None);
    }

    #[test]
    fn error_lines_fail_the_stream() {
        let err = decode_line(br#"{"error":"model 'nope' not found"}"#).unwrap_err();
        assert!(err.to_string().contains("model 'nope' not found"));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = decode_line(b"<html>").unwrap_err();
        assert!(err.to_string().contains("parse ollama response line"));
    }

    #[test]
    fn status_error_prefers_the_error_field() {
        let err = status_error(
            reqwest::StatusCode::NOT_FOUND,
            r#"{"error":"model 'nope' not found, try pulling it first"}"#,
        );
        assert_eq!(
            err.to_string(),
            "ollama returned 404 Not Found: model 'nope' not found, try pulling it first"
        );
    }

    #[test]
    fn status_error_flattens_other_bodies() {
        let err = status_error(
            reqwest::StatusCode::BAD_GATEWAY,
            "<html>\n  <h1>Bad Gateway</h1>\n</html>\n",
        );
        assert_eq!(
            err.to_string(),
            "ollama returned 502 Bad Gateway: <html> <h1>Bad Gateway</h1> </html>"
        );
        assert!(!err.to_string().contains('\n'));
    }

    #[test]
    fn request_body_skips_missing_system() {
        let body = serde_json::to_value(GenerateRequest {
            model: "llama3.1",
            prompt: "hi",
            system: None,
            stream: true,
            options: GenerateOptions { num_ctx: 32_768 },
        })
        .expect("serialize");
        assert_eq!(
            body,
            serde_json::json!({
                "model": "llama3.1",
                "prompt": "hi",
                "stream": true,
                "options": { "num_ctx": 32768 }
            })
        );
    }

    #[test]
    fn builds_generate_url_from_config() {
        let config = NutConfig {
            ollama_url: "http://gpu-box:11434/".to_string(),
            ..NutConfig::default()
        };
        let provider = OllamaProvider::new(&config).expect("provider");
        assert_eq!(provider.generate_url, "http://gpu-box:11434/api/generate");
    }
}
