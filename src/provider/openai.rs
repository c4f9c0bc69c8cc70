//! OpenAI-compatible Chat Completions backend.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::ParleyConfig;
use crate::error::{ParleyError, Result};
use crate::types::Options;

use super::http::{bearer_headers, shared_client, sse_lines};
use super::{ChatBackend, FrameControl, OnFrame};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub struct OpenAiBackend {
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiBackend {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn from_config(config: &ParleyConfig) -> Result<Self> {
        let api_key = config.openai_api_key.clone().ok_or_else(|| {
            ParleyError::Configuration("OPENAI_API_KEY is not set".to_string())
        })?;
        Ok(Self::new(api_key, config.openai_base_url.clone()))
    }

    /// Model used when the request options carry no `model`.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn build_request_body(&self, messages: &[Value], options: &Options) -> Value {
        let mut body = Map::new();
        body.insert("model".into(), Value::String(self.model.clone()));
        for (key, value) in options {
            body.insert(key.clone(), value.clone());
        }
        body.insert("messages".into(), Value::Array(messages.to_vec()));
        body.insert("stream".into(), Value::Bool(true));
        Value::Object(body)
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(
        &self,
        messages: &[Value],
        options: &Options,
        on_frame: &mut OnFrame<'_>,
    ) -> Result<()> {
        let body = self.build_request_body(messages, options);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(url = %url, messages = messages.len(), "OpenAI chat stream");

        let resp = shared_client()
            .post(&url)
            .headers(bearer_headers(&self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await?;
            debug!(status = status.as_u16(), "OpenAI error response");
            on_frame(text.as_bytes());
            return Ok(());
        }

        let mut lines = sse_lines(resp);
        while let Some(line) = lines.next().await {
            if on_frame(line?.as_bytes()) == FrameControl::Stop {
                break;
            }
        }
        Ok(())
    }
}
