//! Shared HTTP client and SSE line splitting.

use std::sync::OnceLock;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};

use crate::error::{ParleyError, Result};

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
///
/// Only connection setup is bounded; streamed replies have no deadline.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    })
}

/// Default headers for a Bearer-token streaming API.
pub fn bearer_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
    if !api_key.is_empty() {
        if let Ok(val) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
            headers.insert(AUTHORIZATION, val);
        }
    }
    headers
}

/// Split a streamed body into trimmed, non-empty lines.
///
/// A trailing line without a newline is yielded when the body ends.
pub fn sse_lines(response: reqwest::Response) -> BoxStream<'static, Result<String>> {
    split_lines(response.bytes_stream())
}

/// Lines are cut on raw bytes so a character split across chunks is decoded whole.
fn split_lines<S, B>(chunks: S) -> BoxStream<'static, Result<String>>
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut buffer: Vec<u8> = Vec::new();
        futures::pin_mut!(chunks);

        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    yield Err(ParleyError::Network(err));
                    return;
                }
            };
            buffer.extend_from_slice(chunk.as_ref());

            while let Some(line_end) = buffer.iter().position(|byte| *byte == b'\n') {
                let line: Vec<u8> = buffer.drain(..=line_end).collect();
                let line = String::from_utf8_lossy(&line).trim().to_string();
                if !line.is_empty() {
                    yield Ok(line);
                }
            }
        }

        let rest = String::from_utf8_lossy(&buffer).trim().to_string();
        if !rest.is_empty() {
            yield Ok(rest);
        }
    };
    Box::pin(stream)
}
