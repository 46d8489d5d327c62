// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The fixed tool set: code interpreter, deep search, file, report, and
//! planning.  The first four speak HTTP to their backing services; streaming
//! services reply with newline-delimited SSE `data:` frames carrying one
//! JSON chunk each.

mod code_interpreter;
mod deep_search;
mod file;
mod planning;
mod report;

pub use code_interpreter::CodeInterpreterTool;
pub use deep_search::DeepSearchTool;
pub use file::FileTool;
pub use planning::PlanningTool;
pub use report::ReportTool;

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{bail, Context};
use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::warn;

use maestro_sse::codec;

use crate::tool::ToolContext;

/// POST a JSON body and hand back the (2xx) response for streaming.
pub(crate) async fn post_service(
    ctx: &ToolContext,
    url: &str,
    body: &Value,
) -> anyhow::Result<reqwest::Response> {
    let resp = ctx
        .http
        .post(url)
        .json(body)
        .send()
        .await
        .with_context(|| format!("POST {url}"))?;
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        bail!("{url} returned {status}: {text}");
    }
    Ok(resp)
}

/// JSON chunks from a streaming tool service.
///
/// Wraps the response byte stream with the shared SSE line codec and a
/// per-read idle timeout; unparseable payloads are skipped with a warning,
/// and the `[DONE]` sentinel (when a service sends one) ends the stream
/// after draining already-buffered chunks.
pub(crate) struct ServiceStream {
    bytes: Pin<Box<dyn Stream<Item = reqwest::Result<Vec<u8>>> + Send>>,
    buf: String,
    pending: VecDeque<Value>,
    read_timeout: Duration,
    done: bool,
}

impl ServiceStream {
    pub(crate) fn new(resp: reqwest::Response, read_timeout: Duration) -> Self {
        Self {
            bytes: Box::pin(resp.bytes_stream().map(|r| r.map(|b| b.to_vec()))),
            buf: String::new(),
            pending: VecDeque::new(),
            read_timeout,
            done: false,
        }
    }

    pub(crate) async fn next_chunk(&mut self) -> anyhow::Result<Option<Value>> {
        loop {
            if let Some(v) = self.pending.pop_front() {
                return Ok(Some(v));
            }
            if self.done {
                return Ok(None);
            }
            let item = tokio::time::timeout(self.read_timeout, self.bytes.next())
                .await
                .map_err(|_| anyhow::anyhow!("upstream stream idle for {:?}", self.read_timeout))?;
            match item {
                None => self.done = true,
                Some(Err(e)) => bail!("stream read failed: {e}"),
                Some(Ok(chunk)) => {
                    for payload in codec::feed(&mut self.buf, &chunk) {
                        if payload == codec::DONE_SENTINEL {
                            self.done = true;
                            break;
                        }
                        match serde_json::from_str::<Value>(&payload) {
                            Ok(v) => self.pending.push_back(v),
                            Err(e) => warn!(error = %e, "skipping unparseable service chunk"),
                        }
                    }
                }
            }
        }
    }
}

/// Join a base URL and a path without doubling slashes.
pub(crate) fn service_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_url_joins_cleanly() {
        assert_eq!(
            service_url("http://x:1/", "/v1/tool/report"),
            "http://x:1/v1/tool/report"
        );
        assert_eq!(
            service_url("http://x:1", "v1/tool/report"),
            "http://x:1/v1/tool/report"
        );
    }
}
