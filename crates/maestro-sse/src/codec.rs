// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Inbound SSE line reassembly.
//!
//! Every upstream service maestro consumes (the chat-completion endpoint,
//! the code interpreter, deep search, report) streams newline-delimited
//! `data:` frames, and a single frame may be split across TCP packets.  The
//! helpers here maintain a persistent buffer across byte chunks and yield
//! only complete payloads, so callers never parse a half-received line.

/// The end-of-stream sentinel used by chat-completion style endpoints.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Append a byte chunk to `buf` and drain every complete `data:` payload.
///
/// Any trailing incomplete line stays in `buf` for the next chunk.  Comment
/// lines, empty keep-alive lines, and non-`data:` fields are skipped.
pub fn feed(buf: &mut String, chunk: &[u8]) -> Vec<String> {
    buf.push_str(&String::from_utf8_lossy(chunk));
    drain_data_lines(buf)
}

/// Drain all complete `\n`-terminated `data:` payloads from `buf`.
pub fn drain_data_lines(buf: &mut String) -> Vec<String> {
    let mut payloads = Vec::new();
    while let Some(nl_pos) = buf.find('\n') {
        // Strip the optional Windows-style \r before \n.
        let line = buf[..nl_pos].trim_end_matches('\r').to_string();
        *buf = buf[nl_pos + 1..].to_string();
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim();
            if !data.is_empty() {
                payloads.push(data.to_string());
            }
        }
    }
    payloads
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
