// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// The closed set of event kinds a request stream may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Plan,
    PlanThought,
    Task,
    ToolThought,
    ToolResult,
    Browser,
    Code,
    Html,
    Markdown,
    Ppt,
    File,
    Knowledge,
    DeepSearch,
    TaskSummary,
    Result,
    Heartbeat,
}

/// Terminal status carried by the final `result` event of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
    Timeout,
}

/// Reference to a file stored in the external file service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHandle {
    pub file_name: String,
    pub file_size: u64,
    /// Public download URL served through the domain gateway.
    pub domain_url: String,
    /// Internal object-storage URL used by the sub-services.
    pub oss_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One frame on the request's SSE stream.
///
/// `is_final = true` means no further events will be sent for this
/// `message_id`; the final event of the whole request is a `Result` packet
/// with `is_final = true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SseEvent {
    pub message_id: String,
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digital_employee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub result_map: Value,
    pub is_final: bool,
}

impl SseEvent {
    pub fn new(message_type: MessageType, result_map: Value) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            message_type,
            digital_employee: None,
            task_id: None,
            result_map,
            is_final: false,
        }
    }

    /// Reuse an existing message id so that streamed chunks of one logical
    /// message (e.g. incremental `code` output) group together client-side.
    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = id.into();
        self
    }

    pub fn with_digital_employee(mut self, name: impl Into<String>) -> Self {
        self.digital_employee = Some(name.into());
        self
    }

    pub fn with_task_id(mut self, id: impl Into<String>) -> Self {
        self.task_id = Some(id.into());
        self
    }

    pub fn finalized(mut self) -> Self {
        self.is_final = true;
        self
    }

    // ── Payload constructors for the fixed wire shapes ───────────────────────

    pub fn heartbeat() -> Self {
        Self::new(MessageType::Heartbeat, json!({}))
    }

    pub fn plan_thought(thought: impl Into<String>) -> Self {
        Self::new(
            MessageType::PlanThought,
            json!({ "planThought": thought.into() }),
        )
    }

    pub fn tool_thought(thought: impl Into<String>) -> Self {
        Self::new(
            MessageType::ToolThought,
            json!({ "toolThought": thought.into() }),
        )
    }

    pub fn tool_result(
        tool_name: impl Into<String>,
        command: Value,
        tool_result: impl Into<String>,
    ) -> Self {
        Self::new(
            MessageType::ToolResult,
            json!({
                "toolName": tool_name.into(),
                "command": command,
                "toolResult": tool_result.into(),
            }),
        )
    }

    pub fn task_summary(summary: impl Into<String>, files: &[FileHandle]) -> Self {
        Self::new(
            MessageType::TaskSummary,
            json!({ "taskSummary": summary.into(), "fileList": files }),
        )
    }

    /// The request-terminal packet.  Always `is_final = true`.
    pub fn result(status: ResultStatus, result: impl Into<String>, files: &[FileHandle]) -> Self {
        let mut map = json!({ "status": status, "result": result.into() });
        if !files.is_empty() {
            map["fileList"] = json!(files);
        }
        Self::new(MessageType::Result, map).finalized()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&MessageType::DeepSearch).unwrap(),
            "\"deep_search\""
        );
        assert_eq!(
            serde_json::to_string(&MessageType::TaskSummary).unwrap(),
            "\"task_summary\""
        );
    }

    #[test]
    fn event_serializes_camel_case() {
        let ev = SseEvent::tool_thought("thinking");
        let v: Value = serde_json::from_str(&serde_json::to_string(&ev).unwrap()).unwrap();
        assert!(v.get("messageId").is_some());
        assert_eq!(v["messageType"], "tool_thought");
        assert_eq!(v["resultMap"]["toolThought"], "thinking");
        assert_eq!(v["isFinal"], false);
    }

    #[test]
    fn optional_fields_omitted_when_absent() {
        let ev = SseEvent::heartbeat();
        let text = serde_json::to_string(&ev).unwrap();
        assert!(!text.contains("digitalEmployee"));
        assert!(!text.contains("taskId"));
    }

    #[test]
    fn result_event_is_final() {
        let ev = SseEvent::result(ResultStatus::Success, "done", &[]);
        assert!(ev.is_final);
        assert_eq!(ev.message_type, MessageType::Result);
        let v: Value = serde_json::from_str(&serde_json::to_string(&ev).unwrap()).unwrap();
        assert_eq!(v["resultMap"]["status"], "success");
        assert!(v["resultMap"].get("fileList").is_none());
    }

    #[test]
    fn result_event_carries_file_list_when_present() {
        let files = vec![FileHandle {
            file_name: "out.py".into(),
            file_size: 42,
            domain_url: "https://files/out.py".into(),
            oss_url: "oss://bucket/out.py".into(),
            description: None,
        }];
        let ev = SseEvent::result(ResultStatus::Success, "done", &files);
        let v: Value = serde_json::from_str(&serde_json::to_string(&ev).unwrap()).unwrap();
        assert_eq!(v["resultMap"]["fileList"][0]["fileName"], "out.py");
    }

    #[test]
    fn with_message_id_groups_chunks() {
        let a = SseEvent::new(MessageType::Code, json!({"data": "x"})).with_message_id("m1");
        let b = SseEvent::new(MessageType::Code, json!({"data": "y"})).with_message_id("m1");
        assert_eq!(a.message_id, b.message_id);
    }

    #[test]
    fn fresh_events_get_distinct_ids() {
        assert_ne!(SseEvent::heartbeat().message_id, SseEvent::heartbeat().message_id);
    }

    #[test]
    fn file_handle_round_trips() {
        let f = FileHandle {
            file_name: "r.html".into(),
            file_size: 10,
            domain_url: "https://x/r.html".into(),
            oss_url: "oss://x/r.html".into(),
            description: Some("report".into()),
        };
        let text = serde_json::to_string(&f).unwrap();
        assert!(text.contains("\"fileName\""));
        let back: FileHandle = serde_json::from_str(&text).unwrap();
        assert_eq!(back, f);
    }
}
