//! Scripted capability: replays queued replies in order and records every
//! request it receives.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::types::{Message, Reply, ToolCall, ToolSpec};
use crate::LlmCapability;

/// A request as seen by the scripted capability.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

pub struct ScriptedCapability {
    name: String,
    replies: Mutex<VecDeque<Result<Reply, LlmError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedCapability {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a plain text reply.
    pub fn push_message(&self, text: &str) -> &Self {
        self.push(Ok(Reply::Message(text.to_string())))
    }

    /// Queue a tool call. Call ids are numbered in queue order.
    pub fn push_tool_call(&self, name: &str, arguments: serde_json::Value) -> &Self {
        let id = format!("call_{}", self.pending() + self.request_count() + 1);
        self.push(Ok(Reply::ToolCall(ToolCall {
            id,
            name: name.to_string(),
            arguments,
        })))
    }

    /// Queue a `run_sql` call with the given query.
    pub fn push_sql(&self, query: &str) -> &Self {
        self.push_tool_call("run_sql", serde_json::json!({ "query": query }))
    }

    /// Queue a failure.
    pub fn push_error(&self, error: LlmError) -> &Self {
        self.push(Err(error))
    }

    fn push(&self, reply: Result<Reply, LlmError>) -> &Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
        self
    }

    /// Number of replies not yet consumed.
    pub fn pending(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Snapshot of all recorded requests.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmCapability for ScriptedCapability {
    async fn respond(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Reply, LlmError> {
        self.requests
            .lock()
            .map_err(|e| LlmError::Unavailable(format!("Lock poisoned: {}", e)))?
            .push(RecordedRequest {
                messages: messages.to_vec(),
                tool_names: tools.iter().map(|t| t.name.clone()).collect(),
            });

        self.replies
            .lock()
            .map_err(|e| LlmError::Unavailable(format!("Lock poisoned: {}", e)))?
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Unavailable("script exhausted".into())))
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_in_order() {
        let llm = ScriptedCapability::new("scripted");
        llm.push_message("first").push_sql("SELECT 1");

        let first = llm.respond(&[Message::user("hi")], &[]).await.unwrap();
        assert_eq!(first, Reply::Message("first".into()));

        match llm.respond(&[], &[]).await.unwrap() {
            Reply::ToolCall(call) => {
                assert_eq!(call.name, "run_sql");
                assert_eq!(call.str_arg("query"), Some("SELECT 1"));
            }
            other => panic!("expected tool call, got {:?}", other),
        }
        assert_eq!(llm.pending(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_script_errors() {
        let llm = ScriptedCapability::new("scripted");
        let result = llm.respond(&[], &[]).await;
        assert!(matches!(result, Err(LlmError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_queued_error_is_returned() {
        let llm = ScriptedCapability::new("scripted");
        llm.push_error(LlmError::Timeout);
        assert!(matches!(
            llm.respond(&[], &[]).await,
            Err(LlmError::Timeout)
        ));
    }

    #[tokio::test]
    async fn test_requests_are_recorded() {
        let llm = ScriptedCapability::new("scripted");
        llm.push_message("ok");
        let tools = vec![ToolSpec {
            name: "run_sql".into(),
            description: String::new(),
            parameters: serde_json::json!({}),
        }];
        llm.respond(&[Message::system("sys"), Message::user("q")], &tools)
            .await
            .unwrap();

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages.len(), 2);
        assert_eq!(requests[0].tool_names, vec!["run_sql".to_string()]);
        assert_eq!(llm.model_name(), "scripted");
    }

    #[test]
    fn test_tool_call_ids_are_distinct() {
        let llm = ScriptedCapability::new("scripted");
        llm.push_sql("SELECT 1").push_sql("SELECT 2");
        let replies = llm.replies.lock().unwrap();
        let ids: Vec<String> = replies
            .iter()
            .filter_map(|r| match r {
                Ok(Reply::ToolCall(c)) => Some(c.id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["call_1", "call_2"]);
    }
}
