//! Live channel message envelope
//!
//! Every message pushed to a connected dashboard client is a `{type, data}`
//! envelope. `initial` carries the bounded backlog sent on connect; the
//! remaining variants mirror the mutating write that produced them.

use serde::{Deserialize, Serialize};

use crate::events::HookEvent;
use crate::metrics::{CoverageRecord, Finding, Session, TokenMetric, ToolMetric};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamMessage {
    Initial(Vec<HookEvent>),
    Event(HookEvent),
    TokenUpdate(TokenMetric),
    ToolUpdate(ToolMetric),
    FindingUpdate(Finding),
    WstgUpdate(CoverageRecord),
    SessionUpdate(Session),
}

impl StreamMessage {
    /// The wire value of the envelope's `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamMessage::Initial(_) => "initial",
            StreamMessage::Event(_) => "event",
            StreamMessage::TokenUpdate(_) => "token_update",
            StreamMessage::ToolUpdate(_) => "tool_update",
            StreamMessage::FindingUpdate(_) => "finding_update",
            StreamMessage::WstgUpdate(_) => "wstg_update",
            StreamMessage::SessionUpdate(_) => "session_update",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_envelope_shape() {
        let event = HookEvent {
            id: 1,
            source_app: "agentA".to_string(),
            session_id: "s1".to_string(),
            hook_event_type: "PreToolUse".to_string(),
            payload: json!({"tool_name": "Bash"}),
            chat: None,
            summary: None,
            timestamp: Utc::now(),
            model_name: None,
            human_in_the_loop: None,
            human_in_the_loop_status: None,
            human_in_the_loop_response: None,
            responded_at: None,
        };

        let wire = serde_json::to_value(StreamMessage::Event(event)).unwrap();
        assert_eq!(wire["type"], json!("event"));
        assert_eq!(wire["data"]["id"], json!(1));

        let initial = StreamMessage::Initial(vec![]);
        assert_eq!(initial.kind(), "initial");
        let wire = serde_json::to_value(&initial).unwrap();
        assert_eq!(wire["type"], json!("initial"));
        assert_eq!(wire["data"], json!([]));
    }
}
