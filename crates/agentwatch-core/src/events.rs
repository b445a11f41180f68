//! Hook event model
//!
//! A hook event is a single structured observation emitted by an external
//! agent run ("tool call started", "session ended", ...). The `payload` is
//! opaque JSON: it is stored and returned verbatim, never inspected.
//!
//! Producers emitted these fields in camelCase for the human-in-the-loop
//! group, so those serde names are kept for wire compatibility; everything
//! else is snake_case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle of a human-in-the-loop request attached to an event.
///
/// Transitions from `Pending` to exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitlStatus {
    Pending,
    Responded,
    Timeout,
    Error,
}

impl HitlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HitlStatus::Pending => "pending",
            HitlStatus::Responded => "responded",
            HitlStatus::Timeout => "timeout",
            HitlStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(HitlStatus::Pending),
            "responded" => Some(HitlStatus::Responded),
            "timeout" => Some(HitlStatus::Timeout),
            "error" => Some(HitlStatus::Error),
            _ => None,
        }
    }
}

/// A stored hook event, as persisted and as broadcast to dashboard clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookEvent {
    pub id: i64,
    pub source_app: String,
    pub session_id: String,
    pub hook_event_type: String,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(rename = "humanInTheLoop", skip_serializing_if = "Option::is_none")]
    pub human_in_the_loop: Option<Value>,
    #[serde(rename = "humanInTheLoopStatus", skip_serializing_if = "Option::is_none")]
    pub human_in_the_loop_status: Option<HitlStatus>,
    #[serde(rename = "humanInTheLoopResponse", skip_serializing_if = "Option::is_none")]
    pub human_in_the_loop_response: Option<Value>,
    #[serde(rename = "respondedAt", skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
}

/// An incoming hook event as posted by a producer.
///
/// `id` is assigned by the store; `timestamp` defaults to now when omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct NewHookEvent {
    pub source_app: String,
    pub session_id: String,
    pub hook_event_type: String,
    pub payload: Value,
    #[serde(default)]
    pub chat: Option<Value>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default, rename = "humanInTheLoop")]
    pub human_in_the_loop: Option<Value>,
    #[serde(default, rename = "humanInTheLoopStatus")]
    pub human_in_the_loop_status: Option<HitlStatus>,
}

/// Distinct values available for dashboard filters, each sorted for stable
/// UI ordering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterOptions {
    pub source_apps: Vec<String>,
    pub session_ids: Vec<String>,
    pub hook_event_types: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hitl_fields_keep_camel_case_on_the_wire() {
        let event = HookEvent {
            id: 7,
            source_app: "agentA".to_string(),
            session_id: "s1".to_string(),
            hook_event_type: "Notification".to_string(),
            payload: json!({"message": "approve?"}),
            chat: None,
            summary: None,
            timestamp: Utc::now(),
            model_name: None,
            human_in_the_loop: Some(json!({"question": "continue?"})),
            human_in_the_loop_status: Some(HitlStatus::Pending),
            human_in_the_loop_response: None,
            responded_at: None,
        };

        let wire = serde_json::to_value(&event).unwrap();
        assert!(wire.get("humanInTheLoop").is_some());
        assert_eq!(wire["humanInTheLoopStatus"], json!("pending"));
        assert!(wire.get("human_in_the_loop").is_none());
    }

    #[test]
    fn test_new_event_requires_payload() {
        let missing: Result<NewHookEvent, _> = serde_json::from_value(json!({
            "source_app": "agentA",
            "session_id": "s1",
            "hook_event_type": "PreToolUse"
        }));
        assert!(missing.is_err());

        let ok: NewHookEvent = serde_json::from_value(json!({
            "source_app": "agentA",
            "session_id": "s1",
            "hook_event_type": "PreToolUse",
            "payload": {"tool_name": "Bash"}
        }))
        .unwrap();
        assert!(ok.timestamp.is_none());
        assert!(ok.human_in_the_loop.is_none());
    }
}
