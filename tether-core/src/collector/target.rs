//! Messages and collector targets

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::events::InboundEvent;

/// A message observed on the bus
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectedMessage {
    pub id: String,
    pub chat_id: String,
    /// Session that produced the message, when the host includes it
    pub session_id: Option<String>,
    /// Host instance that produced the message, when the host includes it
    pub instance_id: Option<String>,
    /// The message exactly as the host sent it
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

impl CollectedMessage {
    /// Interpret a pushed payload as a message.
    ///
    /// Mirrored events may wrap the message in a `data` envelope. Returns
    /// `None` when no message id or chat id can be found.
    pub fn from_payload(payload: &Value, received_at: DateTime<Utc>) -> Option<Self> {
        let message = match payload.get("data") {
            Some(inner) if inner.is_object() => inner,
            _ => payload,
        };

        let id = string_field(message, "id")?;
        let chat_id = string_field(message, "chatId")
            .or_else(|| message.get("chat").and_then(|chat| string_field(chat, "id")))
            .or_else(|| string_field(message, "from"))?;

        Some(Self {
            id,
            chat_id,
            session_id: string_field(message, "sessionId")
                .or_else(|| string_field(payload, "sessionId")),
            instance_id: string_field(message, "instanceId")
                .or_else(|| string_field(payload, "instanceId")),
            payload: message.clone(),
            received_at,
        })
    }

    pub fn from_event(event: &InboundEvent) -> Option<Self> {
        Self::from_payload(&event.payload, event.received_at)
    }

    /// Message text, if any.
    pub fn body(&self) -> Option<&str> {
        self.payload.get("body").and_then(Value::as_str)
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// The chat a collector is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatTarget(String);

impl ChatTarget {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self(chat_id.into())
    }

    /// Resolve the chat id from a message (`chat.id` or `chatId`), a chat
    /// (`id`) or a plain id string.
    pub fn from_value(value: &Value) -> Option<Self> {
        if let Value::String(id) = value {
            return (!id.is_empty()).then(|| Self(id.clone()));
        }
        value
            .get("chat")
            .and_then(|chat| string_field(chat, "id"))
            .or_else(|| string_field(value, "chatId"))
            .or_else(|| string_field(value, "id"))
            .map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChatTarget {
    fn from(chat_id: &str) -> Self {
        Self::new(chat_id)
    }
}

impl From<String> for ChatTarget {
    fn from(chat_id: String) -> Self {
        Self(chat_id)
    }
}

/// Session, instance and chat a collector window is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorScope {
    pub session_id: String,
    pub instance_id: String,
    pub chat_id: ChatTarget,
}

impl CollectorScope {
    /// Whether `message` belongs to this window.
    ///
    /// Session and instance ids only disqualify a message when it carries a
    /// different value.
    pub fn admits(&self, message: &CollectedMessage) -> bool {
        message.chat_id == self.chat_id.as_str()
            && message
                .session_id
                .as_deref()
                .is_none_or(|id| id == self.session_id)
            && message
                .instance_id
                .as_deref()
                .is_none_or(|id| id == self.instance_id)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn scope() -> CollectorScope {
        CollectorScope {
            session_id: "s1".to_string(),
            instance_id: "i1".to_string(),
            chat_id: ChatTarget::from("C1"),
        }
    }

    #[test]
    fn parses_flat_message() {
        let message = CollectedMessage::from_payload(
            &json!({"id": "m1", "chatId": "C1", "body": "hi"}),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(message.id, "m1");
        assert_eq!(message.chat_id, "C1");
        assert_eq!(message.body(), Some("hi"));
    }

    #[test]
    fn parses_enveloped_message_with_nested_chat() {
        let message = CollectedMessage::from_payload(
            &json!({"sessionId": "s1", "data": {"id": "m2", "chat": {"id": "C2"}}}),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(message.chat_id, "C2");
        assert_eq!(message.session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn rejects_payload_without_id() {
        assert!(CollectedMessage::from_payload(&json!({"chatId": "C1"}), Utc::now()).is_none());
        assert!(CollectedMessage::from_payload(&json!("text"), Utc::now()).is_none());
    }

    #[test]
    fn target_resolves_from_message_chat_or_string() {
        let from_message = json!({"id": "m1", "chat": {"id": "C1"}});
        let from_chat = json!({"id": "C2", "name": "Group"});
        assert_eq!(ChatTarget::from_value(&from_message).unwrap().as_str(), "C1");
        assert_eq!(ChatTarget::from_value(&json!({"chatId": "C3"})).unwrap().as_str(), "C3");
        assert_eq!(ChatTarget::from_value(&from_chat).unwrap().as_str(), "C2");
        assert_eq!(ChatTarget::from_value(&json!("C4")).unwrap().as_str(), "C4");
        assert!(ChatTarget::from_value(&json!(null)).is_none());
    }

    #[test]
    fn scope_rejects_foreign_chat_and_session() {
        let scope = scope();
        let own = CollectedMessage::from_payload(&json!({"id": "m1", "chatId": "C1"}), Utc::now())
            .unwrap();
        let other_chat =
            CollectedMessage::from_payload(&json!({"id": "m2", "chatId": "C2"}), Utc::now())
                .unwrap();
        let other_session = CollectedMessage::from_payload(
            &json!({"id": "m3", "chatId": "C1", "sessionId": "s2"}),
            Utc::now(),
        )
        .unwrap();

        assert!(scope.admits(&own));
        assert!(!scope.admits(&other_chat));
        assert!(!scope.admits(&other_session));
    }
}
