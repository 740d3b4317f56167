use agent_bridge::ChatMessage;
use serde_json::Value;

/// One record of a full transcript.
///
/// Records that do not parse as a [`ChatMessage`] are kept verbatim so that
/// rewriting a transcript never drops history written by other versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEntry {
    Message(ChatMessage),
    Unrecognized(Value),
}

impl TranscriptEntry {
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<ChatMessage>(value.clone()) {
            Ok(message) => Self::Message(message),
            Err(_) => Self::Unrecognized(value),
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Message(message) => serde_json::to_value(message),
            Self::Unrecognized(value) => Ok(value.clone()),
        }
    }

    #[must_use]
    pub fn as_message(&self) -> Option<&ChatMessage> {
        match self {
            Self::Message(message) => Some(message),
            Self::Unrecognized(_) => None,
        }
    }
}

impl From<ChatMessage> for TranscriptEntry {
    fn from(message: ChatMessage) -> Self {
        Self::Message(message)
    }
}

/// Parsed messages of a full transcript, skipping unrecognized records.
#[must_use]
pub fn messages_of(entries: &[TranscriptEntry]) -> Vec<ChatMessage> {
    entries
        .iter()
        .filter_map(TranscriptEntry::as_message)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unparsable_records_are_kept_verbatim() {
        let raw = json!({ "role": "tool", "content": "Tool compileSketch completed" });

        let entry = TranscriptEntry::from_value(raw.clone());

        assert_eq!(entry, TranscriptEntry::Unrecognized(raw.clone()));
        assert_eq!(entry.to_value().expect("raw record should serialize"), raw);
        assert!(entry.as_message().is_none());
    }

    #[test]
    fn chat_messages_parse_into_message_entries() {
        let entry = TranscriptEntry::from_value(json!({ "role": "user", "content": "hi" }));

        assert_eq!(entry, TranscriptEntry::Message(ChatMessage::user("hi")));
    }
}
