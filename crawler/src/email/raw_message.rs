//! Raw Gmail message payload (FULL format) as returned by `users.messages.get`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub label_ids: Vec<String>,
    /// Millisecond epoch, encoded as a string
    #[serde(default)]
    pub internal_date: Option<String>,
    #[serde(default)]
    pub payload: Option<MessagePart>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<MessageHeader>,
    #[serde(default)]
    pub body: Option<MessagePartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl MessagePart {
    /// Encoded body data, empty when the part carries none
    pub fn data(&self) -> &str {
        self.body
            .as_ref()
            .and_then(|b| b.data.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePartBody {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub size: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_format() {
        let json = r#"{
            "id": "1921e8debe9a2256",
            "threadId": "1921e8debe9a2256",
            "labelIds": ["INBOX", "CATEGORY_UPDATES"],
            "internalDate": "1727089470000",
            "payload": {
                "mimeType": "multipart/alternative",
                "headers": [{"name": "Subject", "value": "Hi"}],
                "body": {"size": 0},
                "parts": [
                    {"mimeType": "text/plain", "body": {"size": 5, "data": "aGVsbG8"}}
                ]
            }
        }"#;

        let message: RawMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.thread_id, "1921e8debe9a2256");
        assert_eq!(message.internal_date.as_deref(), Some("1727089470000"));
        let payload = message.payload.unwrap();
        assert_eq!(payload.data(), "");
        assert_eq!(payload.parts[0].data(), "aGVsbG8");
    }
}
