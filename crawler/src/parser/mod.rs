//! Record Parser
//!
//! Turns one raw Gmail payload into a [`MessageRecord`] with its participants.
//!
//! ## Failure policy
//!
//! - A missing or malformed `internalDate` fails the whole message with a [`ParseError`].
//! - Every other field falls back to empty when it cannot be read (bad base64,
//!   non UTF-8 bodies, missing headers). Those cases are logged, never returned.
//!
//! ## Headers
//!
//! Only the headers in [`TrackedHeader`] are read. Each maps to exactly one
//! [`HeaderHandler`], so a new header kind cannot be added without a handler.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokenizer::Tokenizer;

use crate::{email::raw_message::RawMessage, error::ParseError};

pub mod body;
pub mod headers;
pub mod normalizer;

pub use headers::{ParticipantRecord, Role, TrackedHeader};
use headers::{extract_ip_addresses, extract_participants, HeaderHandler};
use normalizer::Normalizer;

/// Canonical form of one fetched message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub message_id: String,
    pub thread_id: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
    pub mimetypes: Vec<String>,
    pub ip_address: String,
    pub date: DateTime<Utc>,
    pub labels: Vec<String>,
    pub keywords: IndexMap<String, u32>,
    pub participants: Vec<ParticipantRecord>,
}

#[derive(Debug, Clone)]
pub struct RecordParser {
    tokenizer: Arc<Tokenizer>,
    normalizer: Normalizer,
}

impl RecordParser {
    pub fn new(tokenizer: Arc<Tokenizer>, normalizer: Normalizer) -> Self {
        Self {
            tokenizer,
            normalizer,
        }
    }

    /// English tokenizer and the default plaintext routines
    pub fn english() -> Self {
        Self::new(Arc::new(Tokenizer::english()), Normalizer::plaintext())
    }

    pub fn parse(&self, raw: &RawMessage) -> Result<MessageRecord, ParseError> {
        let message_id = raw.id.clone();
        let date = parse_internal_date(&message_id, raw.internal_date.as_deref())?;
        let payload = raw
            .payload
            .as_ref()
            .ok_or_else(|| ParseError::MissingPayload {
                message_id: message_id.clone(),
            })?;

        let mut subject = String::new();
        let mut ip_address = String::new();
        let mut participants = Vec::new();

        for header in &payload.headers {
            let Some(tracked) = TrackedHeader::from_name(&header.name) else {
                continue;
            };
            match tracked.handler() {
                HeaderHandler::Participants(role) => {
                    participants.extend(extract_participants(&header.value, &message_id, role))
                }
                HeaderHandler::IpAddress => ip_address = extract_ip_addresses(&header.value),
                HeaderHandler::Subject => subject = header.value.clone(),
            }
        }

        let bodies = body::collect_bodies(payload);
        let selected = body::select_body(&bodies, &self.normalizer, &message_id);

        let keyword_source = if !selected.text_body.is_empty() {
            selected.text_body.as_str()
        } else {
            selected.html_body.as_str()
        };
        let keywords = self.keywords(keyword_source);

        Ok(MessageRecord {
            message_id,
            thread_id: raw.thread_id.clone(),
            subject,
            html_body: selected.html_body,
            text_body: selected.text_body,
            mimetypes: bodies.into_keys().collect(),
            ip_address,
            date,
            labels: raw.label_ids.clone(),
            keywords,
            participants,
        })
    }

    /// Frequency of non stop-word, non punctuation tokens
    pub fn keywords(&self, text: &str) -> IndexMap<String, u32> {
        let mut counts = IndexMap::new();
        if text.is_empty() {
            return counts;
        }
        for word in self.tokenizer.content_words(text) {
            *counts.entry(word.to_string()).or_insert(0) += 1;
        }
        counts
    }
}

fn parse_internal_date(message_id: &str, value: Option<&str>) -> Result<DateTime<Utc>, ParseError> {
    let value = value.ok_or_else(|| ParseError::MissingDate {
        message_id: message_id.to_string(),
    })?;
    let malformed = || ParseError::MalformedDate {
        message_id: message_id.to_string(),
        value: value.to_string(),
    };

    let millis: i64 = value.trim().parse().map_err(|_| malformed())?;
    let secs = millis.div_euclid(1000);
    let nanos = (millis.rem_euclid(1000) * 1_000_000) as u32;
    Utc.timestamp_opt(secs, nanos).single().ok_or_else(malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::raw_message::{MessageHeader, MessagePart, MessagePartBody};
    use crate::testing::common::{encode_body, raw_message};

    fn header(name: &str, value: &str) -> MessageHeader {
        MessageHeader {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    fn single_part(data: &str) -> MessagePart {
        MessagePart {
            mime_type: "text/plain".to_string(),
            body: Some(MessagePartBody {
                data: Some(data.to_string()),
                size: None,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_headers_and_body() {
        let mut payload = single_part(&encode_body("Records ship Tuesday. Records!"));
        payload.headers = vec![
            header("From", "Vinyl Me <vinyl@gmail.com>"),
            header("To", "Qxhna Titcomb <qxhna.titcomb@techstars.com>, bob@b.io"),
            header("Subject", "Your order"),
            header("Received-SPF", "pass client-ip=209.85.220.41;"),
            header("X-Mailer", "ignored <x@y.z>"),
        ];
        let raw = raw_message("m1", "1727089470000", payload);

        let record = RecordParser::english().parse(&raw).unwrap();
        assert_eq!(record.subject, "Your order");
        assert_eq!(record.ip_address, "209.85.220.41");
        assert_eq!(record.participants.len(), 3);
        assert_eq!(record.participants[0].role, Role::From);
        assert_eq!(record.participants[2].email, "bob@b.io");
        assert_eq!(record.text_body, "records ship tuesday records");
        assert_eq!(record.keywords.get("records"), Some(&2));
        assert_eq!(record.mimetypes, vec!["text/plain"]);
        assert_eq!(record.date.timestamp(), 1727089470);
    }

    #[test]
    fn test_single_part_without_headers() {
        let raw = raw_message("m2", "1000", single_part(&encode_body("hello there friend")));
        let record = RecordParser::english().parse(&raw).unwrap();
        assert!(record.participants.is_empty());
        assert_eq!(record.text_body, "hello there friend");
    }

    #[test]
    fn test_multipart_with_same_content_matches_single_part() {
        let data = encode_body("hello there friend");
        let parser = RecordParser::english();
        let single = parser
            .parse(&raw_message("m3", "1000", single_part(&data)))
            .unwrap();

        let multipart = MessagePart {
            mime_type: "multipart/alternative".to_string(),
            parts: vec![single_part(&data)],
            ..Default::default()
        };
        let multi = parser.parse(&raw_message("m3", "1000", multipart)).unwrap();
        assert_eq!(multi.text_body, single.text_body);
        assert_eq!(multi.keywords, single.keywords);
    }

    #[test]
    fn test_malformed_date_is_error() {
        let raw = raw_message("m4", "yesterday", single_part(""));
        assert!(matches!(
            RecordParser::english().parse(&raw),
            Err(ParseError::MalformedDate { .. })
        ));

        let mut raw = raw_message("m5", "1000", single_part(""));
        raw.internal_date = None;
        assert!(matches!(
            RecordParser::english().parse(&raw),
            Err(ParseError::MissingDate { .. })
        ));
    }

    #[test]
    fn test_bad_body_leaves_fields_empty() {
        let raw = raw_message("m6", "1000", single_part("%%%"));
        let record = RecordParser::english().parse(&raw).unwrap();
        assert_eq!(record.text_body, "");
        assert!(record.keywords.is_empty());
    }

    #[test]
    fn test_date_keeps_millis() {
        let date = parse_internal_date("m", Some("1500")).unwrap();
        assert_eq!(date.timestamp(), 1);
        assert_eq!(date.timestamp_subsec_millis(), 500);
    }
}
