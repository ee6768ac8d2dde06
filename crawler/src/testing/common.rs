use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine;
use chrono::{TimeZone, Utc};
use indexmap::IndexMap;

use crate::{
    crawler_config::FetchSettings,
    email::{
        raw_message::{MessageHeader, MessagePart, MessagePartBody},
        BatchItem, GmailApiError, MailApi, MessageIdPage, RawMessage,
    },
    fetch::FetchEngine,
    observability::PipelineTracker,
    parser::{headers::domain_of, MessageRecord, ParticipantRecord, RecordParser, Role},
};

pub const SAMPLE_INTERNAL_DATE: &str = "1727089470000";

pub fn encode_body(text: &str) -> String {
    base64::engine::general_purpose::URL_SAFE.encode(text)
}

pub fn raw_message(id: &str, internal_date: &str, payload: MessagePart) -> RawMessage {
    RawMessage {
        id: id.to_string(),
        thread_id: id.to_string(),
        label_ids: vec!["INBOX".to_string()],
        internal_date: Some(internal_date.to_string()),
        payload: Some(payload),
    }
}

/// Parsed record with the given participants and a fixed body
pub fn sample_record(id: &str, participants: &[(&str, Role)]) -> MessageRecord {
    let mut keywords = IndexMap::new();
    keywords.insert("records".to_string(), 2);
    keywords.insert("ship".to_string(), 1);
    keywords.insert("tuesday".to_string(), 1);

    MessageRecord {
        message_id: id.to_string(),
        thread_id: id.to_string(),
        subject: "Your order".to_string(),
        html_body: String::new(),
        text_body: "records ship tuesday records".to_string(),
        mimetypes: vec!["text/plain".to_string()],
        ip_address: "209.85.220.41".to_string(),
        date: Utc.with_ymd_and_hms(2024, 9, 23, 11, 4, 30).unwrap(),
        labels: vec!["INBOX".to_string()],
        keywords,
        participants: participants
            .iter()
            .map(|(email, role)| ParticipantRecord {
                email: email.to_string(),
                name: email.split('@').next().unwrap_or_default().to_string(),
                domain: domain_of(email),
                message_id: id.to_string(),
                role: *role,
            })
            .collect(),
    }
}

/// Engine over `api` that never sleeps between windows
pub fn test_engine(api: Arc<FakeMailApi>) -> FetchEngine {
    let settings = FetchSettings {
        jitter_min_secs: 0.0,
        jitter_max_secs: 0.0,
        throttle_coefficient: 0.0,
        ..Default::default()
    };
    FetchEngine::new(
        api,
        Arc::new(RecordParser::english()),
        settings,
        PipelineTracker::new(),
    )
}

#[derive(Debug, Default)]
struct FakeState {
    fail_once: HashSet<String>,
    failing_calls: usize,
    call_sizes: Vec<usize>,
}

/// Mailbox that answers every id with a small text message, with scripted failures
#[derive(Debug, Default)]
pub struct FakeMailApi {
    mailbox: Vec<String>,
    listing_fails: bool,
    fail_always: HashSet<String>,
    bad_dates: HashSet<String>,
    state: Mutex<FakeState>,
}

impl FakeMailApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mailbox(mut self, ids: Vec<String>) -> Self {
        self.mailbox = ids;
        self
    }

    /// Every listing call fails
    pub fn fail_listing(mut self) -> Self {
        self.listing_fails = true;
        self
    }

    pub fn fail_always(mut self, id: &str) -> Self {
        self.fail_always.insert(id.to_string());
        self
    }

    pub fn fail_always_each(mut self, ids: &[String]) -> Self {
        self.fail_always.extend(ids.iter().cloned());
        self
    }

    /// Each id fails the first time it is requested
    pub fn fail_once_each(self, ids: &[String]) -> Self {
        self.state.lock().unwrap().fail_once.extend(ids.iter().cloned());
        self
    }

    /// The first `n` batch calls fail outright
    pub fn fail_calls(self, n: usize) -> Self {
        self.state.lock().unwrap().failing_calls = n;
        self
    }

    pub fn with_bad_date(mut self, id: &str) -> Self {
        self.bad_dates.insert(id.to_string());
        self
    }

    pub fn call_sizes(&self) -> Vec<usize> {
        self.state.lock().unwrap().call_sizes.clone()
    }

    fn message(&self, id: &str) -> RawMessage {
        let payload = MessagePart {
            mime_type: "text/plain".to_string(),
            headers: vec![
                MessageHeader {
                    name: "From".to_string(),
                    value: "Sender <sender@example.com>".to_string(),
                },
                MessageHeader {
                    name: "To".to_string(),
                    value: "owner@example.com".to_string(),
                },
            ],
            body: Some(MessagePartBody {
                data: Some(encode_body(&format!("Message {id} about records"))),
                size: None,
            }),
            parts: Vec::new(),
        };
        let date = if self.bad_dates.contains(id) {
            "not-a-date"
        } else {
            SAMPLE_INTERNAL_DATE
        };
        raw_message(id, date, payload)
    }
}

#[async_trait]
impl MailApi for FakeMailApi {
    async fn list_message_ids(
        &self,
        page_token: Option<String>,
        page_size: u32,
    ) -> anyhow::Result<MessageIdPage> {
        if self.listing_fails {
            anyhow::bail!("listing unavailable");
        }
        let start: usize = match page_token {
            Some(token) => token.parse()?,
            None => 0,
        };
        let end = (start + page_size as usize).min(self.mailbox.len());
        let ids = self.mailbox.get(start..end).unwrap_or_default().to_vec();
        let next_page_token = (end < self.mailbox.len()).then(|| end.to_string());
        Ok(MessageIdPage {
            ids,
            next_page_token,
        })
    }

    async fn batch_get(&self, message_ids: &[String]) -> anyhow::Result<Vec<BatchItem>> {
        let mut state = self.state.lock().unwrap();
        state.call_sizes.push(message_ids.len());
        if state.failing_calls > 0 {
            state.failing_calls -= 1;
            anyhow::bail!("batch endpoint unavailable");
        }

        Ok(message_ids
            .iter()
            .map(|id| {
                if self.fail_always.contains(id) || state.fail_once.remove(id) {
                    BatchItem::Error {
                        message_id: id.clone(),
                        error: GmailApiError::new(429, "Too many concurrent requests for user"),
                    }
                } else {
                    BatchItem::Success(self.message(id))
                }
            })
            .collect())
    }
}
