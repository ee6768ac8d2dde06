use async_trait::async_trait;

use super::raw_message::RawMessage;

/// Gmail API error response structure
#[derive(Debug, Clone, serde::Deserialize)]
pub struct GmailApiError {
    pub error: GmailApiErrorDetail,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct GmailApiErrorDetail {
    pub code: u16,
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl GmailApiError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            error: GmailApiErrorDetail {
                code,
                message: message.into(),
                status: None,
            },
        }
    }
}

/// Result of one item of a batch fetch - either a message or an error
#[derive(Debug, Clone)]
pub enum BatchItem {
    Success(RawMessage),
    Error {
        message_id: String,
        error: GmailApiError,
    },
}

/// One page of a message id listing
#[derive(Debug, Clone, Default)]
pub struct MessageIdPage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Remote mailbox the pipeline reads from
#[async_trait]
pub trait MailApi: Send + Sync {
    async fn list_message_ids(
        &self,
        page_token: Option<String>,
        page_size: u32,
    ) -> anyhow::Result<MessageIdPage>;

    /// Fetch many messages in one round trip, one result per requested id
    async fn batch_get(&self, message_ids: &[String]) -> anyhow::Result<Vec<BatchItem>>;
}
