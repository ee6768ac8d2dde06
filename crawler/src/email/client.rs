use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use google_gmail1::api::ListMessagesResponse;
use leaky_bucket::RateLimiter;
use uuid::Uuid;

use crate::{crawler_config::GmailSettings, HttpClient};

use super::{
    mail_api::{BatchItem, GmailApiError, MailApi, MessageIdPage},
    raw_message::RawMessage,
};

/// Quota units charged by Gmail per call
pub struct GmailQuota {
    pub messages_list: usize,
    pub messages_get: usize,
}

pub const GMAIL_API_QUOTA: GmailQuota = GmailQuota {
    messages_list: 5,
    messages_get: 5,
};

/// Gmail caps a batch request at 100 parts
pub const MAX_BATCH_SIZE: usize = 100;

macro_rules! gmail_url {
    ($($params:expr),*) => {
        {
            const GMAIL_ENDPOINT: &str = "https://www.googleapis.com/gmail/v1/users/me";
            let list_params = vec![$($params),*];
            let path = list_params.join("/");
            format!("{}/{}", GMAIL_ENDPOINT, path)
        }
    };
}

#[derive(Debug, Clone)]
pub struct GmailClient {
    http_client: HttpClient,
    access_token: String,
    batch_endpoint: String,
    rate_limiter: Arc<RateLimiter>,
}

impl GmailClient {
    pub fn new(http_client: HttpClient, access_token: String, settings: &GmailSettings) -> Self {
        let rate_limiter = RateLimiter::builder()
            .initial(settings.quota_per_second)
            .interval(Duration::from_secs(1))
            .max(settings.quota_per_second)
            .refill(settings.quota_per_second)
            .build();

        Self {
            http_client,
            access_token,
            batch_endpoint: settings.batch_endpoint.clone(),
            rate_limiter: Arc::new(rate_limiter),
        }
    }
}

#[async_trait]
impl MailApi for GmailClient {
    async fn list_message_ids(
        &self,
        page_token: Option<String>,
        page_size: u32,
    ) -> anyhow::Result<MessageIdPage> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_list)
            .await;

        let mut query = vec![("maxResults".to_string(), page_size.to_string())];
        if let Some(token) = page_token {
            query.push(("pageToken".to_string(), token));
        }

        let resp = self
            .http_client
            .get(gmail_url!("messages"))
            .query(&query)
            .bearer_auth(&self.access_token)
            .send()
            .await?
            .error_for_status()?;

        let data = resp
            .json::<ListMessagesResponse>()
            .await
            .context("Error parsing message list")?;

        Ok(MessageIdPage {
            ids: data
                .messages
                .unwrap_or_default()
                .into_iter()
                .filter_map(|m| m.id)
                .collect(),
            next_page_token: data.next_page_token,
        })
    }

    async fn batch_get(&self, message_ids: &[String]) -> anyhow::Result<Vec<BatchItem>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }
        anyhow::ensure!(
            message_ids.len() <= MAX_BATCH_SIZE,
            "Batch of {} exceeds the {} part limit",
            message_ids.len(),
            MAX_BATCH_SIZE
        );

        for _ in 0..message_ids.len() {
            self.rate_limiter
                .acquire(GMAIL_API_QUOTA.messages_get)
                .await;
        }

        let boundary = format!("batch_{}", Uuid::new_v4());
        let body = build_batch_body(&boundary, message_ids);

        let resp = self
            .http_client
            .post(&self.batch_endpoint)
            .bearer_auth(&self.access_token)
            .header(
                "Content-Type",
                format!("multipart/mixed; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await?
            .error_for_status()?;

        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .context("Missing content-type header")?
            .to_string();

        let response_body = resp.text().await?;

        parse_batch_response(&content_type, &response_body, message_ids)
    }
}

fn build_batch_body(boundary: &str, message_ids: &[String]) -> String {
    let mut body = String::new();
    for (i, message_id) in message_ids.iter().enumerate() {
        body.push_str(&format!("--{}\r\n", boundary));
        body.push_str("Content-Type: application/http\r\n");
        body.push_str(&format!("Content-ID: <item{}>\r\n\r\n", i));
        body.push_str(&format!(
            "GET /gmail/v1/users/me/messages/{}?format=FULL\r\n\r\n",
            message_id
        ));
    }
    body.push_str(&format!("--{}--", boundary));
    body
}

/// Split a multipart batch response into one result per requested id.
///
/// Ids whose part is missing or unreadable come back as errors so the caller retries them.
fn parse_batch_response(
    content_type: &str,
    response_body: &str,
    message_ids: &[String],
) -> anyhow::Result<Vec<BatchItem>> {
    let response_boundary = content_type
        .split("boundary=")
        .nth(1)
        .map(|b| b.trim_matches('"'))
        .context("Missing boundary in response")?;

    let mut answered = vec![false; message_ids.len()];
    let mut results = Vec::with_capacity(message_ids.len());

    let delimiter = format!("--{}", response_boundary);
    let parts = response_body
        .split(&delimiter)
        .filter(|p| !p.trim().is_empty() && !p.trim().starts_with("--"));

    for part in parts {
        // Format: Content-ID: <response-item{i}>
        let Some(idx) = part
            .lines()
            .find(|line| line.to_lowercase().starts_with("content-id:"))
            .and_then(|line| {
                line.split("item")
                    .nth(1)
                    .and_then(|s| s.trim().trim_end_matches('>').parse::<usize>().ok())
            })
            .filter(|idx| *idx < message_ids.len())
        else {
            tracing::warn!("Batch response part without a usable Content-ID");
            continue;
        };
        answered[idx] = true;
        let message_id = message_ids[idx].clone();

        let json_body = part
            .split_once("\r\n\r\n")
            .and_then(|(_, rest)| rest.split_once("\r\n\r\n"))
            .map(|(_, json)| json.trim())
            .unwrap_or_default();

        if let Ok(error) = serde_json::from_str::<GmailApiError>(json_body) {
            tracing::warn!(
                "Batch request error for message {}: {} (code: {})",
                message_id,
                error.error.message,
                error.error.code
            );
            results.push(BatchItem::Error { message_id, error });
            continue;
        }

        match serde_json::from_str::<RawMessage>(json_body) {
            Ok(message) => results.push(BatchItem::Success(message)),
            Err(e) => {
                tracing::warn!(
                    "Failed to parse message {} from batch response: {}",
                    message_id,
                    e
                );
                results.push(BatchItem::Error {
                    message_id,
                    error: GmailApiError::new(500, format!("unreadable batch part: {e}")),
                });
            }
        }
    }

    for (idx, _) in answered.iter().enumerate().filter(|(_, seen)| !**seen) {
        results.push(BatchItem::Error {
            message_id: message_ids[idx].clone(),
            error: GmailApiError::new(500, "missing from batch response"),
        });
    }

    Ok(results)
}
