use anyhow::Context;

use crate::email::MailApi;

/// List message ids newest first until the `most_recent` boundary or `limit` is reached.
///
/// Ids at and after the boundary are already stored and are left out.
/// Returns the ids and their count.
pub async fn discover_ids(
    api: &dyn MailApi,
    most_recent: Option<&str>,
    limit: usize,
    page_size: u32,
) -> anyhow::Result<(Vec<String>, usize)> {
    let mut ids = Vec::new();
    let mut page_token = None;

    'pages: loop {
        let page = api
            .list_message_ids(page_token.take(), page_size)
            .await
            .context("Failed to list message ids")?;

        for id in page.ids {
            if most_recent == Some(id.as_str()) {
                tracing::debug!("Reached stored message {} after {} ids", id, ids.len());
                break 'pages;
            }
            ids.push(id);
            if ids.len() >= limit {
                break 'pages;
            }
        }

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    let count = ids.len();
    Ok((ids, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::common::FakeMailApi;

    fn mailbox(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("m{i}")).collect()
    }

    #[tokio::test]
    async fn test_discover_stops_at_limit() {
        let api = FakeMailApi::new().with_mailbox(mailbox(50));
        let (ids, count) = discover_ids(&api, None, 25, 10).await.unwrap();
        assert_eq!(count, 25);
        assert_eq!(ids.first().map(String::as_str), Some("m0"));
        assert_eq!(ids.last().map(String::as_str), Some("m24"));
    }

    #[tokio::test]
    async fn test_discover_stops_at_most_recent() {
        let api = FakeMailApi::new().with_mailbox(mailbox(50));
        let (ids, count) = discover_ids(&api, Some("m13"), 100, 10).await.unwrap();
        assert_eq!(count, 13);
        assert!(!ids.contains(&"m13".to_string()));
    }

    #[tokio::test]
    async fn test_discover_drains_short_mailbox() {
        let api = FakeMailApi::new().with_mailbox(mailbox(7));
        let (ids, count) = discover_ids(&api, Some("gone"), 100, 5).await.unwrap();
        assert_eq!(count, 7);
        assert_eq!(ids, mailbox(7));
    }
}
