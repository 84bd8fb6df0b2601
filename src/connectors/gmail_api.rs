use std::time::Duration as StdDuration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::{GmailScope, Settings};
use crate::connectors::oauth::{redact_response_body, Authenticator};
use crate::connectors::{FetchReport, MessageSource, MessageTrasher};
use crate::snapshot::models::{MessageRecord, NO_SUBJECT, UNKNOWN};

const LIST_PAGE_SIZE: usize = 500;
const MAX_RATE_LIMIT_RETRIES: usize = 5;
const PROGRESS_EVERY: usize = 100;
const TRASH_LABEL: &str = "TRASH";

/// Gmail REST client. Lists and reads message metadata, and moves
/// messages to trash.
#[derive(Debug, Clone)]
pub struct GmailApiConnector {
    client: Client,
    api_base: String,
    auth: Authenticator,
}

impl GmailApiConnector {
    pub fn new(settings: &Settings, scope: GmailScope) -> Self {
        let client = Client::new();
        Self {
            auth: Authenticator::new(client.clone(), settings.clone(), scope),
            api_base: settings.api_base.clone(),
            client,
        }
    }

    /// Make sure a usable token exists before any real work starts.
    pub async fn authenticate(&self) -> Result<()> {
        self.auth.access_token().await.map(|_| ())
    }

    async fn send_with_retry(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<String> {
        let mut backoff_seconds = 1u64;

        for attempt in 0..=MAX_RATE_LIMIT_RETRIES {
            let token = self.auth.access_token().await?;
            let mut request = self
                .client
                .request(method.clone(), url)
                .bearer_auth(&token)
                .header("accept", "application/json");
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request
                .send()
                .await
                .with_context(|| format!("gmail api request: {url}"))?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                if attempt == MAX_RATE_LIMIT_RETRIES {
                    let body = response
                        .text()
                        .await
                        .context("read gmail 429 response body")?;
                    return Err(anyhow!(
                        "gmail api request exhausted retries: {}",
                        redact_response_body(&body)
                    ));
                }

                let retry_after_seconds = response
                    .headers()
                    .get("retry-after")
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse::<u64>().ok())
                    .unwrap_or(backoff_seconds);

                warn!("gmail rate limited, retrying in {retry_after_seconds}s");
                sleep(StdDuration::from_secs(retry_after_seconds)).await;
                backoff_seconds = (backoff_seconds * 2).min(32);
                continue;
            }

            let status = response.status();
            let body = response
                .text()
                .await
                .context("read gmail api response body")?;
            if !status.is_success() {
                return Err(anyhow!(
                    "gmail api request failed: status={} body={}",
                    status,
                    redact_response_body(&body)
                ));
            }

            return Ok(body);
        }

        Err(anyhow!("gmail api request failed without response"))
    }

    async fn list_page(&self, page_token: Option<&str>) -> Result<GmailMessageList> {
        let url = message_list_url(&self.api_base, page_token);
        let body = self.send_with_retry(Method::GET, &url, None).await?;
        serde_json::from_str(&body).context("decode gmail message list")
    }

    /// Follow `nextPageToken` until the mailbox is exhausted or `limit` ids
    /// have been collected.
    pub async fn list_message_ids(&self, limit: Option<usize>) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.list_page(page_token.as_deref()).await?;
            ids.extend(page.messages.unwrap_or_default().into_iter().map(|stub| stub.id));
            info!("fetched {} message ids so far", ids.len());

            if let Some(limit) = limit {
                if ids.len() >= limit {
                    ids.truncate(limit);
                    break;
                }
            }

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(ids)
    }

    async fn get_message(&self, message_id: &str) -> Result<GmailMessage> {
        let url = message_metadata_url(&self.api_base, message_id);
        let body = self.send_with_retry(Method::GET, &url, None).await?;
        serde_json::from_str(&body).context("decode gmail message")
    }

    /// Fetch message metadata. A message that cannot be read is reported and
    /// skipped.
    pub async fn fetch_with_report(
        &self,
        limit: Option<usize>,
    ) -> Result<(Vec<MessageRecord>, FetchReport)> {
        let ids = self.list_message_ids(limit).await?;
        let mut report = FetchReport {
            messages_listed: ids.len(),
            ..FetchReport::default()
        };
        let mut records = Vec::with_capacity(ids.len());

        for (position, id) in ids.iter().enumerate() {
            if (position + 1) % PROGRESS_EVERY == 0 {
                info!("processing message {}/{}", position + 1, ids.len());
            }

            match self.get_message(id).await {
                Ok(message) => {
                    records.push(map_gmail_message(&message));
                    report.messages_fetched += 1;
                }
                Err(error) => {
                    warn!("skipping message {id}: {error:#}");
                    report.errors.push(format!("{id}: {error:#}"));
                }
            }
        }

        Ok((records, report))
    }
}

#[async_trait(?Send)]
impl MessageSource for GmailApiConnector {
    fn name(&self) -> &str {
        "gmail_api"
    }

    async fn fetch(&self, limit: Option<usize>) -> Result<Vec<MessageRecord>> {
        let (records, report) = self.fetch_with_report(limit).await?;
        if !report.errors.is_empty() {
            warn!(
                "{} of {} messages could not be fetched",
                report.errors.len(),
                report.messages_listed
            );
        }
        Ok(records)
    }
}

#[async_trait(?Send)]
impl MessageTrasher for GmailApiConnector {
    async fn trash_batch(&self, ids: &[String]) -> Result<()> {
        let url = format!("{}/users/me/messages/batchModify", self.api_base);
        let body = trash_request_body(ids);
        self.send_with_retry(Method::POST, &url, Some(&body))
            .await
            .with_context(|| format!("move {} messages to trash", ids.len()))?;
        Ok(())
    }
}

fn message_list_url(api_base: &str, page_token: Option<&str>) -> String {
    let mut url = format!("{api_base}/users/me/messages?maxResults={LIST_PAGE_SIZE}");
    if let Some(page_token) = page_token {
        url.push_str(&format!("&pageToken={page_token}"));
    }
    url
}

fn message_metadata_url(api_base: &str, message_id: &str) -> String {
    format!(
        "{api_base}/users/me/messages/{message_id}?format=metadata\
         &metadataHeaders=Subject&metadataHeaders=From&metadataHeaders=Date"
    )
}

fn trash_request_body(ids: &[String]) -> serde_json::Value {
    json!({
        "ids": ids,
        "addLabelIds": [TRASH_LABEL],
    })
}

fn map_gmail_message(message: &GmailMessage) -> MessageRecord {
    let payload = message.payload.as_ref();
    MessageRecord {
        id: message.id.clone(),
        thread_id: message.thread_id.clone().unwrap_or_default(),
        subject: extract_header(payload, "Subject").unwrap_or_else(|| NO_SUBJECT.to_string()),
        from: extract_header(payload, "From").unwrap_or_else(|| UNKNOWN.to_string()),
        date: extract_header(payload, "Date").unwrap_or_else(|| UNKNOWN.to_string()),
        snippet: message.snippet.clone().unwrap_or_default(),
        labels: message.label_ids.clone().unwrap_or_default(),
    }
}

fn extract_header(payload: Option<&GmailPayload>, name: &str) -> Option<String> {
    payload?
        .headers
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case(name))
        .map(|header| header.value.clone())
}

// Gmail API response types: only the fields mailtally reads.

#[derive(Debug, Clone, Deserialize)]
struct GmailMessageList {
    messages: Option<Vec<GmailMessageStub>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailMessageStub {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailMessage {
    id: String,
    #[serde(rename = "threadId")]
    thread_id: Option<String>,
    #[serde(rename = "labelIds")]
    label_ids: Option<Vec<String>>,
    snippet: Option<String>,
    payload: Option<GmailPayload>,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailPayload {
    headers: Option<Vec<GmailHeader>>,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}
