use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::snapshot::MessageRecord;

pub mod gmail_api;
pub mod json_snapshot;
pub mod oauth;

pub use gmail_api::GmailApiConnector;
pub use json_snapshot::JsonSnapshotSource;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    pub messages_listed: usize,
    pub messages_fetched: usize,
    pub errors: Vec<String>,
}

/// Anything that can supply message records: a local snapshot or a mailbox.
#[async_trait(?Send)]
pub trait MessageSource {
    fn name(&self) -> &str;

    /// Fetch up to `limit` records (all when `None`), in source order.
    async fn fetch(&self, limit: Option<usize>) -> Result<Vec<MessageRecord>>;
}

/// Moves messages to trash. One call handles one batch of ids.
#[async_trait(?Send)]
pub trait MessageTrasher {
    async fn trash_batch(&self, ids: &[String]) -> Result<()>;
}
