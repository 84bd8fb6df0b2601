use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::connectors::MessageSource;
use crate::snapshot::{self, MessageRecord};

/// Reads records back from a snapshot written by `fetch`.
#[derive(Debug, Clone)]
pub struct JsonSnapshotSource {
    path: PathBuf,
}

impl JsonSnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait(?Send)]
impl MessageSource for JsonSnapshotSource {
    fn name(&self) -> &str {
        "json_snapshot"
    }

    async fn fetch(&self, limit: Option<usize>) -> Result<Vec<MessageRecord>> {
        let mut records = snapshot::load(&self.path)
            .with_context(|| format!("read snapshot {}", self.path.display()))?;
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }
}
