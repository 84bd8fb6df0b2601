use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod models;

pub use models::MessageRecord;

pub const DEFAULT_SNAPSHOT_FILE: &str = "emails.json";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("{} not found; run `mailtally fetch` first", .0.display())]
    Missing(PathBuf),

    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("filesystem: {0}")]
    Io(#[from] std::io::Error),
}

pub fn load(path: &Path) -> Result<Vec<MessageRecord>, SnapshotError> {
    let raw = std::fs::read_to_string(path).map_err(|error| {
        if error.kind() == std::io::ErrorKind::NotFound {
            SnapshotError::Missing(path.to_path_buf())
        } else {
            SnapshotError::Io(error)
        }
    })?;

    let records: Vec<MessageRecord> =
        serde_json::from_str(&raw).map_err(|source| SnapshotError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    tracing::info!("loaded {} messages from {}", records.len(), path.display());
    Ok(records)
}

pub fn save(path: &Path, records: &[MessageRecord]) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, records).map_err(|source| SnapshotError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
