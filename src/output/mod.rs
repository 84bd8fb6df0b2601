pub mod json;
pub mod table;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::analysis::RankedResult;

pub const DEFAULT_RESULTS_FILE: &str = "sender_analysis.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Table
        }
    }
}

pub fn format_ranked_senders(
    format: OutputFormat,
    ranked: &RankedResult,
    total_messages: usize,
) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table::format_ranked_senders(ranked, total_messages)),
        OutputFormat::Json => json::format_ranked_senders(ranked, total_messages),
    }
}

/// Where a finished ranking goes.
pub trait ResultSink {
    fn emit(&self, ranked: &RankedResult, total_messages: usize) -> Result<()>;
}

/// Prints the ranking to stdout.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleSink {
    pub format: OutputFormat,
}

impl ResultSink for ConsoleSink {
    fn emit(&self, ranked: &RankedResult, total_messages: usize) -> Result<()> {
        let rendered = format_ranked_senders(self.format, ranked, total_messages)?;
        println!("{rendered}");
        Ok(())
    }
}

/// Persists the ranking as a JSON array of `{rank, email, name, count}`.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for JsonFileSink {
    fn emit(&self, ranked: &RankedResult, _total_messages: usize) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create results directory {}", parent.display()))?;
        }
        let rendered = json::format_ranking_file(ranked)?;
        std::fs::write(&self.path, rendered)
            .with_context(|| format!("write results file {}", self.path.display()))?;
        tracing::info!("results saved to {}", self.path.display());
        Ok(())
    }
}
