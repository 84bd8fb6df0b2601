use anyhow::Result;
use serde::Serialize;

use crate::analysis::{percentage, RankedResult, SenderSummary};

#[derive(Debug, Serialize)]
struct RankedEntry<'a> {
    rank: usize,
    email: &'a str,
    name: &'a str,
    count: usize,
}

#[derive(Debug, Serialize)]
struct ConsoleEntry<'a> {
    #[serde(flatten)]
    entry: RankedEntry<'a>,
    percentage: f64,
}

#[derive(Debug, Serialize)]
struct ConsolePayload<'a> {
    summary: SenderSummary,
    senders: Vec<ConsoleEntry<'a>>,
}

fn entries(ranked: &RankedResult) -> impl Iterator<Item = RankedEntry<'_>> {
    ranked
        .iter()
        .enumerate()
        .map(|(idx, sender)| RankedEntry {
            rank: idx + 1,
            email: &sender.address,
            name: &sender.display_name,
            count: sender.count,
        })
}

/// Body of the persisted results file.
pub fn format_ranking_file(ranked: &RankedResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(&entries(ranked).collect::<Vec<_>>())?)
}

pub fn format_ranked_senders(ranked: &RankedResult, total_messages: usize) -> Result<String> {
    let payload = ConsolePayload {
        summary: SenderSummary::from_ranked(ranked, total_messages),
        senders: entries(ranked)
            .map(|entry| ConsoleEntry {
                percentage: percentage(entry.count, total_messages),
                entry,
            })
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&payload)?)
}
