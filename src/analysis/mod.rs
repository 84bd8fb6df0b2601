use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

use crate::identity;

pub mod summary;

pub use summary::{percentage, SenderSummary};

pub const DEFAULT_TOP_N: usize = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("top-N must be greater than zero")]
    InvalidTopN,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SenderRecord {
    pub address: String,
    pub display_name: String,
    pub count: usize,
}

/// Senders ordered by count descending, ties in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RankedResult {
    pub senders: Vec<SenderRecord>,
    /// Non-empty headers that contributed to the counts, before truncation.
    pub headers_counted: usize,
}

impl RankedResult {
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    pub fn top_count(&self) -> usize {
        self.senders.iter().map(|sender| sender.count).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SenderRecord> {
        self.senders.iter()
    }
}

/// Accumulates sender counts keyed by normalized address.
///
/// Records live in a vector in insertion order and the map points into it,
/// so a stable sort over the vector yields the first-seen tie-break.
#[derive(Debug, Default)]
pub struct SenderAggregator {
    records: Vec<SenderRecord>,
    positions: HashMap<String, usize>,
    headers_counted: usize,
}

impl SenderAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one raw header. Blank headers, and headers that reduce to an
    /// empty address such as `< >`, are ignored.
    pub fn record(&mut self, raw: &str) {
        if raw.trim().is_empty() {
            return;
        }

        let identity = identity::extract(raw);
        if identity.address.is_empty() {
            return;
        }
        self.headers_counted += 1;

        match self.positions.get(&identity.address) {
            Some(&position) => self.records[position].count += 1,
            None => {
                self.positions
                    .insert(identity.address.clone(), self.records.len());
                self.records.push(SenderRecord {
                    address: identity.address,
                    display_name: identity.display_name,
                    count: 1,
                });
            }
        }
    }

    pub fn distinct_senders(&self) -> usize {
        self.records.len()
    }

    pub fn finish(self, top_n: usize) -> Result<RankedResult, AnalysisError> {
        if top_n == 0 {
            return Err(AnalysisError::InvalidTopN);
        }

        let mut senders = self.records;
        senders.sort_by(|a, b| b.count.cmp(&a.count));
        senders.truncate(top_n);

        Ok(RankedResult {
            senders,
            headers_counted: self.headers_counted,
        })
    }
}

pub fn aggregate<I, S>(headers: I, top_n: usize) -> Result<RankedResult, AnalysisError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    if top_n == 0 {
        return Err(AnalysisError::InvalidTopN);
    }

    let mut aggregator = SenderAggregator::new();
    for header in headers {
        aggregator.record(header.as_ref());
    }
    let distinct = aggregator.distinct_senders();
    let ranked = aggregator.finish(top_n)?;
    tracing::debug!(
        "aggregated {} headers into {} senders, keeping {}",
        ranked.headers_counted,
        distinct,
        ranked.len()
    );
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::{aggregate, AnalysisError, SenderAggregator, SenderRecord};

    fn record(address: &str, display_name: &str, count: usize) -> SenderRecord {
        SenderRecord {
            address: address.to_string(),
            display_name: display_name.to_string(),
            count,
        }
    }

    #[test]
    fn counts_and_keeps_first_seen_name() {
        let ranked = aggregate(
            ["Alice <a@x.com>", "a@x.com", "Bob <b@x.com>", "Alice <a@x.com>"],
            2,
        )
        .expect("aggregate headers");
        assert_eq!(
            ranked.senders,
            vec![record("a@x.com", "Alice", 3), record("b@x.com", "Bob", 1)]
        );
        assert_eq!(ranked.headers_counted, 4);
    }

    #[test]
    fn first_occurrence_name_wins_over_fuller_later_name() {
        let ranked = aggregate(["a@x.com", "Alice Smith <A@X.com>"], 5).expect("aggregate");
        assert_eq!(ranked.senders, vec![record("a@x.com", "a@x.com", 2)]);
    }

    #[test]
    fn ties_preserve_first_insertion_order() {
        let ranked = aggregate(
            [
                "c@x.com",
                "b@x.com",
                "a@x.com",
                "a@x.com",
                "b@x.com",
                "d@x.com",
            ],
            10,
        )
        .expect("aggregate");
        let order: Vec<&str> = ranked.iter().map(|r| r.address.as_str()).collect();
        assert_eq!(order, vec!["b@x.com", "a@x.com", "c@x.com", "d@x.com"]);
    }

    #[test]
    fn truncates_to_top_n() {
        let ranked = aggregate(["a@x.com", "b@x.com", "c@x.com"], 2).expect("aggregate");
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked.headers_counted, 3);
        assert_eq!(ranked.top_count(), 2);
    }

    #[test]
    fn empty_input_is_empty_result() {
        let ranked = aggregate(Vec::<String>::new(), 5).expect("aggregate empty");
        assert!(ranked.is_empty());
        assert_eq!(ranked.headers_counted, 0);
    }

    #[test]
    fn blank_headers_are_skipped() {
        let ranked = aggregate(["", "   ", "x@y.com"], 5).expect("aggregate");
        assert_eq!(ranked.senders, vec![record("x@y.com", "x@y.com", 1)]);
        assert_eq!(ranked.headers_counted, 1);
    }

    #[test]
    fn headers_with_empty_address_are_skipped() {
        let ranked = aggregate(["< >", "Bob <b@x.com>"], 5).expect("aggregate");
        assert_eq!(ranked.senders, vec![record("b@x.com", "Bob", 1)]);
        assert_eq!(ranked.headers_counted, 1);
    }

    #[test]
    fn malformed_headers_never_fail() {
        let ranked = aggregate(["<<<", ">>", "\"\" <>", "@", "no-email-here"], 10)
            .expect("aggregate malformed");
        assert_eq!(ranked.headers_counted, 5);
    }

    #[test]
    fn zero_top_n_is_rejected() {
        assert_eq!(
            aggregate(["a@x.com"], 0).expect_err("zero top-n"),
            AnalysisError::InvalidTopN
        );
        assert_eq!(
            SenderAggregator::new().finish(0).expect_err("zero top-n"),
            AnalysisError::InvalidTopN
        );
    }
}
