use serde::Serialize;

use crate::analysis::RankedResult;

/// Share of `count` in `total`, in percent. Zero when `total` is zero.
pub fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    count as f64 / total as f64 * 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SenderSummary {
    pub total_messages: usize,
    pub top_senders: usize,
    pub top_count: usize,
    pub top_percentage: f64,
}

impl SenderSummary {
    pub fn from_ranked(ranked: &RankedResult, total_messages: usize) -> Self {
        let top_count = ranked.top_count();
        Self {
            total_messages,
            top_senders: ranked.len(),
            top_count,
            top_percentage: percentage(top_count, total_messages),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{percentage, SenderSummary};
    use crate::analysis::aggregate;

    #[test]
    fn percentage_handles_zero_total() {
        assert_eq!(percentage(3, 0), 0.0);
        assert!((percentage(1, 4) - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn summary_sums_top_counts() {
        let ranked = aggregate(["a@x.com", "a@x.com", "b@x.com", "c@x.com"], 2)
            .expect("aggregate");
        let summary = SenderSummary::from_ranked(&ranked, 8);
        assert_eq!(summary.top_senders, 2);
        assert_eq!(summary.top_count, 3);
        assert!((summary.top_percentage - 37.5).abs() < 1e-9);
    }
}
