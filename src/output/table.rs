use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::analysis::{percentage, RankedResult, SenderSummary};
use crate::snapshot::MessageRecord;

const RULE_WIDTH: usize = 100;
const RANK_WIDTH: usize = 6;
const COUNT_WIDTH: usize = 8;
const PERCENT_WIDTH: usize = 12;
const NAME_WIDTH: usize = 30;

const DATE_WIDTH: usize = 30;
const FROM_WIDTH: usize = 40;
const SUBJECT_WIDTH: usize = 40;

pub const DEFAULT_PREVIEW_LIMIT: usize = 10;

pub fn format_ranked_senders(ranked: &RankedResult, total_messages: usize) -> String {
    if ranked.is_empty() {
        return "No senders found.".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!("{}\n", "=".repeat(RULE_WIDTH)));
    out.push_str(&format!("TOP {} MOST COMMON SENDERS\n", ranked.len()));
    out.push_str(&format!("{}\n", "=".repeat(RULE_WIDTH)));
    out.push_str(&format!(
        "{:<rank$} {:<count$} {:<pct$} {:<name$} {}\n",
        "Rank",
        "Count",
        "Percentage",
        "Sender Name",
        "Email Address",
        rank = RANK_WIDTH,
        count = COUNT_WIDTH,
        pct = PERCENT_WIDTH,
        name = NAME_WIDTH,
    ));
    out.push_str(&format!("{}\n", "-".repeat(RULE_WIDTH)));

    for (idx, sender) in ranked.iter().enumerate() {
        let share = format!("{:>6.2}%", percentage(sender.count, total_messages));
        out.push_str(&format!(
            "{:<rank$} {:<count$} {:<pct$} {} {}\n",
            idx + 1,
            sender.count,
            share,
            pad_to_width(&truncate_for_width(&sender.display_name, NAME_WIDTH), NAME_WIDTH),
            sender.address,
            rank = RANK_WIDTH,
            count = COUNT_WIDTH,
            pct = PERCENT_WIDTH,
        ));
    }

    out.push_str(&format!("{}\n", "=".repeat(RULE_WIDTH)));

    let summary = SenderSummary::from_ranked(ranked, total_messages);
    out.push_str(&format!(
        "\nTop {} senders account for {} emails ({:.2}% of total)",
        summary.top_senders, summary.top_count, summary.top_percentage
    ));
    out
}

pub fn format_cleanup_preview(messages: &[&MessageRecord], limit: usize) -> String {
    let shown = limit.min(messages.len());

    let mut out = String::new();
    out.push_str(&format!("{}\n", "=".repeat(RULE_WIDTH)));
    out.push_str(&format!(
        "PREVIEW OF MESSAGES TO TRASH (showing {shown} of {})\n",
        messages.len()
    ));
    out.push_str(&format!("{}\n", "=".repeat(RULE_WIDTH)));
    out.push_str(&format!(
        "{} {} {}\n",
        pad_to_width("Date", DATE_WIDTH),
        pad_to_width("From", FROM_WIDTH),
        "Subject"
    ));
    out.push_str(&format!("{}\n", "-".repeat(RULE_WIDTH)));

    for message in messages.iter().take(shown) {
        out.push_str(&format!(
            "{} {} {}\n",
            pad_to_width(&truncate_for_width(&message.date, DATE_WIDTH - 2), DATE_WIDTH),
            pad_to_width(&truncate_for_width(&message.from, FROM_WIDTH - 2), FROM_WIDTH),
            truncate_for_width(&message.subject, SUBJECT_WIDTH)
        ));
    }

    if messages.len() > shown {
        out.push_str(&format!(
            "\n... and {} more messages\n",
            messages.len() - shown
        ));
    }
    out.push_str(&"=".repeat(RULE_WIDTH));
    out
}

fn pad_to_width(value: &str, width: usize) -> String {
    let used = UnicodeWidthStr::width(value);
    if used >= width {
        return value.to_string();
    }
    format!("{value}{}", " ".repeat(width - used))
}

fn truncate_for_width(value: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(value) <= max_width {
        return value.to_string();
    }

    if max_width <= 1 {
        return "…".to_string();
    }

    let mut out = String::new();
    let mut width = 0usize;
    for c in value.chars() {
        let cw = UnicodeWidthChar::width(c).unwrap_or(0);
        if width + cw + 1 > max_width {
            break;
        }
        out.push(c);
        width += cw;
    }
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use unicode_width::UnicodeWidthStr;

    use super::{format_cleanup_preview, format_ranked_senders, truncate_for_width};
    use crate::analysis::{aggregate, RankedResult};
    use crate::snapshot::MessageRecord;

    #[test]
    fn ranking_table_has_headers_rows_and_summary() {
        let ranked = aggregate(
            [
                "Alice <a@x.com>",
                "a@x.com",
                "Bob <b@x.com>",
                "Alice <a@x.com>",
            ],
            2,
        )
        .expect("aggregate");
        let rendered = format_ranked_senders(&ranked, 4);

        assert!(rendered.contains("TOP 2 MOST COMMON SENDERS"));
        assert!(rendered.contains("Sender Name"));
        assert!(rendered.contains(" 75.00%"));
        assert!(rendered.contains("b@x.com"));
        assert!(rendered.ends_with("Top 2 senders account for 4 emails (100.00% of total)"));
    }

    #[test]
    fn long_display_names_are_truncated() {
        let header = format!("{} <long@x.com>", "N".repeat(45));
        let ranked = aggregate([header.as_str()], 1).expect("aggregate");
        let rendered = format_ranked_senders(&ranked, 1);
        let row = rendered
            .lines()
            .find(|line| line.contains("long@x.com"))
            .expect("sender row");
        assert!(row.contains(&format!("{}…", "N".repeat(29))));
        assert!(!row.contains(&"N".repeat(31)));
    }

    #[test]
    fn empty_ranking_renders_placeholder() {
        assert_eq!(
            format_ranked_senders(&RankedResult::default(), 0),
            "No senders found."
        );
    }

    #[test]
    fn truncate_respects_display_width() {
        let truncated = truncate_for_width("日本語のメールアドレス", 7);
        assert!(UnicodeWidthStr::width(truncated.as_str()) <= 7);
        assert!(truncated.ends_with('…'));
        assert_eq!(truncate_for_width("short", 30), "short");
    }

    #[test]
    fn cleanup_preview_limits_rows() {
        let records: Vec<MessageRecord> = (1..=12)
            .map(|n| MessageRecord {
                id: format!("m{n}"),
                subject: format!("Update {n}"),
                from: "noreply@service.example".to_string(),
                date: "Mon, 1 Jan 2024 10:00:00 +0000".to_string(),
                ..MessageRecord::default()
            })
            .collect();
        let refs: Vec<&MessageRecord> = records.iter().collect();

        let rendered = format_cleanup_preview(&refs, 10);
        assert!(rendered.contains("showing 10 of 12"));
        assert!(rendered.contains("Update 10"));
        assert!(!rendered.contains("Update 11"));
        assert!(rendered.contains("... and 2 more messages"));
    }
}
