use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::connectors::MessageTrasher;
use crate::snapshot::MessageRecord;

pub const DEFAULT_LABEL: &str = "CATEGORY_UPDATES";
pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub would_trash: usize,
    pub trashed: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

pub fn parse_cutoff(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid cutoff date '{raw}', expected YYYY-MM-DD"))
}

/// Parse an RFC 2822 `Date` header, ignoring a trailing `(zone)` comment
/// and the leading day name, which senders often get wrong.
pub fn parse_message_date(raw: &str) -> Option<DateTime<Utc>> {
    let mut value = raw.trim();
    if value.ends_with(')') {
        if let Some(open) = value.rfind('(') {
            value = value[..open].trim_end();
        }
    }
    if let Some((day, rest)) = value.split_once(',') {
        if day.trim().chars().all(|c| c.is_ascii_alphabetic()) {
            value = rest.trim_start();
        }
    }

    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Records labelled `label` whose date falls strictly before `cutoff`
/// (midnight UTC). Records with unreadable dates are left alone.
pub fn select_before<'a>(
    records: &'a [MessageRecord],
    label: &str,
    cutoff: NaiveDate,
) -> Vec<&'a MessageRecord> {
    let cutoff = cutoff.and_time(chrono::NaiveTime::MIN).and_utc();

    records
        .iter()
        .filter(|record| record.has_label(label))
        .filter(|record| match parse_message_date(&record.date) {
            Some(sent) => sent < cutoff,
            None => {
                warn!("skipping message {}: unreadable date '{}'", record.id, record.date);
                false
            }
        })
        .collect()
}

/// Trash `ids` in chunks of `batch_size`. A failing chunk is recorded and
/// the remaining chunks still run.
pub async fn trash_in_batches<T>(
    trasher: &T,
    ids: &[String],
    batch_size: usize,
    dry_run: bool,
) -> Result<CleanupReport>
where
    T: MessageTrasher + ?Sized,
{
    if batch_size == 0 {
        bail!("batch size must be greater than zero");
    }

    let mut report = CleanupReport {
        would_trash: ids.len(),
        ..CleanupReport::default()
    };
    if ids.is_empty() || dry_run {
        return Ok(report);
    }

    for batch in ids.chunks(batch_size) {
        match trasher.trash_batch(batch).await {
            Ok(()) => {
                report.trashed += batch.len();
                info!("moved {}/{} messages to trash", report.trashed, ids.len());
            }
            Err(error) => {
                warn!("failed to trash batch of {}: {error:#}", batch.len());
                report.failed += batch.len();
                report.errors.push(format!("{error:#}"));
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::NaiveDate;

    use super::{parse_cutoff, parse_message_date, select_before, trash_in_batches};
    use crate::connectors::MessageTrasher;
    use crate::snapshot::MessageRecord;

    #[derive(Default)]
    struct RecordingTrasher {
        calls: RefCell<Vec<Vec<String>>>,
        fail_on_call: Option<usize>,
    }

    #[async_trait(?Send)]
    impl MessageTrasher for RecordingTrasher {
        async fn trash_batch(&self, ids: &[String]) -> Result<()> {
            let mut calls = self.calls.borrow_mut();
            calls.push(ids.to_vec());
            if self.fail_on_call == Some(calls.len()) {
                return Err(anyhow!("simulated http 500"));
            }
            Ok(())
        }
    }

    fn ids(count: usize) -> Vec<String> {
        (1..=count).map(|n| format!("m{n}")).collect()
    }

    fn message(id: &str, date: &str, labels: &[&str]) -> MessageRecord {
        MessageRecord {
            id: id.to_string(),
            date: date.to_string(),
            labels: labels.iter().map(|label| label.to_string()).collect(),
            ..MessageRecord::default()
        }
    }

    #[test]
    fn cutoff_must_be_iso_date() {
        assert_eq!(
            parse_cutoff(" 2024-01-01 ").expect("parse cutoff"),
            NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date")
        );
        assert!(parse_cutoff("01/02/2024").is_err());
    }

    #[test]
    fn message_dates_tolerate_zone_comments() {
        let plain = parse_message_date("Tue, 2 Jan 2024 09:30:00 +0000").expect("plain date");
        let commented =
            parse_message_date("Tue, 2 Jan 2024 09:30:00 +0000 (UTC)").expect("commented date");
        assert_eq!(plain, commented);
        assert!(parse_message_date("Unknown").is_none());
    }

    #[test]
    fn message_dates_ignore_a_wrong_day_name() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 2)
            .expect("valid date")
            .and_hms_opt(9, 30, 0)
            .expect("valid time")
            .and_utc();
        assert_eq!(
            parse_message_date("Mon, 2 Jan 2024 09:30:00 +0000"),
            Some(expected)
        );
        assert_eq!(
            parse_message_date("2 Jan 2024 09:30:00 +0000"),
            Some(expected)
        );
    }

    #[test]
    fn selects_labelled_messages_strictly_before_cutoff() {
        let records = vec![
            message("old", "Sun, 31 Dec 2023 23:59:59 +0000", &["CATEGORY_UPDATES"]),
            message("edge", "Mon, 1 Jan 2024 00:00:00 +0000", &["CATEGORY_UPDATES"]),
            message("other-label", "Fri, 1 Dec 2023 10:00:00 +0000", &["INBOX"]),
            message("bad-date", "Unknown", &["CATEGORY_UPDATES"]),
            message("offset", "Mon, 1 Jan 2024 00:30:00 +0200", &["INBOX", "CATEGORY_UPDATES"]),
        ];
        let cutoff = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");

        let selected: Vec<&str> = select_before(&records, "CATEGORY_UPDATES", cutoff)
            .into_iter()
            .map(|record| record.id.as_str())
            .collect();
        assert_eq!(selected, vec!["old", "offset"]);
    }

    #[tokio::test]
    async fn trashes_in_chunks() {
        let trasher = RecordingTrasher::default();
        let report = trash_in_batches(&trasher, &ids(5), 2, false)
            .await
            .expect("trash batches");
        assert_eq!(trasher.calls.borrow().len(), 3);
        assert_eq!(trasher.calls.borrow()[2], vec!["m5".to_string()]);
        assert_eq!(report.trashed, 5);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn failing_batch_does_not_stop_later_batches() {
        let trasher = RecordingTrasher {
            fail_on_call: Some(1),
            ..RecordingTrasher::default()
        };
        let report = trash_in_batches(&trasher, &ids(5), 2, false)
            .await
            .expect("trash batches");
        assert_eq!(trasher.calls.borrow().len(), 3);
        assert_eq!(report.failed, 2);
        assert_eq!(report.trashed, 3);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("simulated"));
    }

    #[tokio::test]
    async fn dry_run_makes_no_calls() {
        let trasher = RecordingTrasher::default();
        let report = trash_in_batches(&trasher, &ids(3), 100, true)
            .await
            .expect("dry run");
        assert!(trasher.calls.borrow().is_empty());
        assert_eq!(report.would_trash, 3);
        assert_eq!(report.trashed, 0);
    }

    #[tokio::test]
    async fn empty_ids_and_zero_batch() {
        let trasher = RecordingTrasher::default();
        let report = trash_in_batches(&trasher, &[], 100, false)
            .await
            .expect("no ids");
        assert_eq!(report.would_trash, 0);
        assert!(trasher.calls.borrow().is_empty());

        assert!(trash_in_batches(&trasher, &ids(1), 0, false).await.is_err());
    }
}
