use serde::{Deserialize, Serialize};

pub const NO_SUBJECT: &str = "No Subject";
pub const UNKNOWN: &str = "Unknown";

/// One message as stored in the local snapshot file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl MessageRecord {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|candidate| candidate == label)
    }
}

#[cfg(test)]
mod tests {
    use super::MessageRecord;

    #[test]
    fn missing_fields_default_when_reading() {
        let record: MessageRecord =
            serde_json::from_str(r#"{"id":"m1","from":"a@x.com"}"#).expect("decode record");
        assert_eq!(record.id, "m1");
        assert_eq!(record.from, "a@x.com");
        assert!(record.subject.is_empty());
        assert!(record.labels.is_empty());
    }

    #[test]
    fn serializes_with_snapshot_keys() {
        let record = MessageRecord {
            id: "m1".to_string(),
            thread_id: "t1".to_string(),
            labels: vec!["CATEGORY_UPDATES".to_string()],
            ..MessageRecord::default()
        };
        let value = serde_json::to_value(&record).expect("encode record");
        assert_eq!(value["thread_id"], "t1");
        assert_eq!(value["labels"][0], "CATEGORY_UPDATES");
        assert!(record.has_label("CATEGORY_UPDATES"));
        assert!(!record.has_label("INBOX"));
    }
}
