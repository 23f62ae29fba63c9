use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::coerce;

/// Audit trail entry for sensitive mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "coerce::text")]
    pub user_name: String,
    #[serde(default)]
    pub user_avatar: Option<String>,
    #[serde(default)]
    pub school_id: Option<String>,
    pub action: String,
    #[serde(default, deserialize_with = "coerce::text")]
    pub details: String,
    #[serde(default, deserialize_with = "coerce::timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Calendar entry / announcement for a school.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolEvent {
    pub id: String,
    pub school_id: String,
    pub title: String,
    #[serde(default, deserialize_with = "coerce::date")]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default, deserialize_with = "coerce::text")]
    pub message: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default, deserialize_with = "coerce::flag")]
    pub is_read: bool,
    #[serde(default, deserialize_with = "coerce::timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_notification_flag_from_text() {
        let n: Notification = serde_json::from_value(json!({
            "id": "n1", "userId": "u1", "title": "Fee due", "isRead": "f",
            "timestamp": "2024-03-01 08:00:00+00"
        }))
        .unwrap();
        assert!(!n.is_read);
        assert!(n.timestamp.is_some());
    }

    #[test]
    fn test_event_with_bad_date_keeps_record() {
        let e: SchoolEvent = serde_json::from_value(json!({
            "id": "e1", "schoolId": "s1", "title": "Sports Day", "date": "TBD"
        }))
        .unwrap();
        assert!(e.date.is_none());
    }
}
