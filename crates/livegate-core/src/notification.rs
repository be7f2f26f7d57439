//! Notification model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One push-delivered notification.
///
/// `id` is stable across redeliveries and reconnects; the local list is keyed
/// on it for de-duplication and for read/delete targeting. `title` and
/// `message` are opaque display strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Server-assigned identifier, unique per notification.
    pub id: u64,
    /// Short display title.
    pub title: String,
    /// Display body.
    pub message: String,
    /// Server-assigned creation time; drives display ordering.
    pub created_at: DateTime<Utc>,
    /// Read flag. Flipped optimistically by mark-as-read, rolled back when the
    /// server rejects the confirmation.
    #[serde(default)]
    pub is_read: bool,
}

impl Notification {
    /// Create an unread notification.
    pub fn new(
        id: u64,
        title: impl Into<String>,
        message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            message: message.into(),
            created_at,
            is_read: false,
        }
    }

    /// Set the read flag.
    pub fn with_read(mut self, read: bool) -> Self {
        self.is_read = read;
        self
    }

    /// Display-order comparison: newest first, higher id first on equal
    /// timestamps so the order is total and stable across reconnects.
    pub fn display_order(&self, other: &Self) -> Ordering {
        other
            .created_at
            .cmp(&self.created_at)
            .then(other.id.cmp(&self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, secs).unwrap()
    }

    #[test]
    fn deserializes_camel_case_wire_format() {
        let json = r#"{
            "id": 42,
            "title": "Tickets released",
            "message": "Front row seats are back on sale",
            "createdAt": "2025-06-01T12:00:05Z",
            "isRead": true
        }"#;
        let n: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(n.id, 42);
        assert_eq!(n.title, "Tickets released");
        assert_eq!(n.created_at, ts(5));
        assert!(n.is_read);
    }

    #[test]
    fn missing_read_flag_defaults_to_unread() {
        let json = r#"{
            "id": 7,
            "title": "t",
            "message": "m",
            "createdAt": "2025-06-01T12:00:00Z"
        }"#;
        let n: Notification = serde_json::from_str(json).unwrap();
        assert!(!n.is_read);
    }

    #[test]
    fn serializes_camel_case_fields() {
        let n = Notification::new(1, "t", "m", ts(0));
        let value = serde_json::to_value(&n).unwrap();
        assert!(value.get("createdAt").is_some());
        assert!(value.get("isRead").is_some());
        assert!(value.get("created_at").is_none());
    }

    #[test]
    fn display_order_is_newest_first() {
        let older = Notification::new(1, "t", "m", ts(0));
        let newer = Notification::new(2, "t", "m", ts(10));
        assert_eq!(newer.display_order(&older), Ordering::Less);
        assert_eq!(older.display_order(&newer), Ordering::Greater);
    }

    #[test]
    fn display_order_breaks_timestamp_ties_by_id() {
        let a = Notification::new(3, "t", "m", ts(5));
        let b = Notification::new(9, "t", "m", ts(5));
        assert_eq!(b.display_order(&a), Ordering::Less);
        assert_eq!(a.display_order(&a.clone()), Ordering::Equal);
    }
}
