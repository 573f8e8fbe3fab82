use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// A to-do item as stored in the remote `todos` table
///
/// `id` is assigned by the remote store on first insert and is never set
/// locally, so it is only readable. The image path is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<i64>,

    pub title: String,

    pub done: bool,

    /// Path of the attached image inside the blob store
    #[serde(rename = "image_url", default, skip_serializing_if = "Option::is_none")]
    image_path: Option<String>,
}

impl TodoRecord {
    /// A new, not yet persisted record
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            done: false,
            image_path: None,
        }
    }

    /// Row as returned by a remote store. Only store implementations should
    /// need this; everything else receives ids from the store.
    pub fn persisted(
        id: i64,
        title: impl Into<String>,
        done: bool,
        image_path: Option<String>,
    ) -> Self {
        Self {
            id: Some(id),
            title: title.into(),
            done,
            image_path,
        }
    }

    pub fn with_image_path(mut self, image_path: Option<String>) -> Self {
        self.image_path = image_path;
        self
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn image_path(&self) -> Option<&str> {
        self.image_path.as_deref()
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// The server-assigned id, or `InvalidState` for a record that was never
    /// confirmed by the remote store
    pub fn require_id(&self) -> Result<i64> {
        self.id.ok_or_else(|| {
            SyncError::invalid_state(format!(
                "to-do '{}' has no id; it was never confirmed by the remote store",
                self.title
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_record_is_unpersisted() {
        let record = TodoRecord::new("Go for a run");
        assert_eq!(record.id(), None);
        assert!(!record.done);
        assert_eq!(record.image_path(), None);
        assert!(record.require_id().unwrap_err().is_invalid_state());
    }

    #[test]
    fn test_insert_body_omits_absent_fields() {
        let record = TodoRecord::new("Study for Chemistry quiz");
        let body = serde_json::to_value(&record).unwrap();
        assert_eq!(body, json!({ "title": "Study for Chemistry quiz", "done": false }));
    }

    #[test]
    fn test_image_path_uses_wire_name() {
        let record = TodoRecord::new("Photo").with_image_path(Some("abc.jpeg".to_string()));
        let body = serde_json::to_value(&record).unwrap();
        assert_eq!(body["image_url"], "abc.jpeg");
        assert!(body.get("image_path").is_none());
    }

    #[test]
    fn test_decode_row_from_store() {
        let row = json!({ "id": 7, "title": "A", "done": true, "image_url": null });
        let record: TodoRecord = serde_json::from_value(row).unwrap();
        assert_eq!(record, TodoRecord::persisted(7, "A", true, None));
        assert_eq!(record.require_id().unwrap(), 7);

        let row = json!({ "id": 8, "title": "B", "done": false, "image_url": "x.png" });
        let record: TodoRecord = serde_json::from_value(row).unwrap();
        assert_eq!(record.image_path(), Some("x.png"));
    }

    #[test]
    fn test_decode_rejects_missing_title() {
        let row = json!({ "id": 1, "done": false });
        assert!(serde_json::from_value::<TodoRecord>(row).is_err());
    }
}
