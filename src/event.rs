use crate::config::Config;
use crate::error::Result;
use crate::pipeline::process_one;
use crate::storage::ObjectStore;
use crate::verbose;
use serde::Deserialize;

/// A batch of storage-creation notifications, as delivered by S3 event
/// sources. Only the bucket and key are consumed.
#[derive(Debug, Deserialize)]
pub struct NotificationEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<NotificationRecord>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Deserialize)]
pub struct S3Entity {
    pub bucket: BucketEntity,
    pub object: ObjectEntity,
}

#[derive(Debug, Deserialize)]
pub struct BucketEntity {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ObjectEntity {
    pub key: String,
}

impl NotificationEvent {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Processes every notified object concurrently. The first failure fails
/// the whole invocation, even when sibling records succeed.
pub async fn process_event(
    store: &dyn ObjectStore,
    config: &Config,
    event: &NotificationEvent,
) -> Result<()> {
    verbose!("Handling {} notification records", event.records.len());
    futures::future::try_join_all(
        event
            .records
            .iter()
            .map(|record| process_one(store, config, &record.s3.bucket.name, &record.s3.object.key)),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, StoredObject};
    use image::{DynamicImage, ImageFormat, RgbaImage};
    use std::collections::HashMap;
    use std::io::Cursor;

    const SAMPLE_EVENT: &str = r#"{
        "Records": [
            {
                "eventName": "ObjectCreated:Put",
                "s3": {
                    "bucket": { "name": "photos", "arn": "arn:aws:s3:::photos" },
                    "object": { "key": "new/cat.jpg", "size": 1024 }
                }
            },
            {
                "s3": {
                    "bucket": { "name": "uploads" },
                    "object": { "key": "dog+1.png" }
                }
            }
        ]
    }"#;

    fn test_config() -> Config {
        let vars = HashMap::from([("SOURCE_BUCKET".to_string(), "photos".to_string())]);
        Config::from_vars(&vars).unwrap()
    }

    fn tiny_png() -> Vec<u8> {
        let img = RgbaImage::from_fn(16, 16, |x, y| {
            image::Rgba([(x * 15 % 256) as u8, (y * 9 % 256) as u8, 7, 255])
        });
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_parse_notification() {
        let event = NotificationEvent::from_json(SAMPLE_EVENT).unwrap();
        assert_eq!(event.records.len(), 2);
        assert_eq!(event.records[0].s3.bucket.name, "photos");
        assert_eq!(event.records[0].s3.object.key, "new/cat.jpg");
        assert_eq!(event.records[1].s3.bucket.name, "uploads");
    }

    #[test]
    fn test_parse_empty_event() {
        let event = NotificationEvent::from_json("{}").unwrap();
        assert!(event.records.is_empty());
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(NotificationEvent::from_json("not json").is_err());
    }

    #[tokio::test]
    async fn test_process_event_handles_every_record() {
        let store = MemoryStore::new();
        store.insert(
            "photos",
            "new/cat.jpg",
            StoredObject::new(tiny_png(), Some("image/png")),
        );
        store.insert(
            "uploads",
            "dog 1.png",
            StoredObject::new(tiny_png(), Some("image/png")),
        );

        let event = NotificationEvent::from_json(SAMPLE_EVENT).unwrap();
        process_event(&store, &test_config(), &event).await.unwrap();

        // Records are processed against their own bucket, with decoded keys.
        assert!(store
            .object("photos", "new/cat.jpg")
            .unwrap()
            .metadata
            .contains_key("optimized"));
        assert!(store
            .object("uploads", "dog 1.png")
            .unwrap()
            .metadata
            .contains_key("optimized"));
    }

    #[tokio::test]
    async fn test_process_event_first_error_fails_the_batch() {
        let store = MemoryStore::new();
        // Only the second record's object exists; the first head fails.
        store.insert(
            "uploads",
            "dog 1.png",
            StoredObject::new(tiny_png(), Some("image/png")),
        );

        let event = NotificationEvent::from_json(SAMPLE_EVENT).unwrap();
        let result = process_event(&store, &test_config(), &event).await;
        assert!(result.is_err());
    }
}
