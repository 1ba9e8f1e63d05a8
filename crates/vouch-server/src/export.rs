//! Export packaging.
//!
//! Produces the public JSON projection of active testimonials (five fixed
//! column buckets) and bundles it with the referenced avatar files into a
//! single zip archive for the website build to consume.

use std::collections::HashSet;
use std::io::{Cursor, Write};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use vouch_store::Testimonial;

use crate::avatar_store::AvatarStore;
use crate::error::ApiError;

/// Number of layout buckets in the public projection.
pub const COLUMN_COUNT: usize = 5;

/// One testimonial as the public site sees it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicTweet {
    pub id: Uuid,
    pub profile_image: String,
    pub tweet: String,
    pub handle: String,
    pub date: String,
}

/// The `data/testimonials.json` payload.
#[derive(Debug, Serialize)]
pub struct TestimonialsJson {
    pub columns: Vec<Vec<PublicTweet>>,
}

/// Bucket active testimonials by `column_index`, preserving their global
/// order inside each bucket.  `display_text` overrides the tweet body when
/// non-empty.
pub fn build_testimonials_json(active: &[Testimonial]) -> TestimonialsJson {
    let mut columns: Vec<Vec<PublicTweet>> = (0..COLUMN_COUNT).map(|_| Vec::new()).collect();

    for t in active {
        let bucket = t.column_index.clamp(0, COLUMN_COUNT as i64 - 1) as usize;
        columns[bucket].push(PublicTweet {
            id: t.id,
            profile_image: format!("/tweets/avatars/{}", t.avatar_file_name),
            tweet: if t.display_text.is_empty() {
                t.tweet_text.clone()
            } else {
                t.display_text.clone()
            },
            handle: t.handle.clone(),
            date: t.date.clone(),
        });
    }

    TestimonialsJson { columns }
}

/// Download name for the bundle, e.g. `testimonials-20240115-0930.zip`.
pub fn bundle_file_name(now: DateTime<Utc>) -> String {
    format!("testimonials-{}.zip", now.format("%Y%m%d-%H%M"))
}

/// Build the zip bundle in memory: the JSON projection plus every referenced
/// avatar file that exists on disk.  A missing avatar is skipped, not an
/// error.
pub fn build_bundle(active: &[Testimonial], avatars: &AvatarStore) -> Result<Vec<u8>, ApiError> {
    let json = serde_json::to_string_pretty(&build_testimonials_json(active))
        .map_err(|e| ApiError::Internal(format!("Failed to serialize export JSON: {e}")))?;

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    writer
        .start_file("data/testimonials.json", options)
        .and_then(|_| writer.write_all(json.as_bytes()).map_err(Into::into))
        .map_err(|e| ApiError::Internal(format!("Failed to write export JSON: {e}")))?;

    let mut bundled: HashSet<&str> = HashSet::new();
    for t in active {
        if !bundled.insert(t.avatar_file_name.as_str()) {
            continue;
        }
        let Some(path) = avatars.existing_path(&t.avatar_file_name) else {
            warn!(file = %t.avatar_file_name, "avatar missing on disk, skipping in export");
            continue;
        };
        let data = std::fs::read(&path)
            .map_err(|e| ApiError::Storage(format!("Failed to read avatar for export: {e}")))?;

        writer
            .start_file(format!("public/tweets/avatars/{}", t.avatar_file_name), options)
            .and_then(|_| writer.write_all(&data).map_err(Into::into))
            .map_err(|e| ApiError::Internal(format!("Failed to add avatar to bundle: {e}")))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| ApiError::Internal(format!("Failed to finalize bundle: {e}")))?;

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn record(active: bool, column_index: i64, sort_order: i64, avatar: &str) -> Testimonial {
        let now = Utc::now();
        Testimonial {
            id: Uuid::new_v4(),
            tweet_id: sort_order.to_string(),
            tweet_url: format!("https://x.com/user/status/{sort_order}"),
            author_name: "User".to_string(),
            handle: format!("@user{sort_order}"),
            avatar_file_name: avatar.to_string(),
            tweet_text: "original text".to_string(),
            display_text: String::new(),
            date: "2024-01-01".to_string(),
            column_index,
            sort_order,
            is_active: active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn buckets_follow_column_index() {
        let mut a = record(true, 0, 0, "a.jpg");
        a.display_text = "curated text".to_string();
        let b = record(true, 3, 1, "b.jpg");

        let json = build_testimonials_json(&[a.clone(), b]);
        assert_eq!(json.columns.len(), COLUMN_COUNT);
        assert_eq!(json.columns[0].len(), 1);
        assert_eq!(json.columns[3].len(), 1);
        assert!(json.columns[1].is_empty());

        // display_text override and the public avatar path shape.
        assert_eq!(json.columns[0][0].tweet, "curated text");
        assert_eq!(json.columns[0][0].profile_image, "/tweets/avatars/a.jpg");
        // Empty display_text falls back to the original body.
        assert_eq!(json.columns[3][0].tweet, "original text");
    }

    #[tokio::test]
    async fn bundle_contains_json_and_existing_avatars_only() {
        let dir = tempfile::tempdir().unwrap();
        let avatars = AvatarStore::new(dir.path().to_path_buf()).await.unwrap();

        let with_file = record(true, 0, 0, "present.jpg");
        std::fs::write(dir.path().join("present.jpg"), b"jpeg-bytes").unwrap();
        let without_file = record(true, 0, 1, "missing.jpg");

        let bytes = build_bundle(&[with_file, without_file], &avatars).unwrap();

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "data/testimonials.json".to_string(),
                "public/tweets/avatars/present.jpg".to_string(),
            ]
        );

        let mut json = String::new();
        archive
            .by_name("data/testimonials.json")
            .unwrap()
            .read_to_string(&mut json)
            .unwrap();
        // Both records project into the JSON even when the avatar file is
        // missing; only the file entry is skipped.
        assert!(json.contains("/tweets/avatars/present.jpg"));
        assert!(json.contains("/tweets/avatars/missing.jpg"));
    }

    #[test]
    fn export_projects_only_active_records() {
        use vouch_store::{Database, InsertPosition, NewTestimonial};

        let dir = tempfile::tempdir().unwrap();
        let mut db = Database::open_at(&dir.path().join("t.db")).unwrap();

        let new = |active: bool, n: u64| {
            let id = Uuid::new_v4();
            NewTestimonial {
                id,
                tweet_url: format!("https://x.com/user{n}/status/{n}"),
                author_name: format!("User {n}"),
                handle: format!("@user{n}"),
                avatar_file_name: format!("{id}.jpg"),
                tweet_text: "text".to_string(),
                display_text: String::new(),
                date: "2024-01-01".to_string(),
                is_active: active,
            }
        };
        db.create_testimonial(&new(true, 1), InsertPosition::Bottom)
            .unwrap();
        db.create_testimonial(&new(false, 2), InsertPosition::Bottom)
            .unwrap();

        let active = db.list_active_testimonials().unwrap();
        let json = build_testimonials_json(&active);

        assert_eq!(json.columns[0].len(), 1);
        assert_eq!(json.columns[0][0].handle, "@user1");
    }

    #[test]
    fn bundle_name_carries_the_timestamp() {
        let at = DateTime::parse_from_rfc3339("2024-01-15T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(bundle_file_name(at), "testimonials-20240115-0930.zip");
    }
}
