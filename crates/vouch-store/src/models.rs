//! Domain model structs persisted in the local SQLite database.
//!
//! Every struct derives `Serialize` and/or `Deserialize` so it can be handed
//! directly to the HTTP layer as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Highest export bucket index; `column_index` is clamped to `0..=MAX_COLUMN_INDEX`.
pub const MAX_COLUMN_INDEX: i64 = 4;

// ---------------------------------------------------------------------------
// Testimonial
// ---------------------------------------------------------------------------

/// A curated tweet testimonial.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Testimonial {
    /// Unique record identifier.
    pub id: Uuid,
    /// Numeric status id extracted from `tweet_url` when recognizable,
    /// empty otherwise.
    pub tweet_id: String,
    /// Canonical URL of the source tweet.
    pub tweet_url: String,
    /// Author display name.
    pub author_name: String,
    /// Author handle, always starting with `@`.
    pub handle: String,
    /// File name in the avatars directory (`<id>.<ext>`).
    pub avatar_file_name: String,
    /// Original tweet content.
    pub tweet_text: String,
    /// Public override; empty string falls back to `tweet_text`.
    pub display_text: String,
    /// Display date, normalized to `YYYY-MM-DD`.
    pub date: String,
    /// Export bucket, clamped to `0..=4`.
    pub column_index: i64,
    /// Position in the global order; dense `0..N-1` across all records.
    pub sort_order: i64,
    /// Whether the record is included in the export bundle.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    /// Refreshed on every mutation, including reorder shifts.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a testimonial.  The caller supplies the id up front so
/// the avatar file can be claimed under its final `<id>.<ext>` name before
/// the row exists.
#[derive(Debug, Clone)]
pub struct NewTestimonial {
    pub id: Uuid,
    pub tweet_url: String,
    pub author_name: String,
    pub handle: String,
    pub avatar_file_name: String,
    pub tweet_text: String,
    pub display_text: String,
    pub date: String,
    pub is_active: bool,
}

/// Partial update for an existing testimonial.  `None` fields keep the
/// stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestimonialPatch {
    pub tweet_url: Option<String>,
    pub author_name: Option<String>,
    pub handle: Option<String>,
    pub tweet_text: Option<String>,
    pub display_text: Option<String>,
    pub date: Option<String>,
    pub column_index: Option<i64>,
    pub sort_order: Option<i64>,
    pub is_active: Option<bool>,
    /// Only set server-side after a replacement upload, never from a client
    /// body.
    #[serde(skip)]
    pub avatar_file_name: Option<String>,
}

/// Listing filter for the admin table view.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Case-insensitive substring match over handle, tweet text, and author
    /// name.
    pub search: Option<String>,
    /// When set, only records with a matching active flag.
    pub is_active: Option<bool>,
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Where a new record lands in the global order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertPosition {
    /// Order 0; every existing record shifts down by one.
    Top,
    /// Appended after the current last record.
    Bottom,
    /// Immediately after the given record.
    After(Uuid),
}

/// Movement verbs understood by the reorder operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    Up,
    Down,
    Top,
    Bottom,
}
