//! CRUD operations for [`Testimonial`] records.
//!
//! Creation, deletion, and reordering live in [`crate::ordering`] because
//! they cascade into `sort_order` shifts; everything here touches one row at
//! a time.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{ListFilter, NewTestimonial, Testimonial, TestimonialPatch, MAX_COLUMN_INDEX};
use crate::tweet_url;

/// Column list shared by every SELECT over the testimonials table.
pub(crate) const SELECT_COLUMNS: &str = "id, tweet_id, tweet_url, author_name, handle, \
     avatar_file_name, tweet_text, display_text, date, column_index, sort_order, \
     is_active, created_at, updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single testimonial by UUID.
    pub fn get_testimonial(&self, id: Uuid) -> Result<Testimonial> {
        self.conn()
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM testimonials WHERE id = ?1"),
                params![id.to_string()],
                row_to_testimonial,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List testimonials in global order, optionally filtered.
    ///
    /// The search term matches case-insensitively against handle, tweet text,
    /// and author name.  The record set is small, so filtering happens here
    /// rather than in SQL.
    pub fn list_testimonials(&self, filter: &ListFilter) -> Result<Vec<Testimonial>> {
        let rows = self.all_testimonials_ordered()?;

        let needle = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let filtered = rows
            .into_iter()
            .filter(|t| match &needle {
                Some(s) => {
                    t.handle.to_lowercase().contains(s)
                        || t.tweet_text.to_lowercase().contains(s)
                        || t.author_name.to_lowercase().contains(s)
                }
                None => true,
            })
            .filter(|t| match filter.is_active {
                Some(active) => t.is_active == active,
                None => true,
            })
            .collect();

        Ok(filtered)
    }

    /// All records ascending by `sort_order`, creation time as the stable
    /// tie-break should duplicate orders ever appear.
    pub(crate) fn all_testimonials_ordered(&self) -> Result<Vec<Testimonial>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM testimonials
             ORDER BY sort_order ASC, created_at ASC"
        ))?;

        let rows = stmt.query_map([], row_to_testimonial)?;

        let mut testimonials = Vec::new();
        for row in rows {
            testimonials.push(row?);
        }
        Ok(testimonials)
    }

    /// Active records only, in global order (the export projection input).
    pub fn list_active_testimonials(&self) -> Result<Vec<Testimonial>> {
        self.list_testimonials(&ListFilter {
            search: None,
            is_active: Some(true),
        })
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Apply a partial update; `None` fields keep their stored value.
    ///
    /// `column_index` is clamped to the valid bucket range and `date` is
    /// normalized before the write.  Returns the updated record.
    pub fn update_testimonial(&self, id: Uuid, patch: &TestimonialPatch) -> Result<Testimonial> {
        let existing = self.get_testimonial(id)?;

        let tweet_url = match &patch.tweet_url {
            Some(url) => {
                if !tweet_url::is_tweet_url(url) {
                    return Err(StoreError::InvalidArgument(
                        "Invalid Twitter/X tweet URL".into(),
                    ));
                }
                url.trim().to_string()
            }
            None => existing.tweet_url.clone(),
        };
        let tweet_id = tweet_url::status_id(&tweet_url).unwrap_or_default();

        let handle = match &patch.handle {
            Some(h) => validate_handle(h)?,
            None => existing.handle.clone(),
        };
        let author_name = match &patch.author_name {
            Some(n) => validate_non_empty(n, "authorName")?,
            None => existing.author_name.clone(),
        };
        let tweet_text = match &patch.tweet_text {
            Some(t) => validate_non_empty(t, "tweetText")?,
            None => existing.tweet_text.clone(),
        };
        let display_text = patch
            .display_text
            .clone()
            .unwrap_or_else(|| existing.display_text.clone());
        let date = match &patch.date {
            Some(d) => normalize_date(d)?,
            None => existing.date.clone(),
        };
        let column_index = patch
            .column_index
            .map(|c| c.clamp(0, MAX_COLUMN_INDEX))
            .unwrap_or(existing.column_index);
        let sort_order = patch.sort_order.unwrap_or(existing.sort_order);
        let is_active = patch.is_active.unwrap_or(existing.is_active);
        let avatar_file_name = patch
            .avatar_file_name
            .clone()
            .unwrap_or_else(|| existing.avatar_file_name.clone());

        let now = Utc::now();
        self.conn().execute(
            "UPDATE testimonials
             SET tweet_id = ?1, tweet_url = ?2, author_name = ?3, handle = ?4,
                 avatar_file_name = ?5, tweet_text = ?6, display_text = ?7,
                 date = ?8, column_index = ?9, sort_order = ?10, is_active = ?11,
                 updated_at = ?12
             WHERE id = ?13",
            params![
                tweet_id,
                tweet_url,
                author_name,
                handle,
                avatar_file_name,
                tweet_text,
                display_text,
                date,
                column_index,
                sort_order,
                is_active as i32,
                now.to_rfc3339(),
                id.to_string(),
            ],
        )?;

        self.get_testimonial(id)
    }

    // ------------------------------------------------------------------
    // Duplicate detection
    // ------------------------------------------------------------------

    /// Advisory duplicate check for a candidate tweet URL.
    ///
    /// A candidate is a duplicate when its normalized key matches a stored
    /// record's normalized URL, or its extracted status id matches a stored
    /// `tweet_id`.  Blank input is never a duplicate.
    pub fn check_duplicate(&self, url: &str) -> Result<bool> {
        if url.trim().is_empty() {
            return Ok(false);
        }

        let normalized_input = tweet_url::normalize(url);
        let input_status_id = tweet_url::status_id(url);

        let mut stmt = self
            .conn()
            .prepare("SELECT tweet_url, tweet_id FROM testimonials")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (stored_url, stored_id) = row?;
            if tweet_url::normalize(&stored_url) == normalized_input {
                return Ok(true);
            }
            if let Some(ref id) = input_status_id {
                if !stored_id.is_empty() && &stored_id == id {
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

/// Truncate to the leading `YYYY-MM-DD` and verify it parses as a date.
pub(crate) fn normalize_date(raw: &str) -> Result<String> {
    let head: String = raw.trim().chars().take(10).collect();
    NaiveDate::parse_from_str(&head, "%Y-%m-%d").map_err(|_| {
        StoreError::InvalidArgument(format!("Invalid date '{raw}', expected YYYY-MM-DD"))
    })?;
    Ok(head)
}

pub(crate) fn validate_handle(handle: &str) -> Result<String> {
    let trimmed = handle.trim();
    if trimmed.is_empty() || !trimmed.starts_with('@') {
        return Err(StoreError::InvalidArgument(
            "Handle must start with @".into(),
        ));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn validate_non_empty(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidArgument(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// Validate the caller-supplied fields of a new record.
pub(crate) fn validate_new(new: &NewTestimonial) -> Result<()> {
    if !tweet_url::is_tweet_url(&new.tweet_url) {
        return Err(StoreError::InvalidArgument(
            "Invalid Twitter/X tweet URL".into(),
        ));
    }
    validate_handle(&new.handle)?;
    validate_non_empty(&new.author_name, "authorName")?;
    validate_non_empty(&new.tweet_text, "tweetText")?;
    if new.avatar_file_name.trim().is_empty() {
        return Err(StoreError::InvalidArgument(
            "Avatar is required. Fetch it from the tweet or upload an image.".into(),
        ));
    }
    Ok(())
}

/// Map a `rusqlite::Row` to a [`Testimonial`].
pub(crate) fn row_to_testimonial(row: &rusqlite::Row<'_>) -> rusqlite::Result<Testimonial> {
    let id_str: String = row.get(0)?;
    let created_str: String = row.get(12)?;
    let updated_str: String = row.get(13)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(12, rusqlite::types::Type::Text, Box::new(e))
        })?;
    let updated_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&updated_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(13, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Testimonial {
        id,
        tweet_id: row.get(1)?,
        tweet_url: row.get(2)?,
        author_name: row.get(3)?,
        handle: row.get(4)?,
        avatar_file_name: row.get(5)?,
        tweet_text: row.get(6)?,
        display_text: row.get(7)?,
        date: row.get(8)?,
        column_index: row.get(9)?,
        sort_order: row.get(10)?,
        is_active: row.get::<_, i64>(11)? != 0,
        created_at,
        updated_at,
    })
}
