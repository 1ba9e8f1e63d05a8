//! The ordering engine.
//!
//! `sort_order` values form a dense, zero-based global sequence `{0..N-1}`
//! across all testimonials.  Every operation that shifts more than one row
//! runs inside a single transaction, so a crash can never leave a partial
//! renumbering behind.
//!
//! Shift-then-place keeps order values small integers at the cost of O(N)
//! writes per insert or move-to-end; N is tens of records and mutations are
//! admin-triggered.

use chrono::Utc;
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{InsertPosition, MoveDirection, NewTestimonial, Testimonial};
use crate::testimonials::{normalize_date, validate_new};
use crate::tweet_url;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new testimonial at the requested position.
    ///
    /// The sibling shifts and the insert commit together.  `After` fails
    /// with [`StoreError::InvalidArgument`] when the anchor record does not
    /// exist.
    pub fn create_testimonial(
        &mut self,
        new: &NewTestimonial,
        position: InsertPosition,
    ) -> Result<Testimonial> {
        validate_new(new)?;
        let date = normalize_date(&new.date)?;
        let tweet_id = tweet_url::status_id(&new.tweet_url).unwrap_or_default();

        let now = Utc::now().to_rfc3339();
        let tx = self.conn_mut().transaction()?;

        let count: i64 = tx.query_row("SELECT COUNT(*) FROM testimonials", [], |row| row.get(0))?;

        let sort_order = match position {
            InsertPosition::Top => {
                tx.execute(
                    "UPDATE testimonials SET sort_order = sort_order + 1, updated_at = ?1",
                    params![now],
                )?;
                0
            }
            InsertPosition::Bottom => count,
            InsertPosition::After(after_id) => {
                let after_order: i64 = tx
                    .query_row(
                        "SELECT sort_order FROM testimonials WHERE id = ?1",
                        params![after_id.to_string()],
                        |row| row.get(0),
                    )
                    .map_err(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => StoreError::InvalidArgument(
                            "Invalid insertPosition: afterId not found".into(),
                        ),
                        other => StoreError::Sqlite(other),
                    })?;
                let target = after_order + 1;
                tx.execute(
                    "UPDATE testimonials
                     SET sort_order = sort_order + 1, updated_at = ?1
                     WHERE sort_order >= ?2",
                    params![now, target],
                )?;
                target
            }
        };

        tx.execute(
            "INSERT INTO testimonials
                 (id, tweet_id, tweet_url, author_name, handle, avatar_file_name,
                  tweet_text, display_text, date, column_index, sort_order,
                  is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                new.id.to_string(),
                tweet_id,
                new.tweet_url.trim(),
                new.author_name.trim(),
                new.handle.trim(),
                new.avatar_file_name,
                new.tweet_text,
                new.display_text,
                date,
                0i64,
                sort_order,
                new.is_active as i32,
                now,
                now,
            ],
        )?;

        tx.commit()?;

        tracing::info!(id = %new.id, sort_order, "created testimonial");

        self.get_testimonial(new.id)
    }

    // ------------------------------------------------------------------
    // Move
    // ------------------------------------------------------------------

    /// Move a record within the global order.
    ///
    /// `Up`/`Down` swap with the neighbour and are no-ops at the boundary;
    /// `Top`/`Bottom` shift every record between the old and new position.
    /// Fails with [`StoreError::NotFound`] for an unknown id.
    pub fn move_testimonial(&mut self, id: Uuid, direction: MoveDirection) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let id_str = id.to_string();
        let tx = self.conn_mut().transaction()?;

        let seq: Vec<(String, i64)> = {
            let mut stmt = tx.prepare(
                "SELECT id, sort_order FROM testimonials
                 ORDER BY sort_order ASC, created_at ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            let mut seq = Vec::new();
            for row in rows {
                seq.push(row?);
            }
            seq
        };

        let idx = seq
            .iter()
            .position(|(rid, _)| rid == &id_str)
            .ok_or(StoreError::NotFound)?;
        let current_order = seq[idx].1;

        match direction {
            MoveDirection::Up | MoveDirection::Down => {
                let swap_idx = if direction == MoveDirection::Up {
                    idx.checked_sub(1)
                } else {
                    Some(idx + 1).filter(|&i| i < seq.len())
                };

                // Out of bounds: success, no change.
                let Some(swap_idx) = swap_idx else {
                    return Ok(());
                };

                let (other_id, other_order) = &seq[swap_idx];
                tx.execute(
                    "UPDATE testimonials SET sort_order = ?1, updated_at = ?2 WHERE id = ?3",
                    params![other_order, now, id_str],
                )?;
                tx.execute(
                    "UPDATE testimonials SET sort_order = ?1, updated_at = ?2 WHERE id = ?3",
                    params![current_order, now, other_id],
                )?;
            }
            MoveDirection::Top => {
                tx.execute(
                    "UPDATE testimonials
                     SET sort_order = sort_order + 1, updated_at = ?1
                     WHERE sort_order < ?2",
                    params![now, current_order],
                )?;
                tx.execute(
                    "UPDATE testimonials SET sort_order = 0, updated_at = ?1 WHERE id = ?2",
                    params![now, id_str],
                )?;
            }
            MoveDirection::Bottom => {
                tx.execute(
                    "UPDATE testimonials
                     SET sort_order = sort_order - 1, updated_at = ?1
                     WHERE sort_order > ?2",
                    params![now, current_order],
                )?;
                tx.execute(
                    "UPDATE testimonials SET sort_order = ?1, updated_at = ?2 WHERE id = ?3",
                    params![seq.len() as i64 - 1, now, id_str],
                )?;
            }
        }

        tx.commit()?;

        tracing::debug!(id = %id, ?direction, "moved testimonial");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a record and compact the tail so the order stays dense.
    pub fn delete_testimonial(&mut self, id: Uuid) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn_mut().transaction()?;

        let order: i64 = tx
            .query_row(
                "SELECT sort_order FROM testimonials WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        tx.execute(
            "DELETE FROM testimonials WHERE id = ?1",
            params![id.to_string()],
        )?;
        tx.execute(
            "UPDATE testimonials
             SET sort_order = sort_order - 1, updated_at = ?1
             WHERE sort_order > ?2",
            params![now, order],
        )?;

        tx.commit()?;

        tracing::info!(id = %id, "deleted testimonial");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testimonials::SELECT_COLUMNS;

    fn open_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (db, dir)
    }

    fn sample(n: u64) -> NewTestimonial {
        let id = Uuid::new_v4();
        NewTestimonial {
            id,
            tweet_url: format!("https://x.com/user{n}/status/{n}"),
            author_name: format!("User {n}"),
            handle: format!("@user{n}"),
            avatar_file_name: format!("{id}.jpg"),
            tweet_text: format!("tweet number {n}"),
            display_text: String::new(),
            date: "2024-01-01".to_string(),
            is_active: true,
        }
    }

    /// The set of sort_order values must be exactly {0..N-1}.
    fn assert_dense(db: &Database) {
        let mut orders: Vec<i64> = {
            let mut stmt = db
                .conn()
                .prepare("SELECT sort_order FROM testimonials")
                .unwrap();
            let rows = stmt.query_map([], |row| row.get(0)).unwrap();
            rows.map(|r| r.unwrap()).collect()
        };
        orders.sort_unstable();
        let expected: Vec<i64> = (0..orders.len() as i64).collect();
        assert_eq!(orders, expected, "sort_order values must be dense");
    }

    fn ordered_handles(db: &Database) -> Vec<String> {
        let mut stmt = db
            .conn()
            .prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM testimonials ORDER BY sort_order ASC"
            ))
            .unwrap();
        let rows = stmt
            .query_map([], crate::testimonials::row_to_testimonial)
            .unwrap();
        rows.map(|r| r.unwrap().handle).collect()
    }

    #[test]
    fn order_stays_dense_through_inserts_and_moves() {
        let (mut db, _dir) = open_db();

        let a = db.create_testimonial(&sample(1), InsertPosition::Bottom).unwrap();
        assert_dense(&db);
        db.create_testimonial(&sample(2), InsertPosition::Top).unwrap();
        assert_dense(&db);
        let c = db
            .create_testimonial(&sample(3), InsertPosition::After(a.id))
            .unwrap();
        assert_dense(&db);
        db.create_testimonial(&sample(4), InsertPosition::Bottom).unwrap();
        assert_dense(&db);

        db.move_testimonial(c.id, MoveDirection::Up).unwrap();
        assert_dense(&db);
        db.move_testimonial(c.id, MoveDirection::Bottom).unwrap();
        assert_dense(&db);
        db.move_testimonial(a.id, MoveDirection::Top).unwrap();
        assert_dense(&db);
        db.move_testimonial(a.id, MoveDirection::Down).unwrap();
        assert_dense(&db);
    }

    #[test]
    fn insert_top_shifts_everything() {
        let (mut db, _dir) = open_db();
        db.create_testimonial(&sample(1), InsertPosition::Bottom).unwrap();
        db.create_testimonial(&sample(2), InsertPosition::Bottom).unwrap();
        db.create_testimonial(&sample(3), InsertPosition::Top).unwrap();

        assert_eq!(ordered_handles(&db), vec!["@user3", "@user1", "@user2"]);
        assert_dense(&db);
    }

    #[test]
    fn insert_after_places_and_shifts_exactly_the_tail() {
        let (mut db, _dir) = open_db();
        let a = db.create_testimonial(&sample(1), InsertPosition::Bottom).unwrap();
        let b = db.create_testimonial(&sample(2), InsertPosition::Bottom).unwrap();
        let c = db.create_testimonial(&sample(3), InsertPosition::Bottom).unwrap();
        assert_eq!(a.sort_order, 0);

        let inserted = db
            .create_testimonial(&sample(4), InsertPosition::After(a.id))
            .unwrap();
        assert_eq!(inserted.sort_order, 1);

        // The records before the anchor keep their orders; the tail shifts
        // up by exactly one.
        assert_eq!(db.get_testimonial(a.id).unwrap().sort_order, 0);
        assert_eq!(db.get_testimonial(b.id).unwrap().sort_order, 2);
        assert_eq!(db.get_testimonial(c.id).unwrap().sort_order, 3);
        assert_dense(&db);
    }

    #[test]
    fn insert_after_unknown_anchor_is_invalid() {
        let (mut db, _dir) = open_db();
        db.create_testimonial(&sample(1), InsertPosition::Bottom).unwrap();

        let err = db
            .create_testimonial(&sample(2), InsertPosition::After(Uuid::new_v4()))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));

        // The failed insert must not have shifted anything.
        assert_dense(&db);
        assert_eq!(ordered_handles(&db).len(), 1);
    }

    #[test]
    fn boundary_moves_are_noops() {
        let (mut db, _dir) = open_db();
        let a = db.create_testimonial(&sample(1), InsertPosition::Bottom).unwrap();
        let b = db.create_testimonial(&sample(2), InsertPosition::Bottom).unwrap();

        db.move_testimonial(a.id, MoveDirection::Up).unwrap();
        db.move_testimonial(b.id, MoveDirection::Down).unwrap();

        assert_eq!(db.get_testimonial(a.id).unwrap().sort_order, 0);
        assert_eq!(db.get_testimonial(b.id).unwrap().sort_order, 1);
    }

    #[test]
    fn move_to_top_is_idempotent() {
        let (mut db, _dir) = open_db();
        db.create_testimonial(&sample(1), InsertPosition::Bottom).unwrap();
        db.create_testimonial(&sample(2), InsertPosition::Bottom).unwrap();
        let c = db.create_testimonial(&sample(3), InsertPosition::Bottom).unwrap();

        db.move_testimonial(c.id, MoveDirection::Top).unwrap();
        let once = ordered_handles(&db);
        db.move_testimonial(c.id, MoveDirection::Top).unwrap();
        let twice = ordered_handles(&db);

        assert_eq!(once, twice);
        assert_eq!(twice, vec!["@user3", "@user1", "@user2"]);
        assert_dense(&db);
    }

    #[test]
    fn up_down_swap_neighbours() {
        let (mut db, _dir) = open_db();
        db.create_testimonial(&sample(1), InsertPosition::Bottom).unwrap();
        let b = db.create_testimonial(&sample(2), InsertPosition::Bottom).unwrap();
        db.create_testimonial(&sample(3), InsertPosition::Bottom).unwrap();

        db.move_testimonial(b.id, MoveDirection::Up).unwrap();
        assert_eq!(ordered_handles(&db), vec!["@user2", "@user1", "@user3"]);

        db.move_testimonial(b.id, MoveDirection::Down).unwrap();
        assert_eq!(ordered_handles(&db), vec!["@user1", "@user2", "@user3"]);
        assert_dense(&db);
    }

    #[test]
    fn move_unknown_id_is_not_found() {
        let (mut db, _dir) = open_db();
        db.create_testimonial(&sample(1), InsertPosition::Bottom).unwrap();
        assert!(matches!(
            db.move_testimonial(Uuid::new_v4(), MoveDirection::Up),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn delete_compacts_the_tail() {
        let (mut db, _dir) = open_db();
        let a = db.create_testimonial(&sample(1), InsertPosition::Bottom).unwrap();
        let b = db.create_testimonial(&sample(2), InsertPosition::Bottom).unwrap();
        let c = db.create_testimonial(&sample(3), InsertPosition::Bottom).unwrap();

        db.delete_testimonial(b.id).unwrap();

        assert_eq!(db.get_testimonial(a.id).unwrap().sort_order, 0);
        assert_eq!(db.get_testimonial(c.id).unwrap().sort_order, 1);
        assert_dense(&db);

        assert!(matches!(
            db.delete_testimonial(b.id),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn create_rejects_missing_fields() {
        let (mut db, _dir) = open_db();

        let mut bad = sample(1);
        bad.tweet_url = "https://example.com/not-a-tweet".to_string();
        assert!(matches!(
            db.create_testimonial(&bad, InsertPosition::Bottom),
            Err(StoreError::InvalidArgument(_))
        ));

        let mut bad = sample(2);
        bad.avatar_file_name = String::new();
        assert!(matches!(
            db.create_testimonial(&bad, InsertPosition::Bottom),
            Err(StoreError::InvalidArgument(_))
        ));

        let mut bad = sample(3);
        bad.date = "yesterday".to_string();
        assert!(matches!(
            db.create_testimonial(&bad, InsertPosition::Bottom),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn create_extracts_status_id() {
        let (mut db, _dir) = open_db();
        let created = db
            .create_testimonial(&sample(42), InsertPosition::Bottom)
            .unwrap();
        assert_eq!(created.tweet_id, "42");
    }
}
