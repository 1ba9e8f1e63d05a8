//! # vouch-store
//!
//! Local SQLite persistence for the testimonial curation tool.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for the single
//! `testimonials` table, plus the ordering engine that keeps `sort_order`
//! values dense across inserts, moves, and deletes.

pub mod database;
pub mod migrations;
pub mod models;
pub mod ordering;
pub mod testimonials;
pub mod tweet_url;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
