//! Persistence port.
//!
//! `DataStore` is the contract the Resolver writes through. Two backends
//! implement it: `MemoryStore` (keyed maps plus secondary indexes) and
//! `SqliteStore` (normalized tables over rusqlite). Both must return the
//! same logical result set for the same stored state, and every call is
//! atomic from the Resolver's point of view.

use thiserror::Error;

use crate::models::*;

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage contract over all entities. Implementations are selected once at
/// construction time and are invisible to the Resolver afterwards.
pub trait DataStore: Send + Sync {
    // ==================== Users ====================

    /// Insert a new account. Duplicate usernames are rejected with
    /// `Conflict`, and the first account ever inserted gets the admin flag;
    /// both decisions happen inside one critical section so concurrent
    /// registrations cannot race each other.
    fn add_user(&self, username: &str, password_digest: &str) -> StoreResult<User>;
    fn get_user(&self, username: &str) -> StoreResult<User>;
    fn get_users(&self) -> StoreResult<Vec<User>>;

    // ==================== Albums ====================

    fn add_album(&self, album: &Album) -> StoreResult<()>;
    fn get_album(&self, id: i64) -> StoreResult<Album>;
    fn get_albums(&self, author: &str) -> StoreResult<Vec<Album>>;
    fn update_album_description(&self, id: i64, description: &str) -> StoreResult<()>;

    // ==================== Photos ====================

    fn add_photo(&self, photo: &Photo) -> StoreResult<()>;
    fn get_photo(&self, id: i64) -> StoreResult<Photo>;
    fn get_photos_by_author(&self, author: &str) -> StoreResult<Vec<Photo>>;
    fn get_photos_in_album(&self, album_id: i64) -> StoreResult<Vec<Photo>>;
    /// Hard delete. Removes the photo, its ratings, every comment in its
    /// comment tree, and any notifications referencing removed content.
    fn remove_photo(&self, id: i64) -> StoreResult<()>;
    /// Upsert: a user's previous rating on the photo, if any, is replaced.
    fn rate_photo(&self, photo_id: i64, user: &str, up: bool) -> StoreResult<()>;

    // ==================== Comments ====================

    fn add_comment(&self, comment: &Comment) -> StoreResult<()>;
    fn get_comment(&self, id: i64) -> StoreResult<Comment>;
    fn get_comments_by_author(&self, author: &str) -> StoreResult<Vec<Comment>>;
    /// Direct PHOTO_COMMENT children of the photo only, never replies.
    fn get_photo_comments(&self, photo_id: i64) -> StoreResult<Vec<Comment>>;
    /// Direct REPLY children of the comment only, never grandchildren.
    fn get_replies(&self, comment_id: i64) -> StoreResult<Vec<Comment>>;
    fn update_comment_contents(&self, id: i64, contents: &str) -> StoreResult<()>;
    /// Hard delete. Removes the comment, its reply subtree, all votes on
    /// removed comments, and any notifications referencing them.
    fn remove_comment(&self, id: i64) -> StoreResult<()>;
    /// Upsert: a user's previous vote on the comment, if any, is replaced
    /// atomically; no reader observes the intermediate empty state.
    fn vote_on_comment(&self, comment_id: i64, user: &str, up: bool) -> StoreResult<()>;

    // ==================== Notifications ====================

    fn add_notification(&self, notification: &Notification) -> StoreResult<()>;
    fn get_notifications(&self, recipient: &str) -> StoreResult<Vec<Notification>>;
    /// Removes the notification for (recipient, content_id) if present;
    /// absence is not an error, so repeated reads stay idempotent.
    fn remove_notification(&self, recipient: &str, content_id: i64) -> StoreResult<()>;

    // ==================== Follows ====================

    /// Insert a follow relation. A duplicate (follower, followee) pair is
    /// rejected with `Conflict` inside the same critical section as the
    /// insert, so racing callers cannot both succeed.
    fn add_follow(&self, follow: &Follow) -> StoreResult<()>;
    /// Returns whether the relation existed before removal.
    fn remove_follow(&self, follower: &str, followee: &str) -> StoreResult<bool>;
    fn get_followers(&self, username: &str) -> StoreResult<Vec<String>>;
    fn get_following(&self, username: &str) -> StoreResult<Vec<String>>;

    // ==================== Misc ====================

    /// Highest id in use across all id-bearing entities; used to seed the
    /// Resolver's id counter so ids survive process restarts.
    fn max_content_id(&self) -> StoreResult<i64>;
    fn clear(&self) -> StoreResult<()>;
}
