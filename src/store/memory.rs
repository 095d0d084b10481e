use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::*;
use crate::store::{DataStore, StoreError, StoreResult};

/// In-memory backend. Primary collections keyed by id or username, plus
/// secondary indexes for the hot access patterns (photos/comments by
/// author). Queries without an index filter the full collection.
///
/// A single mutex scope guards all collections, so every call, including
/// multi-step cascades and vote upserts, is atomic to other callers.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    albums: HashMap<i64, Album>,

    photos: HashMap<i64, Photo>,
    photos_by_author: HashMap<String, Vec<i64>>,

    comments: HashMap<i64, Comment>,
    comments_by_author: HashMap<String, Vec<i64>>,

    notifications: HashMap<String, Vec<Notification>>,
    follows: Vec<Follow>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Inner {
    /// Ids of `root` and every comment below it, walking REPLY edges.
    fn comment_subtree(&self, root: i64) -> Vec<i64> {
        let mut ids = vec![root];
        let mut frontier = vec![root];
        while let Some(parent) = frontier.pop() {
            for comment in self.comments.values() {
                if comment.kind == CommentKind::Reply && comment.reference_id == parent {
                    ids.push(comment.id);
                    frontier.push(comment.id);
                }
            }
        }
        ids
    }

    fn drop_comments(&mut self, ids: &[i64]) {
        for id in ids {
            if let Some(comment) = self.comments.remove(id) {
                if let Some(index) = self.comments_by_author.get_mut(&comment.author) {
                    index.retain(|c| c != id);
                }
            }
        }
        for queue in self.notifications.values_mut() {
            queue.retain(|n| !ids.contains(&n.content_id));
        }
    }
}

impl DataStore for MemoryStore {
    fn add_user(&self, username: &str, password_digest: &str) -> StoreResult<User> {
        let mut inner = self.inner.lock().unwrap();
        if inner.users.contains_key(username) {
            return Err(StoreError::Conflict(format!("User {}", username)));
        }
        let user = User {
            username: username.to_string(),
            password_digest: password_digest.to_string(),
            admin: inner.users.is_empty(),
        };
        inner.users.insert(username.to_string(), user.clone());
        Ok(user)
    }

    fn get_user(&self, username: &str) -> StoreResult<User> {
        let inner = self.inner.lock().unwrap();
        inner
            .users
            .get(username)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("User {}", username)))
    }

    fn get_users(&self) -> StoreResult<Vec<User>> {
        let inner = self.inner.lock().unwrap();
        let mut users: Vec<User> = inner.users.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    fn add_album(&self, album: &Album) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.albums.insert(album.id, album.clone());
        Ok(())
    }

    fn get_album(&self, id: i64) -> StoreResult<Album> {
        let inner = self.inner.lock().unwrap();
        inner
            .albums
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("Album {}", id)))
    }

    fn get_albums(&self, author: &str) -> StoreResult<Vec<Album>> {
        let inner = self.inner.lock().unwrap();
        let mut albums: Vec<Album> = inner
            .albums
            .values()
            .filter(|a| a.author == author)
            .cloned()
            .collect();
        albums.sort_by_key(|a| a.id);
        Ok(albums)
    }

    fn update_album_description(&self, id: i64, description: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.albums.get_mut(&id) {
            Some(album) => {
                album.description = description.to_string();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("Album {}", id))),
        }
    }

    fn add_photo(&self, photo: &Photo) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.photos.insert(photo.id, photo.clone());
        inner
            .photos_by_author
            .entry(photo.author.clone())
            .or_default()
            .push(photo.id);
        Ok(())
    }

    fn get_photo(&self, id: i64) -> StoreResult<Photo> {
        let inner = self.inner.lock().unwrap();
        inner
            .photos
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("Photo {}", id)))
    }

    fn get_photos_by_author(&self, author: &str) -> StoreResult<Vec<Photo>> {
        let inner = self.inner.lock().unwrap();
        let ids = inner.photos_by_author.get(author).cloned().unwrap_or_default();
        let mut photos: Vec<Photo> = ids
            .iter()
            .filter_map(|id| inner.photos.get(id).cloned())
            .collect();
        photos.sort_by_key(|p| p.id);
        Ok(photos)
    }

    fn get_photos_in_album(&self, album_id: i64) -> StoreResult<Vec<Photo>> {
        // No index for this pattern; filter the full collection.
        let inner = self.inner.lock().unwrap();
        let mut photos: Vec<Photo> = inner
            .photos
            .values()
            .filter(|p| p.album_id == album_id)
            .cloned()
            .collect();
        photos.sort_by_key(|p| p.id);
        Ok(photos)
    }

    fn remove_photo(&self, id: i64) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let photo = inner
            .photos
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound(format!("Photo {}", id)))?;
        if let Some(index) = inner.photos_by_author.get_mut(&photo.author) {
            index.retain(|p| *p != id);
        }

        // Take the whole comment tree down with the photo.
        let roots: Vec<i64> = inner
            .comments
            .values()
            .filter(|c| c.kind == CommentKind::PhotoComment && c.reference_id == id)
            .map(|c| c.id)
            .collect();
        let mut doomed = Vec::new();
        for root in roots {
            doomed.extend(inner.comment_subtree(root));
        }
        inner.drop_comments(&doomed);
        Ok(())
    }

    fn rate_photo(&self, photo_id: i64, user: &str, up: bool) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.photos.get_mut(&photo_id) {
            Some(photo) => {
                photo.ratings.insert(user.to_string(), up);
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("Photo {}", photo_id))),
        }
    }

    fn add_comment(&self, comment: &Comment) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.comments.insert(comment.id, comment.clone());
        inner
            .comments_by_author
            .entry(comment.author.clone())
            .or_default()
            .push(comment.id);
        Ok(())
    }

    fn get_comment(&self, id: i64) -> StoreResult<Comment> {
        let inner = self.inner.lock().unwrap();
        inner
            .comments
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("Comment {}", id)))
    }

    fn get_comments_by_author(&self, author: &str) -> StoreResult<Vec<Comment>> {
        let inner = self.inner.lock().unwrap();
        let ids = inner
            .comments_by_author
            .get(author)
            .cloned()
            .unwrap_or_default();
        let mut comments: Vec<Comment> = ids
            .iter()
            .filter_map(|id| inner.comments.get(id).cloned())
            .collect();
        comments.sort_by_key(|c| c.id);
        Ok(comments)
    }

    fn get_photo_comments(&self, photo_id: i64) -> StoreResult<Vec<Comment>> {
        let inner = self.inner.lock().unwrap();
        let mut comments: Vec<Comment> = inner
            .comments
            .values()
            .filter(|c| c.kind == CommentKind::PhotoComment && c.reference_id == photo_id)
            .cloned()
            .collect();
        comments.sort_by_key(|c| c.id);
        Ok(comments)
    }

    fn get_replies(&self, comment_id: i64) -> StoreResult<Vec<Comment>> {
        let inner = self.inner.lock().unwrap();
        let mut replies: Vec<Comment> = inner
            .comments
            .values()
            .filter(|c| c.kind == CommentKind::Reply && c.reference_id == comment_id)
            .cloned()
            .collect();
        replies.sort_by_key(|c| c.id);
        Ok(replies)
    }

    fn update_comment_contents(&self, id: i64, contents: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.comments.get_mut(&id) {
            Some(comment) => {
                comment.contents = contents.to_string();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("Comment {}", id))),
        }
    }

    fn remove_comment(&self, id: i64) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.comments.contains_key(&id) {
            return Err(StoreError::NotFound(format!("Comment {}", id)));
        }
        let doomed = inner.comment_subtree(id);
        inner.drop_comments(&doomed);
        Ok(())
    }

    fn vote_on_comment(&self, comment_id: i64, user: &str, up: bool) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.comments.get_mut(&comment_id) {
            Some(comment) => {
                // Map insert replaces any previous vote in one step.
                comment.votes.insert(user.to_string(), up);
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("Comment {}", comment_id))),
        }
    }

    fn add_notification(&self, notification: &Notification) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .notifications
            .entry(notification.recipient.clone())
            .or_default()
            .push(notification.clone());
        Ok(())
    }

    fn get_notifications(&self, recipient: &str) -> StoreResult<Vec<Notification>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .notifications
            .get(recipient)
            .cloned()
            .unwrap_or_default())
    }

    fn remove_notification(&self, recipient: &str, content_id: i64) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(queue) = inner.notifications.get_mut(recipient) {
            queue.retain(|n| n.content_id != content_id);
        }
        Ok(())
    }

    fn add_follow(&self, follow: &Follow) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .follows
            .iter()
            .any(|f| f.follower == follow.follower && f.followee == follow.followee)
        {
            return Err(StoreError::Conflict(format!(
                "Follow {} -> {}",
                follow.follower, follow.followee
            )));
        }
        inner.follows.push(follow.clone());
        Ok(())
    }

    fn remove_follow(&self, follower: &str, followee: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.follows.len();
        inner
            .follows
            .retain(|f| !(f.follower == follower && f.followee == followee));
        Ok(inner.follows.len() < before)
    }

    fn get_followers(&self, username: &str) -> StoreResult<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .follows
            .iter()
            .filter(|f| f.followee == username)
            .map(|f| f.follower.clone())
            .collect())
    }

    fn get_following(&self, username: &str) -> StoreResult<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .follows
            .iter()
            .filter(|f| f.follower == username)
            .map(|f| f.followee.clone())
            .collect())
    }

    fn max_content_id(&self) -> StoreResult<i64> {
        let inner = self.inner.lock().unwrap();
        let max = inner
            .albums
            .keys()
            .chain(inner.photos.keys())
            .chain(inner.comments.keys())
            .copied()
            .chain(inner.follows.iter().map(|f| f.id))
            .max()
            .unwrap_or(0);
        Ok(max)
    }

    fn clear(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        *inner = Inner::default();
        Ok(())
    }
}
