//! Request resolution.
//!
//! The `Resolver` sits between the transport boundary and the `DataStore`:
//! it authenticates every call, enforces ownership and uniqueness rules,
//! assigns ids, and fans out notifications. Transport adapters parse
//! requests into payloads and call exactly one method here per operation.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use log::{error, warn};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::auth::{CredentialService, Credentials};
use crate::models::*;
use crate::store::{DataStore, StoreError, StoreResult};

/// Endpoint names bound into request digests. A token signed for one
/// endpoint never verifies on another.
pub mod endpoint {
    pub const LOGIN: &str = "/users/login";
    pub const LIST_USERS: &str = "/users/list";

    pub const ADD_ALBUM: &str = "/albums/add";
    pub const GET_ALBUM: &str = "/albums/get";
    pub const GET_ALBUMS: &str = "/albums/list";
    pub const UPDATE_ALBUM: &str = "/albums/update";

    pub const UPLOAD_PHOTO: &str = "/photos/upload";
    pub const GET_PHOTO: &str = "/photos/get";
    pub const GET_PHOTOS: &str = "/photos/list";
    pub const GET_ALBUM_PHOTOS: &str = "/photos/album";
    pub const REMOVE_PHOTO: &str = "/photos/remove";
    pub const RATE_PHOTO: &str = "/photos/rate";

    pub const ADD_COMMENT: &str = "/comments/add";
    pub const EDIT_COMMENT: &str = "/comments/edit";
    pub const REMOVE_COMMENT: &str = "/comments/remove";
    pub const VOTE_COMMENT: &str = "/comments/vote";
    pub const GET_USER_COMMENTS: &str = "/comments/user";
    pub const GET_PHOTO_COMMENTS: &str = "/comments/photo";
    pub const GET_REPLIES: &str = "/comments/replies";

    pub const GET_NOTIFICATIONS: &str = "/notifications/list";

    pub const FOLLOW: &str = "/follows/add";
    pub const UNFOLLOW: &str = "/follows/remove";
    pub const GET_FOLLOWERS: &str = "/follows/followers";
    pub const GET_FOLLOWING: &str = "/follows/following";
    pub const NEWS_FEED: &str = "/feed";

    pub const ADMIN_REMOVE_PHOTO: &str = "/admin/photos/remove";
    pub const ADMIN_REMOVE_COMMENT: &str = "/admin/comments/remove";
    pub const ADMIN_CLEAR: &str = "/admin/clear";
}

/// Allowed photo file extensions, lowercase.
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// Default cap on decoded photo size, in bytes.
pub const DEFAULT_MAX_PHOTO_BYTES: usize = 10 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("invalid resource request: {0}")]
    InvalidResourceRequest(String),
    #[error("does not own resource: {0}")]
    DoesNotOwnResource(String),
    #[error("already exists: {0}")]
    Existing(String),
    #[error("internal error: {0}")]
    Internal(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            // A missing row named by the caller is the caller's problem.
            StoreError::NotFound(what) => ServiceError::InvalidResourceRequest(what),
            StoreError::Conflict(what) => ServiceError::Existing(what),
            StoreError::Database(_) => {
                error!("storage fault: {}", e);
                ServiceError::Internal(e)
            }
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

pub struct Resolver {
    store: Arc<dyn DataStore>,
    creds: CredentialService,
    max_photo_bytes: usize,
    next_id: AtomicI64,
}

impl Resolver {
    pub fn new(store: Arc<dyn DataStore>) -> StoreResult<Self> {
        Self::with_limits(store, CredentialService::default(), DEFAULT_MAX_PHOTO_BYTES)
    }

    /// Construct with an explicit credential window and photo size cap.
    /// The id counter resumes one past the highest id already stored.
    pub fn with_limits(
        store: Arc<dyn DataStore>,
        creds: CredentialService,
        max_photo_bytes: usize,
    ) -> StoreResult<Self> {
        let next = store.max_content_id()? + 1;
        Ok(Self {
            store,
            creds,
            max_photo_bytes,
            next_id: AtomicI64::new(next),
        })
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    // ==================== Auth ====================

    /// Authenticate a request against `endpoint`. Unknown users and failed
    /// digests collapse into the same error so callers cannot probe for
    /// account existence.
    pub fn verify_auth(&self, endpoint: &str, creds: &Credentials) -> ServiceResult<User> {
        let user = match self.store.get_user(&creds.user) {
            Ok(user) => user,
            Err(StoreError::NotFound(_)) => {
                warn!("auth rejected for unknown user {}", creds.user);
                return Err(ServiceError::Unauthorized);
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(reason) = self.creds.verify(endpoint, creds, &user.password_digest) {
            warn!("auth rejected for {} on {}: {}", creds.user, endpoint, reason);
            return Err(ServiceError::Unauthorized);
        }
        Ok(user)
    }

    /// Authenticate and additionally require the admin flag.
    pub fn verify_admin_auth(&self, endpoint: &str, creds: &Credentials) -> ServiceResult<User> {
        let user = self.verify_auth(endpoint, creds)?;
        if !user.admin {
            warn!("admin endpoint {} refused for {}", endpoint, creds.user);
            return Err(ServiceError::Unauthorized);
        }
        Ok(user)
    }

    // ==================== Users ====================

    /// Register a new account. The store makes the very first account the
    /// admin and rejects duplicate usernames, both atomically with the
    /// insert, so concurrent registrations cannot race each other.
    pub fn register_user(&self, username: &str, password: &str) -> ServiceResult<()> {
        let digest = CredentialService::hash_password(password);
        self.store.add_user(username, &digest)?;
        Ok(())
    }

    /// Prove the caller holds valid credentials and return their account.
    pub fn login(&self, creds: &Credentials) -> ServiceResult<User> {
        self.verify_auth(endpoint::LOGIN, creds)
    }

    /// Admin-only account listing.
    pub fn get_users(&self, creds: &Credentials) -> ServiceResult<Vec<User>> {
        self.verify_admin_auth(endpoint::LIST_USERS, creds)?;
        Ok(self.store.get_users()?)
    }

    // ==================== Albums ====================

    pub fn add_album(&self, creds: &Credentials, payload: &AddAlbumPayload) -> ServiceResult<Receipt> {
        let user = self.verify_auth(endpoint::ADD_ALBUM, creds)?;
        let album = Album {
            id: self.next_id(),
            name: payload.name.clone(),
            author: user.username,
            description: payload.description.clone(),
            created_at: Utc::now(),
        };
        self.store.add_album(&album)?;
        Ok(Receipt { id: album.id })
    }

    pub fn get_album(&self, creds: &Credentials, id: i64) -> ServiceResult<Album> {
        self.verify_auth(endpoint::GET_ALBUM, creds)?;
        Ok(self.store.get_album(id)?)
    }

    pub fn get_albums(&self, creds: &Credentials, author: &str) -> ServiceResult<Vec<Album>> {
        self.verify_auth(endpoint::GET_ALBUMS, creds)?;
        self.store.get_user(author)?;
        Ok(self.store.get_albums(author)?)
    }

    pub fn update_album_description(
        &self,
        creds: &Credentials,
        album_id: i64,
        description: &str,
    ) -> ServiceResult<()> {
        let user = self.verify_auth(endpoint::UPDATE_ALBUM, creds)?;
        let album = self.store.get_album(album_id)?;
        if album.author != user.username {
            return Err(ServiceError::DoesNotOwnResource(format!(
                "Album {}",
                album_id
            )));
        }
        self.store.update_album_description(album_id, description)?;
        Ok(())
    }

    // ==================== Photos ====================

    pub fn upload_photo(
        &self,
        creds: &Credentials,
        payload: &UploadPhotoPayload,
    ) -> ServiceResult<Receipt> {
        let user = self.verify_auth(endpoint::UPLOAD_PHOTO, creds)?;

        let ext = payload.ext.to_lowercase();
        if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(ServiceError::InvalidResourceRequest(format!(
                "unsupported photo extension {}",
                payload.ext
            )));
        }

        let decoded = BASE64.decode(&payload.encoded_contents).map_err(|_| {
            ServiceError::InvalidResourceRequest("photo contents are not valid base64".to_string())
        })?;
        if decoded.len() > self.max_photo_bytes {
            return Err(ServiceError::InvalidResourceRequest(format!(
                "photo exceeds {} byte limit",
                self.max_photo_bytes
            )));
        }

        let album = self.store.get_album(payload.album_id)?;
        if album.author != user.username {
            return Err(ServiceError::DoesNotOwnResource(format!(
                "Album {}",
                payload.album_id
            )));
        }

        let photo = Photo {
            id: self.next_id(),
            name: payload.name.clone(),
            ext,
            author: user.username,
            album_id: payload.album_id,
            contents: payload.encoded_contents.clone(),
            description: payload.description.clone(),
            created_at: Utc::now(),
            ratings: Default::default(),
        };
        self.store.add_photo(&photo)?;
        Ok(Receipt { id: photo.id })
    }

    pub fn get_photo(&self, creds: &Credentials, id: i64) -> ServiceResult<Photo> {
        self.verify_auth(endpoint::GET_PHOTO, creds)?;
        Ok(self.store.get_photo(id)?)
    }

    pub fn get_photos(&self, creds: &Credentials, author: &str) -> ServiceResult<Vec<Photo>> {
        self.verify_auth(endpoint::GET_PHOTOS, creds)?;
        self.store.get_user(author)?;
        Ok(self.store.get_photos_by_author(author)?)
    }

    pub fn get_photos_in_album(&self, creds: &Credentials, album_id: i64) -> ServiceResult<Vec<Photo>> {
        self.verify_auth(endpoint::GET_ALBUM_PHOTOS, creds)?;
        self.store.get_album(album_id)?;
        Ok(self.store.get_photos_in_album(album_id)?)
    }

    /// Remove a photo the caller owns, together with its comment tree.
    pub fn remove_photo(&self, creds: &Credentials, id: i64) -> ServiceResult<()> {
        let user = self.verify_auth(endpoint::REMOVE_PHOTO, creds)?;
        let photo = self.store.get_photo(id)?;
        if photo.author != user.username && !user.admin {
            return Err(ServiceError::DoesNotOwnResource(format!("Photo {}", id)));
        }
        self.store.remove_photo(id)?;
        Ok(())
    }

    /// Admin force-removal of any photo.
    pub fn remove_photo_admin(&self, creds: &Credentials, id: i64) -> ServiceResult<()> {
        self.verify_admin_auth(endpoint::ADMIN_REMOVE_PHOTO, creds)?;
        self.store.remove_photo(id)?;
        Ok(())
    }

    /// Rate a photo up or down. Re-rating replaces the previous rating.
    pub fn rate_photo(&self, creds: &Credentials, photo_id: i64, up: bool) -> ServiceResult<()> {
        let user = self.verify_auth(endpoint::RATE_PHOTO, creds)?;
        self.store.rate_photo(photo_id, &user.username, up)?;
        Ok(())
    }

    // ==================== Comments ====================

    /// Attach a comment to a photo, or a reply to a comment. The author of
    /// the direct parent is notified, even when that author is the caller.
    pub fn add_comment(
        &self,
        creds: &Credentials,
        payload: &AddCommentPayload,
    ) -> ServiceResult<Receipt> {
        let user = self.verify_auth(endpoint::ADD_COMMENT, creds)?;

        let parent_author = match payload.kind {
            CommentKind::PhotoComment => self.store.get_photo(payload.reference_id)?.author,
            CommentKind::Reply => self.store.get_comment(payload.reference_id)?.author,
        };

        let comment = Comment {
            id: self.next_id(),
            author: user.username.clone(),
            contents: payload.contents.clone(),
            reference_id: payload.reference_id,
            kind: payload.kind,
            created_at: Utc::now(),
            votes: Default::default(),
        };
        self.store.add_comment(&comment)?;
        self.store.add_notification(&Notification {
            content_id: comment.id,
            recipient: parent_author,
            author: user.username,
            event_type: payload.kind.into(),
        })?;
        Ok(Receipt { id: comment.id })
    }

    pub fn edit_comment(
        &self,
        creds: &Credentials,
        comment_id: i64,
        payload: &EditCommentPayload,
    ) -> ServiceResult<()> {
        let user = self.verify_auth(endpoint::EDIT_COMMENT, creds)?;
        let comment = self.store.get_comment(comment_id)?;
        if comment.author != user.username {
            return Err(ServiceError::DoesNotOwnResource(format!(
                "Comment {}",
                comment_id
            )));
        }
        self.store
            .update_comment_contents(comment_id, &payload.contents)?;
        Ok(())
    }

    /// Remove a comment the caller authored, together with its reply subtree.
    pub fn remove_comment(&self, creds: &Credentials, comment_id: i64) -> ServiceResult<()> {
        let user = self.verify_auth(endpoint::REMOVE_COMMENT, creds)?;
        let comment = self.store.get_comment(comment_id)?;
        if comment.author != user.username && !user.admin {
            return Err(ServiceError::DoesNotOwnResource(format!(
                "Comment {}",
                comment_id
            )));
        }
        self.store.remove_comment(comment_id)?;
        Ok(())
    }

    /// Admin force-removal of any comment.
    pub fn remove_comment_admin(&self, creds: &Credentials, comment_id: i64) -> ServiceResult<()> {
        self.verify_admin_auth(endpoint::ADMIN_REMOVE_COMMENT, creds)?;
        self.store.remove_comment(comment_id)?;
        Ok(())
    }

    /// Vote on a comment. Re-voting replaces the previous vote.
    pub fn vote_on_comment(
        &self,
        creds: &Credentials,
        comment_id: i64,
        up: bool,
    ) -> ServiceResult<()> {
        let user = self.verify_auth(endpoint::VOTE_COMMENT, creds)?;
        self.store.vote_on_comment(comment_id, &user.username, up)?;
        Ok(())
    }

    /// Comments authored by `author`. Reading the list marks any of the
    /// caller's notifications pointing at these comments as read.
    pub fn get_comments_by_user(
        &self,
        creds: &Credentials,
        author: &str,
    ) -> ServiceResult<Vec<Comment>> {
        let user = self.verify_auth(endpoint::GET_USER_COMMENTS, creds)?;
        self.store.get_user(author)?;
        let comments = self.store.get_comments_by_author(author)?;
        self.consume_comment_notifications(&user.username, &comments)?;
        Ok(comments)
    }

    /// Top-level comments on a photo. Consumes matching notifications for
    /// the caller.
    pub fn get_photo_comments(
        &self,
        creds: &Credentials,
        photo_id: i64,
    ) -> ServiceResult<Vec<Comment>> {
        let user = self.verify_auth(endpoint::GET_PHOTO_COMMENTS, creds)?;
        self.store.get_photo(photo_id)?;
        let comments = self.store.get_photo_comments(photo_id)?;
        self.consume_comment_notifications(&user.username, &comments)?;
        Ok(comments)
    }

    /// Direct replies to a comment. Consumes matching notifications for
    /// the caller.
    pub fn get_replies(&self, creds: &Credentials, comment_id: i64) -> ServiceResult<Vec<Comment>> {
        let user = self.verify_auth(endpoint::GET_REPLIES, creds)?;
        self.store.get_comment(comment_id)?;
        let replies = self.store.get_replies(comment_id)?;
        self.consume_comment_notifications(&user.username, &replies)?;
        Ok(replies)
    }

    fn consume_comment_notifications(
        &self,
        recipient: &str,
        comments: &[Comment],
    ) -> StoreResult<()> {
        for comment in comments {
            self.store.remove_notification(recipient, comment.id)?;
        }
        Ok(())
    }

    // ==================== Notifications ====================

    /// Pending notifications for the caller. Listing does not consume them;
    /// only reading the referenced content does.
    pub fn get_notifications(&self, creds: &Credentials) -> ServiceResult<Vec<Notification>> {
        let user = self.verify_auth(endpoint::GET_NOTIFICATIONS, creds)?;
        Ok(self.store.get_notifications(&user.username)?)
    }

    // ==================== Follows ====================

    /// Follow another user. At most one relation per (follower, followee)
    /// pair; the followee is notified.
    pub fn follow(&self, creds: &Credentials, followee: &str) -> ServiceResult<Receipt> {
        let user = self.verify_auth(endpoint::FOLLOW, creds)?;
        self.store.get_user(followee)?;

        // Uniqueness is enforced by the insert itself; only the winning
        // caller reaches the notification below.
        let follow = Follow {
            id: self.next_id(),
            follower: user.username.clone(),
            followee: followee.to_string(),
        };
        self.store.add_follow(&follow)?;
        self.store.add_notification(&Notification {
            content_id: follow.id,
            recipient: followee.to_string(),
            author: user.username,
            event_type: EventType::Follow,
        })?;
        Ok(Receipt { id: follow.id })
    }

    pub fn unfollow(&self, creds: &Credentials, followee: &str) -> ServiceResult<()> {
        let user = self.verify_auth(endpoint::UNFOLLOW, creds)?;
        if !self.store.remove_follow(&user.username, followee)? {
            return Err(ServiceError::InvalidResourceRequest(format!(
                "Follow {} -> {}",
                user.username, followee
            )));
        }
        Ok(())
    }

    /// Who follows the caller. Reading the list marks the caller's follow
    /// notifications as read.
    pub fn get_followers(&self, creds: &Credentials) -> ServiceResult<Vec<String>> {
        let user = self.verify_auth(endpoint::GET_FOLLOWERS, creds)?;
        let followers = self.store.get_followers(&user.username)?;

        for notification in self.store.get_notifications(&user.username)? {
            if notification.event_type == EventType::Follow {
                self.store
                    .remove_notification(&user.username, notification.content_id)?;
            }
        }
        Ok(followers)
    }

    pub fn get_following(&self, creds: &Credentials) -> ServiceResult<Vec<String>> {
        let user = self.verify_auth(endpoint::GET_FOLLOWING, creds)?;
        Ok(self.store.get_following(&user.username)?)
    }

    /// Photos by everyone the caller follows, newest first.
    pub fn get_news_feed(&self, creds: &Credentials) -> ServiceResult<Vec<Photo>> {
        let user = self.verify_auth(endpoint::NEWS_FEED, creds)?;

        let mut feed = Vec::new();
        for followee in self.store.get_following(&user.username)? {
            feed.extend(self.store.get_photos_by_author(&followee)?);
        }
        feed.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(feed)
    }

    // ==================== Admin ====================

    /// Admin-only full wipe, mainly for test fixtures and staging resets.
    pub fn clear(&self, creds: &Credentials) -> ServiceResult<()> {
        self.verify_admin_auth(endpoint::ADMIN_CLEAR, creds)?;
        self.store.clear()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn resolver() -> Resolver {
        Resolver::new(Arc::new(MemoryStore::new())).unwrap()
    }

    fn signed(endpoint: &str, user: &str, password: &str) -> Credentials {
        Credentials::sign(endpoint, user, &CredentialService::hash_password(password))
    }

    #[test]
    fn first_user_registered_is_admin() {
        let resolver = resolver();
        resolver.register_user("alice", "hunter2").unwrap();
        resolver.register_user("bob", "hunter2").unwrap();

        let creds = signed(endpoint::LOGIN, "alice", "hunter2");
        assert!(resolver.login(&creds).unwrap().admin);

        let creds = signed(endpoint::LOGIN, "bob", "hunter2");
        assert!(!resolver.login(&creds).unwrap().admin);
    }

    #[test]
    fn duplicate_registration_rejected() {
        let resolver = resolver();
        resolver.register_user("alice", "hunter2").unwrap();
        assert!(matches!(
            resolver.register_user("alice", "other"),
            Err(ServiceError::Existing(_))
        ));
    }

    #[test]
    fn unknown_user_is_unauthorized_not_missing() {
        let resolver = resolver();
        let creds = signed(endpoint::LOGIN, "ghost", "hunter2");
        assert!(matches!(
            resolver.login(&creds),
            Err(ServiceError::Unauthorized)
        ));
    }

    #[test]
    fn token_bound_to_endpoint() {
        let resolver = resolver();
        resolver.register_user("alice", "hunter2").unwrap();

        let creds = signed(endpoint::GET_PHOTO, "alice", "hunter2");
        assert!(matches!(
            resolver.login(&creds),
            Err(ServiceError::Unauthorized)
        ));
    }

    #[test]
    fn upload_rejects_bad_extension_and_bad_encoding() {
        let resolver = resolver();
        resolver.register_user("alice", "hunter2").unwrap();

        let creds = signed(endpoint::ADD_ALBUM, "alice", "hunter2");
        let album = resolver
            .add_album(
                &creds,
                &AddAlbumPayload {
                    name: "trip".to_string(),
                    description: String::new(),
                },
            )
            .unwrap();

        let creds = signed(endpoint::UPLOAD_PHOTO, "alice", "hunter2");
        let mut payload = UploadPhotoPayload {
            name: "shot".to_string(),
            ext: "exe".to_string(),
            description: String::new(),
            album_id: album.id,
            encoded_contents: "aGVsbG8=".to_string(),
        };
        assert!(matches!(
            resolver.upload_photo(&creds, &payload),
            Err(ServiceError::InvalidResourceRequest(_))
        ));

        payload.ext = "png".to_string();
        payload.encoded_contents = "not//valid!base64???".to_string();
        assert!(matches!(
            resolver.upload_photo(&creds, &payload),
            Err(ServiceError::InvalidResourceRequest(_))
        ));
    }

    #[test]
    fn photo_size_cap_enforced() {
        let store: Arc<dyn DataStore> = Arc::new(MemoryStore::new());
        let resolver = Resolver::with_limits(store, CredentialService::default(), 4).unwrap();
        resolver.register_user("alice", "hunter2").unwrap();

        let creds = signed(endpoint::ADD_ALBUM, "alice", "hunter2");
        let album = resolver
            .add_album(
                &creds,
                &AddAlbumPayload {
                    name: "trip".to_string(),
                    description: String::new(),
                },
            )
            .unwrap();

        let creds = signed(endpoint::UPLOAD_PHOTO, "alice", "hunter2");
        let payload = UploadPhotoPayload {
            name: "shot".to_string(),
            ext: "png".to_string(),
            description: String::new(),
            album_id: album.id,
            // decodes to five bytes, one over the cap
            encoded_contents: BASE64.encode(b"hello"),
        };
        assert!(matches!(
            resolver.upload_photo(&creds, &payload),
            Err(ServiceError::InvalidResourceRequest(_))
        ));
    }
}
