use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// User represents a registered account. The first user ever persisted is
/// made an admin; everyone after that starts as a regular user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(skip_serializing)]
    pub password_digest: String,
    pub admin: bool,
}

/// Album groups a user's photos. Owned exclusively by its author.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Album {
    pub id: i64,
    pub name: String,
    pub author: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Photo uploaded into an album. `contents` is the base64 text blob exactly
/// as it crossed the boundary; it is never re-encoded between backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Photo {
    pub id: i64,
    pub name: String,
    pub ext: String,
    pub author: String,
    pub album_id: i64,
    pub contents: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    /// username -> rating; the map guarantees at most one rating per user.
    pub ratings: HashMap<String, bool>,
}

impl Photo {
    pub fn upvotes(&self) -> Vec<String> {
        self.ratings
            .iter()
            .filter(|(_, up)| **up)
            .map(|(u, _)| u.clone())
            .collect()
    }

    pub fn downvotes(&self) -> Vec<String> {
        self.ratings
            .iter()
            .filter(|(_, up)| !**up)
            .map(|(u, _)| u.clone())
            .collect()
    }
}

/// Whether a comment sits on a photo or replies to another comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentKind {
    PhotoComment,
    Reply,
}

/// Comment on a photo, or a reply to another comment. `reference_id` names
/// the direct parent; its meaning depends on `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub author: String,
    pub contents: String,
    pub reference_id: i64,
    pub kind: CommentKind,
    pub created_at: DateTime<Utc>,
    /// username -> vote; at most one vote per user, last write wins.
    pub votes: HashMap<String, bool>,
}

impl Comment {
    pub fn upvotes(&self) -> Vec<String> {
        self.votes
            .iter()
            .filter(|(_, up)| **up)
            .map(|(u, _)| u.clone())
            .collect()
    }

    pub fn downvotes(&self) -> Vec<String> {
        self.votes
            .iter()
            .filter(|(_, up)| !**up)
            .map(|(u, _)| u.clone())
            .collect()
    }
}

/// The event a notification points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PhotoComment,
    Reply,
    Follow,
}

impl From<CommentKind> for EventType {
    fn from(kind: CommentKind) -> Self {
        match kind {
            CommentKind::PhotoComment => EventType::PhotoComment,
            CommentKind::Reply => EventType::Reply,
        }
    }
}

/// Transient unread marker. Created when a comment, reply or follow lands on
/// a user's content; removed when the recipient reads the list containing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Id of the comment or follow that triggered this notification.
    pub content_id: i64,
    pub recipient: String,
    pub author: String,
    pub event_type: EventType,
}

/// Follow relation from `follower` to `followee`. Unique per pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Follow {
    pub id: i64,
    pub follower: String,
    pub followee: String,
}

/// Response value carrying the id of a newly created resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: i64,
}

// Boundary payloads. The transport layer parses requests into these and
// hands them to the Resolver together with the caller's credentials.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddAlbumPayload {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadPhotoPayload {
    pub name: String,
    pub ext: String,
    pub description: String,
    pub album_id: i64,
    /// Base64-encoded photo contents, no length prefix.
    pub encoded_contents: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddCommentPayload {
    pub contents: String,
    pub reference_id: i64,
    pub kind: CommentKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditCommentPayload {
    pub contents: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_digest_not_serialized() {
        let user = User {
            username: "alice".to_string(),
            password_digest: "secret-digest".to_string(),
            admin: false,
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-digest"));
        assert!(json.contains("alice"));
    }

    #[test]
    fn vote_map_splits_into_up_and_down() {
        let mut comment = Comment {
            id: 1,
            author: "alice".to_string(),
            contents: "hi".to_string(),
            reference_id: 0,
            kind: CommentKind::PhotoComment,
            created_at: Utc::now(),
            votes: HashMap::new(),
        };
        comment.votes.insert("bob".to_string(), true);
        comment.votes.insert("carol".to_string(), false);

        assert_eq!(comment.upvotes(), vec!["bob".to_string()]);
        assert_eq!(comment.downvotes(), vec!["carol".to_string()]);
    }

    #[test]
    fn comment_kind_maps_to_event_type() {
        assert_eq!(
            EventType::from(CommentKind::PhotoComment),
            EventType::PhotoComment
        );
        assert_eq!(EventType::from(CommentKind::Reply), EventType::Reply);
    }
}
