//! Shared fixtures for the integration suites. Every helper panics on
//! failure so tests read as straight-line scenarios.

use std::sync::Arc;

use photoshare_core::auth::{CredentialService, Credentials};
use photoshare_core::models::*;
use photoshare_core::resolver::{endpoint, Resolver};
use photoshare_core::store::{MemoryStore, SqliteStore};

pub const PASSWORD: &str = "testpass123";

pub fn memory_resolver() -> Resolver {
    Resolver::new(Arc::new(MemoryStore::new())).unwrap()
}

pub fn sqlite_resolver() -> Resolver {
    Resolver::new(Arc::new(SqliteStore::in_memory().unwrap())).unwrap()
}

/// Both backends behind the same trait, for scenarios that must agree.
pub fn both_backends() -> Vec<(&'static str, Resolver)> {
    vec![
        ("memory", memory_resolver()),
        ("sqlite", sqlite_resolver()),
    ]
}

pub fn register(resolver: &Resolver, username: &str) {
    resolver.register_user(username, PASSWORD).unwrap();
}

/// Credentials for `user` signed against `endpoint` with the shared
/// test password.
pub fn sign(endpoint: &str, user: &str) -> Credentials {
    Credentials::sign(endpoint, user, &CredentialService::hash_password(PASSWORD))
}

pub fn create_album(resolver: &Resolver, user: &str, name: &str) -> i64 {
    let creds = sign(endpoint::ADD_ALBUM, user);
    resolver
        .add_album(
            &creds,
            &AddAlbumPayload {
                name: name.to_string(),
                description: String::new(),
            },
        )
        .unwrap()
        .id
}

pub fn upload_photo(resolver: &Resolver, user: &str, album_id: i64, name: &str) -> i64 {
    let creds = sign(endpoint::UPLOAD_PHOTO, user);
    resolver
        .upload_photo(
            &creds,
            &UploadPhotoPayload {
                name: name.to_string(),
                ext: "png".to_string(),
                description: String::new(),
                album_id,
                // "hello" in base64
                encoded_contents: "aGVsbG8=".to_string(),
            },
        )
        .unwrap()
        .id
}

pub fn add_comment(
    resolver: &Resolver,
    user: &str,
    reference_id: i64,
    kind: CommentKind,
) -> i64 {
    let creds = sign(endpoint::ADD_COMMENT, user);
    resolver
        .add_comment(
            &creds,
            &AddCommentPayload {
                contents: format!("comment by {}", user),
                reference_id,
                kind,
            },
        )
        .unwrap()
        .id
}
