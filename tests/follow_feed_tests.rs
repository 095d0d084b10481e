mod common;

use photoshare_core::models::EventType;
use photoshare_core::resolver::{endpoint, ServiceError};

use common::*;

// ==================== Follow relations ====================

#[test]
fn test_follow_and_list_both_directions() {
    for (backend, resolver) in both_backends() {
        register(&resolver, "alice");
        register(&resolver, "bob");

        let creds = sign(endpoint::FOLLOW, "bob");
        resolver.follow(&creds, "alice").unwrap();

        let creds = sign(endpoint::GET_FOLLOWERS, "alice");
        assert_eq!(
            resolver.get_followers(&creds).unwrap(),
            vec!["bob".to_string()],
            "backend {}",
            backend
        );

        let creds = sign(endpoint::GET_FOLLOWING, "bob");
        assert_eq!(
            resolver.get_following(&creds).unwrap(),
            vec!["alice".to_string()]
        );
    }
}

#[test]
fn test_duplicate_follow_rejected() {
    for (backend, resolver) in both_backends() {
        register(&resolver, "alice");
        register(&resolver, "bob");

        let creds = sign(endpoint::FOLLOW, "bob");
        resolver.follow(&creds, "alice").unwrap();
        assert!(
            matches!(
                resolver.follow(&creds, "alice"),
                Err(ServiceError::Existing(_))
            ),
            "backend {}",
            backend
        );
    }
}

#[test]
fn test_following_unknown_user_fails() {
    let resolver = memory_resolver();
    register(&resolver, "alice");

    let creds = sign(endpoint::FOLLOW, "alice");
    assert!(matches!(
        resolver.follow(&creds, "ghost"),
        Err(ServiceError::InvalidResourceRequest(_))
    ));
}

#[test]
fn test_unfollow_then_refollow() {
    let resolver = memory_resolver();
    register(&resolver, "alice");
    register(&resolver, "bob");

    let follow = sign(endpoint::FOLLOW, "bob");
    let unfollow = sign(endpoint::UNFOLLOW, "bob");
    resolver.follow(&follow, "alice").unwrap();
    resolver.unfollow(&unfollow, "alice").unwrap();

    assert!(matches!(
        resolver.unfollow(&unfollow, "alice"),
        Err(ServiceError::InvalidResourceRequest(_))
    ));

    resolver.follow(&follow, "alice").unwrap();
    let creds = sign(endpoint::GET_FOLLOWING, "bob");
    assert_eq!(
        resolver.get_following(&creds).unwrap(),
        vec!["alice".to_string()]
    );
}

// ==================== Follow notifications ====================

#[test]
fn test_follow_notifies_followee_until_followers_read() {
    for (backend, resolver) in both_backends() {
        register(&resolver, "alice");
        register(&resolver, "bob");

        let creds = sign(endpoint::FOLLOW, "bob");
        resolver.follow(&creds, "alice").unwrap();

        let list = sign(endpoint::GET_NOTIFICATIONS, "alice");
        let pending = resolver.get_notifications(&list).unwrap();
        assert_eq!(pending.len(), 1, "backend {}", backend);
        assert_eq!(pending[0].event_type, EventType::Follow);
        assert_eq!(pending[0].author, "bob");

        let creds = sign(endpoint::GET_FOLLOWERS, "alice");
        resolver.get_followers(&creds).unwrap();
        assert!(resolver.get_notifications(&list).unwrap().is_empty());
    }
}

// ==================== News feed ====================

#[test]
fn test_feed_contains_followees_photos_newest_first() {
    for (backend, resolver) in both_backends() {
        register(&resolver, "alice");
        register(&resolver, "bob");
        register(&resolver, "carol");

        let album = create_album(&resolver, "alice", "holiday");
        let older = upload_photo(&resolver, "alice", album, "day-one");
        let newer = upload_photo(&resolver, "alice", album, "day-two");

        // carol posts too, but bob does not follow her
        let other = create_album(&resolver, "carol", "misc");
        upload_photo(&resolver, "carol", other, "noise");

        let creds = sign(endpoint::FOLLOW, "bob");
        resolver.follow(&creds, "alice").unwrap();

        let creds = sign(endpoint::NEWS_FEED, "bob");
        let feed = resolver.get_news_feed(&creds).unwrap();
        assert_eq!(
            feed.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![newer, older],
            "backend {}",
            backend
        );
    }
}

#[test]
fn test_feed_excludes_own_photos_and_is_empty_without_follows() {
    let resolver = memory_resolver();
    register(&resolver, "alice");
    let album = create_album(&resolver, "alice", "holiday");
    upload_photo(&resolver, "alice", album, "selfie");

    let creds = sign(endpoint::NEWS_FEED, "alice");
    assert!(resolver.get_news_feed(&creds).unwrap().is_empty());
}

#[test]
fn test_feed_merges_multiple_followees() {
    let resolver = memory_resolver();
    register(&resolver, "alice");
    register(&resolver, "bob");
    register(&resolver, "carol");

    let a = create_album(&resolver, "alice", "a");
    let b = create_album(&resolver, "bob", "b");
    let first = upload_photo(&resolver, "alice", a, "one");
    let second = upload_photo(&resolver, "bob", b, "two");
    let third = upload_photo(&resolver, "alice", a, "three");

    let creds = sign(endpoint::FOLLOW, "carol");
    resolver.follow(&creds, "alice").unwrap();
    resolver.follow(&creds, "bob").unwrap();

    let creds = sign(endpoint::NEWS_FEED, "carol");
    let feed = resolver.get_news_feed(&creds).unwrap();
    assert_eq!(
        feed.iter().map(|p| p.id).collect::<Vec<_>>(),
        vec![third, second, first]
    );
}
