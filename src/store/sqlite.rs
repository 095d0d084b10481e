use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::models::*;
use crate::store::{DataStore, StoreError, StoreResult};

/// Thread-safe SQLite backend. Foreign keys are declared as a safety net,
/// but the Resolver remains the source of truth for user-facing error
/// semantics; a constraint violation surfaces as a storage fault, never as
/// a business error.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Create a store backed by the database at the given path.
    pub fn new(db_path: &str) -> StoreResult<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory database, mainly for testing.
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                username TEXT PRIMARY KEY,
                password_digest TEXT NOT NULL,
                admin INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS albums (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                author TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                FOREIGN KEY (author) REFERENCES users(username)
            );

            CREATE TABLE IF NOT EXISTS photos (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                ext TEXT NOT NULL,
                author TEXT NOT NULL,
                album_id INTEGER NOT NULL,
                contents TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                FOREIGN KEY (author) REFERENCES users(username),
                FOREIGN KEY (album_id) REFERENCES albums(id)
            );

            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY,
                author TEXT NOT NULL,
                contents TEXT NOT NULL,
                is_reply INTEGER NOT NULL,
                reference_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (author) REFERENCES users(username)
            );

            CREATE TABLE IF NOT EXISTS comment_votes (
                comment_id INTEGER NOT NULL,
                username TEXT NOT NULL,
                vote INTEGER NOT NULL,
                PRIMARY KEY (comment_id, username),
                FOREIGN KEY (comment_id) REFERENCES comments(id) ON DELETE CASCADE,
                FOREIGN KEY (username) REFERENCES users(username)
            );

            CREATE TABLE IF NOT EXISTS photo_ratings (
                photo_id INTEGER NOT NULL,
                username TEXT NOT NULL,
                rating INTEGER NOT NULL,
                PRIMARY KEY (photo_id, username),
                FOREIGN KEY (photo_id) REFERENCES photos(id) ON DELETE CASCADE,
                FOREIGN KEY (username) REFERENCES users(username)
            );

            CREATE TABLE IF NOT EXISTS notifications (
                content_id INTEGER NOT NULL,
                recipient TEXT NOT NULL,
                author TEXT NOT NULL,
                event_type TEXT NOT NULL,
                PRIMARY KEY (content_id, recipient),
                FOREIGN KEY (recipient) REFERENCES users(username)
            );

            CREATE TABLE IF NOT EXISTS follows (
                id INTEGER PRIMARY KEY,
                follower TEXT NOT NULL,
                followee TEXT NOT NULL,
                UNIQUE (follower, followee),
                FOREIGN KEY (follower) REFERENCES users(username),
                FOREIGN KEY (followee) REFERENCES users(username)
            );

            CREATE INDEX IF NOT EXISTS idx_photos_author ON photos(author);
            CREATE INDEX IF NOT EXISTS idx_photos_album ON photos(album_id);
            CREATE INDEX IF NOT EXISTS idx_comments_author ON comments(author);
            CREATE INDEX IF NOT EXISTS idx_comments_reference ON comments(reference_id, is_reply);
            CREATE INDEX IF NOT EXISTS idx_notifications_recipient ON notifications(recipient);
            "#,
        )?;
        Ok(())
    }
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        username: row.get("username")?,
        password_digest: row.get("password_digest")?,
        admin: row.get("admin")?,
    })
}

fn row_to_album(row: &rusqlite::Row) -> rusqlite::Result<Album> {
    Ok(Album {
        id: row.get("id")?,
        name: row.get("name")?,
        author: row.get("author")?,
        description: row.get("description")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
    })
}

fn row_to_photo(row: &rusqlite::Row) -> rusqlite::Result<Photo> {
    Ok(Photo {
        id: row.get("id")?,
        name: row.get("name")?,
        ext: row.get("ext")?,
        author: row.get("author")?,
        album_id: row.get("album_id")?,
        contents: row.get("contents")?,
        description: row.get("description")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
        ratings: HashMap::new(),
    })
}

fn row_to_comment(row: &rusqlite::Row) -> rusqlite::Result<Comment> {
    let is_reply: bool = row.get("is_reply")?;
    Ok(Comment {
        id: row.get("id")?,
        author: row.get("author")?,
        contents: row.get("contents")?,
        reference_id: row.get("reference_id")?,
        kind: if is_reply {
            CommentKind::Reply
        } else {
            CommentKind::PhotoComment
        },
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
        votes: HashMap::new(),
    })
}

fn encode_event_type(event_type: EventType) -> &'static str {
    match event_type {
        EventType::PhotoComment => "photo_comment",
        EventType::Reply => "reply",
        EventType::Follow => "follow",
    }
}

fn decode_event_type(s: &str) -> EventType {
    match s {
        "reply" => EventType::Reply,
        "follow" => EventType::Follow,
        _ => EventType::PhotoComment,
    }
}

/// Votes for one comment, loaded alongside the row.
fn load_comment_votes(conn: &Connection, comment_id: i64) -> rusqlite::Result<HashMap<String, bool>> {
    let mut stmt = conn.prepare("SELECT username, vote FROM comment_votes WHERE comment_id = ?1")?;
    let rows = stmt.query_map(params![comment_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?))
    })?;
    rows.collect()
}

fn load_photo_ratings(conn: &Connection, photo_id: i64) -> rusqlite::Result<HashMap<String, bool>> {
    let mut stmt = conn.prepare("SELECT username, rating FROM photo_ratings WHERE photo_id = ?1")?;
    let rows = stmt.query_map(params![photo_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?))
    })?;
    rows.collect()
}

fn query_photos(conn: &Connection, sql: &str, param: &dyn rusqlite::ToSql) -> StoreResult<Vec<Photo>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([param], row_to_photo)?;
    let mut photos = Vec::new();
    for row in rows {
        photos.push(row?);
    }
    for photo in &mut photos {
        photo.ratings = load_photo_ratings(conn, photo.id)?;
    }
    Ok(photos)
}

fn query_comments(conn: &Connection, sql: &str, param: &dyn rusqlite::ToSql) -> StoreResult<Vec<Comment>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([param], row_to_comment)?;
    let mut comments = Vec::new();
    for row in rows {
        comments.push(row?);
    }
    for comment in &mut comments {
        comment.votes = load_comment_votes(conn, comment.id)?;
    }
    Ok(comments)
}

/// Ids of `root` and every reply below it.
fn comment_subtree(conn: &Connection, root: i64) -> rusqlite::Result<Vec<i64>> {
    let mut ids = vec![root];
    let mut frontier = vec![root];
    while let Some(parent) = frontier.pop() {
        let mut stmt =
            conn.prepare("SELECT id FROM comments WHERE is_reply = 1 AND reference_id = ?1")?;
        let children: Vec<i64> = stmt
            .query_map(params![parent], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        for child in children {
            ids.push(child);
            frontier.push(child);
        }
    }
    Ok(ids)
}

fn delete_comments(conn: &Connection, ids: &[i64]) -> rusqlite::Result<()> {
    for id in ids {
        // comment_votes rows go with the comment via ON DELETE CASCADE
        conn.execute("DELETE FROM comments WHERE id = ?1", params![id])?;
        conn.execute("DELETE FROM notifications WHERE content_id = ?1", params![id])?;
    }
    Ok(())
}

impl DataStore for SqliteStore {
    fn add_user(&self, username: &str, password_digest: &str) -> StoreResult<User> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let taken: Option<String> = tx
            .query_row(
                "SELECT username FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(StoreError::Conflict(format!("User {}", username)));
        }

        let admin: bool =
            tx.query_row("SELECT COUNT(*) FROM users", [], |row| row.get::<_, i64>(0))? == 0;
        tx.execute(
            "INSERT INTO users (username, password_digest, admin) VALUES (?1, ?2, ?3)",
            params![username, password_digest, admin],
        )?;
        tx.commit()?;

        Ok(User {
            username: username.to_string(),
            password_digest: password_digest.to_string(),
            admin,
        })
    }

    fn get_user(&self, username: &str) -> StoreResult<User> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM users WHERE username = ?1",
            params![username],
            row_to_user,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("User {}", username))
            }
            _ => StoreError::Database(e),
        })
    }

    fn get_users(&self) -> StoreResult<Vec<User>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM users ORDER BY username ASC")?;
        let rows = stmt.query_map([], row_to_user)?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    fn add_album(&self, album: &Album) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO albums (id, name, author, description, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                album.id,
                &album.name,
                &album.author,
                &album.description,
                album.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_album(&self, id: i64) -> StoreResult<Album> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM albums WHERE id = ?1",
            params![id],
            row_to_album,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("Album {}", id)),
            _ => StoreError::Database(e),
        })
    }

    fn get_albums(&self, author: &str) -> StoreResult<Vec<Album>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM albums WHERE author = ?1 ORDER BY id ASC")?;
        let rows = stmt.query_map(params![author], row_to_album)?;
        let mut albums = Vec::new();
        for row in rows {
            albums.push(row?);
        }
        Ok(albums)
    }

    fn update_album_description(&self, id: i64, description: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE albums SET description = ?1 WHERE id = ?2",
            params![description, id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Album {}", id)));
        }
        Ok(())
    }

    fn add_photo(&self, photo: &Photo) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO photos (id, name, ext, author, album_id, contents, description, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                photo.id,
                &photo.name,
                &photo.ext,
                &photo.author,
                photo.album_id,
                &photo.contents,
                &photo.description,
                photo.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_photo(&self, id: i64) -> StoreResult<Photo> {
        let conn = self.conn.lock().unwrap();
        let mut photo = conn
            .query_row(
                "SELECT * FROM photos WHERE id = ?1",
                params![id],
                row_to_photo,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("Photo {}", id))
                }
                _ => StoreError::Database(e),
            })?;
        photo.ratings = load_photo_ratings(&conn, id)?;
        Ok(photo)
    }

    fn get_photos_by_author(&self, author: &str) -> StoreResult<Vec<Photo>> {
        let conn = self.conn.lock().unwrap();
        query_photos(
            &conn,
            "SELECT * FROM photos WHERE author = ?1 ORDER BY id ASC",
            &author,
        )
    }

    fn get_photos_in_album(&self, album_id: i64) -> StoreResult<Vec<Photo>> {
        let conn = self.conn.lock().unwrap();
        query_photos(
            &conn,
            "SELECT * FROM photos WHERE album_id = ?1 ORDER BY id ASC",
            &album_id,
        )
    }

    fn remove_photo(&self, id: i64) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let roots: Vec<i64> = {
            let mut stmt = tx.prepare(
                "SELECT id FROM comments WHERE is_reply = 0 AND reference_id = ?1",
            )?;
            let ids = stmt
                .query_map(params![id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<i64>>>()?;
            ids
        };
        let mut doomed = Vec::new();
        for root in roots {
            doomed.extend(comment_subtree(&tx, root)?);
        }
        delete_comments(&tx, &doomed)?;

        // photo_ratings rows cascade with the photo
        let rows = tx.execute("DELETE FROM photos WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Photo {}", id)));
        }
        tx.commit()?;
        Ok(())
    }

    fn rate_photo(&self, photo_id: i64, user: &str, up: bool) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT id FROM photos WHERE id = ?1",
                params![photo_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::NotFound(format!("Photo {}", photo_id)));
        }

        // Update first, insert if nothing was there. Running inside one
        // transaction keeps the replacement invisible to readers.
        let updated = tx.execute(
            "UPDATE photo_ratings SET rating = ?1 WHERE photo_id = ?2 AND username = ?3",
            params![up, photo_id, user],
        )?;
        if updated == 0 {
            tx.execute(
                "INSERT INTO photo_ratings (photo_id, username, rating) VALUES (?1, ?2, ?3)",
                params![photo_id, user, up],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn add_comment(&self, comment: &Comment) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO comments (id, author, contents, is_reply, reference_id, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                comment.id,
                &comment.author,
                &comment.contents,
                comment.kind == CommentKind::Reply,
                comment.reference_id,
                comment.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_comment(&self, id: i64) -> StoreResult<Comment> {
        let conn = self.conn.lock().unwrap();
        let mut comment = conn
            .query_row(
                "SELECT * FROM comments WHERE id = ?1",
                params![id],
                row_to_comment,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound(format!("Comment {}", id))
                }
                _ => StoreError::Database(e),
            })?;
        comment.votes = load_comment_votes(&conn, id)?;
        Ok(comment)
    }

    fn get_comments_by_author(&self, author: &str) -> StoreResult<Vec<Comment>> {
        let conn = self.conn.lock().unwrap();
        query_comments(
            &conn,
            "SELECT * FROM comments WHERE author = ?1 ORDER BY id ASC",
            &author,
        )
    }

    fn get_photo_comments(&self, photo_id: i64) -> StoreResult<Vec<Comment>> {
        let conn = self.conn.lock().unwrap();
        query_comments(
            &conn,
            "SELECT * FROM comments WHERE is_reply = 0 AND reference_id = ?1 ORDER BY id ASC",
            &photo_id,
        )
    }

    fn get_replies(&self, comment_id: i64) -> StoreResult<Vec<Comment>> {
        let conn = self.conn.lock().unwrap();
        query_comments(
            &conn,
            "SELECT * FROM comments WHERE is_reply = 1 AND reference_id = ?1 ORDER BY id ASC",
            &comment_id,
        )
    }

    fn update_comment_contents(&self, id: i64, contents: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE comments SET contents = ?1 WHERE id = ?2",
            params![contents, id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Comment {}", id)));
        }
        Ok(())
    }

    fn remove_comment(&self, id: i64) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT id FROM comments WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::NotFound(format!("Comment {}", id)));
        }

        let doomed = comment_subtree(&tx, id)?;
        delete_comments(&tx, &doomed)?;
        tx.commit()?;
        Ok(())
    }

    fn vote_on_comment(&self, comment_id: i64, user: &str, up: bool) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT id FROM comments WHERE id = ?1",
                params![comment_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::NotFound(format!("Comment {}", comment_id)));
        }

        let updated = tx.execute(
            "UPDATE comment_votes SET vote = ?1 WHERE comment_id = ?2 AND username = ?3",
            params![up, comment_id, user],
        )?;
        if updated == 0 {
            tx.execute(
                "INSERT INTO comment_votes (comment_id, username, vote) VALUES (?1, ?2, ?3)",
                params![comment_id, user, up],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn add_notification(&self, notification: &Notification) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO notifications (content_id, recipient, author, event_type)
               VALUES (?1, ?2, ?3, ?4)"#,
            params![
                notification.content_id,
                &notification.recipient,
                &notification.author,
                encode_event_type(notification.event_type),
            ],
        )?;
        Ok(())
    }

    fn get_notifications(&self, recipient: &str) -> StoreResult<Vec<Notification>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT content_id, recipient, author, event_type FROM notifications \
             WHERE recipient = ?1 ORDER BY content_id ASC",
        )?;
        let rows = stmt.query_map(params![recipient], |row| {
            Ok(Notification {
                content_id: row.get(0)?,
                recipient: row.get(1)?,
                author: row.get(2)?,
                event_type: decode_event_type(&row.get::<_, String>(3)?),
            })
        })?;
        let mut notifications = Vec::new();
        for row in rows {
            notifications.push(row?);
        }
        Ok(notifications)
    }

    fn remove_notification(&self, recipient: &str, content_id: i64) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM notifications WHERE recipient = ?1 AND content_id = ?2",
            params![recipient, content_id],
        )?;
        Ok(())
    }

    fn add_follow(&self, follow: &Follow) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        // The UNIQUE (follower, followee) constraint does the duplicate
        // check atomically with the insert.
        conn.execute(
            "INSERT INTO follows (id, follower, followee) VALUES (?1, ?2, ?3)",
            params![follow.id, &follow.follower, &follow.followee],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(format!(
                    "Follow {} -> {}",
                    follow.follower, follow.followee
                ))
            }
            _ => StoreError::Database(e),
        })?;
        Ok(())
    }

    fn remove_follow(&self, follower: &str, followee: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "DELETE FROM follows WHERE follower = ?1 AND followee = ?2",
            params![follower, followee],
        )?;
        Ok(rows > 0)
    }

    fn get_followers(&self, username: &str) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT follower FROM follows WHERE followee = ?1 ORDER BY id ASC")?;
        let rows = stmt.query_map(params![username], |row| row.get(0))?;
        let mut followers = Vec::new();
        for row in rows {
            followers.push(row?);
        }
        Ok(followers)
    }

    fn get_following(&self, username: &str) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT followee FROM follows WHERE follower = ?1 ORDER BY id ASC")?;
        let rows = stmt.query_map(params![username], |row| row.get(0))?;
        let mut following = Vec::new();
        for row in rows {
            following.push(row?);
        }
        Ok(following)
    }

    fn max_content_id(&self) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        let max: i64 = conn.query_row(
            r#"SELECT COALESCE(MAX(id), 0) FROM (
                   SELECT id FROM albums
                   UNION ALL SELECT id FROM photos
                   UNION ALL SELECT id FROM comments
                   UNION ALL SELECT id FROM follows
               )"#,
            [],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    fn clear(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            DELETE FROM notifications;
            DELETE FROM comment_votes;
            DELETE FROM photo_ratings;
            DELETE FROM comments;
            DELETE FROM photos;
            DELETE FROM follows;
            DELETE FROM albums;
            DELETE FROM users;
            "#,
        )?;
        Ok(())
    }
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_user(store: &SqliteStore, name: &str) {
        store.add_user(name, "digest").unwrap();
    }

    fn seed_album(store: &SqliteStore, id: i64, author: &str) {
        store
            .add_album(&Album {
                id,
                name: format!("album-{}", id),
                author: author.to_string(),
                description: String::new(),
                created_at: Utc::now(),
            })
            .unwrap();
    }

    fn seed_photo(store: &SqliteStore, id: i64, author: &str, album_id: i64) {
        store
            .add_photo(&Photo {
                id,
                name: format!("p{}", id),
                ext: "png".to_string(),
                author: author.to_string(),
                album_id,
                contents: "aGVsbG8=".to_string(),
                description: String::new(),
                created_at: Utc::now(),
                ratings: HashMap::new(),
            })
            .unwrap();
    }

    fn seed_comment(store: &SqliteStore, id: i64, author: &str, reference_id: i64, kind: CommentKind) {
        store
            .add_comment(&Comment {
                id,
                author: author.to_string(),
                contents: "hello".to_string(),
                reference_id,
                kind,
                created_at: Utc::now(),
                votes: HashMap::new(),
            })
            .unwrap();
    }

    #[test]
    fn round_trips_user_and_album() {
        let store = SqliteStore::in_memory().unwrap();
        seed_user(&store, "alice");
        seed_album(&store, 1, "alice");

        let album = store.get_album(1).unwrap();
        assert_eq!(album.author, "alice");
        assert_eq!(store.get_albums("alice").unwrap().len(), 1);
        assert!(matches!(store.get_album(99), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn first_user_inserted_is_admin_and_duplicates_conflict() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.add_user("alice", "digest").unwrap().admin);
        assert!(!store.add_user("bob", "digest").unwrap().admin);
        assert!(matches!(
            store.add_user("alice", "other"),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn duplicate_follow_rejected_at_insert() {
        let store = SqliteStore::in_memory().unwrap();
        seed_user(&store, "alice");
        seed_user(&store, "bob");

        let follow = Follow {
            id: 1,
            follower: "alice".to_string(),
            followee: "bob".to_string(),
        };
        store.add_follow(&follow).unwrap();
        assert!(matches!(
            store.add_follow(&Follow {
                id: 2,
                ..follow.clone()
            }),
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(store.get_followers("bob").unwrap().len(), 1);
    }

    #[test]
    fn photo_contents_survive_as_base64_text() {
        let store = SqliteStore::in_memory().unwrap();
        seed_user(&store, "alice");
        seed_album(&store, 1, "alice");
        seed_photo(&store, 2, "alice", 1);

        let photo = store.get_photo(2).unwrap();
        assert_eq!(photo.contents, "aGVsbG8=");
    }

    #[test]
    fn vote_upsert_keeps_single_row() {
        let store = SqliteStore::in_memory().unwrap();
        seed_user(&store, "alice");
        seed_user(&store, "bob");
        seed_album(&store, 1, "alice");
        seed_photo(&store, 2, "alice", 1);
        seed_comment(&store, 3, "bob", 2, CommentKind::PhotoComment);

        store.vote_on_comment(3, "alice", true).unwrap();
        store.vote_on_comment(3, "alice", false).unwrap();

        let comment = store.get_comment(3).unwrap();
        assert!(comment.upvotes().is_empty());
        assert_eq!(comment.downvotes(), vec!["alice".to_string()]);
    }

    #[test]
    fn remove_comment_cascades_subtree_and_votes() {
        let store = SqliteStore::in_memory().unwrap();
        seed_user(&store, "alice");
        seed_user(&store, "bob");
        seed_album(&store, 1, "alice");
        seed_photo(&store, 2, "alice", 1);
        seed_comment(&store, 3, "bob", 2, CommentKind::PhotoComment);
        seed_comment(&store, 4, "alice", 3, CommentKind::Reply);
        store.vote_on_comment(4, "bob", true).unwrap();

        store.remove_comment(3).unwrap();

        assert!(matches!(store.get_comment(3), Err(StoreError::NotFound(_))));
        assert!(matches!(store.get_comment(4), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn remove_photo_cascades_comment_tree() {
        let store = SqliteStore::in_memory().unwrap();
        seed_user(&store, "alice");
        seed_user(&store, "bob");
        seed_album(&store, 1, "alice");
        seed_photo(&store, 2, "alice", 1);
        seed_comment(&store, 3, "bob", 2, CommentKind::PhotoComment);
        store
            .add_notification(&Notification {
                content_id: 3,
                recipient: "alice".to_string(),
                author: "bob".to_string(),
                event_type: EventType::PhotoComment,
            })
            .unwrap();

        store.remove_photo(2).unwrap();

        assert!(matches!(store.get_photo(2), Err(StoreError::NotFound(_))));
        assert!(matches!(store.get_comment(3), Err(StoreError::NotFound(_))));
        assert!(store.get_notifications("alice").unwrap().is_empty());
    }

    #[test]
    fn max_content_id_resumes_counter() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.max_content_id().unwrap(), 0);

        seed_user(&store, "alice");
        seed_album(&store, 5, "alice");
        seed_photo(&store, 9, "alice", 5);
        assert_eq!(store.max_content_id().unwrap(), 9);
    }
}
