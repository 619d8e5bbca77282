use crate::Database;
use crate::models::{CommentOutcome, CommentRow, LikeOutcome, NewPost, PostRow, ReportOutcome};
use anyhow::Result;
use rusqlite::{Connection, Row};
use tracing::info;

/// Post columns plus derived counts. `?1` is the viewing device id.
const POST_SELECT: &str = "
    SELECT p.postid, p.deviceid, p.post, p.timestamp, p.ipaddr,
           (SELECT COUNT(*) FROM likes l WHERE l.postid = p.postid),
           (SELECT COUNT(*) FROM reports r WHERE r.postid = p.postid),
           (SELECT COUNT(*) FROM comments c WHERE c.postid = p.postid),
           EXISTS (SELECT 1 FROM likes l WHERE l.postid = p.postid AND l.deviceid = ?1)
    FROM posts p";

impl Database {
    // -- Posts --

    /// Append a post and return its id.
    pub fn insert_post(&self, post: &NewPost<'_>) -> Result<i64> {
        let id = self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO posts (deviceid, post, timestamp, ipaddr) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![post.device_id, post.text, post.timestamp, post.ip_addr],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        info!("saved post {} from {}", id, post.device_id);
        Ok(id)
    }

    pub fn post_timestamp(&self, id: i64) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT timestamp FROM posts WHERE postid = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Most recent `limit` posts, newest first.
    pub fn latest_posts(&self, limit: u32, viewer: &str) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!("{POST_SELECT} ORDER BY p.postid DESC LIMIT ?2");
            query_posts(conn, &sql, rusqlite::params![viewer, limit])
        })
    }

    /// Posts from the anchor onwards, oldest first. Includes the anchor.
    pub fn posts_after(
        &self,
        anchor_id: i64,
        anchor_timestamp: i64,
        limit: u32,
        viewer: &str,
    ) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{POST_SELECT}
                 WHERE p.timestamp >= ?2 AND p.postid >= ?3
                 ORDER BY p.postid ASC
                 LIMIT ?4"
            );
            query_posts(
                conn,
                &sql,
                rusqlite::params![viewer, anchor_timestamp, anchor_id, limit],
            )
        })
    }

    /// Posts strictly older than the anchor's timestamp, newest first.
    /// Never includes the anchor.
    pub fn posts_before(
        &self,
        anchor_id: i64,
        anchor_timestamp: i64,
        limit: u32,
        viewer: &str,
    ) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{POST_SELECT}
                 WHERE p.timestamp < ?2 AND p.postid <= ?3
                 ORDER BY p.postid DESC
                 LIMIT ?4"
            );
            query_posts(
                conn,
                &sql,
                rusqlite::params![viewer, anchor_timestamp, anchor_id, limit],
            )
        })
    }

    // -- Likes --

    /// Record that `device_id` likes `post_id`. The (post, device) primary key
    /// turns a second like into `AlreadyLiked`.
    pub fn like_post(&self, post_id: i64, device_id: &str) -> Result<LikeOutcome> {
        self.with_conn_mut(|conn| {
            if !post_exists(conn, post_id)? {
                return Ok(LikeOutcome::InvalidPost);
            }

            match conn.execute(
                "INSERT INTO likes (postid, deviceid) VALUES (?1, ?2)",
                rusqlite::params![post_id, device_id],
            ) {
                Ok(_) => Ok(LikeOutcome::Liked),
                Err(e) if is_duplicate_key(&e) => Ok(LikeOutcome::AlreadyLiked),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn like_count(&self, post_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM likes WHERE postid = ?1",
                [post_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    // -- Reports --

    /// Reports are not de-duplicated: a device may report the same post again.
    pub fn report_post(&self, post_id: i64, device_id: &str, reason: &str) -> Result<ReportOutcome> {
        let outcome = self.with_conn_mut(|conn| {
            if !post_exists(conn, post_id)? {
                return Ok(ReportOutcome::PostNotFound);
            }

            conn.execute(
                "INSERT INTO reports (postid, deviceid, reason) VALUES (?1, ?2, ?3)",
                rusqlite::params![post_id, device_id, reason],
            )?;
            Ok(ReportOutcome::Reported)
        })?;

        if outcome == ReportOutcome::Reported {
            info!("saved report for post {} from {}", post_id, device_id);
        }
        Ok(outcome)
    }

    // -- Comments --

    pub fn add_comment(
        &self,
        post_id: i64,
        device_id: &str,
        text: &str,
        timestamp: i64,
    ) -> Result<CommentOutcome> {
        self.with_conn_mut(|conn| {
            if !post_exists(conn, post_id)? {
                return Ok(CommentOutcome::PostNotFound);
            }

            conn.execute(
                "INSERT INTO comments (postid, deviceid, timestamp, comment) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![post_id, device_id, timestamp, text],
            )?;
            Ok(CommentOutcome::Created {
                id: conn.last_insert_rowid(),
            })
        })
    }

    /// Comments on `post_id` in the order they were written, or `None` when
    /// the post does not exist.
    pub fn comments_for_post(&self, post_id: i64) -> Result<Option<Vec<CommentRow>>> {
        self.with_conn(|conn| {
            if !post_exists(conn, post_id)? {
                return Ok(None);
            }

            let mut stmt = conn.prepare(
                "SELECT commentid, postid, deviceid, comment, timestamp
                 FROM comments
                 WHERE postid = ?1
                 ORDER BY commentid ASC",
            )?;

            let rows = stmt
                .query_map([post_id], |row| {
                    Ok(CommentRow {
                        id: row.get(0)?,
                        post_id: row.get(1)?,
                        device_id: row.get(2)?,
                        text: row.get(3)?,
                        timestamp: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(Some(rows))
        })
    }
}

fn map_post(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        device_id: row.get(1)?,
        text: row.get(2)?,
        timestamp: row.get(3)?,
        ip_addr: row.get(4)?,
        likes: row.get(5)?,
        reports: row.get(6)?,
        comments: row.get(7)?,
        liked: row.get(8)?,
    })
}

fn query_posts(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<PostRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, map_post)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn post_exists(conn: &Connection, post_id: i64) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM posts WHERE postid = ?1)",
        [post_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn is_duplicate_key(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_db;

    fn post_at(db: &Database, text: &str, timestamp: i64) -> i64 {
        db.insert_post(&NewPost {
            device_id: "author",
            text,
            timestamp,
            ip_addr: "127.0.0.1",
        })
        .unwrap()
    }

    fn get_post(db: &Database, id: i64, viewer: &str) -> Option<PostRow> {
        db.with_conn(|conn| {
            let sql = format!("{POST_SELECT} WHERE p.postid = ?2");
            conn.query_row(&sql, rusqlite::params![viewer, id], map_post)
                .optional()
        })
        .unwrap()
    }

    fn ids(rows: &[PostRow]) -> Vec<i64> {
        rows.iter().map(|r| r.id).collect()
    }

    #[test]
    fn latest_is_descending_without_gaps() {
        let (_dir, db) = temp_db();
        let inserted: Vec<i64> = (0..7).map(|i| post_at(&db, "hello", 1_000 + i)).collect();

        let rows = db.latest_posts(7, "viewer").unwrap();
        let mut expected = inserted.clone();
        expected.reverse();
        assert_eq!(ids(&rows), expected);

        let rows = db.latest_posts(3, "viewer").unwrap();
        assert_eq!(ids(&rows), expected[..3].to_vec());
    }

    #[test]
    fn after_includes_anchor_first() {
        let (_dir, db) = temp_db();
        let a = post_at(&db, "a", 100);
        let b = post_at(&db, "b", 100);
        let c = post_at(&db, "c", 101);

        let rows = db.posts_after(b, 100, 10, "viewer").unwrap();
        assert_eq!(ids(&rows), vec![b, c]);

        let rows = db.posts_after(a, 100, 2, "viewer").unwrap();
        assert_eq!(ids(&rows), vec![a, b]);
    }

    #[test]
    fn before_excludes_anchor_and_same_second_posts() {
        let (_dir, db) = temp_db();
        let a = post_at(&db, "a", 100);
        let b = post_at(&db, "b", 100);
        let c = post_at(&db, "c", 101);

        // `a` shares b's timestamp, so it is not strictly before it.
        assert!(db.posts_before(b, 100, 10, "viewer").unwrap().is_empty());

        let rows = db.posts_before(c, 101, 10, "viewer").unwrap();
        assert_eq!(ids(&rows), vec![b, a]);
    }

    #[test]
    fn before_pages_do_not_overlap() {
        let (_dir, db) = temp_db();
        let inserted: Vec<i64> = (0..6).map(|i| post_at(&db, "p", 10 * i)).collect();

        let first = db.posts_before(inserted[5], 50, 2, "viewer").unwrap();
        assert_eq!(ids(&first), vec![inserted[4], inserted[3]]);

        let last = first.last().unwrap();
        let second = db.posts_before(last.id, last.timestamp, 2, "viewer").unwrap();
        assert_eq!(ids(&second), vec![inserted[2], inserted[1]]);
    }

    #[test]
    fn missing_anchor_has_no_timestamp() {
        let (_dir, db) = temp_db();
        assert_eq!(db.post_timestamp(42).unwrap(), None);
        let id = post_at(&db, "x", 7);
        assert_eq!(db.post_timestamp(id).unwrap(), Some(7));
    }

    #[test]
    fn second_like_is_rejected_and_not_counted() {
        let (_dir, db) = temp_db();
        let id = post_at(&db, "likeable", 1);

        assert_eq!(db.like_post(id, "dev-1").unwrap(), LikeOutcome::Liked);
        assert_eq!(db.like_post(id, "dev-1").unwrap(), LikeOutcome::AlreadyLiked);
        assert_eq!(db.like_count(id).unwrap(), 1);

        assert_eq!(db.like_post(id, "dev-2").unwrap(), LikeOutcome::Liked);
        assert_eq!(db.like_count(id).unwrap(), 2);
    }

    #[test]
    fn like_on_missing_post_is_invalid() {
        let (_dir, db) = temp_db();
        assert_eq!(db.like_post(99, "dev-1").unwrap(), LikeOutcome::InvalidPost);
        assert_eq!(db.like_count(99).unwrap(), 0);
    }

    #[test]
    fn liked_flag_follows_viewer() {
        let (_dir, db) = temp_db();
        let id = post_at(&db, "x", 1);
        db.like_post(id, "fan").unwrap();

        let seen_by_fan = get_post(&db, id, "fan").unwrap();
        assert!(seen_by_fan.liked);
        assert_eq!(seen_by_fan.likes, 1);

        let seen_by_other = get_post(&db, id, "other").unwrap();
        assert!(!seen_by_other.liked);
    }

    #[test]
    fn report_on_missing_post_writes_nothing() {
        let (_dir, db) = temp_db();
        assert_eq!(
            db.report_post(5, "dev-1", "spam").unwrap(),
            ReportOutcome::PostNotFound
        );

        let count: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM reports", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn repeated_reports_are_kept() {
        let (_dir, db) = temp_db();
        let id = post_at(&db, "x", 1);
        assert_eq!(db.report_post(id, "dev-1", "spam").unwrap(), ReportOutcome::Reported);
        assert_eq!(db.report_post(id, "dev-1", "spam").unwrap(), ReportOutcome::Reported);
        assert_eq!(get_post(&db, id, "dev-1").unwrap().reports, 2);
    }

    #[test]
    fn comments_come_back_in_write_order() {
        let (_dir, db) = temp_db();
        let id = post_at(&db, "x", 1);

        let CommentOutcome::Created { id: first } = db.add_comment(id, "dev-1", "one", 5).unwrap()
        else {
            panic!("comment on existing post was rejected");
        };
        db.add_comment(id, "dev-2", "two", 5).unwrap();

        let comments = db.comments_for_post(id).unwrap().unwrap();
        let texts: Vec<&str> = comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);
        assert_eq!(comments[0].id, first);
        assert_eq!(get_post(&db, id, "dev-1").unwrap().comments, 2);
    }

    #[test]
    fn comment_on_missing_post_is_rejected() {
        let (_dir, db) = temp_db();
        assert_eq!(
            db.add_comment(3, "dev-1", "hi", 1).unwrap(),
            CommentOutcome::PostNotFound
        );
        assert!(db.comments_for_post(3).unwrap().is_none());
    }
}
