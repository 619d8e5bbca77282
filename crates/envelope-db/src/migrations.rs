use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (posts, likes, reports, comments)");
        conn.execute_batch(
            "
            -- AUTOINCREMENT: post ids are never handed out twice
            CREATE TABLE posts (
                postid      INTEGER PRIMARY KEY AUTOINCREMENT,
                deviceid    TEXT NOT NULL,
                post        TEXT NOT NULL,
                timestamp   INTEGER NOT NULL,
                ipaddr      TEXT NOT NULL
            );

            CREATE INDEX idx_posts_timestamp ON posts(timestamp, postid);

            CREATE TABLE likes (
                postid      INTEGER NOT NULL REFERENCES posts(postid),
                deviceid    TEXT NOT NULL,
                PRIMARY KEY (postid, deviceid)
            );

            CREATE INDEX idx_likes_post ON likes(postid);

            CREATE TABLE reports (
                reportid    INTEGER PRIMARY KEY AUTOINCREMENT,
                postid      INTEGER NOT NULL REFERENCES posts(postid),
                deviceid    TEXT NOT NULL,
                reason      TEXT NOT NULL
            );

            CREATE INDEX idx_reports_post ON reports(postid);

            CREATE TABLE comments (
                commentid   INTEGER PRIMARY KEY AUTOINCREMENT,
                postid      INTEGER NOT NULL REFERENCES posts(postid),
                deviceid    TEXT NOT NULL,
                timestamp   INTEGER NOT NULL,
                comment     TEXT NOT NULL
            );

            CREATE INDEX idx_comments_post ON comments(postid);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (device credentials)");
        conn.execute_batch(
            "
            CREATE TABLE device_credentials (
                deviceid    TEXT PRIMARY KEY,
                hash        TEXT NOT NULL,
                -- unix millis; NULL never expires
                expires_at  INTEGER
            );

            CREATE INDEX idx_credentials_expiry ON device_credentials(expires_at);

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
