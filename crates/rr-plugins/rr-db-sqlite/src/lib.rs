//! # rr-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `rr-core` domain models. Every multi-row write runs in one
//! transaction; vote counters are adjusted relatively (`col = col + ?`).

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rr_core::error::{AppError, Result};
use rr_core::models::{
    Account, Comment, CommentId, ContentRef, NewComment, NewPost, Post, PostId, Profile, ProfileId, ProfileUpdate,
    Tally, TargetKind, Vote, VoteTarget, VoteValue,
};
use rr_core::traits::ForumRepo;
use rr_core::vote::{VoteOutcome, VoteTransition};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, Transaction};

const PROFILE_SELECT: &str = "SELECT p.id, a.username, p.first_name, p.last_name, p.email, p.about_text, \
     p.about_html, p.homepage, p.twitter, p.github, p.comment_karma, p.link_karma, a.created_at \
     FROM profiles p JOIN accounts a ON a.id = p.id";

const POST_SELECT: &str = "SELECT po.id, po.author_id, a.username AS author_name, po.title, po.url, po.text, \
     po.ups, po.downs, po.score, po.comment_count, po.created_at \
     FROM posts po JOIN accounts a ON a.id = po.author_id";

const COMMENT_SELECT: &str = "SELECT c.id, c.author_id, a.username AS author_name, c.post_id, c.parent_id, \
     c.raw_text, c.html_text, c.ups, c.downs, c.score, c.created_at \
     FROM comments c JOIN accounts a ON a.id = c.author_id";

/// How long a writer waits for the database lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SqliteForumRepo {
    pool: SqlitePool,
}

impl SqliteForumRepo {
    /// Connects, creating the database file if needed, and applies migrations.
    ///
    /// File databases run in WAL mode and writers wait up to `BUSY_TIMEOUT` for
    /// the lock. `sqlite::memory:` databases live on a single pooled connection
    /// that is never recycled, otherwise each connection would see its own
    /// empty database.
    pub async fn new(url: &str) -> Result<Self> {
        Self::with_max_connections(url, 5).await
    }

    pub async fn with_max_connections(url: &str, max_connections: u32) -> Result<Self> {
        let in_memory = url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(url)
            .map_err(db_err)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        }
        .connect_with(options)
        .await
        .map_err(db_err)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::Internal(format!("migration failed: {e}")))?;
        tracing::info!(url, "sqlite store ready");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Opens a write transaction holding the database write lock from the start.
    ///
    /// A deferred transaction that reads before it writes fails with
    /// `SQLITE_BUSY` when another connection wrote in between, without waiting.
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool.begin_with("BEGIN IMMEDIATE").await.map_err(db_err)
    }
}

/// Maps driver failures onto the domain error; unique violations become conflicts.
fn db_err(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(db.message().to_string()),
        _ => {
            tracing::error!(error = %e, "sqlite failure");
            AppError::Internal(e.to_string())
        }
    }
}

fn to_i64(n: u64) -> Result<i64> {
    i64::try_from(n).map_err(|_| AppError::validation(format!("{n} is out of range")))
}

fn map_profile(row: &SqliteRow) -> Result<Profile> {
    Ok(Profile {
        id: ProfileId(row.try_get("id").map_err(db_err)?),
        username: row.try_get("username").map_err(db_err)?,
        first_name: row.try_get("first_name").map_err(db_err)?,
        last_name: row.try_get("last_name").map_err(db_err)?,
        email: row.try_get("email").map_err(db_err)?,
        about_text: row.try_get("about_text").map_err(db_err)?,
        about_html: row.try_get("about_html").map_err(db_err)?,
        homepage: row.try_get("homepage").map_err(db_err)?,
        twitter: row.try_get("twitter").map_err(db_err)?,
        github: row.try_get("github").map_err(db_err)?,
        comment_karma: row.try_get("comment_karma").map_err(db_err)?,
        link_karma: row.try_get("link_karma").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn map_tally(row: &SqliteRow) -> Result<Tally> {
    Ok(Tally {
        ups: row.try_get("ups").map_err(db_err)?,
        downs: row.try_get("downs").map_err(db_err)?,
        score: row.try_get("score").map_err(db_err)?,
    })
}

fn map_post(row: &SqliteRow) -> Result<Post> {
    Ok(Post {
        id: PostId(row.try_get("id").map_err(db_err)?),
        author_id: ProfileId(row.try_get("author_id").map_err(db_err)?),
        author_name: row.try_get("author_name").map_err(db_err)?,
        title: row.try_get("title").map_err(db_err)?,
        url: row.try_get("url").map_err(db_err)?,
        text: row.try_get("text").map_err(db_err)?,
        tally: map_tally(row)?,
        comment_count: row.try_get("comment_count").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn map_comment(row: &SqliteRow) -> Result<Comment> {
    let parent_id: Option<i64> = row.try_get("parent_id").map_err(db_err)?;
    Ok(Comment {
        id: CommentId(row.try_get("id").map_err(db_err)?),
        author_id: ProfileId(row.try_get("author_id").map_err(db_err)?),
        author_name: row.try_get("author_name").map_err(db_err)?,
        post_id: PostId(row.try_get("post_id").map_err(db_err)?),
        parent_id: parent_id.map(CommentId),
        raw_text: row.try_get("raw_text").map_err(db_err)?,
        html_text: row.try_get("html_text").map_err(db_err)?,
        tally: map_tally(row)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn map_vote(row: &SqliteRow) -> Result<Vote> {
    let kind: String = row.try_get("target_kind").map_err(db_err)?;
    let target_id: i64 = row.try_get("target_id").map_err(db_err)?;
    let value: i64 = row.try_get("value").map_err(db_err)?;
    let target = match kind.parse::<TargetKind>()? {
        TargetKind::Submission => ContentRef::Post(PostId(target_id)),
        TargetKind::Comment => ContentRef::Comment(CommentId(target_id)),
    };
    Ok(Vote {
        profile_id: ProfileId(row.try_get("profile_id").map_err(db_err)?),
        target,
        post_id: PostId(row.try_get("post_id").map_err(db_err)?),
        value: VoteValue::try_from(value)?,
    })
}

/// Table holding the target's counters, and the author karma column it feeds.
fn target_tables(target: VoteTarget) -> (&'static str, &'static str) {
    match target {
        ContentRef::Post(_) => ("posts", "link_karma"),
        ContentRef::Comment(_) => ("comments", "comment_karma"),
    }
}

#[async_trait]
impl ForumRepo for SqliteForumRepo {
    /// Atomic operation to create an account and its profile.
    async fn create_account(&self, username: &str, password_hash: &str) -> Result<Profile> {
        let mut tx = self.begin_write().await?;

        let inserted = sqlx::query("INSERT INTO accounts (username, password_hash, created_at) VALUES (?, ?, ?)")
            .bind(username)
            .bind(password_hash)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(|e| match db_err(e) {
                AppError::Conflict(_) => AppError::Conflict("A user with that username already exists.".into()),
                other => other,
            })?;
        let id = inserted.last_insert_rowid();

        sqlx::query("INSERT INTO profiles (id) VALUES (?)")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        self.get_profile(ProfileId(id))
            .await?
            .ok_or_else(|| AppError::not_found(ProfileId::LABEL, id))
    }

    async fn get_account(&self, username: &str) -> Result<Option<Account>> {
        let row = sqlx::query("SELECT id, username, password_hash, created_at FROM accounts WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(|row| {
            Ok(Account {
                id: ProfileId(row.try_get("id").map_err(db_err)?),
                username: row.try_get("username").map_err(db_err)?,
                password_hash: row.try_get("password_hash").map_err(db_err)?,
                created_at: row.try_get("created_at").map_err(db_err)?,
            })
        })
        .transpose()
    }

    async fn get_profile(&self, id: ProfileId) -> Result<Option<Profile>> {
        sqlx::query(&format!("{PROFILE_SELECT} WHERE p.id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(map_profile)
            .transpose()
    }

    async fn get_profile_by_username(&self, username: &str) -> Result<Option<Profile>> {
        sqlx::query(&format!("{PROFILE_SELECT} WHERE a.username = ?"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(map_profile)
            .transpose()
    }

    async fn update_profile(&self, id: ProfileId, update: ProfileUpdate) -> Result<Profile> {
        let updated = sqlx::query(
            "UPDATE profiles SET first_name = ?, last_name = ?, email = ?, about_text = ?, about_html = ?, \
             homepage = ?, twitter = ?, github = ? WHERE id = ?",
        )
        .bind(update.first_name)
        .bind(update.last_name)
        .bind(update.email)
        .bind(update.about_text)
        .bind(update.about_html)
        .bind(update.homepage)
        .bind(update.twitter)
        .bind(update.github)
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if updated.rows_affected() == 0 {
            return Err(AppError::not_found(ProfileId::LABEL, id));
        }
        self.get_profile(id)
            .await?
            .ok_or_else(|| AppError::not_found(ProfileId::LABEL, id))
    }

    async fn create_post(&self, post: NewPost) -> Result<Post> {
        let inserted = sqlx::query("INSERT INTO posts (author_id, title, url, text, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(post.author_id.0)
            .bind(post.title)
            .bind(post.url)
            .bind(post.text)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        let id = PostId(inserted.last_insert_rowid());
        self.get_post(id)
            .await?
            .ok_or_else(|| AppError::not_found(PostId::LABEL, id))
    }

    async fn get_post(&self, id: PostId) -> Result<Option<Post>> {
        sqlx::query(&format!("{POST_SELECT} WHERE po.id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(map_post)
            .transpose()
    }

    async fn count_posts(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count.max(0) as u64)
    }

    async fn list_posts(&self, limit: u64, offset: u64) -> Result<Vec<Post>> {
        sqlx::query(&format!("{POST_SELECT} ORDER BY po.score DESC, po.id ASC LIMIT ? OFFSET ?"))
            .bind(to_i64(limit)?)
            .bind(to_i64(offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .iter()
            .map(map_post)
            .collect()
    }

    async fn get_comment(&self, id: CommentId) -> Result<Option<Comment>> {
        sqlx::query(&format!("{COMMENT_SELECT} WHERE c.id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(map_comment)
            .transpose()
    }

    /// Inserts the comment and counts it against its root post in one transaction.
    async fn insert_comment(&self, comment: NewComment) -> Result<Comment> {
        let mut tx = self.begin_write().await?;

        if let Some(parent) = comment.parent_id {
            let parent_post: Option<i64> = sqlx::query_scalar("SELECT post_id FROM comments WHERE id = ?")
                .bind(parent.0)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
            match parent_post {
                None => return Err(AppError::not_found(CommentId::LABEL, parent)),
                Some(post) if post != comment.post_id.0 => {
                    return Err(AppError::validation(format!(
                        "comment {parent} belongs to post {post}, not {}",
                        comment.post_id
                    )));
                }
                Some(_) => {}
            }
        }

        let counted = sqlx::query("UPDATE posts SET comment_count = comment_count + 1 WHERE id = ?")
            .bind(comment.post_id.0)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        if counted.rows_affected() == 0 {
            return Err(AppError::not_found(PostId::LABEL, comment.post_id));
        }

        let inserted = sqlx::query(
            "INSERT INTO comments (author_id, post_id, parent_id, raw_text, html_text, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(comment.author_id.0)
        .bind(comment.post_id.0)
        .bind(comment.parent_id.map(|p| p.0))
        .bind(comment.raw_text)
        .bind(comment.html_text)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        let id = CommentId(inserted.last_insert_rowid());
        self.get_comment(id)
            .await?
            .ok_or_else(|| AppError::not_found(CommentId::LABEL, id))
    }

    async fn list_comments(&self, post: PostId) -> Result<Vec<Comment>> {
        sqlx::query(&format!("{COMMENT_SELECT} WHERE c.post_id = ? ORDER BY c.id ASC"))
            .bind(post.0)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .iter()
            .map(map_comment)
            .collect()
    }

    /// Read-decide-write of one (caster, target) pair inside a single
    /// immediate transaction, so concurrent casts on the same pair queue up and
    /// each one sees the previous one's vote. The UNIQUE
    /// (profile_id, target_kind, target_id) constraint backs this up: a second
    /// row is a `Conflict`, never a duplicate.
    async fn cast_vote(&self, caster: ProfileId, target: VoteTarget, value: VoteValue) -> Result<VoteOutcome> {
        let (table, karma_column) = target_tables(target);
        let kind = target.kind().as_str();
        let mut tx = self.begin_write().await?;

        let owner_query = match target {
            ContentRef::Post(_) => "SELECT author_id, id AS post_id FROM posts WHERE id = ?",
            ContentRef::Comment(_) => "SELECT author_id, post_id FROM comments WHERE id = ?",
        };
        let owner = sqlx::query(owner_query)
            .bind(target.raw_id())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .ok_or_else(|| target.not_found())?;
        let author_id = ProfileId(owner.try_get("author_id").map_err(db_err)?);
        let post_id: i64 = owner.try_get("post_id").map_err(db_err)?;

        let prior: Option<i64> = sqlx::query_scalar(
            "SELECT value FROM votes WHERE profile_id = ? AND target_kind = ? AND target_id = ?",
        )
        .bind(caster.0)
        .bind(kind)
        .bind(target.raw_id())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        let prior = prior.map(VoteValue::try_from).transpose()?;

        let transition = VoteTransition::resolve(prior, value);
        match transition {
            VoteTransition::Create { value } => {
                sqlx::query(
                    "INSERT INTO votes (profile_id, target_kind, target_id, post_id, value) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(caster.0)
                .bind(kind)
                .bind(target.raw_id())
                .bind(post_id)
                .bind(value.as_i64())
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
            VoteTransition::Cancel { .. } => {
                sqlx::query("DELETE FROM votes WHERE profile_id = ? AND target_kind = ? AND target_id = ?")
                    .bind(caster.0)
                    .bind(kind)
                    .bind(target.raw_id())
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
            }
            VoteTransition::Reverse { to, .. } => {
                sqlx::query("UPDATE votes SET value = ? WHERE profile_id = ? AND target_kind = ? AND target_id = ?")
                    .bind(to.as_i64())
                    .bind(caster.0)
                    .bind(kind)
                    .bind(target.raw_id())
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
            }
        }

        let change = transition.change();
        let counters = sqlx::query(&format!(
            "UPDATE {table} SET ups = ups + ?, downs = downs + ?, score = score + ? \
             WHERE id = ? RETURNING ups, downs, score"
        ))
        .bind(change.ups)
        .bind(change.downs)
        .bind(change.score)
        .bind(target.raw_id())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        let tally = map_tally(&counters)?;

        sqlx::query(&format!(
            "UPDATE profiles SET {karma_column} = {karma_column} + ? WHERE id = ?"
        ))
        .bind(change.score)
        .bind(author_id.0)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        tracing::debug!(caster = %caster, ?target, ?transition, "vote committed");
        Ok(VoteOutcome {
            transition,
            tally,
            author_id,
        })
    }

    async fn votes_on_posts(&self, caster: ProfileId, posts: &[PostId]) -> Result<Vec<Vote>> {
        if posts.is_empty() {
            return Ok(Vec::new());
        }
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT profile_id, target_kind, target_id, post_id, value FROM votes WHERE target_kind = 'submission' AND profile_id = ",
        );
        query.push_bind(caster.0).push(" AND target_id IN (");
        let mut ids = query.separated(", ");
        for post in posts {
            ids.push_bind(post.0);
        }
        ids.push_unseparated(")");

        query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .iter()
            .map(map_vote)
            .collect()
    }

    async fn votes_in_thread(&self, caster: ProfileId, post: PostId) -> Result<Vec<Vote>> {
        sqlx::query(
            "SELECT profile_id, target_kind, target_id, post_id, value FROM votes \
             WHERE profile_id = ? AND post_id = ?",
        )
        .bind(caster.0)
        .bind(post.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        .iter()
        .map(map_vote)
        .collect()
    }
}
