//! # Domain Models
//!
//! These structs represent the core entities of the forum.
//! Every entity is keyed by a positive integer assigned by the store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub const LABEL: &'static str = $label;
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Identity of a Profile; shared 1:1 with the owning account.
    ProfileId,
    "Profile"
);
entity_id!(
    /// Identity of a Post (submission).
    PostId,
    "Post"
);
entity_id!(
    /// Identity of a Comment.
    CommentId,
    "Comment"
);

/// Credentials record backing a Profile. Never serialized to clients.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: ProfileId,
    pub username: String,
    /// argon2 PHC string
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Forum-specific attributes of a registered user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub about_text: Option<String>,
    /// Rendered form of `about_text`
    pub about_html: Option<String>,
    pub homepage: Option<String>,
    pub twitter: Option<String>,
    pub github: Option<String>,
    pub comment_karma: i64,
    pub link_karma: i64,
    pub created_at: DateTime<Utc>,
}

/// Validated profile edit, ready to be persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub about_text: Option<String>,
    pub about_html: Option<String>,
    pub homepage: Option<String>,
    pub twitter: Option<String>,
    pub github: Option<String>,
}

/// Vote counters shared by Posts and Comments.
///
/// `score == ups - downs` holds for every tally the engine produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub ups: i64,
    pub downs: i64,
    pub score: i64,
}

impl Tally {
    pub fn is_consistent(&self) -> bool {
        self.score == self.ups - self.downs
    }
}

/// A top-level link or text submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: ProfileId,
    pub author_name: String,
    pub title: String,
    pub url: Option<String>,
    pub text: Option<String>,
    #[serde(flatten)]
    pub tally: Tally,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// Where the title links to: the external URL, or the post's own thread.
    pub fn linked_url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => self.comments_url(),
        }
    }

    pub fn comments_url(&self) -> String {
        format!("/comments/{}", self.id)
    }
}

/// Validated submission, ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub author_id: ProfileId,
    pub title: String,
    pub url: Option<String>,
    pub text: Option<String>,
}

/// A node in a Post's reply tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub author_id: ProfileId,
    pub author_name: String,
    /// Root Post of the tree, however deep this comment is nested
    pub post_id: PostId,
    /// `None` for root-level comments
    pub parent_id: Option<CommentId>,
    pub raw_text: String,
    pub html_text: String,
    #[serde(flatten)]
    pub tally: Tally,
    pub created_at: DateTime<Utc>,
}

/// Comment attached to its parent but not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewComment {
    pub author_id: ProfileId,
    pub post_id: PostId,
    pub parent_id: Option<CommentId>,
    pub raw_text: String,
    pub html_text: String,
}

/// The two kinds of content that can be voted on or replied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Submission,
    Comment,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Submission => "submission",
            TargetKind::Comment => "comment",
        }
    }
}

impl FromStr for TargetKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "submission" => Ok(TargetKind::Submission),
            "comment" => Ok(TargetKind::Comment),
            other => Err(AppError::validation(format!("unknown content type {other:?}"))),
        }
    }
}

/// Reference to a Post or a Comment, resolved from a (type tag, id) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentRef {
    Post(PostId),
    Comment(CommentId),
}

/// What a vote is cast on.
pub type VoteTarget = ContentRef;
/// What a new comment replies to.
pub type CommentParent = ContentRef;

impl ContentRef {
    /// Builds a reference from the raw type tag and id of a request.
    ///
    /// The id must be a positive decimal integer; existence is checked by the store.
    pub fn parse(kind: &str, id: &str) -> Result<Self> {
        let kind: TargetKind = kind.parse()?;
        let id = parse_positive_id(id)?;
        Ok(match kind {
            TargetKind::Submission => ContentRef::Post(PostId(id)),
            TargetKind::Comment => ContentRef::Comment(CommentId(id)),
        })
    }

    pub fn kind(&self) -> TargetKind {
        match self {
            ContentRef::Post(_) => TargetKind::Submission,
            ContentRef::Comment(_) => TargetKind::Comment,
        }
    }

    pub fn raw_id(&self) -> i64 {
        match self {
            ContentRef::Post(id) => id.0,
            ContentRef::Comment(id) => id.0,
        }
    }

    pub fn not_found(&self) -> AppError {
        match self {
            ContentRef::Post(id) => AppError::not_found(PostId::LABEL, id),
            ContentRef::Comment(id) => AppError::not_found(CommentId::LABEL, id),
        }
    }
}

fn parse_positive_id(raw: &str) -> Result<i64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::validation(format!("invalid id {raw:?}")));
    }
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(AppError::validation(format!("invalid id {raw:?}"))),
    }
}

/// A persisted vote is always +1 or -1; absence of a row means "no vote".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i64")]
pub enum VoteValue {
    Up,
    Down,
}

impl VoteValue {
    pub fn as_i64(self) -> i64 {
        match self {
            VoteValue::Up => 1,
            VoteValue::Down => -1,
        }
    }
}

impl From<VoteValue> for i8 {
    fn from(v: VoteValue) -> i8 {
        v.as_i64() as i8
    }
}

impl TryFrom<i64> for VoteValue {
    type Error = AppError;

    fn try_from(v: i64) -> Result<Self> {
        match v {
            1 => Ok(VoteValue::Up),
            -1 => Ok(VoteValue::Down),
            other => Err(AppError::validation(format!("vote value must be 1 or -1, got {other}"))),
        }
    }
}

impl FromStr for VoteValue {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let n: i64 = s
            .trim()
            .parse()
            .map_err(|_| AppError::validation(format!("vote value must be 1 or -1, got {s:?}")))?;
        VoteValue::try_from(n)
    }
}

/// A signed rating cast by one profile on one Post or Comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vote {
    pub profile_id: ProfileId,
    pub target: VoteTarget,
    /// Owning Post of the target, kept for per-thread lookups
    pub post_id: PostId,
    pub value: VoteValue,
}
