//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.

use async_trait::async_trait;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::error::Result;
use crate::models::{
    Account, Comment, CommentId, NewComment, NewPost, Post, PostId, Profile, ProfileId, ProfileUpdate, Vote,
    VoteTarget, VoteValue,
};
use crate::vote::VoteOutcome;

/// Data persistence contract for profiles, posts, comments and votes.
///
/// Every method is one transaction; multi-row writes either commit together or not at all.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ForumRepo: Send + Sync {
    // Account / Profile Operations

    /// Creates the account and its empty profile. Duplicate usernames are a `Conflict`.
    async fn create_account(&self, username: &str, password_hash: &str) -> Result<Profile>;
    async fn get_account(&self, username: &str) -> Result<Option<Account>>;
    async fn get_profile(&self, id: ProfileId) -> Result<Option<Profile>>;
    async fn get_profile_by_username(&self, username: &str) -> Result<Option<Profile>>;
    async fn update_profile(&self, id: ProfileId, update: ProfileUpdate) -> Result<Profile>;

    // Post Operations
    async fn create_post(&self, post: NewPost) -> Result<Post>;
    async fn get_post(&self, id: PostId) -> Result<Option<Post>>;
    async fn count_posts(&self) -> Result<u64>;
    /// Posts by descending score, oldest first among equal scores.
    async fn list_posts(&self, limit: u64, offset: u64) -> Result<Vec<Post>>;

    // Comment Operations
    async fn get_comment(&self, id: CommentId) -> Result<Option<Comment>>;
    /// Inserts the comment and bumps its post's `comment_count` in the same transaction.
    async fn insert_comment(&self, comment: NewComment) -> Result<Comment>;
    async fn list_comments(&self, post: PostId) -> Result<Vec<Comment>>;

    // Vote Operations

    /// Creates, cancels or reverses the caster's vote on `target` and updates
    /// the target's counters and its author's karma, atomically.
    async fn cast_vote(&self, caster: ProfileId, target: VoteTarget, value: VoteValue) -> Result<VoteOutcome>;
    /// The caster's votes on any of `posts` (post votes only).
    async fn votes_on_posts(&self, caster: ProfileId, posts: &[PostId]) -> Result<Vec<Vote>>;
    /// Every vote the caster made inside one thread, on the post and its comments.
    async fn votes_in_thread(&self, caster: ProfileId, post: PostId) -> Result<Vec<Vote>>;
}

/// Identity contract: password hashing and session tokens.
#[cfg_attr(any(test, feature = "testing"), automock)]
pub trait AuthProvider: Send + Sync {
    /// Produces a self-describing hash (PHC string) of `password`.
    fn hash_password(&self, password: &str) -> Result<String>;

    /// Verifies `password` against a hash produced by `hash_password`.
    fn verify_password(&self, password: &str, hash: &str) -> bool;

    /// Issues a session token for an authenticated profile.
    fn issue_session(&self, profile: ProfileId) -> Result<String>;

    /// Resolves a session token; `None` if it is invalid or expired.
    fn verify_session(&self, token: &str) -> Option<ProfileId>;
}

/// Markdown-to-HTML collaborator used for comments and profile bios.
#[cfg_attr(any(test, feature = "testing"), automock)]
pub trait MarkdownRenderer: Send + Sync {
    /// Renders untrusted markdown to safe HTML. May reject input.
    fn render(&self, raw: &str) -> Result<String>;
}
