//! # Forum service
//!
//! Orchestrates the ports: validates input, resolves polymorphic targets and
//! parents, renders markdown, and delegates transactional writes to the store.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::comments::{build_tree, CommentNode, ResolvedParent};
use crate::error::{AppError, Result};
use crate::models::{
    Comment, CommentId, CommentParent, ContentRef, NewComment, Post, PostId, Profile, ProfileId, VoteTarget,
    VoteValue,
};
use crate::pagination::{Page, PageWindow, FRONT_PAGE_SIZE};
use crate::traits::{AuthProvider, ForumRepo, MarkdownRenderer};
use crate::validation::{Credentials, ProfileForm, SubmissionForm};
use crate::vote::VoteOutcome;

/// A logged-in session.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub profile: Profile,
}

/// Front page listing with the viewer's votes on the listed posts.
#[derive(Debug, Clone, Serialize)]
pub struct FrontPage {
    pub submissions: Page<Post>,
    /// Post id to vote value; empty for anonymous viewers
    pub submission_votes: HashMap<PostId, VoteValue>,
}

/// A post with its comment tree and the viewer's votes in it.
#[derive(Debug, Clone, Serialize)]
pub struct Thread {
    pub submission: Post,
    pub comments: Vec<CommentNode>,
    pub sub_vote: Option<VoteValue>,
    pub comment_votes: HashMap<CommentId, VoteValue>,
}

/// Entry point for every forum operation.
pub struct Forum {
    repo: Arc<dyn ForumRepo>,
    auth: Arc<dyn AuthProvider>,
    markdown: Arc<dyn MarkdownRenderer>,
}

impl Forum {
    pub fn new(repo: Arc<dyn ForumRepo>, auth: Arc<dyn AuthProvider>, markdown: Arc<dyn MarkdownRenderer>) -> Self {
        Self { repo, auth, markdown }
    }

    // ── Accounts ───────────────────────────────────────────────────────────

    #[instrument(skip_all, fields(username = ?credentials.username))]
    pub async fn register(&self, credentials: Credentials) -> Result<Session> {
        let registration = credentials.validate_registration()?;
        if self.repo.get_account(&registration.username).await?.is_some() {
            return Err(AppError::Conflict("A user with that username already exists.".into()));
        }
        let hash = self.auth.hash_password(&registration.password)?;
        let profile = self.repo.create_account(&registration.username, &hash).await?;
        let token = self.auth.issue_session(profile.id)?;
        info!(profile = %profile.id, "account registered");
        Ok(Session { token, profile })
    }

    #[instrument(skip_all, fields(username = ?credentials.username))]
    pub async fn login(&self, credentials: Credentials) -> Result<Session> {
        let (username, password) = credentials.into_login()?;
        let wrong = || AppError::Unauthorized("Wrong username or password.".into());

        let account = self.repo.get_account(&username).await?.ok_or_else(wrong)?;
        if !self.auth.verify_password(&password, &account.password_hash) {
            debug!("password mismatch");
            return Err(wrong());
        }
        let profile = self
            .repo
            .get_profile(account.id)
            .await?
            .ok_or_else(|| AppError::not_found("Profile", account.id))?;
        let token = self.auth.issue_session(profile.id)?;
        Ok(Session { token, profile })
    }

    /// Resolves a bearer token to the caster it was issued for.
    pub fn authenticate(&self, token: &str) -> Option<ProfileId> {
        self.auth.verify_session(token)
    }

    pub async fn profile(&self, username: &str) -> Result<Profile> {
        self.repo
            .get_profile_by_username(username)
            .await?
            .ok_or_else(|| AppError::not_found("Profile", username))
    }

    #[instrument(skip(self, form))]
    pub async fn edit_profile(&self, caster: ProfileId, form: ProfileForm) -> Result<Profile> {
        self.require_profile(caster).await?;
        let mut update = form.validate()?;
        update.about_html = update
            .about_text
            .as_deref()
            .map(|text| self.markdown.render(text))
            .transpose()?;
        let profile = self.repo.update_profile(caster, update).await?;
        info!("profile updated");
        Ok(profile)
    }

    // ── Posts ──────────────────────────────────────────────────────────────

    #[instrument(skip(self, form))]
    pub async fn submit(&self, author: ProfileId, form: SubmissionForm) -> Result<Post> {
        self.require_profile(author).await?;
        let post = self.repo.create_post(form.validate(author)?).await?;
        info!(post = %post.id, "submission created");
        Ok(post)
    }

    /// Posts ordered by descending score, `FRONT_PAGE_SIZE` per page.
    #[instrument(skip(self))]
    pub async fn frontpage(&self, viewer: Option<ProfileId>, page: i64) -> Result<FrontPage> {
        let total = self.repo.count_posts().await?;
        let window = PageWindow::new(total, FRONT_PAGE_SIZE, page);
        let items = self.repo.list_posts(window.limit, window.offset).await?;

        let submission_votes = match viewer {
            Some(viewer) if !items.is_empty() => {
                let ids: Vec<PostId> = items.iter().map(|p| p.id).collect();
                self.repo
                    .votes_on_posts(viewer, &ids)
                    .await?
                    .into_iter()
                    .filter_map(|v| match v.target {
                        ContentRef::Post(id) => Some((id, v.value)),
                        ContentRef::Comment(_) => None,
                    })
                    .collect()
            }
            _ => HashMap::new(),
        };

        Ok(FrontPage {
            submissions: Page { items, window },
            submission_votes,
        })
    }

    #[instrument(skip(self))]
    pub async fn thread(&self, viewer: Option<ProfileId>, id: PostId) -> Result<Thread> {
        let submission = self
            .repo
            .get_post(id)
            .await?
            .ok_or_else(|| AppError::not_found(PostId::LABEL, id))?;
        let comments = build_tree(self.repo.list_comments(id).await?);

        let mut sub_vote = None;
        let mut comment_votes = HashMap::new();
        if let Some(viewer) = viewer {
            for vote in self.repo.votes_in_thread(viewer, id).await? {
                match vote.target {
                    ContentRef::Post(_) => sub_vote = Some(vote.value),
                    ContentRef::Comment(comment) => {
                        comment_votes.insert(comment, vote.value);
                    }
                }
            }
        }

        Ok(Thread {
            submission,
            comments,
            sub_vote,
            comment_votes,
        })
    }

    // ── Comment Tree Builder ───────────────────────────────────────────────

    /// Attaches a new comment to a Post (root comment) or a Comment (reply).
    ///
    /// The owning post's `comment_count` grows by one in the same transaction
    /// as the insert.
    #[instrument(skip(self, raw_text))]
    pub async fn create_comment(&self, author: ProfileId, raw_text: &str, parent: CommentParent) -> Result<Comment> {
        self.require_profile(author).await?;
        if raw_text.trim().is_empty() {
            return Err(AppError::validation("You have to write something."));
        }
        let parent = self.resolve_parent(parent).await?;
        let html = self
            .markdown
            .render(raw_text)
            .inspect_err(|e| warn!(error = %e, "markdown rendering failed"))?;

        let comment = self
            .repo
            .insert_comment(NewComment::attach(author, raw_text.to_string(), html, &parent))
            .await?;
        info!(comment = %comment.id, post = %comment.post_id, "comment posted");
        Ok(comment)
    }

    async fn resolve_parent(&self, parent: CommentParent) -> Result<ResolvedParent> {
        let resolved = match parent {
            ContentRef::Post(id) => self.repo.get_post(id).await?.map(ResolvedParent::Post),
            ContentRef::Comment(id) => self.repo.get_comment(id).await?.map(ResolvedParent::Comment),
        };
        resolved.ok_or_else(|| parent.not_found())
    }

    // ── Vote Engine ────────────────────────────────────────────────────────

    /// Casts, cancels or reverses the caster's vote; returns the committed outcome.
    ///
    /// Target existence is checked inside the store's transaction.
    #[instrument(skip(self))]
    pub async fn cast_vote(&self, caster: ProfileId, target: VoteTarget, value: VoteValue) -> Result<VoteOutcome> {
        self.require_profile(caster).await?;
        let outcome = self.repo.cast_vote(caster, target, value).await?;
        info!(delta = outcome.delta(), score = outcome.tally.score, "vote applied");
        Ok(outcome)
    }

    async fn require_profile(&self, id: ProfileId) -> Result<Profile> {
        self.repo
            .get_profile(id)
            .await?
            .ok_or_else(|| AppError::Unauthorized(format!("unknown caster {id}")))
    }
}
