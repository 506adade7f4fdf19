//! # rr-api Handlers
//!
//! This module coordinates the flow between HTTP requests and the `Forum` service.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use rr_core::pagination::parse_page_param;
use rr_core::validation::{Credentials, ProfileForm, SubmissionForm};
use rr_core::{AppError, ContentRef, FrontPage, Post, PostId, Profile, Session, Thread, VoteValue};
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::extract::Caster;
use crate::AppState;

const MSG_LOGIN_TO_COMMENT: &str = "You need to log in to post new comments.";
const MSG_EMPTY_COMMENT: &str = "You have to write something.";
const MSG_COMMENT_POSTED: &str = "Your comment has been posted.";

#[derive(Debug, Deserialize)]
pub struct FrontPageQuery {
    page: Option<String>,
}

/// Front page, ordered by descending score.
pub async fn frontpage(
    State(state): State<AppState>,
    caster: Caster,
    Query(query): Query<FrontPageQuery>,
) -> Result<Json<FrontPage>, ApiError> {
    let page = parse_page_param(query.page.as_deref())?;
    Ok(Json(state.forum.frontpage(caster.0, page).await?))
}

/// A submission with its comment tree and the viewer's votes.
pub async fn view_thread(
    State(state): State<AppState>,
    caster: Caster,
    Path(raw_id): Path<String>,
) -> Result<Json<Thread>, ApiError> {
    let id = match raw_id.parse::<i64>() {
        Ok(id) if id > 0 => PostId(id),
        _ => return Err(AppError::not_found(PostId::LABEL, raw_id).into()),
    };
    Ok(Json(state.forum.thread(caster.0, id).await?))
}

pub async fn register(
    State(state): State<AppState>,
    Form(credentials): Form<Credentials>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let session = state.forum.register(credentials).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn login(
    State(state): State<AppState>,
    Form(credentials): Form<Credentials>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(state.forum.login(credentials).await?))
}

pub async fn view_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Profile>, ApiError> {
    Ok(Json(state.forum.profile(&username).await?))
}

pub async fn edit_profile(
    State(state): State<AppState>,
    caster: Caster,
    Form(form): Form<ProfileForm>,
) -> Result<Json<Profile>, ApiError> {
    let caster = caster.required()?;
    Ok(Json(state.forum.edit_profile(caster, form).await?))
}

pub async fn submit(
    State(state): State<AppState>,
    caster: Caster,
    Form(form): Form<SubmissionForm>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    let caster = caster.required()?;
    let post = state.forum.submit(caster, form).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

#[derive(Debug, Deserialize)]
pub struct CommentForm {
    #[serde(rename = "parentType")]
    parent_type: Option<String>,
    #[serde(rename = "parentId")]
    parent_id: Option<String>,
    #[serde(rename = "commentContent")]
    comment_content: Option<String>,
}

fn msg(status: StatusCode, text: &str) -> Response {
    (status, Json(json!({ "msg": text }))).into_response()
}

/// Creates a root comment on a submission, or a reply to a comment.
pub async fn post_comment(State(state): State<AppState>, caster: Caster, Form(form): Form<CommentForm>) -> Response {
    // 1. Identity
    let Some(author) = caster.0 else {
        return msg(StatusCode::FORBIDDEN, MSG_LOGIN_TO_COMMENT);
    };

    // 2. Parent reference
    let parent = match ContentRef::parse(
        form.parent_type.as_deref().unwrap_or_default(),
        form.parent_id.as_deref().unwrap_or_default(),
    ) {
        Ok(parent) => parent,
        Err(e) => return ApiError::from(e).into_response(),
    };

    // 3. Content
    let text = form.comment_content.unwrap_or_default();
    if text.trim().is_empty() {
        return msg(StatusCode::OK, MSG_EMPTY_COMMENT);
    }

    // 4. Persistence
    match state.forum.create_comment(author, &text, parent).await {
        Ok(_) => msg(StatusCode::OK, MSG_COMMENT_POSTED),
        Err(AppError::Unauthorized(_)) => msg(StatusCode::FORBIDDEN, MSG_LOGIN_TO_COMMENT),
        Err(e) => ApiError::missing_as_bad_request(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct VoteForm {
    what: Option<String>,
    what_id: Option<String>,
    vote_value: Option<String>,
}

/// Casts, cancels or reverses a vote and reports the score change.
pub async fn vote(
    State(state): State<AppState>,
    caster: Caster,
    Form(form): Form<VoteForm>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let caster = caster.required()?;

    let value: VoteValue = form
        .vote_value
        .as_deref()
        .ok_or_else(|| AppError::validation("vote_value is required"))?
        .parse()?;
    let target = ContentRef::parse(
        form.what.as_deref().unwrap_or_default(),
        form.what_id.as_deref().unwrap_or_default(),
    )?;

    let outcome = state
        .forum
        .cast_vote(caster, target, value)
        .await
        .map_err(ApiError::missing_as_bad_request)?;

    Ok(Json(json!({ "error": null, "voteDiff": outcome.delta() })))
}

pub async fn health() -> &'static str {
    "ok"
}
