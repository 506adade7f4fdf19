//! End-to-end tests of the HTTP surface over an in-memory SQLite store.

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Request, StatusCode};
use axum::Router;
use rr_api::{router, AppState};
use rr_auth_simple::SimpleAuthProvider;
use rr_core::Forum;
use rr_db_sqlite::SqliteForumRepo;
use rr_markdown::CommonMarkRenderer;
use serde_json::Value;
use tower::ServiceExt;

async fn app() -> Router {
    let repo = SqliteForumRepo::new("sqlite::memory:").await.unwrap();
    let auth = SimpleAuthProvider::new(b"integration-test-secret-0123456789", 3600)
        .with_hash_cost(1024, 1)
        .unwrap();
    let forum = Forum::new(Arc::new(repo), Arc::new(auth), Arc::new(CommonMarkRenderer::new()));
    router(AppState::new(forum))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn get(app: &Router, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        request = request.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    send(app, request.body(Body::empty()).unwrap()).await
}

async fn post_form(app: &Router, uri: &str, token: Option<&str>, body: &str) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(token) = token {
        request = request.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    send(app, request.body(Body::from(body.to_string())).unwrap()).await
}

async fn register(app: &Router, username: &str) -> String {
    let (status, body) = post_form(app, "/register", None, &format!("username={username}&password=password")).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["token"].as_str().unwrap().to_string()
}

async fn submit(app: &Router, token: &str, title: &str) -> i64 {
    let (status, body) = post_form(app, "/submit", Some(token), &format!("title={title}")).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_i64().unwrap()
}

async fn vote(app: &Router, token: &str, what: &str, id: i64, value: &str) -> (StatusCode, Value) {
    post_form(
        app,
        "/vote",
        Some(token),
        &format!("what={what}&what_id={id}&vote_value={value}"),
    )
    .await
}

#[tokio::test]
async fn registration_and_login() {
    let app = app().await;
    let token = register(&app, "alice").await;
    assert!(!token.is_empty());

    let (status, body) = post_form(&app, "/register", None, "username=alice&password=other").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "A user with that username already exists.");

    let (status, _) = post_form(&app, "/register", None, "username=a!&password=password").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post_form(&app, "/login", None, "username=alice&password=password").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["profile"]["username"], "alice");

    let (status, body) = post_form(&app, "/login", None, "username=alice&password=wrong").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Wrong username or password.");
}

#[tokio::test]
async fn vote_endpoint_reports_deltas() {
    let app = app().await;
    let author = register(&app, "author").await;
    let voter = register(&app, "voter").await;
    let post = submit(&app, &author, "vote+testing").await;

    let expected = [("1", 1), ("1", -1), ("-1", -1), ("1", 2)];
    for (value, diff) in expected {
        let (status, body) = vote(&app, &voter, "submission", post, value).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], Value::Null);
        assert_eq!(body["voteDiff"], diff);
    }

    let (_, thread) = get(&app, &format!("/comments/{post}"), Some(&voter)).await;
    assert_eq!(thread["submission"]["score"], 1);
    assert_eq!(thread["submission"]["ups"], 1);
    assert_eq!(thread["submission"]["downs"], 0);
    assert_eq!(thread["sub_vote"], 1);

    let (_, profile) = get(&app, "/user/author", None).await;
    assert_eq!(profile["link_karma"], 1);
}

#[tokio::test]
async fn vote_endpoint_rejects_bad_input() {
    let app = app().await;
    let token = register(&app, "voter").await;
    let post = submit(&app, &token, "target").await;

    let (status, _) = post_form(&app, "/vote", None, &format!("what=submission&what_id={post}&vote_value=1")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    for value in ["0", "abc", "2"] {
        let (status, _) = vote(&app, &token, "submission", post, value).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "vote_value={value}");
    }
    let (status, _) = vote(&app, &token, "banana", post, "1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = vote(&app, &token, "comment", 9999, "1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = post_form(&app, "/vote", Some(&token), "what=submission&what_id=-3&vote_value=1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // nothing was mutated
    let (_, thread) = get(&app, &format!("/comments/{post}"), None).await;
    assert_eq!(thread["submission"]["score"], 0);
}

#[tokio::test]
async fn comment_endpoint_builds_thread() {
    let app = app().await;
    let token = register(&app, "writer").await;
    let post = submit(&app, &token, "discussion").await;

    let (status, body) = post_form(
        &app,
        "/post/comment",
        None,
        &format!("parentType=submission&parentId={post}&commentContent=hi"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["msg"], "You need to log in to post new comments.");

    let (status, body) = post_form(
        &app,
        "/post/comment",
        Some(&token),
        &format!("parentType=submission&parentId={post}&commentContent=+++"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["msg"], "You have to write something.");

    let (status, _) = post_form(&app, "/post/comment", Some(&token), "parentType=wiki&parentId=1&commentContent=x").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = post_form(&app, "/post/comment", Some(&token), "parentType=comment&parentId=abc&commentContent=x").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = post_form(&app, "/post/comment", Some(&token), "parentType=comment&parentId=9999&commentContent=x").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post_form(
        &app,
        "/post/comment",
        Some(&token),
        &format!("parentType=submission&parentId={post}&commentContent=root+**comment**"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["msg"], "Your comment has been posted.");

    let (_, thread) = get(&app, &format!("/comments/{post}"), None).await;
    let root_id = thread["comments"][0]["id"].as_i64().unwrap();
    assert_eq!(thread["comments"][0]["html_text"], "<p>root <strong>comment</strong></p>\n");

    let (status, _) = post_form(
        &app,
        "/post/comment",
        Some(&token),
        &format!("parentType=comment&parentId={root_id}&commentContent=reply"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, thread) = get(&app, &format!("/comments/{post}"), Some(&token)).await;
    assert_eq!(thread["submission"]["comment_count"], 2);
    let reply = &thread["comments"][0]["children"][0];
    assert_eq!(reply["parent_id"], root_id);
    assert_eq!(reply["post_id"], post);
    assert_eq!(reply["depth"], 1);

    let reply_id = reply["id"].as_i64().unwrap();
    let (status, body) = vote(&app, &token, "comment", reply_id, "-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["voteDiff"], -1);
    let (_, thread) = get(&app, &format!("/comments/{post}"), Some(&token)).await;
    assert_eq!(thread["comment_votes"][reply_id.to_string()], -1);
    assert_eq!(thread["sub_vote"], Value::Null);
}

#[tokio::test]
async fn frontpage_paging_and_viewer_votes() {
    let app = app().await;
    let token = register(&app, "poster").await;
    let first = submit(&app, &token, "first").await;
    let second = submit(&app, &token, "second").await;
    vote(&app, &token, "submission", second, "1").await;

    let (status, page) = get(&app, "/", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let items = page["submissions"]["items"].as_array().unwrap();
    assert_eq!(items[0]["id"], second);
    assert_eq!(items[1]["id"], first);
    assert_eq!(page["submissions"]["number"], 1);
    assert_eq!(page["submission_votes"][second.to_string()], 1);

    let (status, page) = get(&app, "/?page=99", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["submissions"]["number"], 1);
    assert_eq!(page["submission_votes"], serde_json::json!({}));

    let (status, _) = get(&app, "/?page=abc", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_resources_are_404() {
    let app = app().await;
    assert_eq!(get(&app, "/comments/9999", None).await.0, StatusCode::NOT_FOUND);
    assert_eq!(get(&app, "/comments/abc", None).await.0, StatusCode::NOT_FOUND);
    assert_eq!(get(&app, "/user/nobody", None).await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn profile_editing() {
    let app = app().await;
    let token = register(&app, "editor").await;

    let (status, _) = post_form(&app, "/profile/edit", None, "first_name=Ed").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = post_form(
        &app,
        "/profile/edit",
        Some(&token),
        "first_name=Ed&about_text=**hello**&homepage=https%3A%2F%2Fexample.com&github=editor",
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["first_name"], "Ed");
    assert_eq!(body["about_html"], "<p><strong>hello</strong></p>\n");

    let (status, _) = post_form(&app, "/profile/edit", Some(&token), "homepage=not+a+url").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, profile) = get(&app, "/user/editor", None).await;
    assert_eq!(profile["github"], "editor");
}

#[tokio::test]
async fn forged_token_is_anonymous() {
    let app = app().await;
    let (status, _) = post_form(&app, "/submit", Some("not-a-token"), "title=hello").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
