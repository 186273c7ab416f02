//! End-to-end tests for the REST surface.
//!
//! The router is served on an ephemeral port and driven with `reqwest`; the
//! classification service is replaced by an in-process stub.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use civic_connect::auth::{Credential, CredentialTable};
use civic_connect::classify::{Classification, ClassifyError, Classifier, ImageUpload};
use civic_connect::config::ServerConfig;
use civic_connect::db::Database;
use civic_connect::server::{build_router, AppState};
use civic_connect::uploads::ImageStore;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};

#[derive(Default)]
struct StubClassifier {
    fail: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl Classifier for StubClassifier {
    async fn classify(&self, image: &ImageUpload) -> Result<Classification, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ClassifyError::Status(StatusCode::SERVICE_UNAVAILABLE));
        }
        assert!(!image.bytes.is_empty());
        Ok(Classification {
            category: "Pothole".to_string(),
            description: "Detected a High urgency issue: Pothole.".to_string(),
            urgency: "High".to_string(),
        })
    }
}

struct TestApp {
    addr: SocketAddr,
    client: reqwest::Client,
    classifier: Arc<StubClassifier>,
    uploads: std::path::PathBuf,
    _dir: TempDir,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn submit(&self, author: Option<&str>) -> reqwest::Response {
        let mut form = Form::new()
            .part(
                "image",
                Part::bytes(vec![0xff, 0xd8, 0xff, 0xe0])
                    .file_name("pothole.jpg")
                    .mime_str("image/jpeg")
                    .unwrap(),
            )
            .text("lat", "12.9716")
            .text("lng", "77.5946");
        if let Some(author) = author {
            form = form.text("author", author.to_string());
        }

        self.client
            .post(self.url("/api/issues"))
            .multipart(form)
            .send()
            .await
            .unwrap()
    }

    async fn create(&self, author: &str) -> i64 {
        let res = self.submit(Some(author)).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = res.json().await.unwrap();
        body["id"].as_i64().unwrap()
    }

    async fn vote(&self, id: i64, user: &str, vote_type: &str) -> reqwest::Response {
        self.client
            .put(self.url(&format!("/api/issues/{}/vote", id)))
            .json(&json!({ "userId": user, "voteType": vote_type }))
            .send()
            .await
            .unwrap()
    }

    async fn vote_raw(&self, path: &str) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .json(&json!({ "userId": "alice", "voteType": "upvote" }))
            .send()
            .await
            .unwrap()
    }

    async fn get_json(&self, path: &str) -> Value {
        let res = self.client.get(self.url(path)).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        res.json().await.unwrap()
    }

    fn uploaded_files(&self) -> usize {
        std::fs::read_dir(&self.uploads).unwrap().count()
    }
}

async fn spawn_app(fail_classification: bool) -> TestApp {
    spawn_app_with_limit(fail_classification, 1024 * 1024).await
}

async fn spawn_app_with_limit(fail_classification: bool, max_upload_bytes: usize) -> TestApp {
    let dir = tempdir().unwrap();
    let uploads = dir.path().join("uploads");
    std::fs::create_dir_all(&uploads).unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let public_url = format!("http://{}", addr);

    let config = ServerConfig {
        bind: addr.to_string(),
        uploads_dir: uploads.clone(),
        public_url: public_url.clone(),
        classifier_url: "http://127.0.0.1:9/unused".to_string(),
        classifier_timeout: Duration::from_secs(1),
        client_dir: None,
        max_upload_bytes,
    };

    let classifier = Arc::new(StubClassifier {
        fail: fail_classification,
        ..Default::default()
    });
    let credentials = CredentialTable::new([
        Credential {
            username: "user1".to_string(),
            password: "pass123*".to_string(),
        },
        Credential {
            username: "user2".to_string(),
            password: "pass234*".to_string(),
        },
    ]);
    let db = Database::open(&dir.path().join("issues.db")).unwrap();
    let state = AppState::new(
        db,
        credentials,
        classifier.clone(),
        ImageStore::new(&uploads, &public_url),
    );
    let app = build_router(state, &config);
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });

    TestApp {
        addr,
        client: reqwest::Client::new(),
        classifier,
        uploads,
        _dir: dir,
    }
}

#[tokio::test]
async fn login_accepts_known_credentials_only() {
    let app = spawn_app(false).await;

    let res = app
        .client
        .post(app.url("/api/login"))
        .json(&json!({ "username": "user1", "password": "pass123*" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["identity"], "user1");
    assert_eq!(body["user"]["username"], "user1");

    let res = app
        .client
        .post(app.url("/api/login"))
        .json(&json!({ "username": "user1", "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn create_issue_classifies_and_persists() {
    let app = spawn_app(false).await;

    let res = app.submit(Some("user1")).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let issue: Value = res.json().await.unwrap();

    assert_eq!(issue["author"], "user1");
    assert_eq!(issue["category"], "Pothole");
    assert_eq!(issue["urgency"], "High");
    assert_eq!(issue["description"], "Detected a High urgency issue: Pothole.");
    assert_eq!(issue["status"], "Submitted");
    assert_eq!(issue["location"]["lat"], 12.9716);
    assert_eq!(issue["upvotes"], 0);
    assert_eq!(issue["downvotes"], 0);
    assert_eq!(issue["upvotedBy"], json!([]));
    assert_eq!(issue["downvotedBy"], json!([]));

    let image_url = issue["imageUrl"].as_str().unwrap();
    assert!(image_url.starts_with(&app.url("/uploads/")));
    assert!(image_url.ends_with(".jpg"));
    assert_eq!(app.uploaded_files(), 1);

    let image = app.client.get(image_url).send().await.unwrap();
    assert_eq!(image.status(), StatusCode::OK);
    assert_eq!(image.bytes().await.unwrap().as_ref(), &[0xff, 0xd8, 0xff, 0xe0]);

    let id = issue["id"].as_i64().unwrap();
    assert_eq!(issue["_id"], id);
    let fetched = app.get_json(&format!("/api/issues/{}", id)).await;
    assert_eq!(fetched["author"], "user1");
}

#[tokio::test]
async fn create_issue_without_author_is_rejected() {
    let app = spawn_app(false).await;

    let res = app.submit(None).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "validation_error");
    assert_eq!(body["message"], "Author is required.");

    assert_eq!(app.classifier.calls.load(Ordering::SeqCst), 0);
    assert_eq!(app.get_json("/api/issues").await, json!([]));
    assert_eq!(app.uploaded_files(), 0);
}

#[tokio::test]
async fn classification_failure_persists_nothing() {
    let app = spawn_app(true).await;

    let res = app.submit(Some("user1")).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "upstream_error");

    assert_eq!(app.classifier.calls.load(Ordering::SeqCst), 1);
    assert_eq!(app.get_json("/api/issues").await, json!([]));
    assert_eq!(app.uploaded_files(), 0);
}

#[tokio::test]
async fn vote_toggles_and_switches() {
    let app = spawn_app(false).await;
    let id = app.create("user1").await;

    let res = app.vote(id, "alice", "upvote").await;
    assert_eq!(res.status(), StatusCode::OK);
    let issue: Value = res.json().await.unwrap();
    assert_eq!(issue["upvotes"], 1);
    assert_eq!(issue["upvotedBy"], json!(["alice"]));

    let issue: Value = app.vote(id, "alice", "upvote").await.json().await.unwrap();
    assert_eq!(issue["upvotes"], 0);
    assert_eq!(issue["upvotedBy"], json!([]));

    let issue: Value = app.vote(id, "alice", "downvote").await.json().await.unwrap();
    assert_eq!(issue["downvotes"], 1);
    assert_eq!(issue["downvotedBy"], json!(["alice"]));

    let issue: Value = app.vote(id, "alice", "upvote").await.json().await.unwrap();
    assert_eq!(issue["upvotes"], 1);
    assert_eq!(issue["downvotes"], 0);
    assert_eq!(issue["upvotedBy"], json!(["alice"]));
    assert_eq!(issue["downvotedBy"], json!([]));
}

#[tokio::test]
async fn vote_errors_are_distinguished() {
    let app = spawn_app(false).await;
    let id = app.create("user1").await;

    let res = app.vote(99999, "alice", "upvote").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "not_found");

    let res = app.vote(id, "alice", "sideways").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app.vote(id, "  ", "upvote").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let issue = app.get_json(&format!("/api/issues/{}", id)).await;
    assert_eq!(issue["upvotes"], 0);
    assert_eq!(issue["downvotes"], 0);
}

#[tokio::test]
async fn concurrent_votes_are_not_lost() {
    let app = Arc::new(spawn_app(false).await);
    let id = app.create("user1").await;

    let tasks: Vec<_> = (0..20)
        .map(|n| {
            let app = app.clone();
            tokio::spawn(async move {
                let vote_type = if n % 4 == 0 { "downvote" } else { "upvote" };
                let res = app.vote(id, &format!("voter{}", n), vote_type).await;
                assert_eq!(res.status(), StatusCode::OK);
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let issue = app.get_json(&format!("/api/issues/{}", id)).await;
    assert_eq!(issue["upvotes"], 15);
    assert_eq!(issue["downvotes"], 5);
    assert_eq!(issue["upvotedBy"].as_array().unwrap().len(), 15);
    assert_eq!(issue["downvotedBy"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn feed_is_ordered_by_upvotes_then_recency() {
    let app = spawn_app(false).await;
    let first = app.create("user1").await;
    let second = app.create("user2").await;
    let third = app.create("user1").await;

    app.vote(first, "a", "upvote").await;
    app.vote(first, "b", "upvote").await;
    app.vote(second, "a", "upvote").await;
    app.vote(third, "a", "downvote").await;

    let feed = app.get_json("/api/issues").await;
    let ids: Vec<i64> = feed
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![first, second, third]);

    let mine = app.get_json("/api/issues/by/user1").await;
    let ids: Vec<i64> = mine
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![third, first]);

    assert_eq!(app.get_json("/api/issues/by/nobody").await, json!([]));
}

#[tokio::test]
async fn status_updates() {
    let app = spawn_app(false).await;
    let id = app.create("user1").await;

    let res = app
        .client
        .put(app.url(&format!("/api/issues/{}/status", id)))
        .json(&json!({ "status": "In Progress" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let issue: Value = res.json().await.unwrap();
    assert_eq!(issue["status"], "In Progress");
    assert_eq!(issue["author"], "user1");

    let res = app
        .client
        .put(app.url(&format!("/api/issues/{}/status", id)))
        .json(&json!({ "status": "Teleported" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .client
        .put(app.url("/api/issues/99999/status"))
        .json(&json!({ "status": "Resolved" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_and_missing_issue() {
    let app = spawn_app(false).await;

    assert_eq!(app.get_json("/health").await, json!({ "status": "ok" }));

    let res = app.client.get(app.url("/api/issues/42")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

async fn assert_validation_error(res: reqwest::Response) {
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "validation_error");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn incomplete_json_bodies_are_validation_errors() {
    let app = spawn_app(false).await;
    let id = app.create("user1").await;

    let res = app
        .client
        .put(app.url(&format!("/api/issues/{}/vote", id)))
        .json(&json!({ "userId": "alice" }))
        .send()
        .await
        .unwrap();
    assert_validation_error(res).await;

    let res = app
        .client
        .put(app.url(&format!("/api/issues/{}/status", id)))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_validation_error(res).await;

    let res = app
        .client
        .post(app.url("/api/login"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_validation_error(res).await;

    let res = app
        .client
        .put(app.url(&format!("/api/issues/{}/vote", id)))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_validation_error(res).await;

    let issue = app.get_json(&format!("/api/issues/{}", id)).await;
    assert_eq!(issue["upvotes"], 0);
    assert_eq!(issue["status"], "Submitted");
}

#[tokio::test]
async fn non_multipart_submission_is_a_validation_error() {
    let app = spawn_app(false).await;

    let res = app
        .client
        .post(app.url("/api/issues"))
        .json(&json!({ "author": "user1", "lat": 1.0, "lng": 2.0 }))
        .send()
        .await
        .unwrap();
    assert_validation_error(res).await;

    assert_eq!(app.classifier.calls.load(Ordering::SeqCst), 0);
    assert_eq!(app.get_json("/api/issues").await, json!([]));
}

#[tokio::test]
async fn non_numeric_issue_ids_are_not_found() {
    let app = spawn_app(false).await;

    let res = app.vote_raw("/api/issues/abc/vote").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "not_found");
    assert_eq!(body["message"], "Issue #abc not found");

    let res = app.client.get(app.url("/api/issues/abc")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = app
        .client
        .put(app.url("/api/issues/1.5/status"))
        .json(&json!({ "status": "Resolved" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_upload_is_payload_too_large() {
    let app = spawn_app_with_limit(false, 1024).await;

    let form = Form::new()
        .text("author", "user1")
        .text("lat", "12.9716")
        .text("lng", "77.5946")
        .part(
            "image",
            Part::bytes(vec![0u8; 4096])
                .file_name("big.jpg")
                .mime_str("image/jpeg")
                .unwrap(),
        );
    let res = app
        .client
        .post(app.url("/api/issues"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "payload_too_large");

    assert_eq!(app.classifier.calls.load(Ordering::SeqCst), 0);
    assert_eq!(app.uploaded_files(), 0);
}
