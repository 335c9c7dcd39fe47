//! API integration tests, driving the router in process

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use libris_server::{
    config::{AppConfig, StorageBackend},
    models::{
        book::Book,
        user::{Role, UserClaims},
    },
    repository::{memory::MemoryBorrowingStore, Repository},
    AppState,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    router: Router,
    secret: String,
    book_id: Uuid,
}

impl TestApp {
    async fn new(copies: i32) -> Self {
        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Memory;
        let secret = config.auth.jwt_secret.clone();

        let store = MemoryBorrowingStore::new();
        let book_id = store
            .insert_book(
                Book::new("Neuromancer", "William Gibson", "9780441569595", copies)
                    .with_category("Science Fiction"),
            )
            .await
            .unwrap();

        let state = AppState::new(config, Repository::memory(store));
        Self {
            router: libris_server::api::router(state),
            secret,
            book_id,
        }
    }

    fn token(&self, user_id: Uuid, role: Role) -> String {
        UserClaims::new(user_id, role, 1)
            .create_token(&self.secret)
            .unwrap()
    }

    async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(format!("/api/v1{}", uri));
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new(1).await;
    let (status, body) = app.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.send("GET", "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_borrow_without_identity() {
    let app = TestApp::new(1).await;
    let (status, body) = app
        .send("POST", "/borrowings", None, Some(json!({ "book_id": app.book_id })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NotAuthenticated");

    let (_, book) = app.send("GET", &format!("/books/{}", app.book_id), None, None).await;
    assert_eq!(book["available_copies"], 1);
}

#[tokio::test]
async fn test_borrow_and_return() {
    let app = TestApp::new(1).await;
    let token = app.token(Uuid::new_v4(), Role::Student);

    let (status, receipt) = app
        .send("POST", "/borrowings", Some(&token), Some(json!({ "book_id": app.book_id })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let borrowing_id = receipt["borrowing_id"].as_str().unwrap().to_string();
    assert!(receipt["due_date"].is_string());

    let (_, book) = app.send("GET", &format!("/books/{}", app.book_id), None, None).await;
    assert_eq!(book["available_copies"], 0);

    // Second borrower finds the shelf empty.
    let other = app.token(Uuid::new_v4(), Role::Faculty);
    let (status, body) = app
        .send("POST", "/borrowings", Some(&other), Some(json!({ "book_id": app.book_id })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "OutOfStock");

    let uri = format!("/borrowings/{}/return", borrowing_id);
    let (status, body) = app
        .send("POST", &uri, Some(&token), Some(json!({ "book_id": app.book_id })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["return_date"].is_string());

    let (status, body) = app
        .send("POST", &uri, Some(&token), Some(json!({ "book_id": app.book_id })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "AlreadyReturned");

    let (_, book) = app.send("GET", &format!("/books/{}", app.book_id), None, None).await;
    assert_eq!(book["available_copies"], 1);
}

#[tokio::test]
async fn test_my_borrowings() {
    let app = TestApp::new(2).await;
    let token = app.token(Uuid::new_v4(), Role::Student);

    app.send("POST", "/borrowings", Some(&token), Some(json!({ "book_id": app.book_id })))
        .await;

    let (status, body) = app.send("GET", "/me/borrowings", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["book"]["title"], "Neuromancer");
    assert_eq!(list[0]["status"], "active");
    assert_eq!(list[0]["is_overdue"], false);
}

#[tokio::test]
async fn test_admin_projections_require_staff() {
    let app = TestApp::new(1).await;
    let student = app.token(Uuid::new_v4(), Role::Student);
    let librarian = app.token(Uuid::new_v4(), Role::Librarian);

    for uri in ["/borrowings", "/borrowings/overdue", "/stats/borrowings"] {
        let (status, _) = app.send("GET", uri, Some(&student), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", uri);

        let (status, _) = app.send("GET", uri, Some(&librarian), None).await;
        assert_eq!(status, StatusCode::OK, "{}", uri);
    }

    let (status, _) = app.send("GET", "/borrowings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_book() {
    let app = TestApp::new(1).await;
    let token = app.token(Uuid::new_v4(), Role::Student);
    let (status, _) = app
        .send("POST", "/borrowings", Some(&token), Some(json!({ "book_id": Uuid::new_v4() })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_return_by_other_user_forbidden() {
    let app = TestApp::new(1).await;
    let owner = app.token(Uuid::new_v4(), Role::Student);
    let stranger = app.token(Uuid::new_v4(), Role::Student);

    let (_, receipt) = app
        .send("POST", "/borrowings", Some(&owner), Some(json!({ "book_id": app.book_id })))
        .await;
    let uri = format!("/borrowings/{}/return", receipt["borrowing_id"].as_str().unwrap());

    let (status, body) = app
        .send("POST", &uri, Some(&stranger), Some(json!({ "book_id": app.book_id })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "NotAuthorized");

    let (_, book) = app.send("GET", &format!("/books/{}", app.book_id), None, None).await;
    assert_eq!(book["available_copies"], 0);

    let (status, _) = app
        .send("POST", &uri, Some(&owner), Some(json!({ "book_id": app.book_id })))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_librarian_returns_on_behalf_of_patron() {
    let app = TestApp::new(1).await;
    let owner = app.token(Uuid::new_v4(), Role::Student);
    let librarian = app.token(Uuid::new_v4(), Role::Librarian);

    let (_, receipt) = app
        .send("POST", "/borrowings", Some(&owner), Some(json!({ "book_id": app.book_id })))
        .await;
    let uri = format!("/borrowings/{}/return", receipt["borrowing_id"].as_str().unwrap());

    let (status, _) = app
        .send("POST", &uri, Some(&librarian), Some(json!({ "book_id": app.book_id })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, book) = app.send("GET", &format!("/books/{}", app.book_id), None, None).await;
    assert_eq!(book["available_copies"], 1);
}
