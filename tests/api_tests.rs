// tests/api_tests.rs

use std::{net::SocketAddr, sync::Arc};

use serde_json::{Value, json};
use skillcert::{
    config::Config,
    models::user::Role,
    routes,
    state::AppState,
    store::{MemoryStore, NewUser, Store},
    utils::hash::hash_password,
};

const ADMIN_USERNAME: &str = "admin";
const ADMIN_PASSWORD: &str = "admin-password";

struct TestApp {
    address: String,
    client: reqwest::Client,
}

/// Spawns the app on a random port, backed by an in-memory store with one admin.
async fn spawn_app() -> TestApp {
    let store = MemoryStore::new();

    let mut tx = store.begin().await.unwrap();
    tx.create_user(NewUser {
        username: ADMIN_USERNAME.to_string(),
        name: "Administrator".to_string(),
        password_hash: hash_password(ADMIN_PASSWORD).unwrap(),
        role: Role::Admin,
    })
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let config = Config {
        database_url: "postgres://unused".to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        database_max_connections: 1,
        admin_username: None,
        admin_password: None,
    };

    let app = routes::create_router(AppState::new(Arc::new(store), config));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    async fn register(&self, username: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/auth/register"))
            .json(&json!({
                "username": username,
                "name": format!("{} tester", username),
                "password": "password123"
            }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    async fn login(&self, username: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Returns (token, user id).
    async fn user_token(&self, username: &str) -> (String, i64) {
        assert_eq!(self.register(username).await.status().as_u16(), 201);
        let body: Value = self.login(username, "password123").await.json().await.unwrap();
        (
            body["data"]["token"].as_str().unwrap().to_string(),
            body["data"]["userId"].as_i64().unwrap(),
        )
    }

    async fn admin_token(&self) -> String {
        let body: Value = self
            .login(ADMIN_USERNAME, ADMIN_PASSWORD)
            .await
            .json()
            .await
            .unwrap();
        body["data"]["token"].as_str().unwrap().to_string()
    }

    async fn post(&self, path: &str, token: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Creates a 30-minute evaluation with one 10-point choice question.
    /// Returns (evaluation id, question id, correct option id, wrong option id).
    async fn seed_evaluation(&self, admin: &str) -> (i64, i64, i64, i64) {
        let response = self
            .post(
                "/api/admin/evaluations",
                admin,
                json!({
                    "title": "Forklift Operation",
                    "durationMinutes": 30,
                    "passingScore": 70,
                    "maxAttempts": 2
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.unwrap();
        let evaluation_id = body["data"]["id"].as_i64().unwrap();

        let response = self
            .post(
                &format!("/api/admin/evaluations/{}/questions", evaluation_id),
                admin,
                json!({
                    "questionText": "Maximum load?",
                    "questionType": "MULTIPLE_CHOICE",
                    "points": 10,
                    "options": [
                        { "optionText": "As rated", "isCorrect": true },
                        { "optionText": "Double the rating" }
                    ]
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.unwrap();
        let question_id = body["data"]["id"].as_i64().unwrap();
        let options = body["data"]["options"].as_array().unwrap();

        (
            evaluation_id,
            question_id,
            options[0]["id"].as_i64().unwrap(),
            options[1]["id"].as_i64().unwrap(),
        )
    }
}

#[tokio::test]
async fn unknown_path_is_404() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/random_path_that_does_not_exist"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn register_works_once_per_username() {
    let app = spawn_app().await;

    let response = app.register("carol").await;
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["username"], "carol");
    assert_eq!(body["data"]["role"], "NORMAL");
    assert!(body["data"].get("password").is_none());

    let response = app.register("carol").await;
    assert_eq!(response.status().as_u16(), 409);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn register_fails_validation() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/api/auth/register"))
        .json(&json!({ "username": "yo", "password": "password123" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn login_rejects_wrong_password() {
    let app = spawn_app().await;
    app.register("dave").await;

    let response = app.login("dave", "not-the-password").await;
    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn attempts_require_a_token() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/api/attempts/user/current"))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 401);

    let response = app.get("/api/attempts/user/current", "garbage").await;
    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn admin_routes_reject_normal_users() {
    let app = spawn_app().await;
    let (token, _) = app.user_token("erin").await;

    let response = app
        .post(
            "/api/admin/evaluations",
            &token,
            json!({
                "title": "Sneaky",
                "durationMinutes": 10,
                "passingScore": 0,
                "maxAttempts": 1
            }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn question_options_are_checked() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    let (evaluation_id, ..) = app.seed_evaluation(&admin).await;

    let response = app
        .post(
            &format!("/api/admin/evaluations/{}/questions", evaluation_id),
            &admin,
            json!({
                "questionText": "Pick two",
                "questionType": "MULTIPLE_CHOICE",
                "points": 5,
                "options": [
                    { "optionText": "A", "isCorrect": true },
                    { "optionText": "B", "isCorrect": true }
                ]
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app.get(&format!("/api/admin/evaluations/{}", evaluation_id), &admin).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["questions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn full_attempt_flow() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    let (evaluation_id, question_id, right, _wrong) = app.seed_evaluation(&admin).await;
    let (token, user_id) = app.user_token("frank").await;

    // Start
    let response = app
        .client
        .post(app.url("/api/attempts"))
        .bearer_auth(&token)
        .header("X-Forwarded-For", "203.0.113.7, 10.0.0.1")
        .json(&json!({ "evaluationId": evaluation_id }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["attemptNumber"], 1);
    assert_eq!(body["data"]["status"], "IN_PROGRESS");
    assert_eq!(body["data"]["maxScore"], 10);
    assert_eq!(body["data"]["ipAddress"], "203.0.113.7");
    let attempt_id = body["data"]["id"].as_i64().unwrap();

    // A second start while running conflicts
    let response = app
        .post("/api/attempts", &token, json!({ "evaluationId": evaluation_id }))
        .await;
    assert_eq!(response.status().as_u16(), 409);

    // Answer
    let response = app
        .post(
            &format!("/api/attempts/{}/answers", attempt_id),
            &token,
            json!({ "questionId": question_id, "selectedOptionId": right, "timeSpentSeconds": 12 }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["isCorrect"], true);
    assert_eq!(body["data"]["pointsEarned"], 10);

    // Results are not available before submission
    let response = app
        .get(&format!("/api/attempts/{}/results", attempt_id), &token)
        .await;
    assert_eq!(response.status().as_u16(), 400);

    // Submit
    let response = app
        .post(&format!("/api/attempts/{}/submit", attempt_id), &token, json!({}))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["percentage"], "100.00");
    assert_eq!(body["data"]["passed"], true);
    assert_eq!(body["data"]["certified"], true);
    let code = body["data"]["certificateCode"].as_str().unwrap().to_string();
    assert!(code.starts_with("CERT-"));

    // Results
    let response = app
        .get(&format!("/api/attempts/{}/results", attempt_id), &token)
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["certificateCode"], code.as_str());
    assert_eq!(body["data"]["correctAnswers"], 1);
    assert_eq!(body["data"]["questionResults"][0]["userAnswer"], "As rated");

    // Listings
    let response = app.get("/api/attempts/user/current", &token).await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["status"], "COMPLETED");

    let response = app
        .get(&format!("/api/attempts/user/{}", user_id), &admin)
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let response = app
        .get(
            &format!("/api/admin/evaluations/{}/attempts", evaluation_id),
            &admin,
        )
        .await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"][0]["userName"], "frank tester");

    // Admin delete
    let response = app
        .client
        .delete(app.url(&format!("/api/admin/attempts/{}", attempt_id)))
        .bearer_auth(&admin)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    let response = app
        .get(&format!("/api/attempts/{}", attempt_id), &token)
        .await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn strangers_cannot_touch_an_attempt() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    let (evaluation_id, question_id, right, _) = app.seed_evaluation(&admin).await;
    let (owner, _) = app.user_token("grace").await;
    let (stranger, _) = app.user_token("heidi").await;

    let response = app
        .post("/api/attempts", &owner, json!({ "evaluationId": evaluation_id }))
        .await;
    let body: Value = response.json().await.unwrap();
    let attempt_id = body["data"]["id"].as_i64().unwrap();

    let response = app
        .post(
            &format!("/api/attempts/{}/answers", attempt_id),
            &stranger,
            json!({ "questionId": question_id, "selectedOptionId": right }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 403);

    let response = app
        .get(&format!("/api/attempts/{}", attempt_id), &stranger)
        .await;
    assert_eq!(response.status().as_u16(), 403);

    let response = app
        .client
        .put(app.url(&format!("/api/attempts/{}", attempt_id)))
        .bearer_auth(&owner)
        .json(&json!({ "status": "ABANDONED" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["status"], "ABANDONED");
}
