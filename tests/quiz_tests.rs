// tests/quiz_tests.rs

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use clubhub::{
    cache::MemoryCache,
    config::Config,
    models::{
        attempt::ReplacementPolicy,
        quiz::{Question, Quiz},
        user::{Role, UserProfile},
    },
    routes,
    state::AppState,
    store::{MemoryStore, Stores},
    utils::{clock::ManualClock, jwt::sign_jwt},
};
use serde_json::{Value, json};

const SECRET: &str = "quiz_test_secret";

struct TestApp {
    address: String,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
}

impl TestApp {
    fn token(&self, user_id: i64) -> String {
        sign_jwt(user_id, "member", SECRET, 600).expect("Failed to sign token")
    }
}

fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        jwt_secret: SECRET.to_string(),
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        redis_url: None,
        leaderboard_cache_ttl_secs: 300,
        replacement_policy: ReplacementPolicy::Latest,
    }
}

/// Quiz 1 (club 10, 10 minutes): q11 single-choice, q12 multi-select, 5 marks each.
fn sample_quiz() -> Quiz {
    Quiz {
        id: 1,
        club_id: Some(10),
        title: "Rust basics".to_string(),
        questions: vec![
            Question {
                id: 11,
                text: "Which keyword declares an immutable binding?".to_string(),
                options: vec!["var".into(), "let".into(), "mut".into()],
                correct_answers: ["1".to_string()].into_iter().collect(),
                marks: 5,
                order: 1,
            },
            Question {
                id: 12,
                text: "Which types are Copy?".to_string(),
                options: vec!["i32".into(), "String".into(), "bool".into()],
                correct_answers: ["0".to_string(), "2".to_string()].into_iter().collect(),
                marks: 5,
                order: 2,
            },
        ],
        time_limit_minutes: Some(10),
        total_marks: 10,
        passing_marks: Some(5),
        is_active: true,
    }
}

/// Spawns the app on a random port, backed by the in-memory store.
async fn spawn_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    store.insert_quiz(sample_quiz()).await;
    store
        .insert_user(UserProfile {
            id: 1,
            name: "ada".to_string(),
            avatar_url: None,
            role: Role::Member,
        })
        .await;

    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap(),
    ));
    let cache = Arc::new(MemoryCache::new(clock.clone(), 16));
    let state = AppState::new(
        test_config(),
        Stores::from_backend(store.clone()),
        cache,
        clock.clone(),
    );
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address,
        store,
        clock,
    }
}

#[tokio::test]
async fn submit_requires_token() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .post(format!("{}/api/quizzes/submit", app.address))
        .json(&json!({ "quizId": 1, "answers": {} }))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn start_hides_answer_keys() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .post(format!("{}/api/quizzes/1/start", app.address))
        .bearer_auth(app.token(1))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    let questions = body["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 2);
    assert_eq!(questions[1]["multiSelect"], true);
    assert!(questions.iter().all(|q| q.get("correctAnswers").is_none()));
}

#[tokio::test]
async fn correct_submission_scores_full_marks() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .post(format!("{}/api/quizzes/submit", app.address))
        .bearer_auth(app.token(1))
        .json(&json!({
            "quizId": 1,
            "answers": { "11": 1, "12": [2, "0"] }
        }))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["attempt"]["score"], 10);
    assert_eq!(body["attempt"]["isPassed"], true);
    assert_eq!(body["result"]["correctCount"], 2);
    assert_eq!(body["replacedPrevious"], false);
}

#[tokio::test]
async fn wrong_option_in_multi_select_earns_nothing() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let body: Value = client
        .post(format!("{}/api/quizzes/submit", app.address))
        .bearer_auth(app.token(1))
        .json(&json!({ "quizId": 1, "answers": { "11": "1", "12": [0, 1, 2] } }))
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .unwrap();

    // Assert
    assert_eq!(body["attempt"]["score"], 5);
    assert_eq!(body["attempt"]["percentage"], 50.0);
}

#[tokio::test]
async fn resubmission_keeps_one_attempt() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let submit = |answers: Value| {
        client
            .post(format!("{}/api/quizzes/submit", app.address))
            .bearer_auth(app.token(1))
            .json(&json!({ "quizId": 1, "answers": answers }))
            .send()
    };

    // Act
    submit(json!({ "11": 1, "12": [0, 2] })).await.unwrap();
    let second: Value = submit(json!({ "11": 0 })).await.unwrap().json().await.unwrap();

    // Assert
    assert_eq!(second["replacedPrevious"], true);
    assert_eq!(app.store.attempt_count().await, 1);

    let stored: Value = client
        .get(format!("{}/api/quizzes/1/attempt", app.address))
        .bearer_auth(app.token(1))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stored["score"], 0);
}

#[tokio::test]
async fn submitting_for_another_user_is_forbidden() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .post(format!("{}/api/quizzes/submit", app.address))
        .bearer_auth(app.token(1))
        .json(&json!({ "quizId": 1, "userId": 2, "answers": { "11": 1 } }))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 403);
    assert_eq!(app.store.attempt_count().await, 0);
}

#[tokio::test]
async fn unknown_quiz_is_404() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .post(format!("{}/api/quizzes/submit", app.address))
        .bearer_auth(app.token(1))
        .json(&json!({ "quizId": 999, "answers": {} }))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Quiz 999 not found");
}

#[tokio::test]
async fn late_submission_is_422_and_keeps_prior_attempt() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    client
        .post(format!("{}/api/quizzes/submit", app.address))
        .bearer_auth(app.token(1))
        .json(&json!({ "quizId": 1, "answers": { "11": 1 } }))
        .send()
        .await
        .unwrap();

    client
        .post(format!("{}/api/quizzes/1/start", app.address))
        .bearer_auth(app.token(1))
        .send()
        .await
        .unwrap();
    app.clock.advance(Duration::minutes(11));

    // Act
    let response = client
        .post(format!("{}/api/quizzes/submit", app.address))
        .bearer_auth(app.token(1))
        .json(&json!({
            "quizId": 1,
            "answers": { "11": 1, "12": [0, 2] },
            "clientElapsedSeconds": 120
        }))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 422);

    let stored: Value = client
        .get(format!("{}/api/quizzes/1/attempt", app.address))
        .bearer_auth(app.token(1))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stored["score"], 5);
}

#[tokio::test]
async fn missing_attempt_is_404() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .get(format!("{}/api/quizzes/1/attempt", app.address))
        .bearer_auth(app.token(1))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn negative_client_elapsed_is_400() {
    // Arrange
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .post(format!("{}/api/quizzes/submit", app.address))
        .bearer_auth(app.token(1))
        .json(&json!({ "quizId": 1, "answers": {}, "clientElapsedSeconds": -5 }))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 400);
}
