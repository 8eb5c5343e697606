use actix_web::{web, App, HttpResponse, HttpServer};
use serde_json::{json, Value};
use sqlx::{Connection, Executor, PgConnection, PgPool, Row};
use std::net::TcpListener;

use movie_api::configuration::{get_configuration, DatabaseSettings};
use movie_api::email_client::{EmailClient, SenderEmail};
use movie_api::startup::run;

pub struct TestApp {
    pub address: String,
    pub db_pool: PgPool,
}

/// Stands in for the external mail API: accepts every POST /email.
async fn spawn_email_sink() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let server = HttpServer::new(|| {
        App::new().route(
            "/email",
            web::post().to(|| async { HttpResponse::Ok().finish() }),
        )
    })
    .listen(listener)
    .expect("Failed to listen")
    .run();
    let _ = tokio::spawn(server);

    format!("http://127.0.0.1:{}", port)
}

async fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = uuid::Uuid::new_v4().to_string();
    let connection_pool = configure_database(&configuration.database).await;

    let email_sink_url = spawn_email_sink().await;
    let email_client = EmailClient::new(
        email_sink_url,
        SenderEmail::parse("no-reply@example.com".to_string()).unwrap(),
        reqwest::Client::new(),
    );

    let server = run(
        listener,
        connection_pool.clone(),
        configuration.jwt.clone(),
        email_client,
    )
    .expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        db_pool: connection_pool,
    }
}

pub async fn configure_database(config: &DatabaseSettings) -> PgPool {
    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");
    let connection_pool = PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    connection_pool
}

async fn register_alice(app: &TestApp) {
    let client = reqwest::Client::new();
    let body = json!({
        "name": "Alice",
        "email": "alice@example.com",
        "username": "alice",
        "password": "OldPassword123"
    });

    let response = client
        .post(&format!("{}/auth/register", &app.address))
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(201, response.status().as_u16());
}

async fn stored_otp(app: &TestApp) -> i32 {
    sqlx::query("SELECT otp FROM password_reset_otps")
        .fetch_one(&app.db_pool)
        .await
        .expect("Expected a stored OTP")
        .get::<i32, _>("otp")
}

#[tokio::test]
async fn forgot_password_returns_404_for_unknown_email() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(&format!("{}/auth/forgot-password", &app.address))
        .json(&json!({"email": "nobody@example.com"}))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(404, response.status().as_u16());
    let response_body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(response_body["code"], "UNKNOWN_USER");
}

#[tokio::test]
async fn forgot_password_stores_a_six_digit_code() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register_alice(&app).await;

    let response = client
        .post(&format!("{}/auth/forgot-password", &app.address))
        .json(&json!({"email": "alice@example.com"}))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());

    let otp = stored_otp(&app).await;
    assert!((100_000..=999_999).contains(&otp));
}

#[tokio::test]
async fn a_new_request_overwrites_the_previous_code() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register_alice(&app).await;

    for _ in 0..2 {
        let response = client
            .post(&format!("{}/auth/forgot-password", &app.address))
            .json(&json!({"email": "alice@example.com"}))
            .send()
            .await
            .expect("Failed to execute request.");
        assert_eq!(200, response.status().as_u16());
    }

    // Still exactly one live code for the user
    let count = sqlx::query("SELECT COUNT(*) AS n FROM password_reset_otps")
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to count OTPs")
        .get::<i64, _>("n");
    assert_eq!(count, 1);
}

#[tokio::test]
async fn reset_password_returns_400_for_wrong_code() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register_alice(&app).await;
    client
        .post(&format!("{}/auth/forgot-password", &app.address))
        .json(&json!({"email": "alice@example.com"}))
        .send()
        .await
        .expect("Failed to execute request.");

    let otp = stored_otp(&app).await;
    let wrong_otp = if otp == 999_999 { 100_000 } else { otp + 1 };

    let response = client
        .post(&format!("{}/auth/reset-password", &app.address))
        .json(&json!({
            "email": "alice@example.com",
            "otp": wrong_otp,
            "new_password": "NewPassword123"
        }))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(400, response.status().as_u16());
    let response_body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(response_body["code"], "OTP_MISMATCH");
}

#[tokio::test]
async fn reset_password_returns_400_for_expired_code() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register_alice(&app).await;
    client
        .post(&format!("{}/auth/forgot-password", &app.address))
        .json(&json!({"email": "alice@example.com"}))
        .send()
        .await
        .expect("Failed to execute request.");

    let otp = stored_otp(&app).await;

    sqlx::query("UPDATE password_reset_otps SET expires_at = now() - interval '1 minute'")
        .execute(&app.db_pool)
        .await
        .expect("Failed to age OTP");

    let response = client
        .post(&format!("{}/auth/reset-password", &app.address))
        .json(&json!({
            "email": "alice@example.com",
            "otp": otp,
            "new_password": "NewPassword123"
        }))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(400, response.status().as_u16());
    let response_body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(response_body["code"], "OTP_EXPIRED");
}

#[tokio::test]
async fn full_reset_flow_replaces_the_password_and_consumes_the_code() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register_alice(&app).await;
    client
        .post(&format!("{}/auth/forgot-password", &app.address))
        .json(&json!({"email": "alice@example.com"}))
        .send()
        .await
        .expect("Failed to execute request.");

    let otp = stored_otp(&app).await;

    let response = client
        .post(&format!("{}/auth/reset-password", &app.address))
        .json(&json!({
            "email": "alice@example.com",
            "otp": otp,
            "new_password": "NewPassword123"
        }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());

    // Old password stops working
    let old_login = client
        .post(&format!("{}/auth/login", &app.address))
        .json(&json!({"email": "alice@example.com", "password": "OldPassword123"}))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, old_login.status().as_u16());

    // New password logs in
    let new_login = client
        .post(&format!("{}/auth/login", &app.address))
        .json(&json!({"email": "alice@example.com", "password": "NewPassword123"}))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, new_login.status().as_u16());

    // The code was consumed; replaying it fails
    let replay = client
        .post(&format!("{}/auth/reset-password", &app.address))
        .json(&json!({
            "email": "alice@example.com",
            "otp": otp,
            "new_password": "AnotherPassword123"
        }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(400, replay.status().as_u16());
}

#[tokio::test]
async fn reset_password_returns_400_for_weak_new_password() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register_alice(&app).await;
    client
        .post(&format!("{}/auth/forgot-password", &app.address))
        .json(&json!({"email": "alice@example.com"}))
        .send()
        .await
        .expect("Failed to execute request.");

    let otp = stored_otp(&app).await;

    let response = client
        .post(&format!("{}/auth/reset-password", &app.address))
        .json(&json!({
            "email": "alice@example.com",
            "otp": otp,
            "new_password": "weak"
        }))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(400, response.status().as_u16());
}
