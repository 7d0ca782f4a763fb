//! CLI tests against a mock backend.
//!
//! Each test runs the built binary with an isolated HOME/XDG_DATA_HOME so
//! the session file never touches the real user profile.

use std::path::Path;
use std::process::{Command, Output};

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Run the CLI binary with an isolated home against `base_url`.
async fn run_cli(args: &[&str], home: &Path, base_url: &str) -> Output {
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    let home = home.to_path_buf();
    let base_url = base_url.to_string();

    // The mock server lives on this runtime; block elsewhere.
    tokio::task::spawn_blocking(move || {
        Command::new(env!("CARGO_BIN_EXE_kidquest"))
            .args(&args)
            .args(["--retry-delay-ms", "10"])
            .env("HOME", &home)
            .env("XDG_DATA_HOME", home.join("data"))
            .env("KIDQUEST_BASE_URL", &base_url)
            .env("NO_COLOR", "1")
            .env_remove("KIDQUEST_PASSWORD")
            .env_remove("RUST_LOG")
            .output()
            .expect("Failed to execute CLI")
    })
    .await
    .unwrap()
}

async fn run_cli_success(args: &[&str], home: &Path, base_url: &str) -> String {
    let output = run_cli(args, home, base_url).await;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!("CLI command failed: {:?}\nstderr: {}", args, stderr);
    }
    String::from_utf8_lossy(&output.stdout).to_string()
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({"email": "parent@example.com", "password": "hunter2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "a1",
            "refreshToken": "r1",
            "user": {"id": 1, "name": "Sam"}
        })))
        .mount(server)
        .await;
}

async fn login(home: &Path, base_url: &str) {
    run_cli_success(
        &["login", "--email", "parent@example.com", "--password", "hunter2"],
        home,
        base_url,
    )
    .await;
}

#[test]
fn test_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_kidquest"))
        .arg("--help")
        .output()
        .expect("Failed to execute CLI");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["login", "logout", "whoami", "refresh", "get", "upload"] {
        assert!(stdout.contains(command), "help is missing '{}'", command);
    }
}

#[tokio::test]
async fn test_whoami_without_session_fails() {
    let server = MockServer::start().await;
    let home = TempDir::new().unwrap();

    let output = run_cli(&["whoami"], home.path(), &server.uri()).await;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No active session"));
}

#[tokio::test]
async fn test_login_whoami_logout() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    let home = TempDir::new().unwrap();

    login(home.path(), &server.uri()).await;

    let stdout = run_cli_success(&["whoami"], home.path(), &server.uri()).await;
    assert!(stdout.contains("\"name\": \"Sam\""));

    let stdout = run_cli_success(&["logout"], home.path(), &server.uri()).await;
    assert!(stdout.contains("Logged out"));

    let output = run_cli(&["whoami"], home.path(), &server.uri()).await;
    assert!(!output.status.success());
}

#[tokio::test]
async fn test_get_prints_json_body() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/missions"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 7, "title": "Tidy room"}])))
        .expect(1)
        .mount(&server)
        .await;
    let home = TempDir::new().unwrap();

    login(home.path(), &server.uri()).await;
    let stdout = run_cli_success(&["get", "/missions"], home.path(), &server.uri()).await;

    let body: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(body[0]["title"], "Tidy room");
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_persisted() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/rewards"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({"refreshToken": "r1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "a2", "refreshToken": "r2"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rewards"))
        .and(header("authorization", "Bearer a2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"points": 40})))
        .expect(2)
        .mount(&server)
        .await;
    let home = TempDir::new().unwrap();

    login(home.path(), &server.uri()).await;
    let stdout = run_cli_success(&["get", "/rewards"], home.path(), &server.uri()).await;
    assert!(stdout.contains("40"));

    // The next invocation reads the refreshed token from disk.
    run_cli_success(&["get", "/rewards"], home.path(), &server.uri()).await;
}

#[tokio::test]
async fn test_failed_refresh_ends_session() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    let home = TempDir::new().unwrap();

    login(home.path(), &server.uri()).await;
    let output = run_cli(&["get", "/missions"], home.path(), &server.uri()).await;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Session ended"));
    assert!(stderr.contains("Unauthorized"));

    let output = run_cli(&["whoami"], home.path(), &server.uri()).await;
    assert!(!output.status.success());
}

#[tokio::test]
async fn test_post_validation_error() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/children"))
        .and(body_json(json!({"age": 7})))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({"message": "name is required"})))
        .expect(1)
        .mount(&server)
        .await;
    let home = TempDir::new().unwrap();

    login(home.path(), &server.uri()).await;
    let output = run_cli(
        &["post", "/children", "--data", r#"{"age": 7}"#],
        home.path(),
        &server.uri(),
    )
    .await;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("name is required"));
    assert!(stderr.contains("Validation"));
}
