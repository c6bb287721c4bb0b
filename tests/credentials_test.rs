//! Credential broker tests against a stubbed HTTP endpoint
//!
//! A minimal TCP server stands in for the sessions endpoint so every status
//! and body shape the broker must handle can be exercised offline.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread::JoinHandle;

use voicewire::config::VoicewireConfig;
use voicewire::errors::VoiceError;
use voicewire::session::{create_session_token, TOKEN_CAPACITY};

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Serve exactly one HTTP request with a canned response, returning the raw
/// request text for assertions.
fn spawn_stub_server(status_line: &'static str, body: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = Vec::new();
        let mut tmp = [0u8; 4096];

        loop {
            let n = stream.read(&mut tmp).unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&tmp[..n]);
            if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..pos]).to_ascii_lowercase();
                let content_length = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() - (pos + 4) >= content_length {
                    break;
                }
            }
        }

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).unwrap();
        let _ = stream.flush();

        String::from_utf8_lossy(&buf).to_string()
    });

    (format!("http://{}", addr), handle)
}

fn stub_session_config(sessions_url: String) -> voicewire::config::SessionConfig {
    let mut config = VoicewireConfig::default().session;
    config.api_key = "k".to_string();
    config.model = "m".to_string();
    config.voice = "v".to_string();
    config.sessions_url = sessions_url;
    config
}

#[tokio::test]
async fn test_well_formed_response_yields_token() {
    let (url, request) = spawn_stub_server(
        "200 OK",
        r#"{"client_secret":{"value":"abc123"}}"#.to_string(),
    );
    let config = stub_session_config(url);

    let token = create_session_token(&reqwest::Client::new(), &config)
        .await
        .expect("token request should succeed");
    assert_eq!(token.as_str(), "abc123");

    let raw = request.join().unwrap();
    assert!(raw.to_ascii_lowercase().contains("authorization: bearer k"));
    assert!(raw.to_ascii_lowercase().contains("content-type: application/json"));
    assert!(raw.contains(r#""model":"m""#));
    assert!(raw.contains(r#""voice":"v""#));
}

#[tokio::test]
async fn test_server_error_is_network_error() {
    let (url, request) = spawn_stub_server("500 Internal Server Error", "overloaded".to_string());
    let config = stub_session_config(url);

    let result = create_session_token(&reqwest::Client::new(), &config).await;
    assert!(matches!(result, Err(VoiceError::Network(_))), "{:?}", result);

    request.join().unwrap();
}

#[tokio::test]
async fn test_missing_client_secret_is_protocol_error() {
    let (url, request) = spawn_stub_server("200 OK", r#"{"id":"sess_1"}"#.to_string());
    let config = stub_session_config(url);

    let result = create_session_token(&reqwest::Client::new(), &config).await;
    assert!(matches!(result, Err(VoiceError::Protocol(_))), "{:?}", result);

    request.join().unwrap();
}

#[tokio::test]
async fn test_empty_secret_value_is_protocol_error() {
    let (url, request) =
        spawn_stub_server("200 OK", r#"{"client_secret":{"value":""}}"#.to_string());
    let config = stub_session_config(url);

    let result = create_session_token(&reqwest::Client::new(), &config).await;
    assert!(matches!(result, Err(VoiceError::Protocol(_))), "{:?}", result);

    request.join().unwrap();
}

#[tokio::test]
async fn test_unparseable_body_is_protocol_error() {
    let (url, request) = spawn_stub_server("200 OK", "not json at all".to_string());
    let config = stub_session_config(url);

    let result = create_session_token(&reqwest::Client::new(), &config).await;
    assert!(matches!(result, Err(VoiceError::Protocol(_))), "{:?}", result);

    request.join().unwrap();
}

#[tokio::test]
async fn test_oversized_token_is_truncated() {
    let oversized = "t".repeat(TOKEN_CAPACITY * 3);
    let (url, request) = spawn_stub_server(
        "200 OK",
        format!(r#"{{"client_secret":{{"value":"{}"}}}}"#, oversized),
    );
    let config = stub_session_config(url);

    let token = create_session_token(&reqwest::Client::new(), &config)
        .await
        .expect("oversized token should still succeed");
    assert_eq!(token.as_str().len(), TOKEN_CAPACITY);
    assert!(oversized.starts_with(token.as_str()));

    request.join().unwrap();
}
