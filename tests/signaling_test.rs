//! Signaling exchange tests against a stubbed realtime endpoint

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread::JoinHandle;

use voicewire::config::VoicewireConfig;
use voicewire::errors::VoiceError;
use voicewire::session::{exchange_offer, SessionToken};

const FAKE_OFFER: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";
const FAKE_ANSWER: &str = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=answer\r\nt=0 0\r\n";

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

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
            "HTTP/1.1 {}\r\nContent-Type: application/sdp\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
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

fn stub_session_config(realtime_url: String) -> voicewire::config::SessionConfig {
    let mut config = VoicewireConfig::default().session;
    config.realtime_url = realtime_url;
    config
}

#[tokio::test]
async fn test_exchange_returns_exact_answer_body() {
    let (url, request) = spawn_stub_server("201 Created", FAKE_ANSWER.to_string());
    let config = stub_session_config(url);
    let token = SessionToken::new("ephemeral-token");

    let answer = exchange_offer(&reqwest::Client::new(), &config, &token, FAKE_OFFER)
        .await
        .expect("exchange should succeed");
    assert_eq!(answer, FAKE_ANSWER);

    let raw = request.join().unwrap();
    assert!(raw
        .to_ascii_lowercase()
        .contains("authorization: bearer ephemeral-token"));
    assert!(raw.to_ascii_lowercase().contains("content-type: application/sdp"));
    assert!(raw.contains("v=0"));
}

#[tokio::test]
async fn test_non_201_status_is_fatal() {
    let (url, request) = spawn_stub_server("403 Forbidden", "denied".to_string());
    let config = stub_session_config(url);
    let token = SessionToken::new("ephemeral-token");

    let result = exchange_offer(&reqwest::Client::new(), &config, &token, FAKE_OFFER).await;
    match result {
        Err(e) => {
            assert!(matches!(e, VoiceError::Signaling(_)), "{:?}", e);
            assert!(e.is_fatal());
        }
        Ok(body) => panic!("expected Signaling error, got answer {:?}", body),
    }

    request.join().unwrap();
}

#[tokio::test]
async fn test_even_200_is_rejected() {
    // The contract is exactly 201; a plain 200 means something is off.
    let (url, request) = spawn_stub_server("200 OK", FAKE_ANSWER.to_string());
    let config = stub_session_config(url);
    let token = SessionToken::new("ephemeral-token");

    let result = exchange_offer(&reqwest::Client::new(), &config, &token, FAKE_OFFER).await;
    assert!(matches!(result, Err(VoiceError::Signaling(_))), "{:?}", result);

    request.join().unwrap();
}
