//! End-to-end checks of the OpenAI client and the conversation controller
//! against a throwaway HTTP server on localhost.

use std::sync::Arc;
use std::time::Duration;

use chatbot_core::error::{GENERIC_FAILURE_TEXT, NO_RESPONSE_TEXT, UNAUTHORIZED_TEXT};
use chatbot_core::state::DEFAULT_GREETING;
use chatbot_core::{ChatMessage, CompletionError, Conversation, OpenAIClient};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// A request as the stub saw it
struct Captured {
    head: String,
    body: serde_json::Value,
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

async fn read_request(socket: &mut TcpStream) -> Captured {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(header_end) = find_header_end(&buf) {
            let head = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
            let content_length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }

    let header_end = find_header_end(&buf).expect("complete request head");
    Captured {
        head: String::from_utf8_lossy(&buf[..header_end]).into_owned(),
        body: serde_json::from_slice(&buf[header_end + 4..]).unwrap_or(serde_json::Value::Null),
    }
}

/// Serve exactly one request with the given status line and JSON body
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<Captured>) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    serve_raw(response).await
}

/// Serve exactly one request, answering with the raw bytes given
async fn serve_raw(response: String) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let captured = read_request(&mut socket).await;
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        captured
    });

    (format!("http://{}/v1", addr), handle)
}

fn client(base_url: &str) -> OpenAIClient {
    OpenAIClient::new("sk-test")
        .with_http_client(direct_http_client())
        .with_base_url(base_url)
        .with_timeout(Duration::from_secs(5))
}

/// Ignore proxy settings from the environment; the stub is on localhost
fn direct_http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[tokio::test]
async fn test_success_sends_history_and_bearer_token() {
    let (base_url, server) = serve_once(
        "200 OK",
        r#"{"id":"chatcmpl-1","choices":[{"index":0,"message":{"role":"assistant","content":"Hi there"}}]}"#,
    )
    .await;
    let mut conv = Conversation::new(Arc::new(client(&base_url)), DEFAULT_GREETING);

    assert!(conv.submit("Hello").await);

    assert_eq!(
        conv.transcript(),
        &[
            ChatMessage::assistant(DEFAULT_GREETING),
            ChatMessage::user("Hello"),
            ChatMessage::assistant("Hi there"),
        ]
    );
    assert!(!conv.is_awaiting());

    let captured = server.await.unwrap();
    assert!(captured.head.starts_with("POST /v1/chat/completions "));
    assert!(captured.head.to_lowercase().contains("authorization: bearer sk-test"));
    assert_eq!(
        captured.body,
        serde_json::json!({
            "model": "gpt-3.5-turbo",
            "messages": [
                { "role": "assistant", "content": DEFAULT_GREETING },
                { "role": "user", "content": "Hello" }
            ]
        })
    );
}

#[tokio::test]
async fn test_unauthorized_status() {
    let (base_url, server) = serve_once(
        "401 Unauthorized",
        r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#,
    )
    .await;
    let mut conv = Conversation::new(Arc::new(client(&base_url)), DEFAULT_GREETING);

    conv.submit("X").await;

    assert_eq!(conv.transcript().last().unwrap().content, UNAUTHORIZED_TEXT);
    assert!(!conv.is_awaiting());
    server.await.unwrap();
}

#[tokio::test]
async fn test_server_error_with_message() {
    let (base_url, server) =
        serve_once("500 Internal Server Error", r#"{"error":{"message":"overloaded"}}"#).await;
    let mut conv = Conversation::new(Arc::new(client(&base_url)), DEFAULT_GREETING);

    conv.submit("X").await;

    assert_eq!(conv.transcript().last().unwrap().content, "Error: overloaded");
    assert_eq!(conv.transcript().len(), 3);
    server.await.unwrap();
}

#[tokio::test]
async fn test_server_error_without_message() {
    let (base_url, server) = serve_once("503 Service Unavailable", r#"{"detail":"down"}"#).await;

    let err = client(&base_url)
        .chat(&[ChatMessage::user("X")])
        .await
        .unwrap_err();

    assert_eq!(err, CompletionError::Api { status: 503, message: None });
    server.await.unwrap();
}

#[tokio::test]
async fn test_connection_refused_is_no_response() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut conv = Conversation::new(
        Arc::new(client(&format!("http://{}/v1", addr))),
        DEFAULT_GREETING,
    );
    conv.submit("X").await;

    assert_eq!(conv.transcript().last().unwrap().content, NO_RESPONSE_TEXT);
    assert!(!conv.is_awaiting());
}

#[tokio::test]
async fn test_timeout_is_no_response() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let slow = OpenAIClient::new("sk-test")
        .with_http_client(direct_http_client())
        .with_base_url(&format!("http://{}/v1", addr))
        .with_timeout(Duration::from_millis(200));
    let err = slow.chat(&[ChatMessage::user("X")]).await.unwrap_err();

    assert!(matches!(err, CompletionError::NoResponse(_)));
    assert_eq!(err.transcript_text(), NO_RESPONSE_TEXT);
    server.abort();
}

#[tokio::test]
async fn test_truncated_error_body_still_classified_by_status() {
    // Content-Length promises more than is sent before the connection closes
    let (base_url, server) = serve_raw(
        "HTTP/1.1 401 Unauthorized\r\nContent-Type: application/json\r\nContent-Length: 500\r\nConnection: close\r\n\r\n{\"error\":"
            .to_string(),
    )
    .await;
    let mut conv = Conversation::new(Arc::new(client(&base_url)), DEFAULT_GREETING);

    conv.submit("X").await;

    assert_eq!(conv.transcript().last().unwrap().content, UNAUTHORIZED_TEXT);
    server.await.unwrap();
}

#[tokio::test]
async fn test_malformed_base_url_is_not_a_connectivity_error() {
    let err = client("not a url")
        .chat(&[ChatMessage::user("X")])
        .await
        .unwrap_err();

    assert!(matches!(err, CompletionError::Request(_)));
    assert_eq!(err.transcript_text(), GENERIC_FAILURE_TEXT);
}

#[tokio::test]
async fn test_invalid_api_key_header_is_request_error() {
    let bad_key = OpenAIClient::new("sk-bad\nkey")
        .with_http_client(direct_http_client())
        .with_base_url("http://127.0.0.1:9/v1");

    let err = bad_key.chat(&[ChatMessage::user("X")]).await.unwrap_err();

    assert!(matches!(err, CompletionError::Request(_)));
}
