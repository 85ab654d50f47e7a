//! AnthropicClient against a canned in-process HTTP server.

use cairn_api::{AnthropicClient, RetryConfig};
use cairn_types::{ApiError, ContentBlock, CreateMessageRequest, Message, ModelClient, StopReason};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Serve one canned response per connection, returning the request heads seen.
async fn serve(responses: Vec<String>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        let mut heads = Vec::new();
        for response in responses {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let head = loop {
                let n = conn.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&buf[..end]).to_string();
                    let len: usize = head
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length")
                                .then(|| v.trim().parse().ok())?
                        })
                        .unwrap_or(0);
                    while buf.len() < end + 4 + len {
                        let n = conn.read(&mut chunk).await.unwrap();
                        if n == 0 {
                            break;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                    }
                    break head;
                }
                assert!(n > 0);
            };
            heads.push(head);
            conn.write_all(response.as_bytes()).await.unwrap();
            conn.shutdown().await.ok();
        }
        heads
    });
    (base, handle)
}

fn http(status: &str, extra: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\n{extra}content-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    )
}

fn request() -> CreateMessageRequest {
    CreateMessageRequest {
        model: "claude-test".into(),
        max_tokens: 64,
        messages: vec![Message::user_text("hi")],
        system: None,
        tools: vec![],
    }
}

const OK_BODY: &str = r#"{"id":"msg_1","type":"message","role":"assistant","content":[{"type":"text","text":"hello"}],"stop_reason":"end_turn","usage":{"input_tokens":5,"output_tokens":1}}"#;

fn fast_retries(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_delay_ms: 5,
        max_delay_ms: 20,
        backoff_factor: 2.0,
    }
}

#[tokio::test]
async fn successful_call_sends_auth_headers() {
    let (base, server) = serve(vec![http("200 OK", "", OK_BODY)]).await;
    let client = AnthropicClient::new("sk-test", base).unwrap();

    let response = client.create_message(&request()).await.unwrap();
    assert_eq!(response.stop_reason, Some(StopReason::EndTurn));
    assert_eq!(response.usage.input_tokens, 5);
    assert_eq!(
        response.content,
        vec![ContentBlock::Text {
            text: "hello".into()
        }]
    );

    let heads = server.await.unwrap();
    let head = heads[0].to_ascii_lowercase();
    assert!(head.starts_with("post /v1/messages"));
    assert!(head.contains("x-api-key: sk-test"));
    assert!(head.contains("anthropic-version: 2023-06-01"));
}

#[tokio::test]
async fn overloaded_is_retried() {
    let (base, server) = serve(vec![
        http("529 Site Overloaded", "", "{}"),
        http("200 OK", "", OK_BODY),
    ])
    .await;
    let client = AnthropicClient::new("k", base)
        .unwrap()
        .with_retry_config(fast_retries(2));

    let response = client.create_message(&request()).await.unwrap();
    assert_eq!(response.usage.output_tokens, 1);
    assert_eq!(server.await.unwrap().len(), 2);
}

#[tokio::test]
async fn retries_are_bounded() {
    let (base, server) = serve(vec![
        http("500 Internal Server Error", "", r#"{"error":{"message":"down"}}"#),
        http("500 Internal Server Error", "", r#"{"error":{"message":"still down"}}"#),
    ])
    .await;
    let client = AnthropicClient::new("k", base)
        .unwrap()
        .with_retry_config(fast_retries(1));

    match client.create_message(&request()).await {
        Err(ApiError::Server { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "still down");
        }
        other => panic!("expected server error, got {other:?}"),
    }
    assert_eq!(server.await.unwrap().len(), 2);
}

#[tokio::test]
async fn auth_failure_is_not_retried() {
    let (base, server) = serve(vec![http(
        "401 Unauthorized",
        "",
        r#"{"error":{"message":"invalid x-api-key"}}"#,
    )])
    .await;
    let client = AnthropicClient::new("k", base)
        .unwrap()
        .with_retry_config(fast_retries(3));

    let err = client.create_message(&request()).await.unwrap_err();
    assert!(matches!(err, ApiError::Auth { ref message } if message == "invalid x-api-key"));
    assert_eq!(server.await.unwrap().len(), 1);
}

#[tokio::test]
async fn garbage_body_is_invalid_response() {
    let (base, _server) = serve(vec![http("200 OK", "", "not json")]).await;
    let client = AnthropicClient::new("k", base).unwrap();
    let err = client.create_message(&request()).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidResponse(_)));
}
