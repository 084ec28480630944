//! End-to-end tests against a mocked Responses API.

use futures::StreamExt;
use mockito::{Matcher, Server, ServerGuard};
use openai_responses::{
    create_message_with_images, Client, ClientConfig, Error, ImageDetail, Message,
    RequestOptions, Schema, StreamEvent, Tool,
};
use serde::Deserialize;
use serde_json::json;
use std::io::Write;
use std::time::Duration;

const KEY: &str = "sk-test-key";

fn client_for(server: &ServerGuard) -> Client {
    openai_responses::init_tracing();
    Client::new(ClientConfig::new(KEY).with_base_url(server.url())).unwrap()
}

fn completion_body(text: &str) -> String {
    json!({
        "id": "resp_abc",
        "object": "response",
        "created_at": 1741476542,
        "status": "completed",
        "model": "gpt-4o-mini-2024-07-18",
        "output": [{
            "type": "message",
            "id": "msg_1",
            "status": "completed",
            "role": "assistant",
            "content": [{"type": "output_text", "text": text, "annotations": []}]
        }],
        "usage": {
            "input_tokens": 10,
            "output_tokens": 5,
            "total_tokens": 15
        }
    })
    .to_string()
}

fn sse(event: serde_json::Value) -> String {
    format!("event: {}\ndata: {}\n\n", event["type"].as_str().unwrap(), event)
}

fn text_delta(delta: &str) -> String {
    sse(json!({
        "type": "response.output_text.delta",
        "item_id": "msg_1",
        "output_index": 0,
        "content_index": 0,
        "delta": delta,
        "sequence_number": 1
    }))
}

fn completed() -> String {
    sse(json!({
        "type": "response.completed",
        "response": {"id": "resp_abc", "status": "completed", "model": "gpt-4o", "output": []},
        "sequence_number": 9
    }))
}

#[tokio::test]
async fn test_create_returns_output_text() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/responses")
        .match_header("authorization", format!("Bearer {}", KEY).as_str())
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(json!({
            "model": "gpt-4o-mini",
            "input": "Say hello",
            "temperature": 0.5
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion_body("Hello there!"))
        .create_async()
        .await;

    let client = client_for(&server);
    let response = client
        .create(
            "gpt-4o-mini",
            "Say hello",
            RequestOptions::new().with_temperature(0.5),
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.output_text(), "Hello there!");
    assert!(!response.has_refusal());

    let usage = client.token_usage(&response);
    assert_eq!(usage.total_tokens, 15);
    // gpt-4o-mini: 0.15 in / 0.60 out per million
    let cost = usage.cost.unwrap();
    assert!((cost - (10.0 * 0.15 + 5.0 * 0.60) / 1_000_000.0).abs() < 1e-12);
}

#[tokio::test]
async fn test_message_list_and_extra_options_on_the_wire() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/responses")
        .match_body(Matcher::PartialJson(json!({
            "input": [
                {"type": "message", "role": "developer", "content": "Be brief"},
                {"type": "message", "role": "user", "content": "Hi"}
            ],
            "tools": [{"type": "function", "name": "lookup"}],
            "truncation": "auto"
        })))
        .with_status(200)
        .with_body(completion_body("ok"))
        .create_async()
        .await;

    let client = client_for(&server);
    let options = RequestOptions::new()
        .with_tool(Tool::function("lookup", "Look something up", json!({"type": "object"})))
        .with_extra("truncation", json!("auto"));
    let messages = vec![Message::developer("Be brief"), Message::user("Hi")];

    client.create("gpt-4o", messages, options).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_api_error_carries_status_and_message() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/responses")
        .with_status(429)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"error": {"message": "Rate limit reached", "type": "requests", "code": "rate_limit_exceeded"}})
                .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .create("gpt-4o", "hi", RequestOptions::default())
        .await
        .unwrap_err();

    match &err {
        Error::Api {
            status,
            message,
            error,
        } => {
            assert_eq!(*status, 429);
            assert_eq!(message, "Rate limit reached");
            assert_eq!(
                error.as_ref().unwrap().code.as_deref(),
                Some("rate_limit_exceeded")
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!err.to_string().contains(KEY));
}

#[tokio::test]
async fn test_errors_are_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/responses")
        .with_status(500)
        .with_body("upstream exploded")
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .create("gpt-4o", "hi", RequestOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(500));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_malformed_json_is_decode_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/responses")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("{\"id\": \"resp_1\", \"output\": [")
        .create_async()
        .await;

    let client = client_for(&server);
    match client
        .create("gpt-4o", "hi", RequestOptions::default())
        .await
    {
        Err(Error::Decode { body, .. }) => assert!(body.starts_with("{\"id\"")),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_host_is_connection_error() {
    let config = ClientConfig::new(KEY).with_base_url("http://127.0.0.1:1/v1");
    let client = Client::new(config).unwrap();

    let err = client
        .create("gpt-4o", "hi", RequestOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Connection(_)), "{err:?}");
}

#[tokio::test]
async fn test_sub_second_timeout_still_allows_calls() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/responses")
        .with_status(200)
        .with_body(completion_body("quick"))
        .create_async()
        .await;

    let config = ClientConfig::new(KEY)
        .with_base_url(server.url())
        .with_timeout(Duration::from_millis(500));
    let client = Client::new(config).unwrap();

    let response = client
        .create("gpt-4o", "hi", RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(response.output_text(), "quick");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_empty_model_fails_before_network() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/responses")
        .expect(0)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .create("", "hi", RequestOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidRequest(_)));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_stream_text_deltas() {
    let mut server = Server::new_async().await;
    let body = format!("{}{}{}", text_delta("Hello"), text_delta(" world"), completed());
    let mock = server
        .mock("POST", "/responses")
        .match_header("accept", "text/event-stream")
        .match_body(Matcher::PartialJson(json!({"stream": true})))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let client = client_for(&server);
    let stream = client
        .stream("gpt-4o", "Greet the world", RequestOptions::default())
        .await
        .unwrap();

    let deltas: Vec<String> = stream
        .text_deltas()
        .map(|d| d.unwrap())
        .collect()
        .await;

    mock.assert_async().await;
    assert_eq!(deltas, ["Hello", " world"]);
}

#[tokio::test]
async fn test_stream_survives_frames_split_across_chunks() {
    let mut server = Server::new_async().await;
    let body = format!("{}{}{}", text_delta("Hel"), text_delta("lo ✓"), completed());
    server
        .mock("POST", "/responses")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_chunked_body(move |w| {
            for piece in body.as_bytes().chunks(7) {
                w.write_all(piece)?;
                w.flush()?;
            }
            Ok(())
        })
        .create_async()
        .await;

    let client = client_for(&server);
    let mut stream = client
        .stream("gpt-4o", "hi", RequestOptions::default())
        .await
        .unwrap();

    let mut kinds = Vec::new();
    let mut text = String::new();
    while let Some(event) = stream.next().await {
        let event = event.unwrap();
        if let StreamEvent::TextDelta { delta, .. } = &event {
            text.push_str(delta);
        }
        kinds.push(event.event_type().to_string());
    }

    assert_eq!(text, "Hello ✓");
    assert_eq!(
        kinds,
        [
            "response.output_text.delta",
            "response.output_text.delta",
            "response.completed"
        ]
    );
}

#[tokio::test]
async fn test_stream_error_status_fails_upfront() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/responses")
        .with_status(401)
        .with_body(json!({"error": {"message": "Incorrect API key provided"}}).to_string())
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .stream("gpt-4o", "hi", RequestOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(401));
}

#[tokio::test]
async fn test_stream_malformed_frame_terminates() {
    let mut server = Server::new_async().await;
    let body = format!("{}data: {{oops\n\n{}", text_delta("Hi"), completed());
    server
        .mock("POST", "/responses")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let client = client_for(&server);
    let stream = client
        .stream("gpt-4o", "hi", RequestOptions::default())
        .await
        .unwrap();
    let events: Vec<_> = stream.collect().await;

    assert_eq!(events.len(), 2);
    assert!(events[0].is_ok());
    assert!(matches!(events[1], Err(Error::Stream(_))));
}

#[derive(Debug, Deserialize, PartialEq)]
struct Person {
    name: String,
    age: u32,
    hobbies: Vec<String>,
}

#[tokio::test]
async fn test_parse_structured_output() {
    let schema = Schema::object(
        "person",
        &json!({"name": "string", "age": "integer", "hobbies": "array"}),
    )
    .unwrap();

    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/responses")
        .match_body(Matcher::PartialJson(json!({
            "text": {"format": {"type": "json_schema", "name": "person", "strict": true}}
        })))
        .with_status(200)
        .with_body(completion_body(r#"{"name":"Ada","age":36,"hobbies":["math"]}"#))
        .create_async()
        .await;

    let client = client_for(&server);
    let parsed = client
        .parse::<Person>("gpt-4o", "Describe Ada", &schema, RequestOptions::default())
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(
        parsed.value,
        Person {
            name: "Ada".to_string(),
            age: 36,
            hobbies: vec!["math".to_string()]
        }
    );
    assert_eq!(parsed.response.id, "resp_abc");
}

#[tokio::test]
async fn test_parse_schema_mismatch() {
    let schema = Schema::object("person", &json!({"name": "string", "age": "integer"})).unwrap();

    let mut server = Server::new_async().await;
    server
        .mock("POST", "/responses")
        .with_status(200)
        .with_body(completion_body(r#"{"name":"Ada"}"#))
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .parse::<serde_json::Value>("gpt-4o", "x", &schema, RequestOptions::default())
        .await
        .unwrap_err();

    match err {
        Error::SchemaMismatch { path, .. } => assert_eq!(path, "$.age"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_local_image_is_inlined_in_request() {
    let mut file = tempfile::Builder::new().suffix(".gif").tempfile().unwrap();
    file.write_all(b"GIF89a\x01\x00\x01\x00\x00\x00\x00;").unwrap();

    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/responses")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#""image_url":"data:image/gif;base64,R0lGODlh"#.to_string()),
            Matcher::Regex(r#""image_url":"https://example.com/b.png","detail":"low""#.to_string()),
        ]))
        .with_status(200)
        .with_body(completion_body("Two images"))
        .create_async()
        .await;

    let message = create_message_with_images(
        "Compare these",
        vec![
            openai_responses::ImageInput::from(file.path()),
            ("https://example.com/b.png", ImageDetail::Low).into(),
        ],
    )
    .unwrap();

    let client = client_for(&server);
    let response = client
        .create("gpt-4o", message, RequestOptions::default())
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.output_text(), "Two images");
}

#[tokio::test]
async fn test_retrieve_and_delete() {
    let mut server = Server::new_async().await;
    let get = server
        .mock("GET", "/responses/resp_abc")
        .with_status(200)
        .with_body(completion_body("stored"))
        .create_async()
        .await;
    let delete = server
        .mock("DELETE", "/responses/resp_abc")
        .with_status(200)
        .with_body(json!({"id": "resp_abc", "object": "response.deleted", "deleted": true}).to_string())
        .create_async()
        .await;

    let client = client_for(&server);
    let response = client.retrieve("resp_abc").await.unwrap();
    assert_eq!(response.output_text(), "stored");
    client.delete("resp_abc").await.unwrap();

    get.assert_async().await;
    delete.assert_async().await;
}
