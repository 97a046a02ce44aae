use base64::{Engine as _, engine::general_purpose};
use httpmock::Method::POST;
use httpmock::MockServer;
use psyche::{DialogueBackend, Message, QueryRequest, ResponseAction};
use serde_json::json;
use shara::HttpDialogue;

fn request() -> QueryRequest {
    QueryRequest {
        audio: Some(b"pcm".to_vec()),
        username: Some("ana".into()),
        proactive_question: None,
        history: vec![Message::user("hi"), Message::assistant("hello")],
    }
}

#[tokio::test]
async fn reply_is_decoded() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/query").json_body_partial(
                json!({
                    "audio": general_purpose::STANDARD.encode(b"pcm"),
                    "username": "ana",
                    "history": [
                        { "role": "user", "content": "hi" },
                        { "role": "assistant", "content": "hello" }
                    ]
                })
                .to_string(),
            );
            then.status(200).json_body(json!({
                "audio": general_purpose::STANDARD.encode(b"wav"),
                "transcript": "how are you",
                "text": "Fine, thanks!",
                "action": "enrollFace",
                "username": "bob",
                "continue": true,
                "robot_mood": "happy"
            }));
        })
        .await;

    let backend = HttpDialogue::new(&server.base_url()).unwrap();
    let reply = backend.query(request()).await.unwrap().unwrap();
    mock.assert_async().await;
    assert_eq!(reply.audio, b"wav");
    assert_eq!(reply.transcript.as_deref(), Some("how are you"));
    assert_eq!(reply.text.as_deref(), Some("Fine, thanks!"));
    assert_eq!(reply.action, Some(ResponseAction::EnrollFace));
    assert_eq!(reply.action_username.as_deref(), Some("bob"));
    assert!(reply.continue_conversation);
    assert_eq!(reply.mood, "happy");
}

#[tokio::test]
async fn missing_fields_take_defaults() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/query");
            then.status(200).json_body(json!({
                "audio": "",
                "action": "dance",
                "robot_mood": ""
            }));
        })
        .await;

    let backend = HttpDialogue::new(&server.base_url()).unwrap();
    let reply = backend.query(request()).await.unwrap().unwrap();
    assert!(reply.audio.is_empty());
    assert_eq!(reply.action, None);
    assert!(!reply.continue_conversation);
    assert_eq!(reply.mood, "neutral");
}

#[tokio::test]
async fn nothing_heard_is_an_empty_answer() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/query");
            then.status(204);
        })
        .await;

    let backend = HttpDialogue::new(&server.base_url()).unwrap();
    assert!(backend.query(request()).await.unwrap().is_none());
}

#[tokio::test]
async fn server_error_is_a_failure() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/query");
            then.status(500);
        })
        .await;

    let backend = HttpDialogue::new(&server.base_url()).unwrap();
    assert!(backend.query(request()).await.is_err());
}

#[test]
fn rejects_bad_url() {
    assert!(HttpDialogue::new("not a url").is_err());
}
