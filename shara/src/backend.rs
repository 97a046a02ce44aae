use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use psyche::{DialogueBackend, Message, QueryRequest, QueryResponse, ResponseAction};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Client for the dialogue sidecar.
///
/// The sidecar runs speech-to-text, reply generation and text-to-speech in one
/// call: `POST {base}/query` with the captured audio and context, answered by
/// the spoken reply or `204 No Content` when nothing intelligible was heard.
#[derive(Clone)]
pub struct HttpDialogue {
    url: Url,
    client: Client,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    audio: Option<String>,
    username: Option<&'a str>,
    proactive_question: Option<&'a str>,
    history: &'a [Message],
}

#[derive(Deserialize)]
struct WireResponse {
    audio: String,
    #[serde(default)]
    transcript: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default, rename = "continue")]
    continue_conversation: bool,
    #[serde(default)]
    robot_mood: Option<String>,
}

impl HttpDialogue {
    /// Create a client for the sidecar at `base` (e.g. `http://localhost:8000`).
    pub fn new(base: &str) -> Result<Self> {
        let url = Url::parse(base)
            .and_then(|u| u.join("query"))
            .with_context(|| format!("invalid dialogue backend url {base}"))?;
        Ok(Self {
            url,
            client: Client::new(),
        })
    }
}

fn decode(wire: WireResponse) -> Result<QueryResponse> {
    let audio = general_purpose::STANDARD
        .decode(wire.audio)
        .context("reply audio is not base64")?;
    let action = wire.action.as_deref().and_then(|name| {
        let parsed = ResponseAction::parse(name);
        if parsed.is_none() {
            warn!(action = name, "unknown backend action ignored");
        }
        parsed
    });
    Ok(QueryResponse {
        audio,
        transcript: wire.transcript.filter(|t| !t.is_empty()),
        text: wire.text,
        action,
        action_username: wire.username,
        continue_conversation: wire.continue_conversation,
        mood: wire
            .robot_mood
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "neutral".into()),
    })
}

#[async_trait]
impl DialogueBackend for HttpDialogue {
    async fn query(&self, request: QueryRequest) -> Result<Option<QueryResponse>> {
        let body = WireRequest {
            audio: request
                .audio
                .as_ref()
                .map(|a| general_purpose::STANDARD.encode(a)),
            username: request.username.as_deref(),
            proactive_question: request.proactive_question.as_deref(),
            history: &request.history,
        };
        debug!(
            username = ?body.username,
            proactive = ?body.proactive_question,
            turns = body.history.len(),
            "querying dialogue backend"
        );
        let resp = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        if resp.status() == StatusCode::NO_CONTENT {
            info!("backend heard nothing");
            return Ok(None);
        }
        let wire: Option<WireResponse> = resp.json().await?;
        wire.map(decode).transpose()
    }
}
