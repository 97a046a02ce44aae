use crate::conversation::Message;
use async_trait::async_trait;

/// What the dispatcher sends to the cloud dialogue backend.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryRequest {
    /// Captured utterance; absent for proactive questions.
    pub audio: Option<Vec<u8>>,
    pub username: Option<String>,
    /// Proactive question tag steering the reply.
    pub proactive_question: Option<String>,
    /// Conversation so far, oldest first.
    pub history: Vec<Message>,
}

/// Side effect requested by the backend alongside its reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseAction {
    /// Record the speaker's face under the reply's username.
    EnrollFace,
    /// Adopt the reply's username for the current speaker.
    SetUsername,
}

impl ResponseAction {
    /// Parse the backend's action name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "enrollFace" | "enroll_face" | "record_face" => Some(Self::EnrollFace),
            "setUsername" | "set_username" => Some(Self::SetUsername),
            _ => None,
        }
    }
}

/// Spoken reply produced by the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryResponse {
    pub audio: Vec<u8>,
    /// What the backend heard, when it transcribed the request audio.
    pub transcript: Option<String>,
    pub text: Option<String>,
    pub action: Option<ResponseAction>,
    pub action_username: Option<String>,
    pub continue_conversation: bool,
    pub mood: String,
}

impl QueryResponse {
    /// Plain reply with `audio` and a neutral mood.
    pub fn speech(audio: impl Into<Vec<u8>>) -> Self {
        Self {
            audio: audio.into(),
            transcript: None,
            text: None,
            action: None,
            action_username: None,
            continue_conversation: false,
            mood: "neutral".into(),
        }
    }
}

/// Blocking-in-spirit call to the speech-to-text / language model /
/// text-to-speech pipeline.
///
/// `Ok(None)` means the utterance contained no recognisable speech.
#[async_trait]
pub trait DialogueBackend: Send + Sync {
    async fn query(&self, request: QueryRequest) -> anyhow::Result<Option<QueryResponse>>;
}
