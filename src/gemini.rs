//! HTTP narrative client for a generateContent-style REST API
//!
//! Owns the conversation the trait contract promises: the system
//! instruction plus every user/model turn so far, resent in full on each
//! call (the endpoint is stateless). A turn is recorded only after the
//! service answers, so a retried request never duplicates history.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::client::{AdvanceRequest, ClientError, Credential, NarrativeClient, TurnReply};
use crate::prompt::{self, StoryProfile};

/// Model requested when none is configured
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Narrative generation is slow; timeouts surface as transport failures
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    text: String,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
struct Turn {
    role: &'static str,
    parts: Vec<Part>,
}

impl Turn {
    fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user",
            parts: vec![Part::text(text)],
        }
    }

    fn model(text: impl Into<String>) -> Self {
        Self {
            role: "model",
            parts: vec![Part::text(text)],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: SystemInstruction,
    contents: Vec<Turn>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Conversation state for one play-through
struct Conversation {
    credential: Credential,
    system: String,
    turns: Vec<Turn>,
}

/// Production [`NarrativeClient`] speaking HTTP
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
    profile: StoryProfile,
    conversation: Mutex<Option<Conversation>>,
}

impl GeminiClient {
    pub fn new(profile: StoryProfile) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            profile,
            conversation: Mutex::new(None),
        }
    }

    /// Override the model name
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the service base URL (no trailing slash)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the per-request timeout (default 90s)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send one request carrying the full conversation, return the reply text
    async fn exchange(
        &self,
        credential: &Credential,
        system: &str,
        turns: &[Turn],
    ) -> Result<String, ClientError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = GenerateRequest {
            system_instruction: SystemInstruction {
                parts: vec![Part::text(system)],
            },
            contents: turns.to_vec(),
        };

        let response = self
            .http
            .post(&url)
            .query(&[("key", credential.as_str())])
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ClientError::Transport(format!(
                "service returned {status}: {}",
                snippet(&detail)
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        Ok(extract_text(&parsed))
    }
}

#[async_trait]
impl NarrativeClient for GeminiClient {
    async fn start(&self, credential: &Credential) -> Result<TurnReply, ClientError> {
        let mut guard = self.conversation.lock().await;
        // Any previous conversation is over the moment a new start is issued,
        // even if this one fails.
        *guard = None;

        let system = prompt::system_prompt(&self.profile);
        let turns = vec![Turn::user(prompt::OPENING_MESSAGE)];
        let raw = self.exchange(credential, &system, &turns).await?;

        let mut conversation = Conversation {
            credential: credential.clone(),
            system,
            turns,
        };
        conversation.turns.push(Turn::model(raw.clone()));
        *guard = Some(conversation);

        Ok(TurnReply::from_raw(raw))
    }

    async fn advance(&self, request: &AdvanceRequest) -> Result<TurnReply, ClientError> {
        let mut guard = self.conversation.lock().await;
        let Some(conversation) = guard.as_mut() else {
            return Err(ClientError::CredentialMissing);
        };

        let user = Turn::user(prompt::continue_prompt(request));
        let mut turns = conversation.turns.clone();
        turns.push(user.clone());

        let raw = self
            .exchange(&conversation.credential, &conversation.system, &turns)
            .await?;
        conversation.turns.push(user);
        conversation.turns.push(Turn::model(raw.clone()));

        Ok(TurnReply::from_raw(raw))
    }
}

fn transport_error(err: reqwest::Error, timeout: Duration) -> ClientError {
    if err.is_timeout() {
        ClientError::Transport(format!(
            "no reply within {}s, request abandoned",
            timeout.as_secs()
        ))
    } else {
        ClientError::Transport(err.to_string())
    }
}

/// Concatenated text of the first candidate; empty when the service
/// answered without one (the decode stage rejects it downstream)
fn extract_text(response: &GenerateResponse) -> String {
    response
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .map(|part| part.text.as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Char-safe prefix of an error body, for messages
fn snippet(text: &str) -> &str {
    match text.char_indices().nth(200) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
