//! Narrative client: the conversation boundary with the generation service
//!
//! Defines the client trait and reply types for driving one story session.
//! Two implementations:
//! - `GeminiClient` (src/gemini.rs): HTTP against a generateContent-style
//!   REST endpoint (production)
//! - `MockClient`: replays a scripted sequence of replies (testing)
//!
//! A client owns the single logical conversation: `start` opens it, every
//! `advance` continues it. The reply always carries the verbatim text the
//! service produced when the call itself succeeded, so the session can
//! cache it for a local re-decode even when reconciliation fails.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::scene::{self, BoundaryFlags, PayloadError, Scene};

/// A text credential for the generation service
///
/// Debug output is redacted; the secret only leaves through [`as_str`].
///
/// [`as_str`]: Credential::as_str
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw secret, for building authenticated requests
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(..)")
    }
}

/// Context the service needs to continue the story coherently
///
/// Everything here comes from the last committed scene except `action`
/// (the player's pick) and `micro_arc` (controller bookkeeping).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvanceRequest {
    /// Text of the choice the player selected
    pub action: String,
    /// `suggested_focus` echoed back from the committed scene
    pub focus: String,
    pub act_title: String,
    pub scene_title: String,
    /// Controller-owned micro-arc counter, already updated for this turn
    pub micro_arc: u32,
    /// Boundary flags of the committed scene the player is leaving
    pub flags: BoundaryFlags,
}

/// One narrative turn as seen from the service
#[derive(Debug, Clone)]
pub struct TurnReply {
    /// Verbatim service output, present whenever the call reached the service
    pub raw_text: String,
    /// The reconciled scene, or why reconciliation failed
    pub outcome: Result<Scene, PayloadError>,
}

impl TurnReply {
    /// Build a reply by running the reconciliation pipeline on raw text
    ///
    /// Shared by every implementation so a scripted reply and a live reply
    /// go through the identical decode + normalize path.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw_text = raw.into();
        let outcome = scene::parse(&raw_text);
        Self { raw_text, outcome }
    }
}

/// Errors that prevent a reply body from being obtained at all
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Network-level failure: nothing usable came back
    #[error("could not reach the story service: {0}")]
    Transport(String),
    /// No credential is available to issue the request
    #[error("no credential available to start the session")]
    CredentialMissing,
}

/// Client trait for driving one story conversation
///
/// Abstracts over transport (HTTP, mock) so the session controller never
/// depends on how the service is reached. Implementations own conversation
/// state; callers hold them behind `Arc<dyn NarrativeClient>`.
#[async_trait]
pub trait NarrativeClient: Send + Sync {
    /// Open a fresh conversation and request the opening scene
    ///
    /// Resets any prior conversation held by this client.
    async fn start(&self, credential: &Credential) -> Result<TurnReply, ClientError>;

    /// Continue the conversation with the player's action and its context
    async fn advance(&self, request: &AdvanceRequest) -> Result<TurnReply, ClientError>;
}

/// A call observed by [`MockClient`], for test assertions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Start,
    Advance(AdvanceRequest),
}

/// Mock client for testing; replays a scripted sequence of replies
///
/// Replies are consumed in order regardless of whether the call is a start
/// or an advance; every call is recorded so tests can assert on the exact
/// request contexts the controller issued.
#[derive(Default)]
pub struct MockClient {
    script: Mutex<VecDeque<Result<TurnReply, ClientError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply built from raw service text
    ///
    /// The text runs through the real reconciliation pipeline, so malformed
    /// scripts exercise the same failure paths live traffic would.
    pub fn with_reply(self, raw: impl Into<String>) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Ok(TurnReply::from_raw(raw)));
        self
    }

    /// Queue a transport failure
    pub fn with_transport_failure(self, message: impl Into<String>) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(ClientError::Transport(message.into())));
        self
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn next_reply(&self) -> Result<TurnReply, ClientError> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ClientError::Transport("mock script exhausted".to_string())))
    }
}

#[async_trait]
impl NarrativeClient for MockClient {
    async fn start(&self, _credential: &Credential) -> Result<TurnReply, ClientError> {
        self.calls.lock().unwrap().push(RecordedCall::Start);
        self.next_reply()
    }

    async fn advance(&self, request: &AdvanceRequest) -> Result<TurnReply, ClientError> {
        self.calls
            .lock()
            .unwrap()
            .push(RecordedCall::Advance(request.clone()));
        self.next_reply()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene_raw() -> String {
        r#"{
            "description": "Steam rises off the launch pad.",
            "choices": ["Board", "Stall", "Watch"],
            "suggestedFocus": "the countdown",
            "actTitle": "Act I",
            "sceneTitle": "Pad Seven",
            "isSceneEnd": false,
            "isMicroArcEnd": false,
            "isActEnd": false
        }"#
        .to_string()
    }

    fn advance_request(action: &str) -> AdvanceRequest {
        AdvanceRequest {
            action: action.to_string(),
            focus: "the countdown".to_string(),
            act_title: "Act I".to_string(),
            scene_title: "Pad Seven".to_string(),
            micro_arc: 1,
            flags: BoundaryFlags::default(),
        }
    }

    #[tokio::test]
    async fn mock_replays_script_in_order() {
        let client = MockClient::new()
            .with_reply(scene_raw())
            .with_transport_failure("socket closed");

        let credential = Credential::new("k");
        let reply = client.start(&credential).await.unwrap();
        assert!(reply.outcome.is_ok());

        let err = client.advance(&advance_request("Board")).await.unwrap_err();
        assert_eq!(err, ClientError::Transport("socket closed".to_string()));
    }

    #[tokio::test]
    async fn mock_records_request_contexts() {
        let client = MockClient::new()
            .with_reply(scene_raw())
            .with_reply(scene_raw());

        let credential = Credential::new("k");
        client.start(&credential).await.unwrap();
        client.advance(&advance_request("Stall")).await.unwrap();

        let calls = client.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], RecordedCall::Start);
        match &calls[1] {
            RecordedCall::Advance(req) => assert_eq!(req.action, "Stall"),
            other => panic!("expected an advance, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausted_script_reports_transport_failure() {
        let client = MockClient::new();
        let credential = Credential::new("k");
        let err = client.start(&credential).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }

    #[test]
    fn garbled_script_goes_through_the_real_pipeline() {
        let reply = TurnReply::from_raw("not json");
        assert_eq!(reply.raw_text, "not json");
        assert!(matches!(reply.outcome, Err(PayloadError::Decode(_))));
    }

    #[test]
    fn credential_debug_is_redacted() {
        let credential = Credential::new("super-secret-key");
        assert_eq!(format!("{credential:?}"), "Credential(..)");
    }
}
