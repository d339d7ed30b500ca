//! Session state machine and recovery orchestration
//!
//! The controller is the sole writer of session state. It owns one
//! `SessionContext` per play-through and replaces it wholesale on restart;
//! everything the UI renders is a committed snapshot read through the
//! accessors. Failures never lose the player's place: the last action and,
//! when a reply body was obtained, the raw reply text are retained so the
//! player can retry exactly what failed.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::{AdvanceRequest, ClientError, Credential, NarrativeClient, TurnReply};
use crate::illustrate::ImageSidecar;
use crate::scene::{self, PayloadError, Scene, UnitPath};

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed; credential availability not yet resolved
    Uninitialized,
    /// No credential; nothing can start until one is submitted
    AwaitingCredential,
    /// Ready to begin, or holding a committed scene awaiting the next choice
    Active,
    /// A narrative request is outstanding
    Loading,
    /// The last turn failed; a recovery path is armed
    Failed,
    /// A terminal scene was committed; only restart remains
    Ended,
}

/// The armed retry path while the session is `Failed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// Re-run reconciliation on the cached reply text, no network involved
    Redecode { raw_text: String },
    /// Re-issue the request that failed: the retained action when one
    /// exists, otherwise a fresh session start
    Reissue,
}

/// Why the session is `Failed`, plus how to retry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    message: String,
    recovery: Recovery,
}

impl Failure {
    /// Human-readable account of what went wrong
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn recovery(&self) -> &Recovery {
        &self.recovery
    }
}

/// Working state for one play-through
///
/// Replaced wholesale on begin/restart, never patched from outside.
struct SessionContext {
    phase: Phase,
    active: Option<Scene>,
    micro_arc: u32,
    last_action: Option<String>,
    failure: Option<Failure>,
    started_at: DateTime<Utc>,
}

impl SessionContext {
    fn new(phase: Phase) -> Self {
        Self {
            phase,
            active: None,
            micro_arc: 1,
            last_action: None,
            failure: None,
            started_at: Utc::now(),
        }
    }
}

/// The session state machine
///
/// Drives one story conversation through a [`NarrativeClient`], reconciles
/// replies into committed scenes, and exposes the recovery paths of the
/// failure taxonomy. The client is injected at construction so sessions
/// never share hidden state; the optional image sidecar is notified on
/// every commit and never awaited.
pub struct SessionController {
    client: Arc<dyn NarrativeClient>,
    sidecar: Option<Arc<ImageSidecar>>,
    credential: Option<Credential>,
    ctx: SessionContext,
}

impl SessionController {
    pub fn new(client: Arc<dyn NarrativeClient>) -> Self {
        Self {
            client,
            sidecar: None,
            credential: None,
            ctx: SessionContext::new(Phase::Uninitialized),
        }
    }

    /// Attach an image sidecar to be fired on every committed scene
    pub fn with_sidecar(mut self, sidecar: Arc<ImageSidecar>) -> Self {
        self.sidecar = Some(sidecar);
        self
    }

    // -----------------------------------------------------------------------
    // Observable state
    // -----------------------------------------------------------------------

    pub fn phase(&self) -> Phase {
        self.ctx.phase
    }

    /// The committed scene, when one exists
    pub fn scene(&self) -> Option<&Scene> {
        self.ctx.active.as_ref()
    }

    /// Controller-owned micro-arc counter, 1-based
    pub fn micro_arc(&self) -> u32 {
        self.ctx.micro_arc
    }

    /// Hierarchical position of the committed scene
    pub fn unit_path(&self) -> Option<UnitPath> {
        self.ctx.active.as_ref().map(|scene| UnitPath {
            act_title: scene.act_title.clone(),
            scene_title: scene.scene_title.clone(),
            micro_arc: self.ctx.micro_arc,
        })
    }

    /// The most recent player action, retained across failures
    pub fn last_action(&self) -> Option<&str> {
        self.ctx.last_action.as_deref()
    }

    /// Failure details while `Failed`
    pub fn failure(&self) -> Option<&Failure> {
        self.ctx.failure.as_ref()
    }

    /// True when a retry path is armed
    pub fn recovery_available(&self) -> bool {
        self.ctx.failure.is_some()
    }

    /// Raw reply text cached for the local re-decode path, if any
    pub fn cached_raw_text(&self) -> Option<&str> {
        match self.ctx.failure.as_ref().map(Failure::recovery) {
            Some(Recovery::Redecode { raw_text }) => Some(raw_text),
            _ => None,
        }
    }

    /// When the current play-through's context was created
    pub fn started_at(&self) -> DateTime<Utc> {
        self.ctx.started_at
    }

    // -----------------------------------------------------------------------
    // Credential intake
    // -----------------------------------------------------------------------

    /// Resolve what the environment provided at startup
    ///
    /// Uninitialized → Active when a credential is present, otherwise
    /// AwaitingCredential. Ignored in any later phase.
    pub fn resolve_credential(&mut self, credential: Option<Credential>) {
        if self.ctx.phase != Phase::Uninitialized {
            debug!(phase = ?self.ctx.phase, "credential resolution ignored");
            return;
        }
        match credential {
            Some(credential) => {
                self.credential = Some(credential);
                self.ctx.phase = Phase::Active;
            }
            None => self.ctx.phase = Phase::AwaitingCredential,
        }
    }

    /// Accept a credential typed in by the player
    pub fn submit_credential(&mut self, credential: Credential) {
        if !matches!(
            self.ctx.phase,
            Phase::Uninitialized | Phase::AwaitingCredential
        ) {
            debug!(phase = ?self.ctx.phase, "credential submission ignored");
            return;
        }
        self.credential = Some(credential);
        self.ctx.phase = Phase::Active;
    }

    // -----------------------------------------------------------------------
    // Narrative operations
    // -----------------------------------------------------------------------

    /// Start a fresh play-through
    ///
    /// Replaces the working context (micro-arc counter back to 1, recovery
    /// and last action cleared) and issues the start request. Valid from
    /// Active, Failed, and Ended; a gated no-op elsewhere.
    pub async fn begin_session(&mut self) {
        if !matches!(self.ctx.phase, Phase::Active | Phase::Failed | Phase::Ended) {
            debug!(phase = ?self.ctx.phase, "begin ignored");
            return;
        }
        self.ctx = SessionContext::new(Phase::Loading);

        let Some(credential) = self.credential.clone() else {
            // Unreachable through the credential flow; kept as a safeguard.
            self.enter_failed(
                transport_message(&ClientError::CredentialMissing),
                Recovery::Reissue,
            );
            return;
        };
        let result = self.client.start(&credential).await;
        self.settle(result);
    }

    /// Send the player's choice and await the next scene
    ///
    /// Requires a committed scene in Active; anything else is a gated
    /// no-op (including a second submit while Loading). The advance carries
    /// the committed scene's focus, titles, and boundary flags plus the
    /// controller's micro-arc counter.
    pub async fn submit_choice(&mut self, action: impl Into<String>) {
        if self.ctx.phase != Phase::Active {
            debug!(phase = ?self.ctx.phase, "choice ignored");
            return;
        }
        let Some(scene) = self.ctx.active.as_ref() else {
            debug!("choice ignored: no committed scene yet");
            return;
        };
        let action = action.into();
        let request = build_advance(&action, scene, self.ctx.micro_arc);

        self.ctx.last_action = Some(action);
        self.ctx.failure = None;
        self.ctx.phase = Phase::Loading;

        let result = self.client.advance(&request).await;
        self.settle(result);
    }

    /// Re-run reconciliation on the cached reply text, without the network
    ///
    /// Valid only while `Failed` with cached text. Success commits as
    /// usual. A second failure discards the cache (it is presumed
    /// permanently corrupt) and re-arms recovery as resubmission.
    pub fn retry_decode_only(&mut self) {
        if self.ctx.phase != Phase::Failed {
            debug!(phase = ?self.ctx.phase, "local retry ignored");
            return;
        }
        let raw = match self.ctx.failure.as_ref().map(Failure::recovery) {
            Some(Recovery::Redecode { raw_text }) => raw_text.clone(),
            _ => {
                debug!("local retry ignored: no cached reply text");
                return;
            }
        };
        self.ctx.failure = None;
        self.ctx.phase = Phase::Loading;

        match scene::parse(&raw) {
            Ok(new_scene) => self.commit(new_scene),
            Err(flaw) => {
                warn!(error = %flaw, "cached reply failed again; discarding it");
                let message = if self.ctx.last_action.is_some() {
                    "The cached reply is unusable and has been discarded. \
                     Retrying resends your last action."
                } else {
                    "The cached reply is unusable and has been discarded. \
                     Retrying restarts the session."
                };
                self.enter_failed(message.to_string(), Recovery::Reissue);
            }
        }
    }

    /// Re-issue the request that failed
    ///
    /// Valid only while `Failed` with no cached text: the retained action
    /// is resubmitted with the same context it carried before (failed turns
    /// commit nothing, so the rebuilt request is identical), or the start
    /// request is re-issued when no action exists.
    pub async fn retry_network(&mut self) {
        if self.ctx.phase != Phase::Failed {
            debug!(phase = ?self.ctx.phase, "network retry ignored");
            return;
        }
        if !matches!(
            self.ctx.failure.as_ref().map(Failure::recovery),
            Some(Recovery::Reissue)
        ) {
            debug!("network retry ignored: cached reply text wants a local retry");
            return;
        }
        self.ctx.failure = None;
        self.ctx.phase = Phase::Loading;

        let result = match self.reissue_request() {
            Some(request) => self.client.advance(&request).await,
            None => match self.credential.clone() {
                Some(credential) => self.client.start(&credential).await,
                None => Err(ClientError::CredentialMissing),
            },
        };
        self.settle(result);
    }

    /// Dispatch whichever retry path is armed
    ///
    /// The zero-argument entry point a UI binds to its retry control.
    pub async fn invoke_recovery(&mut self) {
        let Some(failure) = self.ctx.failure.as_ref() else {
            debug!("no recovery armed");
            return;
        };
        match failure.recovery() {
            Recovery::Redecode { .. } => self.retry_decode_only(),
            Recovery::Reissue => self.retry_network().await,
        }
    }

    // -----------------------------------------------------------------------
    // Settlement
    // -----------------------------------------------------------------------

    fn settle(&mut self, result: Result<TurnReply, ClientError>) {
        match result {
            Ok(reply) => match reply.outcome {
                Ok(new_scene) => self.commit(new_scene),
                Err(flaw) => {
                    warn!(error = %flaw, "reply obtained but not usable; caching raw text");
                    self.enter_failed(
                        payload_message(&flaw),
                        Recovery::Redecode {
                            raw_text: reply.raw_text,
                        },
                    );
                }
            },
            Err(err) => {
                warn!(error = %err, "narrative request failed");
                self.enter_failed(transport_message(&err), Recovery::Reissue);
            }
        }
    }

    fn commit(&mut self, new_scene: Scene) {
        // Bookkeeping reads the incoming scene's flags; the updated counter
        // rides along with the next advance.
        if new_scene.flags.act_end {
            self.ctx.micro_arc = 1;
        } else if new_scene.flags.micro_arc_end {
            self.ctx.micro_arc += 1;
        }
        self.ctx.failure = None;
        self.ctx.phase = if new_scene.is_terminal() {
            Phase::Ended
        } else {
            Phase::Active
        };
        info!(
            act = %new_scene.act_title,
            scene_title = %new_scene.scene_title,
            micro_arc = self.ctx.micro_arc,
            terminal = new_scene.is_terminal(),
            "scene committed"
        );
        if let Some(sidecar) = &self.sidecar {
            if !new_scene.description.is_empty() {
                let _render = sidecar.illustrate(&new_scene);
            }
        }
        self.ctx.active = Some(new_scene);
    }

    fn enter_failed(&mut self, message: String, recovery: Recovery) {
        self.ctx.phase = Phase::Failed;
        self.ctx.failure = Some(Failure { message, recovery });
    }

    fn reissue_request(&self) -> Option<AdvanceRequest> {
        let action = self.ctx.last_action.clone()?;
        let scene = self.ctx.active.as_ref()?;
        Some(build_advance(&action, scene, self.ctx.micro_arc))
    }
}

fn build_advance(action: &str, scene: &Scene, micro_arc: u32) -> AdvanceRequest {
    AdvanceRequest {
        action: action.to_string(),
        focus: scene.suggested_focus.clone(),
        act_title: scene.act_title.clone(),
        scene_title: scene.scene_title.clone(),
        micro_arc,
        flags: scene.flags,
    }
}

fn transport_message(err: &ClientError) -> String {
    match err {
        ClientError::CredentialMissing => {
            "No credential is available. Submit one, then retry.".to_string()
        }
        ClientError::Transport(detail) => format!(
            "The story service could not be reached: {detail}. \
             Retrying resends the request."
        ),
    }
}

fn payload_message(flaw: &PayloadError) -> String {
    format!(
        "The reply could not be turned into a scene: {flaw}. \
         Retrying re-processes the cached reply without contacting the service."
    )
}
