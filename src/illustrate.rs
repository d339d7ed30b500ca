//! Scene illustration sidecar
//!
//! Illustration is decorative: renders are fired on commit and never
//! awaited by the session, and a failed render degrades to text-only play.
//! The sidecar owns a single slot holding the latest render state; a
//! render that finishes after a newer scene has claimed the slot is
//! dropped rather than displayed against the wrong scene.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::client::Credential;
use crate::scene::{Scene, SceneId};

/// Longest scene excerpt carried into an image prompt, in characters
const PROMPT_EXCERPT_CEILING: usize = 700;

const FREE_BASE_URL: &str = "https://image.pollinations.ai";
const PREMIUM_BASE_URL: &str = "https://api.openai.com/v1";
const PREMIUM_MODEL: &str = "dall-e-3";
const PREMIUM_TIMEOUT: Duration = Duration::from_secs(120);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// The request never produced a reply
    #[error("image request failed: {0}")]
    Request(String),

    /// The service answered with a non-success status
    #[error("image service returned {status}: {detail}")]
    Rejected { status: u16, detail: String },

    /// A well-formed reply that carries no image
    #[error("image service reply held no image url")]
    EmptyReply,
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// A source of scene illustrations
///
/// Implementations resolve a finished prompt to a displayable URL. They do
/// not restyle the prompt; composition happens in the sidecar.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn render(&self, prompt: &str) -> Result<String, ImageError>;
}

/// Keyless provider backed by an on-demand image service
///
/// No request is issued here: the returned URL renders the image when
/// first fetched, so construction is the whole job.
pub struct FreeImageProvider {
    base_url: String,
    width: u32,
    height: u32,
}

impl FreeImageProvider {
    pub fn new() -> Self {
        Self {
            base_url: FREE_BASE_URL.to_string(),
            width: 1024,
            height: 1024,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Default for FreeImageProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageProvider for FreeImageProvider {
    async fn render(&self, prompt: &str) -> Result<String, ImageError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|err| ImageError::Request(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ImageError::Request("image base url cannot carry a path".to_string()))?
            .push("prompt")
            .push(prompt);
        url.query_pairs_mut()
            .append_pair("width", &self.width.to_string())
            .append_pair("height", &self.height.to_string())
            .append_pair("nologo", "true");
        Ok(url.to_string())
    }
}

#[derive(Deserialize)]
struct ImagesReply {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    url: Option<String>,
}

/// Keyed provider speaking the `/images/generations` convention
///
/// Any failure falls back to the free provider, so holding a premium key
/// never renders fewer scenes than holding none.
pub struct PremiumImageProvider {
    http: reqwest::Client,
    base_url: String,
    model: String,
    credential: Credential,
    fallback: FreeImageProvider,
}

impl PremiumImageProvider {
    pub fn new(credential: Credential) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: PREMIUM_BASE_URL.to_string(),
            model: PREMIUM_MODEL.to_string(),
            credential,
            fallback: FreeImageProvider::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn request_premium(&self, prompt: &str) -> Result<String, ImageError> {
        let endpoint = format!("{}/images/generations", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "n": 1,
            "size": "1024x1024",
            "quality": "standard",
            "style": "natural",
        });
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(self.credential.as_str())
            .timeout(PREMIUM_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|err| ImageError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ImageError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }
        let reply: ImagesReply = response
            .json()
            .await
            .map_err(|err| ImageError::Request(err.to_string()))?;
        reply
            .data
            .into_iter()
            .find_map(|datum| datum.url)
            .ok_or(ImageError::EmptyReply)
    }
}

#[async_trait]
impl ImageProvider for PremiumImageProvider {
    async fn render(&self, prompt: &str) -> Result<String, ImageError> {
        match self.request_premium(prompt).await {
            Ok(url) => Ok(url),
            Err(err) => {
                warn!(error = %err, "premium image request failed; using the free service");
                self.fallback.render(prompt).await
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Sidecar
// ---------------------------------------------------------------------------

/// State of the single illustration slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Illustration {
    /// Nothing has been illustrated yet
    Idle,
    /// A render for this scene is in flight
    Pending { scene: SceneId },
    /// The latest render finished and may be displayed
    Ready { scene: SceneId, url: String },
    /// The render for this scene failed; play continues without it
    Unavailable { scene: SceneId },
}

/// Fire-and-forget illustration for committed scenes
///
/// `illustrate` claims the slot for the scene and spawns the render on the
/// ambient runtime. Results are applied only while the slot still belongs
/// to the scene that requested them, so a slow render can never paint over
/// a newer one.
pub struct ImageSidecar {
    provider: Arc<dyn ImageProvider>,
    style: String,
    slot: Arc<Mutex<Illustration>>,
}

impl ImageSidecar {
    pub fn new(provider: Arc<dyn ImageProvider>, style: impl Into<String>) -> Self {
        Self {
            provider,
            style: style.into(),
            slot: Arc::new(Mutex::new(Illustration::Idle)),
        }
    }

    /// Snapshot of the slot, for display
    pub fn current(&self) -> Illustration {
        self.slot.lock().unwrap().clone()
    }

    /// Claim the slot for `scene` and render it in the background
    ///
    /// Returns the task handle so tests can await completion; callers in
    /// the session path drop it. Outside a runtime the slot is marked
    /// unavailable and no task is spawned.
    pub fn illustrate(&self, scene: &Scene) -> Option<JoinHandle<()>> {
        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("no async runtime; scene illustration skipped");
                *self.slot.lock().unwrap() = Illustration::Unavailable { scene: scene.id };
                return None;
            }
        };

        let scene_id = scene.id;
        let prompt = compose_prompt(scene, &self.style);
        let provider = self.provider.clone();
        let slot = self.slot.clone();
        *slot.lock().unwrap() = Illustration::Pending { scene: scene_id };

        Some(runtime.spawn(async move {
            let outcome = provider.render(&prompt).await;
            let mut slot = slot.lock().unwrap();
            let claimed = matches!(&*slot, Illustration::Pending { scene } if *scene == scene_id);
            if !claimed {
                debug!("render finished for a superseded scene; dropped");
                return;
            }
            *slot = match outcome {
                Ok(url) => Illustration::Ready {
                    scene: scene_id,
                    url,
                },
                Err(err) => {
                    warn!(error = %err, "illustration failed; continuing without one");
                    Illustration::Unavailable { scene: scene_id }
                }
            };
        }))
    }
}

/// Prompt for one scene: title and a bounded excerpt of the description,
/// then the profile's style clause
fn compose_prompt(scene: &Scene, style: &str) -> String {
    let subject: String = format!("{}. {}", scene.scene_title, scene.description)
        .chars()
        .take(PROMPT_EXCERPT_CEILING)
        .collect();
    format!("{subject}, {style}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{BoundaryFlags, Outcome};
    use std::collections::VecDeque;
    use tokio::sync::oneshot;

    fn scene(title: &str, description: &str) -> Scene {
        Scene {
            id: SceneId::new(),
            description: description.to_string(),
            choices: Vec::new(),
            suggested_focus: String::new(),
            act_title: "Act I".to_string(),
            scene_title: title.to_string(),
            flags: BoundaryFlags::default(),
            outcome: Outcome::Ongoing,
        }
    }

    /// Replays a fixed script of render outcomes
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<String, ImageError>>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<String, ImageError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
            }
        }
    }

    #[async_trait]
    impl ImageProvider for ScriptedProvider {
        async fn render(&self, _prompt: &str) -> Result<String, ImageError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ImageError::EmptyReply))
        }
    }

    /// Blocks each render until the test releases its gate
    struct GatedProvider {
        gates: Mutex<VecDeque<oneshot::Receiver<Result<String, ImageError>>>>,
    }

    impl GatedProvider {
        fn new(count: usize) -> (Self, Vec<oneshot::Sender<Result<String, ImageError>>>) {
            let mut senders = Vec::new();
            let mut receivers = VecDeque::new();
            for _ in 0..count {
                let (tx, rx) = oneshot::channel();
                senders.push(tx);
                receivers.push_back(rx);
            }
            (
                Self {
                    gates: Mutex::new(receivers),
                },
                senders,
            )
        }
    }

    #[async_trait]
    impl ImageProvider for GatedProvider {
        async fn render(&self, _prompt: &str) -> Result<String, ImageError> {
            let gate = self.gates.lock().unwrap().pop_front();
            match gate {
                Some(gate) => gate.await.unwrap_or(Err(ImageError::EmptyReply)),
                None => Err(ImageError::EmptyReply),
            }
        }
    }

    // --- Scenario: free provider builds a self-rendering url ---

    #[tokio::test]
    async fn free_url_encodes_the_prompt() {
        let provider = FreeImageProvider::new();
        let url = provider.render("a quiet dock, rain").await.unwrap();
        assert!(url.starts_with("https://image.pollinations.ai/prompt/"));
        assert!(url.contains("a%20quiet%20dock"));
        assert!(url.contains("width=1024"));
        assert!(url.contains("height=1024"));
        assert!(url.contains("nologo=true"));
    }

    // --- Scenario: prompt composition ---

    #[test]
    fn prompt_carries_title_excerpt_and_style() {
        let prompt = compose_prompt(
            &scene("Customs House", "Rain on the tin roof."),
            "moody digital painting",
        );
        assert_eq!(
            prompt,
            "Customs House. Rain on the tin roof., moody digital painting"
        );
    }

    #[test]
    fn prompt_excerpt_is_bounded_and_multibyte_safe() {
        let long = "é".repeat(900);
        let prompt = compose_prompt(&scene("T", &long), "style");
        assert!(prompt.chars().count() <= PROMPT_EXCERPT_CEILING + ", style".len());
        assert!(prompt.ends_with(", style"));
    }

    // --- Scenario: slot lifecycle ---

    #[tokio::test]
    async fn render_success_fills_the_slot() {
        let provider = ScriptedProvider::new(vec![Ok("https://img.example/1".to_string())]);
        let sidecar = ImageSidecar::new(Arc::new(provider), "style");
        let subject = scene("Opening", "A dock at night.");

        let handle = sidecar.illustrate(&subject).unwrap();
        handle.await.unwrap();

        assert_eq!(
            sidecar.current(),
            Illustration::Ready {
                scene: subject.id,
                url: "https://img.example/1".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn render_failure_marks_the_slot_unavailable() {
        let provider = ScriptedProvider::new(vec![Err(ImageError::EmptyReply)]);
        let sidecar = ImageSidecar::new(Arc::new(provider), "style");
        let subject = scene("Opening", "A dock at night.");

        let handle = sidecar.illustrate(&subject).unwrap();
        handle.await.unwrap();

        assert_eq!(
            sidecar.current(),
            Illustration::Unavailable { scene: subject.id }
        );
    }

    #[tokio::test]
    async fn stale_render_never_paints_over_a_newer_scene() {
        let (provider, mut gates) = GatedProvider::new(2);
        let sidecar = ImageSidecar::new(Arc::new(provider), "style");
        let first = scene("First", "Scene one.");
        let second = scene("Second", "Scene two.");

        let first_task = sidecar.illustrate(&first).unwrap();
        let second_task = sidecar.illustrate(&second).unwrap();
        assert_eq!(sidecar.current(), Illustration::Pending { scene: second.id });

        // The first render finishes late; its result must be dropped.
        let second_gate = gates.pop().unwrap();
        let first_gate = gates.pop().unwrap();
        first_gate
            .send(Ok("https://img.example/stale".to_string()))
            .unwrap();
        first_task.await.unwrap();
        assert_eq!(sidecar.current(), Illustration::Pending { scene: second.id });

        second_gate
            .send(Ok("https://img.example/fresh".to_string()))
            .unwrap();
        second_task.await.unwrap();
        assert_eq!(
            sidecar.current(),
            Illustration::Ready {
                scene: second.id,
                url: "https://img.example/fresh".to_string(),
            }
        );
    }

    #[test]
    fn without_a_runtime_the_slot_degrades_cleanly() {
        let provider = ScriptedProvider::new(vec![Ok("unused".to_string())]);
        let sidecar = ImageSidecar::new(Arc::new(provider), "style");
        let subject = scene("Opening", "A dock at night.");

        assert!(sidecar.illustrate(&subject).is_none());
        assert_eq!(
            sidecar.current(),
            Illustration::Unavailable { scene: subject.id }
        );
    }
}
