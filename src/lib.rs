//! Fabula: Session Engine for LLM-Driven Interactive Fiction
//!
//! A state machine that drives a branching story through a remote
//! text-generation service, reconciling free-form model output into
//! committed scenes and keeping every failure recoverable in place.
//!
//! # Core Concepts
//!
//! - **Scenes**: Committed story beats with exactly three choices (none at an ending)
//! - **Controller**: The single writer of session state, from credential intake to endings
//! - **Recovery**: Failed turns retain the player's action and, when one was obtained, the raw reply
//!
//! # Example
//!
//! ```
//! use fabula::{MockClient, Phase, SessionController};
//! use std::sync::Arc;
//!
//! let client = Arc::new(MockClient::new());
//! let controller = SessionController::new(client);
//! assert_eq!(controller.phase(), Phase::Uninitialized);
//! ```

pub mod client;
pub mod gemini;
pub mod illustrate;
pub mod prompt;
pub mod scene;
pub mod session;

pub use client::{
    AdvanceRequest, ClientError, Credential, MockClient, NarrativeClient, RecordedCall, TurnReply,
};
pub use gemini::GeminiClient;
pub use illustrate::{
    FreeImageProvider, Illustration, ImageError, ImageProvider, ImageSidecar, PremiumImageProvider,
};
pub use prompt::{system_prompt, ProfileError, StoryProfile, OPENING_MESSAGE};
pub use scene::{
    BoundaryFlags, Choice, ChoiceId, DecodeError, Outcome, PayloadError, Scene, SceneId,
    SchemaError, UnitPath,
};
pub use session::{Failure, Phase, Recovery, SessionController};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
