//! Prompt construction and story profiles
//!
//! The wire schema the prompts instruct is load-bearing (the normalizer
//! depends on it); the fiction around it is not. A [`StoryProfile`] carries
//! the fiction so settings can be swapped without touching the engine, and
//! ships with a built-in default.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::client::AdvanceRequest;

/// The fixed first user message that opens every session
///
/// Stable across versions; callers and tests may assert on it.
pub const OPENING_MESSAGE: &str = "Begin adventure.";

/// The reply shape the service is instructed to produce
const SCHEMA_BLOCK: &str = r#"{
  "description": "string (purely in-world narrative, what the player reads)",
  "choices": ["string", "string", "string"],
  "suggestedFocus": "string",
  "actTitle": "string",
  "sceneTitle": "string",
  "isSceneEnd": boolean,
  "isMicroArcEnd": boolean,
  "isActEnd": boolean,
  "isPlayerDefeated": boolean (optional, defaults false),
  "isGameWon": boolean (optional, defaults false)
}"#;

/// Problems reading a story profile file
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("cannot read story profile: {0}")]
    Io(#[from] std::io::Error),
    #[error("story profile is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Setting, tone, and illustration style for one story
///
/// Loaded from YAML; missing fields fall back to the built-in profile's
/// values, so a profile file can override just the premise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryProfile {
    /// Display title, also woven into the system prompt
    pub title: String,
    /// Setting and tone brief handed to the service verbatim
    pub premise: String,
    /// Suffix appended to illustration prompts
    pub image_style: String,
}

impl Default for StoryProfile {
    fn default() -> Self {
        Self {
            title: "The Last Manifest".to_string(),
            premise: "A hard-edged smuggling drama on a rain-soaked frontier \
                      port. The player is a freight broker pulled into moving \
                      cargo that powerful people want lost. Tone: terse, \
                      grounded, consequences stick. Violence is costly and \
                      rarely the best answer."
                .to_string(),
            image_style: "digital painting, cinematic lighting, moody color, high detail"
                .to_string(),
        }
    }
}

impl StoryProfile {
    /// Read a profile from a YAML file
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Render this profile as YAML, for scaffolding profile files
    pub fn to_yaml(&self) -> Result<String, ProfileError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Build the system instruction for a session
pub fn system_prompt(profile: &StoryProfile) -> String {
    format!(
        "You are the storyteller for \"{title}\", an interactive fiction session.\n\
         \n\
         {premise}\n\
         \n\
         Pacing: scenes are short and consequential. Scenes group into \
         micro-arcs (2-4 scenes forming one complete mission-like unit); \
         micro-arcs group into acts. Signal unit completion with the \
         boundary flags.\n\
         \n\
         Every reply MUST be a single valid JSON object and nothing else:\n\
         {schema}\n\
         \n\
         Offer exactly 3 choices while the story is ongoing. On defeat set \
         \"isPlayerDefeated\" true; on victory set \"isGameWon\" true; in \
         either case \"choices\" must be an empty array. All keys must be \
         double-quoted. Do not wrap the JSON in a code fence.",
        title = profile.title,
        premise = profile.premise,
        schema = SCHEMA_BLOCK,
    )
}

/// Render an advance request as the next user message
///
/// Carries the full unit-path context so a stateless service call can
/// continue coherently.
pub fn continue_prompt(request: &AdvanceRequest) -> String {
    format!(
        "The player chose: \"{action}\"\n\
         Previously, the suggested focus was: \"{focus}\"\n\
         Current position: Act: \"{act}\", Scene: \"{scene}\", Micro-Arc Number: {arc}.\n\
         Previous turn ended: Scene: {scene_end}, Micro-Arc: {arc_end}, Act: {act_end}.\n\
         \n\
         Continue the story from the player's choice. If the player refused \
         or walked away, continue with consequences or alternatives.\n\
         Reply with a single valid JSON object adhering to the schema, \
         nothing else.",
        action = request.action,
        focus = request.focus,
        act = request.act_title,
        scene = request.scene_title,
        arc = request.micro_arc,
        scene_end = request.flags.scene_end,
        arc_end = request.flags.micro_arc_end,
        act_end = request.flags.act_end,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::BoundaryFlags;

    #[test]
    fn system_prompt_carries_title_and_schema() {
        let prompt = system_prompt(&StoryProfile::default());
        assert!(prompt.contains("The Last Manifest"));
        assert!(prompt.contains("\"suggestedFocus\""));
        assert!(prompt.contains("isPlayerDefeated"));
    }

    #[test]
    fn continue_prompt_carries_full_context() {
        let request = AdvanceRequest {
            action: "Bribe the inspector".to_string(),
            focus: "the sealed manifest".to_string(),
            act_title: "Act II".to_string(),
            scene_title: "Dockside".to_string(),
            micro_arc: 3,
            flags: BoundaryFlags {
                scene_end: true,
                micro_arc_end: false,
                act_end: false,
            },
        };
        let prompt = continue_prompt(&request);
        assert!(prompt.contains("\"Bribe the inspector\""));
        assert!(prompt.contains("\"the sealed manifest\""));
        assert!(prompt.contains("Act: \"Act II\""));
        assert!(prompt.contains("Micro-Arc Number: 3"));
        assert!(prompt.contains("Scene: true, Micro-Arc: false, Act: false"));
    }

    #[test]
    fn profile_loads_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("story.yaml");
        std::fs::write(
            &path,
            "title: Ash Orbit\npremise: Salvage crews circle a dead station.\n",
        )
        .unwrap();

        let profile = StoryProfile::load(&path).unwrap();
        assert_eq!(profile.title, "Ash Orbit");
        assert_eq!(profile.premise, "Salvage crews circle a dead station.");
        // Unspecified fields keep the built-in values.
        assert_eq!(profile.image_style, StoryProfile::default().image_style);
    }

    #[test]
    fn profile_round_trips_through_yaml() {
        let profile = StoryProfile::default();
        let yaml = profile.to_yaml().unwrap();
        let back: StoryProfile = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, profile);
    }

    #[test]
    fn missing_profile_file_reports_io_error() {
        let err = StoryProfile::load(Path::new("/nonexistent/story.yaml")).unwrap_err();
        assert!(matches!(err, ProfileError::Io(_)));
    }
}
