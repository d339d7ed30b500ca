//! Canonical scene records produced by the normalizer

use serde::Serialize;
use uuid::Uuid;

/// Unique identifier for a committed scene
///
/// Process-unique, freshly assigned at normalization. The image sidecar keys
/// in-flight requests on this so a stale result can never attach to a newer
/// scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SceneId(Uuid);

impl SceneId {
    /// Create a new random SceneId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SceneId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SceneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a choice within a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ChoiceId(Uuid);

impl ChoiceId {
    /// Create a new random ChoiceId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChoiceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One selectable player action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    /// Process-unique identifier, never taken from the wire
    pub id: ChoiceId,
    /// Player-facing action text
    pub text: String,
}

impl Choice {
    /// Create a choice with a fresh id
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: ChoiceId::new(),
            text: text.into(),
        }
    }
}

/// Unit-completion signals reported by the service
///
/// The controller's micro-arc bookkeeping consumes these; the normalizer
/// passes them through untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BoundaryFlags {
    pub scene_end: bool,
    pub micro_arc_end: bool,
    pub act_end: bool,
}

/// Whether the story continues past this scene
///
/// A tagged outcome instead of two booleans: defeat and victory cannot both
/// be represented once a payload has passed normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Outcome {
    #[default]
    Ongoing,
    Defeat,
    Victory,
}

impl Outcome {
    /// True for scenes that end the session
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::Ongoing)
    }
}

/// One normalized narrative beat
///
/// Invariants held by construction (see the normalizer): `choices` has
/// exactly three entries when `outcome` is `Ongoing` and is empty otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scene {
    /// Process-unique identity, assigned at normalization
    pub id: SceneId,
    /// Narrative text for this beat
    pub description: String,
    /// Selectable actions; empty only on terminal scenes
    pub choices: Vec<Choice>,
    /// Hint the service wants echoed back on the next advance
    pub suggested_focus: String,
    /// Title of the enclosing act
    pub act_title: String,
    /// Title of the current scene
    pub scene_title: String,
    /// Unit-completion signals
    pub flags: BoundaryFlags,
    /// Ongoing, Defeat, or Victory
    pub outcome: Outcome,
}

impl Scene {
    /// True when this scene ends the session
    pub fn is_terminal(&self) -> bool {
        self.outcome.is_terminal()
    }
}

/// Hierarchical position of the active scene
///
/// `micro_arc` comes from the session controller, not the scene: the
/// normalizer never sets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitPath {
    pub act_title: String,
    pub scene_title: String,
    /// 1-based index of the current micro-arc within the act
    pub micro_arc: u32,
}

impl std::fmt::Display for UnitPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} / {} (micro-arc {})",
            self.act_title, self.scene_title, self.micro_arc
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choice_ids_are_unique() {
        let a = Choice::new("hold position");
        let b = Choice::new("hold position");
        assert_ne!(a.id, b.id);
        assert_eq!(a.text, b.text);
    }

    #[test]
    fn outcome_terminality() {
        assert!(!Outcome::Ongoing.is_terminal());
        assert!(Outcome::Defeat.is_terminal());
        assert!(Outcome::Victory.is_terminal());
    }

    #[test]
    fn unit_path_display() {
        let path = UnitPath {
            act_title: "Act I".to_string(),
            scene_title: "The Quiet Harbor".to_string(),
            micro_arc: 2,
        };
        assert_eq!(path.to_string(), "Act I / The Quiet Harbor (micro-arc 2)");
    }
}
