//! Scene reconciliation: decode raw reply text, validate, canonicalize
//!
//! The two stages are deliberately separate failure domains: a reply that is
//! not structured data at all ([`DecodeError`]) versus structured data that
//! violates the scene schema ([`SchemaError`]). The session controller
//! treats both the same way for recovery (the raw text is re-decodable
//! locally), but surfaces them with different messages.

mod decode;
mod normalize;
mod types;

use thiserror::Error;

pub use decode::{decode, DecodeError};
pub use normalize::{normalize, SchemaError, FALLBACK_CHOICES, FILLER_CHOICE, REQUIRED_CHOICES};
pub use types::{BoundaryFlags, Choice, ChoiceId, Outcome, Scene, SceneId, UnitPath};

/// A reply body that could not be turned into a [`Scene`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Run the full reconciliation pipeline on raw reply text
///
/// This is the single ingress for scenes: the narrative client runs it on
/// fresh replies and the controller re-runs it on cached text during a
/// local retry. Pure and synchronous, so retrying it on the same input
/// yields the same outcome.
pub fn parse(raw: &str) -> Result<Scene, PayloadError> {
    let payload = decode(raw)?;
    let scene = normalize(&payload)?;
    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WELL_FORMED: &str = r#"{
        "description": "The relay tower hums in the dark.",
        "choices": ["Climb", "Wait", "Circle around"],
        "suggestedFocus": "the humming relay",
        "actTitle": "Act II: Signals",
        "sceneTitle": "The Relay Tower",
        "isSceneEnd": false,
        "isMicroArcEnd": false,
        "isActEnd": false
    }"#;

    #[test]
    fn parse_composes_decode_and_normalize() {
        let fenced = format!("```json\n{WELL_FORMED}\n```");
        let scene = parse(&fenced).unwrap();
        assert_eq!(scene.scene_title, "The Relay Tower");
        assert_eq!(scene.choices.len(), REQUIRED_CHOICES);
    }

    #[test]
    fn parse_distinguishes_failure_domains() {
        assert!(matches!(parse("not json"), Err(PayloadError::Decode(_))));
        assert!(matches!(
            parse(r#"{"description": "x"}"#),
            Err(PayloadError::Schema(_))
        ));
    }

    #[test]
    fn parse_is_repeatable_on_the_same_input() {
        // Outcome stability is what makes the local re-decode retry honest.
        let first = parse(WELL_FORMED).unwrap();
        let second = parse(WELL_FORMED).unwrap();
        assert_eq!(first.description, second.description);
        assert_eq!(
            first.choices.iter().map(|c| &c.text).collect::<Vec<_>>(),
            second.choices.iter().map(|c| &c.text).collect::<Vec<_>>()
        );
        assert!(parse("still not json").is_err());
        assert!(parse("still not json").is_err());
    }
}
