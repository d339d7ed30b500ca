//! Schema validation and choice-count reconciliation
//!
//! The service is instructed to return a fixed JSON shape but drifts in
//! practice: too few choices, too many, stray field types. Normalization
//! applies a strict required-field check, defaults the optional end-game
//! flags, and repairs choice-count drift so the rest of the system only
//! ever sees a canonical [`Scene`].

use serde_json::{Map, Value};
use thiserror::Error;

use super::types::{BoundaryFlags, Choice, Outcome, Scene, SceneId};

/// Number of choices every ongoing scene presents
pub const REQUIRED_CHOICES: usize = 3;

/// Filler appended when the service supplies one or two choices
///
/// Stable across versions; callers and tests may assert on it.
pub const FILLER_CHOICE: &str = "Consider your next move carefully.";

/// Substituted wholesale when the service supplies no choices at all
///
/// Stable across versions; callers and tests may assert on it.
pub const FALLBACK_CHOICES: [&str; 3] = [
    "Proceed cautiously.",
    "Assess the situation.",
    "Look for opportunities.",
];

/// A decoded payload that violates the scene schema
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("required field `{0}` is missing or mistyped")]
    Field(&'static str),
    #[error("payload marks the session both defeated and won")]
    ConflictingOutcome,
}

/// Validate and coerce a decoded payload into a canonical [`Scene`]
///
/// Required fields fail closed: any missing or mistyped one rejects the
/// whole payload. The optional `isPlayerDefeated` / `isGameWon` flags
/// default to `false` when absent or mistyped. Choice reconciliation only
/// applies to ongoing scenes; terminal scenes get an empty choice list no
/// matter what was supplied.
pub fn normalize(payload: &Value) -> Result<Scene, SchemaError> {
    let obj = payload.as_object().ok_or(SchemaError::NotAnObject)?;

    let description = require_text(obj, "description")?;
    let supplied_choices = require_text_array(obj, "choices")?;
    let suggested_focus = require_text(obj, "suggestedFocus")?;
    let act_title = require_text(obj, "actTitle")?;
    let scene_title = require_text(obj, "sceneTitle")?;
    let flags = BoundaryFlags {
        scene_end: require_flag(obj, "isSceneEnd")?,
        micro_arc_end: require_flag(obj, "isMicroArcEnd")?,
        act_end: require_flag(obj, "isActEnd")?,
    };

    let defeated = optional_flag(obj, "isPlayerDefeated");
    let won = optional_flag(obj, "isGameWon");
    let outcome = match (defeated, won) {
        (true, true) => return Err(SchemaError::ConflictingOutcome),
        (true, false) => Outcome::Defeat,
        (false, true) => Outcome::Victory,
        (false, false) => Outcome::Ongoing,
    };

    let choices = if outcome.is_terminal() {
        Vec::new()
    } else {
        reconcile_choices(supplied_choices)
    };

    Ok(Scene {
        id: SceneId::new(),
        description,
        choices,
        suggested_focus,
        act_title,
        scene_title,
        flags,
        outcome,
    })
}

/// Repair choice-count drift to exactly [`REQUIRED_CHOICES`]
///
/// Zero supplied choices means the payload gave us nothing to preserve, so
/// the whole fallback set is substituted. One or two get padded with the
/// filler; four or more get truncated, order preserved.
fn reconcile_choices(mut texts: Vec<String>) -> Vec<Choice> {
    if texts.is_empty() {
        return FALLBACK_CHOICES.iter().map(|text| Choice::new(*text)).collect();
    }
    texts.truncate(REQUIRED_CHOICES);
    while texts.len() < REQUIRED_CHOICES {
        texts.push(FILLER_CHOICE.to_string());
    }
    texts.into_iter().map(Choice::new).collect()
}

fn require_text(obj: &Map<String, Value>, key: &'static str) -> Result<String, SchemaError> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(SchemaError::Field(key))
}

fn require_text_array(
    obj: &Map<String, Value>,
    key: &'static str,
) -> Result<Vec<String>, SchemaError> {
    let items = obj
        .get(key)
        .and_then(Value::as_array)
        .ok_or(SchemaError::Field(key))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or(SchemaError::Field(key))
        })
        .collect()
}

fn require_flag(obj: &Map<String, Value>, key: &'static str) -> Result<bool, SchemaError> {
    obj.get(key)
        .and_then(Value::as_bool)
        .ok_or(SchemaError::Field(key))
}

fn optional_flag(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key).and_then(Value::as_bool).unwrap_or(false)
}
