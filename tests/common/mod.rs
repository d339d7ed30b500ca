//! Shared builders for session flow tests
//!
//! Replies are built as JSON text because that is what the service hands
//! back: the tests exercise the whole reconciliation pipeline, not
//! pre-parsed scenes.

use serde_json::json;

/// Builder for raw scene replies in the service's wire vocabulary
pub struct ScenePayload {
    description: String,
    choices: Vec<String>,
    suggested_focus: String,
    act_title: String,
    scene_title: String,
    scene_end: bool,
    micro_arc_end: bool,
    act_end: bool,
    defeated: bool,
    won: bool,
}

impl ScenePayload {
    pub fn titled(scene_title: &str) -> Self {
        Self {
            description: format!("What happens at {scene_title}."),
            choices: vec![
                "Press on".to_string(),
                "Hold back".to_string(),
                "Change course".to_string(),
            ],
            suggested_focus: format!("the matter of {scene_title}"),
            act_title: "Act I: Arrival".to_string(),
            scene_title: scene_title.to_string(),
            scene_end: false,
            micro_arc_end: false,
            act_end: false,
            defeated: false,
            won: false,
        }
    }

    pub fn choices(mut self, choices: &[&str]) -> Self {
        self.choices = choices.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn focus(mut self, focus: &str) -> Self {
        self.suggested_focus = focus.to_string();
        self
    }

    pub fn act(mut self, act_title: &str) -> Self {
        self.act_title = act_title.to_string();
        self
    }

    pub fn micro_arc_end(mut self) -> Self {
        self.scene_end = true;
        self.micro_arc_end = true;
        self
    }

    pub fn act_end(mut self) -> Self {
        self.scene_end = true;
        self.micro_arc_end = true;
        self.act_end = true;
        self
    }

    pub fn defeated(mut self) -> Self {
        self.defeated = true;
        self
    }

    pub fn won(mut self) -> Self {
        self.won = true;
        self
    }

    /// Render as the bare JSON text a well-behaved reply carries
    pub fn render(&self) -> String {
        json!({
            "description": self.description,
            "choices": self.choices,
            "suggestedFocus": self.suggested_focus,
            "actTitle": self.act_title,
            "sceneTitle": self.scene_title,
            "isSceneEnd": self.scene_end,
            "isMicroArcEnd": self.micro_arc_end,
            "isActEnd": self.act_end,
            "isPlayerDefeated": self.defeated,
            "isGameWon": self.won,
        })
        .to_string()
    }

    /// Render wrapped in the code fence models like to add
    pub fn fenced(&self) -> String {
        format!("```json\n{}\n```", self.render())
    }
}
